//! Ordered persistence for the session record.
//!
//! All writes go through one task, so they land in the order they were
//! issued. Writes queued behind a slow one collapse into the newest, and a
//! clear supersedes any save queued before it.

use std::sync::Arc;

use phrasemark_core::{PersistedSession, StateStore};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum Op {
    Save(PersistedSession),
    Clear,
    Flush(oneshot::Sender<()>),
}

enum Write {
    Save(PersistedSession),
    Clear,
}

pub struct SessionWriter {
    tx: mpsc::UnboundedSender<Op>,
}

impl SessionWriter {
    /// Starts the writer task on the current tokio runtime. The task stops
    /// once the writer is dropped and its queue is drained.
    pub fn spawn(store: Arc<dyn StateStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, rx));
        Self { tx }
    }

    pub fn save(&self, record: PersistedSession) {
        self.send(Op::Save(record));
    }

    pub fn clear(&self) {
        self.send(Op::Clear);
    }

    /// Resolves once every write issued before this call has been applied.
    pub async fn flush(&self) {
        let (done, applied) = oneshot::channel();
        self.send(Op::Flush(done));
        if applied.await.is_err() {
            warn!("session writer stopped before flushing");
        }
    }

    fn send(&self, op: Op) {
        if self.tx.send(op).is_err() {
            warn!("session writer has stopped, dropping write");
        }
    }
}

async fn run(store: Arc<dyn StateStore>, mut rx: mpsc::UnboundedReceiver<Op>) {
    while let Some(first) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(first);
        while let Some(op) = next {
            match op {
                Op::Save(record) => latest = Some(Write::Save(record)),
                Op::Clear => latest = Some(Write::Clear),
                Op::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        if let Some(write) = latest {
            apply(&store, write).await;
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
    debug!("session writer stopped");
}

async fn apply(store: &Arc<dyn StateStore>, write: Write) {
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || match write {
        Write::Save(record) => store.save(&record),
        Write::Clear => store.clear(),
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(?err, "failed to persist session"),
        Err(err) => warn!(?err, "persistence task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use anyhow::Result;
    use parking_lot::Mutex;
    use phrasemark_core::{MemoryStateStore, SessionState};

    /// Memory store that stalls on a chosen page text and tracks overlap.
    #[derive(Default)]
    struct StallingStore {
        inner: MemoryStateStore,
        stall_on: Option<&'static str>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        applied: Mutex<Vec<Option<String>>>,
    }

    impl StallingStore {
        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl StateStore for StallingStore {
        fn load(&self) -> Result<Option<PersistedSession>> {
            self.inner.load()
        }

        fn save(&self, record: &PersistedSession) -> Result<()> {
            self.enter();
            let text = record.state.as_ref().map(|s| s.page_text.clone());
            if text.as_deref().is_some() && text.as_deref() == self.stall_on {
                thread::sleep(Duration::from_millis(200));
            }
            let result = self.inner.save(record);
            self.applied.lock().push(text);
            self.leave();
            result
        }

        fn clear(&self) -> Result<()> {
            self.enter();
            let result = self.inner.clear();
            self.applied.lock().push(None);
            self.leave();
            result
        }
    }

    fn record(text: &str) -> PersistedSession {
        PersistedSession {
            state: Some(SessionState::new(text)),
            ..PersistedSession::default()
        }
    }

    #[tokio::test]
    async fn clear_after_slow_save_wins() {
        let store = Arc::new(StallingStore {
            stall_on: Some("first"),
            ..StallingStore::default()
        });
        let writer = SessionWriter::spawn(store.clone());

        writer.save(record("first"));
        writer.clear();
        writer.flush().await;

        assert!(store.inner.snapshot().is_none());
        assert_eq!(store.applied.lock().last(), Some(&None));
    }

    #[tokio::test]
    async fn burst_of_saves_ends_on_newest_without_overlap() {
        let store = Arc::new(StallingStore {
            stall_on: Some("0"),
            ..StallingStore::default()
        });
        let writer = SessionWriter::spawn(store.clone());

        for n in 0..8 {
            writer.save(record(&n.to_string()));
        }
        writer.flush().await;

        let persisted = store.inner.snapshot().unwrap();
        assert_eq!(persisted.state.unwrap().page_text, "7");
        assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
        assert!(store.applied.lock().len() <= 8);
    }

    #[tokio::test]
    async fn flush_with_nothing_queued_returns() {
        let writer = SessionWriter::spawn(Arc::new(MemoryStateStore::new()));
        writer.flush().await;
        writer.flush().await;
    }
}
