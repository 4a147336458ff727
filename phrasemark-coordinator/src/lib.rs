//! Long-lived coordinator between the viewer window and the source document.
//!
//! Owns the session state, persists it so a restart loses nothing, and routes
//! highlight requests to the agent in the right document even when the handle
//! it holds has gone stale.

use std::sync::Arc;

use parking_lot::Mutex;
use phrasemark_core::{
    Ack, AgentRequest, CoordinatorRequest, CoordinatorResponse, DocumentHandle, PersistedSession,
    SessionState, StateReply, StateStore,
};
use tracing::{debug, info, instrument, warn};

pub mod config;
pub mod error;
pub mod host;
pub mod local;
pub mod resolve;
pub mod router;
pub mod writer;

pub use config::CoordinatorConfig;
pub use error::RouteError;
pub use host::{DeliveryError, DocumentHost, OpenDocument};
pub use local::LocalHost;
pub use router::{IdentitySource, RouteMachine, RouteOutcome, RouteStep, TargetIdentity};
pub use writer::SessionWriter;

#[derive(Debug, Default)]
struct Inner {
    state: Option<SessionState>,
    handle: Option<DocumentHandle>,
    url: Option<String>,
}

impl Inner {
    fn record(&self) -> PersistedSession {
        PersistedSession {
            state: self.state.clone(),
            target_document_id: self.handle,
            target_url: self.url.clone(),
        }
    }
}

pub struct Coordinator {
    host: Arc<dyn DocumentHost>,
    store: Arc<dyn StateStore>,
    config: CoordinatorConfig,
    inner: Mutex<Inner>,
    writer: SessionWriter,
}

impl Coordinator {
    /// Builds a coordinator and rehydrates the persisted identity before it
    /// can receive any message. Must be called inside a tokio runtime.
    pub fn start(
        host: Arc<dyn DocumentHost>,
        store: Arc<dyn StateStore>,
        config: CoordinatorConfig,
    ) -> Self {
        let mut inner = Inner::default();
        match store.load() {
            Ok(Some(record)) => {
                inner.handle = record
                    .target_document_id
                    .or_else(|| record.state.as_ref()?.target_document_id);
                inner.url = record
                    .target_url
                    .clone()
                    .or_else(|| record.state.as_ref()?.target_url.clone());
                inner.state = record.state;
                info!(handle = ?inner.handle, url = ?inner.url, "session rehydrated");
            }
            Ok(None) => debug!("no persisted session"),
            Err(err) => warn!(?err, "failed to read persisted session"),
        }
        let writer = SessionWriter::spawn(Arc::clone(&store));
        Self {
            host,
            store,
            config,
            inner: Mutex::new(inner),
            writer,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Message entry point. Every request gets exactly one response.
    #[instrument(skip_all, fields(action = request.name()))]
    pub async fn handle(&self, request: CoordinatorRequest) -> CoordinatorResponse {
        match request {
            CoordinatorRequest::OpenSession {
                state,
                origin_handle,
                origin_url,
            } => CoordinatorResponse::Ack(
                self.open_session(state, origin_handle, &origin_url).await,
            ),
            CoordinatorRequest::GetSessionState => CoordinatorResponse::State(StateReply {
                state: self.get_state(),
            }),
            CoordinatorRequest::UpdateSessionState { state } => {
                CoordinatorResponse::Ack(self.update_session(state))
            }
            CoordinatorRequest::ScrollToPhrase { phrase } => {
                CoordinatorResponse::Ack(self.route_scroll_request(&phrase).await)
            }
            CoordinatorRequest::ClearHighlights => {
                CoordinatorResponse::Ack(self.route_clear_request().await)
            }
            CoordinatorRequest::CloseSession => CoordinatorResponse::Ack(self.close_session()),
        }
    }

    pub fn get_state(&self) -> Option<SessionState> {
        self.current();
        let inner = self.inner.lock();
        let mut state = inner.state.clone()?;
        if state.target_document_id.is_none() {
            state.target_document_id = inner.handle;
        }
        if state.target_url.is_none() {
            state.target_url = inner.url.clone();
        }
        Some(state)
    }

    pub async fn open_session(
        &self,
        mut state: SessionState,
        origin_handle: DocumentHandle,
        origin_url: &str,
    ) -> Ack {
        state.set_target(origin_handle, origin_url);
        {
            let mut inner = self.inner.lock();
            inner.state = Some(state);
            inner.handle = Some(origin_handle);
            inner.url = Some(origin_url.to_string());
        }
        self.persist();
        info!(handle = %origin_handle, url = origin_url, "session opened");

        if let Err(err) = self.host.open_viewer(&self.config.viewer_url).await {
            warn!(?err, "failed to open viewer window");
            return Ack::error(format!("Could not open the viewer window: {err}"));
        }
        Ack::ok()
    }

    /// Replaces the state wholesale. An identity in the new state wins;
    /// without one, the identity already held is carried over.
    pub fn update_session(&self, mut state: SessionState) -> Ack {
        {
            let mut inner = self.inner.lock();
            match state.target_document_id {
                Some(handle) => {
                    inner.handle = Some(handle);
                    if let Some(url) = &state.target_url {
                        inner.url = Some(url.clone());
                    } else {
                        state.target_url = inner.url.clone();
                    }
                }
                None => {
                    let previous = inner.state.as_ref();
                    let kept_handle = inner.handle.or_else(|| previous?.target_document_id);
                    let kept_url = inner.url.clone().or_else(|| previous?.target_url.clone());
                    let incoming_url = state.target_url.take();
                    // a kept handle keeps the url it was resolved with
                    state.target_url = match kept_handle {
                        Some(_) => kept_url.or(incoming_url),
                        None => incoming_url.or(kept_url),
                    };
                    state.target_document_id = kept_handle;
                    inner.handle = kept_handle;
                    inner.url = state.target_url.clone();
                }
            }
            inner.state = Some(state);
        }
        self.persist();
        Ack::ok()
    }

    pub async fn route_scroll_request(&self, phrase: &str) -> Ack {
        self.route(AgentRequest::ScrollAndHighlight {
            phrase: phrase.to_string(),
        })
        .await
    }

    pub async fn route_clear_request(&self) -> Ack {
        self.route(AgentRequest::ClearHighlights).await
    }

    async fn route(&self, request: AgentRequest) -> Ack {
        let machine = RouteMachine::new(
            self.host.as_ref(),
            self,
            request,
            self.config.injection_delay,
        );
        let outcome = machine.run().await;
        match &outcome {
            RouteOutcome::Delivered { handle, .. } => debug!(%handle, "request delivered"),
            RouteOutcome::Failed(err) => warn!(%err, "request could not be delivered"),
        }
        outcome.into_ack()
    }

    /// Drops the session and its persisted copy.
    pub fn close_session(&self) -> Ack {
        {
            let mut inner = self.inner.lock();
            *inner = Inner::default();
            self.writer.clear();
        }
        info!("session closed");
        Ack::ok()
    }

    /// Waits until every write issued so far has reached the store.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Queues the current record. Sent under the state lock so the writer
    /// sees records in the order the state changed.
    fn persist(&self) {
        let inner = self.inner.lock();
        self.writer.save(inner.record());
    }
}

impl IdentitySource for Coordinator {
    /// Memory first, then the in-memory state's own copy, then one read of
    /// the persisted record.
    fn current(&self) -> TargetIdentity {
        {
            let mut inner = self.inner.lock();
            if inner.handle.is_none() {
                if let Some(state) = inner.state.as_ref() {
                    let (handle, url) = (state.target_document_id, state.target_url.clone());
                    inner.handle = handle;
                    if inner.url.is_none() {
                        inner.url = url;
                    }
                }
            }
            if inner.handle.is_some() {
                return TargetIdentity {
                    handle: inner.handle,
                    url: inner.url.clone(),
                };
            }
        }

        let record = match self.store.load() {
            Ok(record) => record.unwrap_or_default(),
            Err(err) => {
                warn!(?err, "failed to read persisted session while recovering identity");
                PersistedSession::default()
            }
        };
        let stored_state = record.state.as_ref();
        let handle = record
            .target_document_id
            .or_else(|| stored_state?.target_document_id);
        let url = record
            .target_url
            .clone()
            .or_else(|| stored_state?.target_url.clone());

        let mut inner = self.inner.lock();
        if inner.handle.is_none() {
            inner.handle = handle;
        }
        if inner.url.is_none() {
            inner.url = url;
        }
        if inner.handle.is_some() {
            info!(handle = ?inner.handle, "identity recovered from persisted session");
        }
        TargetIdentity {
            handle: inner.handle,
            url: inner.url.clone(),
        }
    }

    fn adopt(&self, handle: DocumentHandle, url: &str) {
        {
            let mut inner = self.inner.lock();
            inner.handle = Some(handle);
            inner.url = Some(url.to_string());
            if let Some(state) = inner.state.as_mut() {
                state.set_target(handle, url);
            }
        }
        self.persist();
    }
}
