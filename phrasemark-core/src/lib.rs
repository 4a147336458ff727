use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

pub mod normalize;
pub mod protocol;

pub use normalize::{compact, decode_entities, normalize, NormalizedText};
pub use protocol::{
    Ack, AgentRequest, AgentResponse, CoordinatorRequest, CoordinatorResponse, FailureKind,
    PageContent, StateReply,
};

/// Opaque, possibly stale reference to an open document in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentHandle(pub u64);

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
        }
    }
}

/// State shared between the viewer window and the coordinator.
///
/// `page_structure_summary`, `messages` and `settings` are carried along
/// untouched; only the target identity fields are interpreted by the router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub page_text: String,
    #[serde(default)]
    pub page_structure_summary: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub target_document_id: Option<DocumentHandle>,
    #[serde(default)]
    pub target_url: Option<String>,
}

impl SessionState {
    pub fn new(page_text: impl Into<String>) -> Self {
        Self {
            page_text: page_text.into(),
            ..Self::default()
        }
    }

    /// Records a successful resolution; handle and url always move together.
    pub fn set_target(&mut self, handle: DocumentHandle, url: impl Into<String>) {
        self.target_document_id = Some(handle);
        self.target_url = Some(url.into());
    }
}

/// The single persisted record: session state plus the resolved identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub state: Option<SessionState>,
    pub target_document_id: Option<DocumentHandle>,
    pub target_url: Option<String>,
}

impl PersistedSession {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.target_document_id.is_none() && self.target_url.is_none()
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>>;
    fn save(&self, record: &PersistedSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Keeps the record as `<root>/<key>.json`.
///
/// Each save serializes into its own temp file in `root` and renames it over
/// the record, so readers see either the old record or the new one.
pub struct FileStateStore {
    root: PathBuf,
    record_path: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf, key: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        let record_path = root.join(format!("{}.json", key.into()));
        Ok(Self { root, record_path })
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        let raw = match fs::read(&self.record_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read session record {:?}", self.record_path))
            }
        };
        let record = serde_json::from_slice(&raw)
            .with_context(|| format!("session record {:?} is not valid", self.record_path))?;
        Ok(Some(record))
    }

    fn save(&self, record: &PersistedSession) -> Result<()> {
        let mut staged = NamedTempFile::new_in(&self.root)
            .with_context(|| format!("failed to stage session record in {:?}", self.root))?;
        serde_json::to_writer_pretty(staged.as_file_mut(), record)?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.record_path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace session record {:?}", self.record_path))?;
        debug!(path = ?self.record_path, "session record written");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.record_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to remove session record {:?}", self.record_path)),
        }
    }
}

pub struct MemoryStateStore {
    inner: Mutex<Option<PersistedSession>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn with_record(record: PersistedSession) -> Self {
        Self {
            inner: Mutex::new(Some(record)),
        }
    }

    pub fn snapshot(&self) -> Option<PersistedSession> {
        self.inner.lock().clone()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        Ok(self.inner.lock().clone())
    }

    fn save(&self, record: &PersistedSession) -> Result<()> {
        *self.inner.lock() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock() = None;
        Ok(())
    }
}
