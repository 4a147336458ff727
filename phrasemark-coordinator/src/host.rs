use anyhow::Result;
use async_trait::async_trait;
use phrasemark_core::{AgentRequest, AgentResponse, DocumentHandle};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub handle: DocumentHandle,
    pub url: String,
}

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The document is alive but no agent is listening in it.
    #[error("no agent is listening in the document")]
    NoListener,
    #[error("document {0} is no longer open")]
    HandleGone(DocumentHandle),
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn is_no_listener(&self) -> bool {
        matches!(self, Self::NoListener)
    }
}

/// The environment hosting the open documents and the viewer window.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Checks that the handle still refers to a live document and returns
    /// its current url.
    async fn resolve(&self, handle: DocumentHandle) -> Result<String, DeliveryError>;

    /// Sends a request to the agent in the document and waits for its reply.
    async fn send(
        &self,
        handle: DocumentHandle,
        request: AgentRequest,
    ) -> Result<AgentResponse, DeliveryError>;

    /// Loads the agent into the document.
    async fn inject(&self, handle: DocumentHandle) -> Result<(), DeliveryError>;

    async fn documents(&self) -> Vec<OpenDocument>;

    async fn open_viewer(&self, url: &str) -> Result<()>;
}
