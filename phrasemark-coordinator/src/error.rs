use phrasemark_core::{DocumentHandle, FailureKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Connection to the original page was lost. Close this window and reopen it from the page you were reading.")]
    IdentityLost,
    #[error("Could not reach the original page ({reason}). Make sure its tab is still open, refresh it, and try again.")]
    DeliveryFailed {
        handle: Option<DocumentHandle>,
        reason: String,
    },
}

impl RouteError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::IdentityLost => FailureKind::IdentityLost,
            Self::DeliveryFailed { .. } => FailureKind::DeliveryFailed,
        }
    }
}
