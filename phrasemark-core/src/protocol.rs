//! Message contracts between the viewer window, the coordinator and the
//! source document agent.

use serde::{Deserialize, Serialize};

use crate::{DocumentHandle, SessionState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorRequest {
    #[serde(rename_all = "camelCase")]
    OpenSession {
        state: SessionState,
        origin_handle: DocumentHandle,
        origin_url: String,
    },
    GetSessionState,
    UpdateSessionState {
        state: SessionState,
    },
    ScrollToPhrase {
        phrase: String,
    },
    ClearHighlights,
    CloseSession,
}

impl CoordinatorRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenSession { .. } => "OPEN_SESSION",
            Self::GetSessionState => "GET_SESSION_STATE",
            Self::UpdateSessionState { .. } => "UPDATE_SESSION_STATE",
            Self::ScrollToPhrase { .. } => "SCROLL_TO_PHRASE",
            Self::ClearHighlights => "CLEAR_HIGHLIGHTS",
            Self::CloseSession => "CLOSE_SESSION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordinatorResponse {
    Ack(Ack),
    State(StateReply),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReply {
    pub state: Option<SessionState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRequest {
    ScrollAndHighlight { phrase: String },
    ClearHighlights,
    GetPageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentResponse {
    Ack(Ack),
    Page(PageContent),
}

impl AgentResponse {
    /// Collapses the response into an acknowledgement for the router.
    pub fn into_ack(self) -> Ack {
        match self {
            Self::Ack(ack) => ack,
            Self::Page(_) => Ack::ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub title: String,
    pub text: String,
}

/// Error categories surfaced to the viewer window. Each one suggests a
/// different remedy, so they are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No handle and no url to fall back on: reopen the viewer.
    IdentityLost,
    /// Identity known but the document could not be reached: retry or refresh.
    DeliveryFailed,
    /// The phrase does not occur in the current document text.
    PhraseNotPresent,
    /// The text exists but no visible element contains it.
    PhraseUnlocatable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            kind: None,
        }
    }

    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            kind: Some(kind),
        }
    }

    /// Failure outside the routing and highlighting taxonomy.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            kind: None,
        }
    }
}
