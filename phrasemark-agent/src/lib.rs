//! Source document agent: locates phrases in the page it lives in and
//! highlights them.

use phrasemark_core::{Ack, AgentRequest, AgentResponse, PageContent};
use tracing::{instrument, warn};

pub mod dom;
pub mod error;
pub mod highlight;
pub mod locator;
pub mod snapshot;
pub mod style;

pub use dom::{Document, NodeId, ScrollAlign};
pub use error::{DomError, HighlightError};
pub use highlight::{HighlightOutcome, Highlighter, BLOCK_MARK_CLASS, INLINE_MARK_CLASS};
pub use locator::{Located, Locator, Pass};
pub use snapshot::{DocumentSpec, NodeSpec};

pub struct SourceAgent {
    document: Document,
    highlighter: Highlighter,
}

impl SourceAgent {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            highlighter: Highlighter::new(),
        }
    }

    pub fn from_spec(spec: &DocumentSpec) -> Self {
        Self::new(spec.build())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn highlighter(&self) -> &Highlighter {
        &self.highlighter
    }

    pub fn locate(&self, phrase: &str) -> Option<NodeId> {
        Locator::new(&self.document).locate(phrase)
    }

    pub fn highlight(&mut self, phrase: &str) -> Result<HighlightOutcome, HighlightError> {
        self.highlighter.highlight(&mut self.document, phrase)
    }

    pub fn clear_all(&mut self) {
        self.highlighter.clear_all(&mut self.document);
    }

    pub fn page_content(&self) -> PageContent {
        PageContent {
            title: self.document.title().to_string(),
            text: Locator::new(&self.document).page_text(),
        }
    }

    /// Message entry point. Failures come back as structured acks.
    #[instrument(skip(self))]
    pub fn handle(&mut self, request: AgentRequest) -> AgentResponse {
        match request {
            AgentRequest::ScrollAndHighlight { phrase } => match self.highlight(&phrase) {
                Ok(_) => AgentResponse::Ack(Ack::ok()),
                Err(err) => {
                    warn!(%err, "highlight failed");
                    AgentResponse::Ack(Ack::failure(err.kind(), err.to_string()))
                }
            },
            AgentRequest::ClearHighlights => {
                self.clear_all();
                AgentResponse::Ack(Ack::ok())
            }
            AgentRequest::GetPageContent => AgentResponse::Page(self.page_content()),
        }
    }
}
