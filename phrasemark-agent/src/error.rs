use phrasemark_core::FailureKind;
use thiserror::Error;

use crate::dom::NodeId;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0:?} is not a text node")]
    NotText(NodeId),
    #[error("node {0:?} already has a parent")]
    AlreadyAttached(NodeId),
    #[error("node {0:?} has no parent")]
    Detached(NodeId),
    #[error("inserting {0:?} would create a cycle")]
    Cycle(NodeId),
    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("range crosses an element boundary and cannot be wrapped")]
    RangeCrossesBoundary,
    #[error("range {start}..{end} is not valid for the text node")]
    InvalidRange { start: usize, end: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HighlightError {
    #[error("Could not find this text on the page. The page may have changed, or the quote may not come from it.")]
    PhraseNotPresent,
    #[error("The text is on the page but not inside any visible section. The page content may have changed or the section may be collapsed.")]
    PhraseUnlocatable,
}

impl HighlightError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PhraseNotPresent => FailureKind::PhraseNotPresent,
            Self::PhraseUnlocatable => FailureKind::PhraseUnlocatable,
        }
    }
}
