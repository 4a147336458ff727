//! Applies and reverts phrase highlights.
//!
//! Every edit is recorded as a patch holding exactly the nodes it inserted,
//! and clearing replays those patches in reverse. Nothing is found again by
//! scanning for marker classes.

use std::ops::Range;

use phrasemark_core::{compact, normalize, NormalizedText};
use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId, ScrollAlign};
use crate::error::{DomError, HighlightError};
use crate::locator::{Locator, Needle, Pass};

pub const INLINE_MARK_TAG: &str = "mark";
pub const INLINE_MARK_CLASS: &str = "phrasemark-inline-highlight";
pub const BLOCK_MARK_CLASS: &str = "phrasemark-block-highlight";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightOutcome {
    pub element: NodeId,
    pub inline: bool,
    pub pass: Pass,
}

/// One inline wrap: the split text node, what it held before, and the two
/// nodes inserted after it.
#[derive(Debug, Clone)]
struct InlinePatch {
    original: NodeId,
    original_text: String,
    marker: NodeId,
    tail: NodeId,
}

impl InlinePatch {
    fn revert(&self, doc: &mut Document) -> Result<(), DomError> {
        let intact = doc.is_attached(self.original)
            && doc.parent(self.marker) == doc.parent(self.original)
            && doc.parent(self.tail) == doc.parent(self.original);
        if intact {
            doc.set_text(self.original, self.original_text.clone())?;
            doc.detach(self.marker)?;
            doc.detach(self.tail)?;
            return Ok(());
        }
        // the page moved our nodes around; fall back to unwrapping in place
        unwrap_marker(doc, self.marker)
    }
}

/// Moves the marker's children into its parent, in order, then drops it.
fn unwrap_marker(doc: &mut Document, marker: NodeId) -> Result<(), DomError> {
    let Some(parent) = doc.parent(marker) else {
        return Ok(());
    };
    let children = doc.children(marker).to_vec();
    for child in children {
        doc.detach(child)?;
        doc.insert_before(parent, child, Some(marker))?;
    }
    doc.detach(marker)
}

#[derive(Debug, Default)]
pub struct Highlighter {
    inline: Vec<InlinePatch>,
    blocks: Vec<NodeId>,
}

impl Highlighter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inline.is_empty() && self.blocks.is_empty()
    }

    pub fn inline_markers(&self) -> Vec<NodeId> {
        self.inline.iter().map(|patch| patch.marker).collect()
    }

    pub fn block_elements(&self) -> &[NodeId] {
        &self.blocks
    }

    pub fn highlight(
        &mut self,
        doc: &mut Document,
        phrase: &str,
    ) -> Result<HighlightOutcome, HighlightError> {
        let needle = Needle::new(phrase);
        if needle.is_empty() {
            return Err(HighlightError::PhraseNotPresent);
        }

        let page = Locator::new(doc).page_text();
        if !needle.found_in(&normalize(&page)) && !needle.found_in_compact(&compact(&page)) {
            debug!(phrase = %needle.normalized, "phrase absent from page text");
            return Err(HighlightError::PhraseNotPresent);
        }

        self.clear_all(doc);

        let (located, element) = {
            let locator = Locator::new(doc);
            let located = locator
                .locate_detailed(phrase)
                .ok_or(HighlightError::PhraseUnlocatable)?;
            let element = if locator.is_coarse(located.element) {
                locator
                    .tightest_descendant(located.element, phrase)
                    .unwrap_or(located.element)
            } else {
                located.element
            };
            (located, element)
        };

        doc.scroll_into_view(element, ScrollAlign::Center);

        let inline = match self.wrap_inline(doc, element, &needle) {
            Ok(()) => true,
            Err(err) => {
                debug!(%err, element = %doc.describe(element), "inline highlight skipped");
                false
            }
        };
        self.mark_block(doc, element);

        info!(
            element = %doc.describe(element),
            inline,
            pass = ?located.pass,
            "phrase highlighted"
        );
        Ok(HighlightOutcome {
            element,
            inline,
            pass: located.pass,
        })
    }

    /// Reverts every recorded edit. Safe to call with nothing applied.
    pub fn clear_all(&mut self, doc: &mut Document) {
        for patch in self.inline.drain(..).rev() {
            if let Err(err) = patch.revert(doc) {
                warn!(%err, "failed to revert inline highlight");
            }
        }
        for element in self.blocks.drain(..) {
            if let Err(err) = doc.remove_class(element, BLOCK_MARK_CLASS) {
                warn!(%err, "failed to remove block highlight");
            }
        }
    }

    fn wrap_inline(
        &mut self,
        doc: &mut Document,
        element: NodeId,
        needle: &Needle,
    ) -> Result<(), DomError> {
        let text_nodes = {
            let locator = Locator::new(doc);
            let within_nav = locator.in_navigation(element);
            doc.text_nodes_filtered(element, |n| {
                locator.is_overlay(n) || (!within_nav && locator.is_navigation(n))
            })
        };
        for node in text_nodes {
            let Some(raw) = doc.text(node) else {
                continue;
            };
            if let Some(range) = NormalizedText::new(raw).find_raw(&needle.normalized) {
                return self.wrap(doc, node, range);
            }
        }
        // only reachable when the phrase spans several text runs
        Err(DomError::RangeCrossesBoundary)
    }

    fn wrap(&mut self, doc: &mut Document, node: NodeId, range: Range<usize>) -> Result<(), DomError> {
        let original_text = doc.text(node).ok_or(DomError::NotText(node))?.to_string();
        let valid = range.start < range.end
            && range.end <= original_text.len()
            && original_text.is_char_boundary(range.start)
            && original_text.is_char_boundary(range.end);
        if !valid {
            return Err(DomError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        if doc.parent(node).is_none() {
            return Err(DomError::Detached(node));
        }

        let marker = doc.create_element(INLINE_MARK_TAG);
        doc.set_attr(marker, "class", INLINE_MARK_CLASS)?;
        let inner = doc.create_text(&original_text[range.clone()]);
        doc.append_child(marker, inner)?;
        let tail = doc.create_text(&original_text[range.end..]);

        doc.insert_after(node, marker)?;
        doc.insert_after(marker, tail)?;
        doc.set_text(node, &original_text[..range.start])?;

        self.inline.push(InlinePatch {
            original: node,
            original_text,
            marker,
            tail,
        });
        Ok(())
    }

    fn mark_block(&mut self, doc: &mut Document, element: NodeId) {
        match doc.add_class(element, BLOCK_MARK_CLASS) {
            Ok(true) => self.blocks.push(element),
            Ok(false) => {}
            Err(err) => warn!(%err, "failed to apply block highlight"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{el, el_with, text, DocumentSpec, NodeSpec};

    fn build(body: Vec<NodeSpec>) -> Document {
        DocumentSpec::new(body).build()
    }

    fn primate_page() -> Document {
        build(vec![
            el("h1", vec![text("Primate")]),
            el(
                "p",
                vec![
                    text("Nails are a "),
                    el_with("a", &[("href", "/wiki/Nail")], vec![text("distinguishing feature")]),
                    text(" of the primate order."),
                ],
            ),
            el(
                "p",
                vec![text("Most primates live in   tropical forests of the Americas.")],
            ),
        ])
    }

    fn marked_text(doc: &Document, highlighter: &Highlighter) -> Vec<String> {
        highlighter
            .inline_markers()
            .into_iter()
            .map(|marker| doc.text_content(marker))
            .collect()
    }

    #[test]
    fn inline_and_block_highlight_within_single_run() {
        let mut doc = primate_page();
        let before = doc.text_content(doc.root());
        let mut highlighter = Highlighter::new();

        let outcome = highlighter
            .highlight(&mut doc, "live in tropical FORESTS")
            .unwrap();
        assert!(outcome.inline);
        assert_eq!(outcome.pass, Pass::Content);
        assert_eq!(marked_text(&doc, &highlighter), vec!["live in   tropical forests"]);
        assert!(doc.has_class(outcome.element, BLOCK_MARK_CLASS));
        assert_eq!(doc.scrolled_to(), Some((outcome.element, ScrollAlign::Center)));
        assert_eq!(doc.text_content(doc.root()), before);
    }

    #[test]
    fn phrase_across_link_gets_block_highlight_only() {
        let mut doc = primate_page();
        let mut highlighter = Highlighter::new();

        let outcome = highlighter
            .highlight(&mut doc, "Nails are a distinguishing feature of the primate order")
            .unwrap();
        assert!(!outcome.inline);
        assert_eq!(doc.tag(outcome.element), Some("p"));
        assert!(doc.has_class(outcome.element, BLOCK_MARK_CLASS));
        assert!(highlighter.inline_markers().is_empty());
    }

    #[test]
    fn clear_all_restores_text_after_repeated_highlights() {
        let mut doc = primate_page();
        let before = doc.text_content(doc.root());
        let mut highlighter = Highlighter::new();

        highlighter.highlight(&mut doc, "primate order").unwrap();
        highlighter.highlight(&mut doc, "tropical forests").unwrap();
        highlighter.highlight(&mut doc, "Primate").unwrap();
        assert_eq!(highlighter.inline_markers().len(), 1);
        assert_eq!(highlighter.block_elements().len(), 1);

        highlighter.clear_all(&mut doc);
        assert!(highlighter.is_empty());
        assert_eq!(doc.text_content(doc.root()), before);
        let leftover = doc
            .subtree(doc.root())
            .filter(|id| {
                doc.tag(*id) == Some(INLINE_MARK_TAG) || doc.has_class(*id, BLOCK_MARK_CLASS)
            })
            .count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn clear_all_is_safe_when_empty_or_repeated() {
        let mut doc = primate_page();
        let mut highlighter = Highlighter::new();
        highlighter.clear_all(&mut doc);
        highlighter.highlight(&mut doc, "tropical").unwrap();
        highlighter.clear_all(&mut doc);
        highlighter.clear_all(&mut doc);
        assert!(highlighter.is_empty());
    }

    #[test]
    fn absent_phrase_leaves_existing_highlight() {
        let mut doc = primate_page();
        let mut highlighter = Highlighter::new();
        highlighter.highlight(&mut doc, "tropical").unwrap();

        let err = highlighter
            .highlight(&mut doc, "arboreal marsupials")
            .unwrap_err();
        assert_eq!(err, HighlightError::PhraseNotPresent);
        assert_eq!(highlighter.inline_markers().len(), 1);
    }

    #[test]
    fn hidden_only_occurrence_is_unlocatable() {
        let mut doc = build(vec![
            el_with(
                "nav",
                &[("style", "display:none")],
                vec![el("li", vec![text("needle")])],
            ),
            el("p", vec![text("haystack")]),
        ]);
        let mut highlighter = Highlighter::new();
        let err = highlighter.highlight(&mut doc, "needle").unwrap_err();
        assert_eq!(err, HighlightError::PhraseUnlocatable);
        assert!(highlighter.is_empty());
    }

    #[test]
    fn coarse_match_is_refined_to_child() {
        let mut doc = build(vec![el(
            "div",
            vec![
                el("p", vec![text("Alpha beta")]),
                el("p", vec![text("gamma delta")]),
            ],
        )]);
        let mut highlighter = Highlighter::new();
        // spans two paragraphs, so only the div holds it and nothing tighter does
        let outcome = highlighter.highlight(&mut doc, "betagamma").unwrap();
        assert_eq!(doc.tag(outcome.element), Some("div"));
        assert!(!outcome.inline);

        let outcome = highlighter.highlight(&mut doc, "gamma").unwrap();
        assert_eq!(doc.tag(outcome.element), Some("p"));
        assert!(outcome.inline);
    }

    #[test]
    fn preexisting_block_class_is_left_alone() {
        let mut doc = build(vec![el_with(
            "p",
            &[("class", BLOCK_MARK_CLASS)],
            vec![text("already flagged")],
        )]);
        let mut highlighter = Highlighter::new();
        let outcome = highlighter.highlight(&mut doc, "flagged").unwrap();
        highlighter.clear_all(&mut doc);
        assert!(doc.has_class(outcome.element, BLOCK_MARK_CLASS));
    }

    #[test]
    fn unwrap_handles_moved_nodes() {
        let mut doc = primate_page();
        let mut highlighter = Highlighter::new();
        highlighter.highlight(&mut doc, "tropical").unwrap();
        let marker = highlighter.inline_markers()[0];

        // page script moves the mark into a new wrapper
        let parent = doc.parent(marker).unwrap();
        let wrapper = doc.create_element("span");
        doc.insert_before(parent, wrapper, Some(marker)).unwrap();
        doc.detach(marker).unwrap();
        doc.append_child(wrapper, marker).unwrap();

        let before = doc.text_content(doc.root());
        highlighter.clear_all(&mut doc);
        assert!(doc.parent(marker).is_none());
        assert_eq!(doc.text_content(doc.root()), before);
    }

    #[test]
    fn coarse_match_is_not_narrowed_into_hidden_navigation() {
        let mut doc = build(vec![el(
            "div",
            vec![
                text("Lemurs eat fruit "),
                el_with(
                    "aside",
                    &[("hidden", "")],
                    vec![el("li", vec![text("Lemurs eat fruit")])],
                ),
            ],
        )]);
        let mut highlighter = Highlighter::new();

        let outcome = highlighter.highlight(&mut doc, "lemurs eat fruit").unwrap();
        assert_eq!(doc.tag(outcome.element), Some("div"));
        assert!(doc.is_visible(outcome.element));
        assert_eq!(outcome.pass, Pass::Content);
        assert!(outcome.inline);
        assert_eq!(marked_text(&doc, &highlighter), vec!["Lemurs eat fruit"]);
    }
}
