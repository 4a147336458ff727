//! Finds the element that best contains a phrase.
//!
//! The search runs in two passes. The first ignores navigation furniture
//! entirely and prefers the main content container; the second admits
//! navigation but only accepts a match that is actually rendered.

use phrasemark_core::{compact, normalize};
use tracing::debug;

use crate::dom::{Document, NodeId};

/// Tags that carry readable content. Containers come last and are only
/// picked when nothing tighter holds the phrase.
pub const CONTENT_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "dt", "dd", "td", "th", "blockquote", "pre",
    "code", "figcaption", "caption", "summary", "label", "div", "section", "article", "main",
    "body",
];

/// Candidates that are too broad to be a precise answer on their own.
pub const CONTAINER_TAGS: &[&str] = &["div", "section", "article", "main", "body"];

/// Normalized length past which a match is treated as a container.
pub const MAX_PRECISE_CHARS: usize = 1500;

pub const OVERLAY_ID: &str = "phrasemark-overlay";
pub const OVERLAY_CLASS: &str = "phrasemark-overlay";

const NAV_TAGS: &[&str] = &["nav", "header", "footer", "aside", "menu"];
const NAV_ROLES: &[&str] = &[
    "navigation",
    "banner",
    "contentinfo",
    "complementary",
    "menu",
    "menubar",
    "tree",
];
const NAV_HINTS: &[&str] = &[
    "nav",
    "navbar",
    "navigation",
    "sidebar",
    "toc",
    "menu",
    "breadcrumb",
    "breadcrumbs",
    "footer",
    "header",
];
const MAIN_IDS: &[&str] = &["content", "main", "main-content", "maincontent", "mw-content-text"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Content,
    Navigation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub element: NodeId,
    pub pass: Pass,
}

/// A phrase prepared once for repeated matching.
#[derive(Debug, Clone)]
pub struct Needle {
    pub normalized: String,
    pub compact: String,
}

impl Needle {
    pub fn new(phrase: &str) -> Self {
        Self {
            normalized: normalize(phrase),
            compact: compact(phrase),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn found_in(&self, normalized_haystack: &str) -> bool {
        !self.is_empty() && normalized_haystack.contains(&self.normalized)
    }

    pub fn found_in_compact(&self, compact_haystack: &str) -> bool {
        !self.compact.is_empty() && compact_haystack.contains(&self.compact)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matching {
    Normalized,
    Compact,
}

struct Candidate {
    id: NodeId,
    order: usize,
    depth: usize,
    in_nav: bool,
    in_main: bool,
}

struct Hit {
    id: NodeId,
    order: usize,
    depth: usize,
    len: usize,
    in_main: bool,
}

pub struct Locator<'a> {
    doc: &'a Document,
}

impl<'a> Locator<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    pub fn locate(&self, phrase: &str) -> Option<NodeId> {
        self.locate_detailed(phrase).map(|located| located.element)
    }

    pub fn locate_detailed(&self, phrase: &str) -> Option<Located> {
        let needle = Needle::new(phrase);
        if needle.is_empty() {
            return None;
        }
        let candidates = self.candidates();

        if let Some(element) = self.best_match(&candidates, &needle, Pass::Content) {
            debug!(element = %self.doc.describe(element), "phrase located in content");
            return Some(Located {
                element,
                pass: Pass::Content,
            });
        }

        let element = self.best_match(&candidates, &needle, Pass::Navigation)?;
        if !self.doc.is_visible(element) {
            debug!(
                element = %self.doc.describe(element),
                "navigation match is not rendered, discarding"
            );
            return None;
        }
        debug!(element = %self.doc.describe(element), "phrase located in navigation");
        Some(Located {
            element,
            pass: Pass::Navigation,
        })
    }

    /// Smallest precise content element below `element` that still holds
    /// the phrase, if any. Below a content element, navigation is skipped;
    /// either way the descendant must be rendered.
    pub fn tightest_descendant(&self, element: NodeId, phrase: &str) -> Option<NodeId> {
        let needle = Needle::new(phrase);
        if needle.is_empty() {
            return None;
        }
        let within_nav = self.in_navigation(element);
        self.doc
            .subtree(element)
            .skip(1)
            .enumerate()
            .filter(|(_, id)| {
                self.doc
                    .tag(*id)
                    .is_some_and(|tag| CONTENT_TAGS.contains(&tag) && !CONTAINER_TAGS.contains(&tag))
            })
            .filter(|(_, id)| !self.in_overlay(*id))
            .filter(|(_, id)| within_nav || !self.in_navigation(*id))
            .filter(|(_, id)| self.doc.is_visible(*id))
            .filter_map(|(order, id)| {
                let text = normalize(&self.doc.text_content_filtered(id, |n| {
                    self.is_overlay(n) || (!within_nav && self.is_navigation(n))
                }));
                needle.found_in(&text).then(|| Hit {
                    id,
                    order,
                    depth: self.doc.depth(id),
                    len: text.chars().count(),
                    in_main: false,
                })
            })
            .min_by_key(|hit| (hit.len, std::cmp::Reverse(hit.depth), hit.order))
            .map(|hit| hit.id)
    }

    /// Whether a located element is too broad to be shown as the answer.
    pub fn is_coarse(&self, element: NodeId) -> bool {
        let Some(tag) = self.doc.tag(element) else {
            return false;
        };
        if CONTAINER_TAGS.contains(&tag) || !CONTENT_TAGS.contains(&tag) {
            return true;
        }
        let text = normalize(&self.doc.text_content(element));
        text.chars().count() > MAX_PRECISE_CHARS
    }

    fn candidates(&self) -> Vec<Candidate> {
        self.doc
            .subtree(self.doc.body())
            .filter(|id| self.doc.tag(*id).is_some_and(|tag| CONTENT_TAGS.contains(&tag)))
            .filter(|id| !self.in_overlay(*id))
            .enumerate()
            .map(|(order, id)| Candidate {
                id,
                order,
                depth: self.doc.depth(id),
                in_nav: self.in_navigation(id),
                in_main: self.in_main_content(id),
            })
            .collect()
    }

    fn best_match(&self, candidates: &[Candidate], needle: &Needle, pass: Pass) -> Option<NodeId> {
        let hits = self.hits(candidates, needle, pass, Matching::Normalized);
        let hits = if hits.is_empty() {
            self.hits(candidates, needle, pass, Matching::Compact)
        } else {
            hits
        };
        if hits.is_empty() {
            return None;
        }

        let prefer_main = pass == Pass::Content && hits.iter().any(|hit| hit.in_main);
        hits.into_iter()
            .filter(|hit| !prefer_main || hit.in_main)
            .min_by_key(|hit| (hit.len, std::cmp::Reverse(hit.depth), hit.order))
            .map(|hit| hit.id)
    }

    fn hits(
        &self,
        candidates: &[Candidate],
        needle: &Needle,
        pass: Pass,
        matching: Matching,
    ) -> Vec<Hit> {
        candidates
            .iter()
            .filter(|candidate| pass == Pass::Navigation || !candidate.in_nav)
            .filter_map(|candidate| {
                let raw = match pass {
                    Pass::Content => self.doc.text_content_filtered(candidate.id, |n| {
                        self.is_overlay(n) || self.is_navigation(n)
                    }),
                    Pass::Navigation => {
                        self.doc.text_content_filtered(candidate.id, |n| self.is_overlay(n))
                    }
                };
                let (found, len) = match matching {
                    Matching::Normalized => {
                        let text = normalize(&raw);
                        (needle.found_in(&text), text.chars().count())
                    }
                    Matching::Compact => {
                        let text = compact(&raw);
                        (needle.found_in_compact(&text), text.chars().count())
                    }
                };
                found.then(|| Hit {
                    id: candidate.id,
                    order: candidate.order,
                    depth: candidate.depth,
                    len,
                    in_main: candidate.in_main,
                })
            })
            .collect()
    }

    /// Flattened text of the whole page, minus our own overlay.
    pub fn page_text(&self) -> String {
        self.doc
            .text_content_filtered(self.doc.body(), |n| self.is_overlay(n))
    }

    pub fn is_overlay(&self, id: NodeId) -> bool {
        self.doc.attr(id, "id") == Some(OVERLAY_ID) || self.doc.has_class(id, OVERLAY_CLASS)
    }

    pub fn in_overlay(&self, id: NodeId) -> bool {
        self.is_overlay(id) || self.doc.ancestors(id).any(|a| self.is_overlay(a))
    }

    pub fn is_navigation(&self, id: NodeId) -> bool {
        let Some(element) = self.doc.element(id) else {
            return false;
        };
        if NAV_TAGS.contains(&element.tag.as_str()) {
            return true;
        }
        if element
            .attr("role")
            .is_some_and(|role| NAV_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()))
        {
            return true;
        }
        let hinted = |value: &str| {
            value
                .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
                .any(|token| NAV_HINTS.contains(&token.to_ascii_lowercase().as_str()))
        };
        element.attr("id").is_some_and(hinted) || element.classes().any(hinted)
    }

    pub fn in_navigation(&self, id: NodeId) -> bool {
        self.is_navigation(id) || self.doc.ancestors(id).any(|a| self.is_navigation(a))
    }

    fn is_main_content(&self, id: NodeId) -> bool {
        let Some(element) = self.doc.element(id) else {
            return false;
        };
        matches!(element.tag.as_str(), "main" | "article")
            || element.attr("role") == Some("main")
            || element.attr("id").is_some_and(|value| MAIN_IDS.contains(&value))
    }

    fn in_main_content(&self, id: NodeId) -> bool {
        self.is_main_content(id) || self.doc.ancestors(id).any(|a| self.is_main_content(a))
    }
}
