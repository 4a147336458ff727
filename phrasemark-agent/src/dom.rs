//! Arena document model the agent searches and mutates.
//!
//! Nodes are never freed: detaching a node only unlinks it from its parent,
//! so ids held by an undo record stay valid after the tree changes.

use std::collections::BTreeMap;

use crate::error::DomError;
use crate::style::{Display, Style, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Subtrees whose text is never page content.
const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    attrs: BTreeMap<String, String>,
    style: Style,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            style: Style::default(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    fn refresh_style(&mut self) {
        let mut style = Style::parse(self.attr("style").unwrap_or_default());
        if self.attrs.contains_key("hidden") {
            style.display = Display::None;
        }
        self.style = style;
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAlign {
    Start,
    Center,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    title: String,
    url: Option<String>,
    scrolled_to: Option<(NodeId, ScrollAlign)>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            title: String::new(),
            url: None,
            scrolled_to: None,
        };
        let root = doc.create_element("html");
        let body = doc.create_element("body");
        doc.nodes[body.0].parent = Some(root);
        doc.nodes[root.0].children.push(body);
        doc.root = root;
        doc.body = body;
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url;
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(Element::new(tag)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).map(|node| &node.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id)? {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        match self.nodes.get_mut(id.0).map(|node| &mut node.data) {
            Some(NodeData::Element(element)) => Ok(element),
            Some(NodeData::Text(_)) => Err(DomError::NotAnElement(id)),
            None => Err(DomError::UnknownNode(id)),
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Text(text) => Some(text.as_str()),
            NodeData::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) -> Result<(), DomError> {
        match self.nodes.get_mut(id.0).map(|node| &mut node.data) {
            Some(NodeData::Text(text)) => {
                *text = value.into();
                Ok(())
            }
            Some(NodeData::Element(_)) => Err(DomError::NotText(id)),
            None => Err(DomError::UnknownNode(id)),
        }
    }

    /// Attribute names are case-insensitive and stored lowercased.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(&name.to_ascii_lowercase())
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        element.attrs.insert(name.to_ascii_lowercase(), value.into());
        element.refresh_style();
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        element.attrs.remove(&name.to_ascii_lowercase());
        element.refresh_style();
        Ok(())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|element| element.has_class(class))
    }

    /// Returns false when the class was already present.
    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<bool, DomError> {
        let element = self.element_mut(id)?;
        if element.has_class(class) {
            return Ok(false);
        }
        let mut classes: Vec<&str> = element.classes().collect();
        classes.push(class);
        let joined = classes.join(" ");
        element.attrs.insert("class".into(), joined);
        Ok(true)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        if !element.has_class(class) {
            return Ok(());
        }
        let remaining: Vec<&str> = element.classes().filter(|c| *c != class).collect();
        if remaining.is_empty() {
            element.attrs.remove("class");
        } else {
            let joined = remaining.join(" ");
            element.attrs.insert("class".into(), joined);
        }
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` under `parent` ahead of `reference`, or last when
    /// `reference` is `None`. The child must be detached.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if self.element(parent).is_none() {
            return Err(DomError::NotAnElement(parent));
        }
        if self.node(child)?.parent.is_some() {
            return Err(DomError::AlreadyAttached(child));
        }
        if child == parent || self.ancestors(parent).any(|ancestor| ancestor == child) {
            return Err(DomError::Cycle(child));
        }
        let position = match reference {
            Some(reference) => self.nodes[parent.0]
                .children
                .iter()
                .position(|c| *c == reference)
                .ok_or(DomError::NotAChild { parent, child: reference })?,
            None => self.nodes[parent.0].children.len(),
        };
        self.nodes[parent.0].children.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    pub fn insert_after(&mut self, sibling: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent = self.parent(sibling).ok_or(DomError::Detached(sibling))?;
        let next = self.next_sibling(sibling);
        self.insert_before(parent, child, next)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|c| *c == id)?;
        siblings.get(position + 1).copied()
    }

    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
            self.nodes[id.0].parent = None;
        }
        Ok(())
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|ancestor| ancestor == self.root)
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// The node itself followed by its descendants in document order.
    pub fn subtree(&self, id: NodeId) -> Subtree<'_> {
        Subtree {
            doc: self,
            stack: vec![id],
        }
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.text_content_filtered(id, |_| false)
    }

    /// Concatenated text of the subtree, skipping non-content tags and any
    /// element for which `skip` returns true (together with its subtree).
    pub fn text_content_filtered(&self, id: NodeId, skip: impl Fn(NodeId) -> bool) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.data(current) {
                Some(NodeData::Text(text)) => out.push_str(text),
                Some(NodeData::Element(element)) => {
                    if NON_CONTENT_TAGS.contains(&element.tag.as_str()) || skip(current) {
                        continue;
                    }
                    stack.extend(self.children(current).iter().rev().copied());
                }
                None => {}
            }
        }
        out
    }

    /// Text nodes of the subtree in document order, with the same skipping
    /// rules as [`Document::text_content_filtered`].
    pub fn text_nodes_filtered(&self, id: NodeId, skip: impl Fn(NodeId) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.data(current) {
                Some(NodeData::Text(_)) => out.push(current),
                Some(NodeData::Element(element)) => {
                    if NON_CONTENT_TAGS.contains(&element.tag.as_str()) || skip(current) {
                        continue;
                    }
                    stack.extend(self.children(current).iter().rev().copied());
                }
                None => {}
            }
        }
        out
    }

    /// Rendering check: nothing on the ancestor chain hides or collapses the
    /// element, and it has a box or some text to show.
    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_attached(id) {
            return false;
        }
        let Some(element) = self.element(id) else {
            return self
                .parent(id)
                .is_some_and(|parent| self.is_visible(parent));
        };

        let chain = std::iter::once(id).chain(self.ancestors(id));
        let mut visibility = None;
        for node in chain {
            let Some(style) = self.element(node).map(Element::style) else {
                continue;
            };
            if style.display == Display::None || style.is_collapsed() {
                return false;
            }
            if visibility.is_none() {
                visibility = style.visibility;
            }
        }
        if visibility == Some(Visibility::Hidden) {
            return false;
        }

        match element.style().explicit_size() {
            Some((width, height)) if width > 0.0 && height > 0.0 => true,
            _ => !self.text_content(id).trim().is_empty(),
        }
    }

    pub fn scroll_into_view(&mut self, id: NodeId, align: ScrollAlign) {
        self.scrolled_to = Some((id, align));
    }

    pub fn scrolled_to(&self) -> Option<(NodeId, ScrollAlign)> {
        self.scrolled_to
    }

    /// Short selector-like label for logs and CLI output.
    pub fn describe(&self, id: NodeId) -> String {
        match self.data(id) {
            Some(NodeData::Element(element)) => {
                let mut label = element.tag.clone();
                if let Some(elem_id) = element.attr("id") {
                    label.push('#');
                    label.push_str(elem_id);
                }
                for class in element.classes() {
                    label.push('.');
                    label.push_str(class);
                }
                label
            }
            Some(NodeData::Text(_)) => "#text".to_string(),
            None => "<unknown>".to_string(),
        }
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

pub struct Subtree<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Subtree<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(current).iter().rev().copied());
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(doc: &mut Document, parent: NodeId, text: &str) -> NodeId {
        let p = doc.create_element("p");
        let t = doc.create_text(text);
        doc.append_child(p, t).unwrap();
        doc.append_child(parent, p).unwrap();
        p
    }

    #[test]
    fn text_content_skips_scripts() {
        let mut doc = Document::new();
        let body = doc.body();
        paragraph(&mut doc, body, "visible ");
        let script = doc.create_element("script");
        let code = doc.create_text("var hidden = 1;");
        doc.append_child(script, code).unwrap();
        doc.append_child(body, script).unwrap();
        paragraph(&mut doc, body, "text");

        assert_eq!(doc.text_content(body), "visible text");
    }

    #[test]
    fn insert_rejects_cycles_and_double_attach() {
        let mut doc = Document::new();
        let body = doc.body();
        let div = doc.create_element("div");
        doc.append_child(body, div).unwrap();
        assert!(matches!(
            doc.append_child(body, div),
            Err(DomError::AlreadyAttached(_))
        ));
        let root = doc.root();
        doc.detach(body).unwrap();
        assert!(matches!(doc.append_child(div, body), Err(DomError::Cycle(_))));
        doc.append_child(root, body).unwrap();
        assert!(doc.is_attached(div));
    }

    #[test]
    fn class_edits_preserve_other_classes() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = paragraph(&mut doc, body, "x");
        doc.set_attr(p, "class", "lead intro").unwrap();
        assert!(doc.add_class(p, "flag").unwrap());
        assert!(!doc.add_class(p, "flag").unwrap());
        assert_eq!(doc.attr(p, "class"), Some("lead intro flag"));
        doc.remove_class(p, "flag").unwrap();
        assert_eq!(doc.attr(p, "class"), Some("lead intro"));
    }

    #[test]
    fn visibility_follows_ancestor_styles() {
        let mut doc = Document::new();
        let body = doc.body();
        let nav = doc.create_element("nav");
        doc.set_attr(nav, "style", "display: none").unwrap();
        doc.append_child(body, nav).unwrap();
        let hidden = paragraph(&mut doc, nav, "needle");

        let drawer = doc.create_element("div");
        doc.set_attr(drawer, "style", "height: 0; overflow: hidden").unwrap();
        doc.append_child(body, drawer).unwrap();
        let collapsed = paragraph(&mut doc, drawer, "folded");

        let ghost = doc.create_element("div");
        doc.set_attr(ghost, "style", "visibility: hidden").unwrap();
        doc.append_child(body, ghost).unwrap();
        let invisible = paragraph(&mut doc, ghost, "ghost");
        let revealed = paragraph(&mut doc, ghost, "shown");
        doc.set_attr(revealed, "style", "visibility: visible").unwrap();

        let empty = doc.create_element("p");
        doc.append_child(body, empty).unwrap();
        let shown = paragraph(&mut doc, body, "plain");

        assert!(!doc.is_visible(hidden));
        assert!(!doc.is_visible(collapsed));
        assert!(!doc.is_visible(invisible));
        assert!(doc.is_visible(revealed));
        assert!(!doc.is_visible(empty));
        assert!(doc.is_visible(shown));
    }

    #[test]
    fn hidden_attribute_counts_as_display_none() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = paragraph(&mut doc, body, "secret");
        doc.set_attr(p, "hidden", "").unwrap();
        assert!(!doc.is_visible(p));
        doc.remove_attr(p, "hidden").unwrap();
        assert!(doc.is_visible(p));
    }

    #[test]
    fn attribute_names_ignore_case() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = paragraph(&mut doc, body, "secret");
        doc.set_attr(p, "HIDDEN", "").unwrap();
        assert_eq!(doc.attr(p, "Hidden"), Some(""));
        assert!(!doc.is_visible(p));

        doc.remove_attr(p, "Hidden").unwrap();
        assert_eq!(doc.attr(p, "hidden"), None);
        assert!(doc.is_visible(p));
    }
}
