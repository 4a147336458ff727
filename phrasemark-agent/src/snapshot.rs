//! Serialized DOM trees, used to hand a page to the agent from outside the
//! browser (fixtures, the CLI, the in-process host).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Text(String),
    Element(ElementSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub body: Vec<NodeSpec>,
}

impl DocumentSpec {
    pub fn new(body: Vec<NodeSpec>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to decode snapshot {:?}", path))
    }

    pub fn build(&self) -> Document {
        let mut doc = Document::new();
        doc.set_title(self.title.clone());
        doc.set_url(self.url.clone());
        let body = doc.body();
        for node in &self.body {
            attach(&mut doc, body, node);
        }
        doc
    }
}

fn attach(doc: &mut Document, parent: NodeId, spec: &NodeSpec) {
    let id = match spec {
        NodeSpec::Text(text) => doc.create_text(text.clone()),
        NodeSpec::Element(element) => {
            let id = doc.create_element(&element.tag);
            for (name, value) in &element.attrs {
                // freshly created elements always accept attributes
                let _ = doc.set_attr(id, name, value.clone());
            }
            for child in &element.children {
                attach(doc, id, child);
            }
            id
        }
    };
    // `parent` is always a live element built by this function
    let _ = doc.append_child(parent, id);
}

pub fn text(value: &str) -> NodeSpec {
    NodeSpec::Text(value.to_string())
}

pub fn el(tag: &str, children: Vec<NodeSpec>) -> NodeSpec {
    el_with(tag, &[], children)
}

pub fn el_with(tag: &str, attrs: &[(&str, &str)], children: Vec<NodeSpec>) -> NodeSpec {
    NodeSpec::Element(ElementSpec {
        tag: tag.to_string(),
        attrs: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_builds_document() {
        let spec: DocumentSpec = serde_json::from_str(
            r#"{
                "title": "Primates",
                "url": "https://example.org/wiki/Primate",
                "body": [
                    {"tag": "nav", "attrs": {"style": "display:none"}, "children": [
                        {"tag": "li", "children": ["needle"]}
                    ]},
                    {"tag": "p", "children": ["Nails ", {"tag": "a", "children": ["matter"]}]}
                ]
            }"#,
        )
        .unwrap();
        let doc = spec.build();
        assert_eq!(doc.title(), "Primates");
        assert_eq!(doc.url(), Some("https://example.org/wiki/Primate"));
        assert_eq!(doc.text_content(doc.body()), "needleNails matter");

        let nav = doc.children(doc.body())[0];
        assert_eq!(doc.tag(nav), Some("nav"));
        assert!(!doc.is_visible(nav));
    }

    #[test]
    fn builders_match_json_shape() {
        let built = el_with("p", &[("class", "lead")], vec![text("hi")]);
        let parsed: NodeSpec =
            serde_json::from_str(r#"{"tag":"p","attrs":{"class":"lead"},"children":["hi"]}"#)
                .unwrap();
        assert_eq!(built, parsed);
    }
}
