//! Text normalization shared by the locator and the presence checks.
//!
//! Phrases arrive from a generative model and page text comes out of a live
//! document, so both sides go through the same pipeline before comparison:
//! decode markup entities, collapse whitespace runs (non-breaking space
//! included) to a single space, lowercase, trim.

use std::borrow::Cow;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid entity pattern")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\u{00a0}]+").expect("valid whitespace pattern"));

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{00ab}',
        "raquo" => '\u{00bb}',
        "copy" => '\u{00a9}',
        "reg" => '\u{00ae}',
        "trade" => '\u{2122}',
        "deg" => '\u{00b0}',
        "middot" => '\u{00b7}',
        "times" => '\u{00d7}',
        "shy" => '\u{00ad}',
        "thinsp" => '\u{2009}',
        "ensp" => '\u{2002}',
        "emsp" => '\u{2003}',
        _ => return None,
    };
    Some(ch)
}

fn numeric_entity(body: &str) -> Option<char> {
    let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

/// Decodes character references. Unknown entities are left as written.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    ENTITY.replace_all(input, |caps: &Captures<'_>| {
        let body = &caps[1];
        let decoded = match body.strip_prefix('#') {
            Some(numeric) => numeric_entity(numeric),
            None => named_entity(body),
        };
        match decoded {
            Some(ch) => ch.to_string(),
            None => caps[0].to_string(),
        }
    })
}

pub fn normalize(input: &str) -> String {
    let decoded = decode_entities(input);
    let collapsed = WHITESPACE.replace_all(&decoded, " ");
    lowercase(collapsed.trim())
}

/// Per-character lowercasing, context free, so `NormalizedText` produces the
/// same characters for the same input.
fn lowercase(input: &str) -> String {
    input.chars().flat_map(char::to_lowercase).collect()
}

/// Aggressive form with every whitespace character removed, for text that
/// was reflowed (code blocks, hard-wrapped prose).
pub fn compact(input: &str) -> String {
    normalize(input)
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect()
}

/// Normalized view of a raw text run that remembers where every normalized
/// character came from, so a match can be mapped back onto the raw text.
///
/// Raw DOM text is already entity-decoded, so only whitespace collapsing,
/// lowercasing and trimming are applied here.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    text: String,
    // (byte offset in `text`, byte range in the raw input) per normalized char
    spans: Vec<(usize, Range<usize>)>,
}

impl NormalizedText {
    pub fn new(raw: &str) -> Self {
        let mut text = String::with_capacity(raw.len());
        let mut spans: Vec<(usize, Range<usize>)> = Vec::with_capacity(raw.len());
        let mut pending_space: Option<Range<usize>> = None;

        for (start, ch) in raw.char_indices() {
            let end = start + ch.len_utf8();
            if ch.is_whitespace() {
                match pending_space.as_mut() {
                    Some(range) => range.end = end,
                    None => pending_space = Some(start..end),
                }
                continue;
            }
            if let Some(range) = pending_space.take() {
                if !text.is_empty() {
                    spans.push((text.len(), range));
                    text.push(' ');
                }
            }
            for lower in ch.to_lowercase() {
                spans.push((text.len(), start..end));
                text.push(lower);
            }
        }

        Self { text, spans }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn contains(&self, needle: &str) -> bool {
        !needle.is_empty() && self.text.contains(needle)
    }

    /// Finds an already-normalized needle and returns the raw byte range it
    /// covers in the original input.
    pub fn find_raw(&self, needle: &str) -> Option<Range<usize>> {
        if needle.is_empty() {
            return None;
        }
        let start = self.text.find(needle)?;
        let end = start + needle.len();
        let first = self
            .spans
            .binary_search_by_key(&start, |(offset, _)| *offset)
            .ok()?;
        let last = self
            .spans
            .partition_point(|(offset, _)| *offset < end)
            .checked_sub(1)?;
        Some(self.spans[first].1.start..self.spans[last].1.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_entities() {
        assert_eq!(
            normalize("  Nails&nbsp;are\n\ta   DISTINGUISHING&#32;feature "),
            "nails are a distinguishing feature"
        );
        assert_eq!(normalize("Fish &amp; Chips"), "fish & chips");
        assert_eq!(normalize("caf&#xE9;"), "café");
        assert_eq!(normalize("\u{00a0}\u{00a0}x\u{00a0}y"), "x y");
    }

    #[test]
    fn unknown_entities_survive_decoding() {
        assert_eq!(decode_entities("a &bogus; b"), "a &bogus; b");
        assert_eq!(decode_entities("AT&T"), "AT&T");
        assert!(matches!(decode_entities("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn compact_strips_all_whitespace() {
        assert_eq!(compact("fn main() {\n    run();\n}"), "fnmain(){run();}");
        assert_eq!(compact(" a b\u{00a0}c "), "abc");
    }

    #[test]
    fn normalized_text_maps_matches_to_raw_offsets() {
        let raw = "  The   Primate\u{00a0}order  ";
        let view = NormalizedText::new(raw);
        assert_eq!(view.as_str(), "the primate order");

        let range = view.find_raw("primate order").unwrap();
        assert_eq!(&raw[range], "Primate\u{00a0}order");

        let range = view.find_raw("the").unwrap();
        assert_eq!(&raw[range], "The");
        assert!(view.find_raw("").is_none());
        assert!(view.find_raw("absent").is_none());
    }

    #[test]
    fn final_sigma_lowercases_the_same_on_both_paths() {
        let raw = "Η ΟΔΟΣ προς το βουνό";
        let needle = normalize("η οδοΣ");
        assert_eq!(needle, "η οδοσ");
        let range = NormalizedText::new(raw).find_raw(&needle).unwrap();
        assert_eq!(&raw[range], "Η ΟΔΟΣ");
    }

    #[test]
    fn normalized_text_handles_multibyte_characters() {
        let raw = "Überall  Straße";
        let view = NormalizedText::new(raw);
        assert_eq!(view.as_str(), "überall straße");
        let range = view.find_raw("straße").unwrap();
        assert_eq!(&raw[range], "Straße");
    }
}
