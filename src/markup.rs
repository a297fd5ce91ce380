// Document-tree collaborator: region extraction, fragment snapshotting and serialization.
// Works on the markup text directly; fragments are treated as opaque strings and never re-encoded.

use regex_automata::meta::Regex;
use std::ops::Range;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::DocumentError;
use crate::reconstruct::TAG_PLACEHOLDER;

fn fragment_pattern() -> &'static Regex {
    static FRAGMENT: OnceLock<Regex> = OnceLock::new();
    FRAGMENT.get_or_init(|| Regex::new(r"<[^>]+>").expect("fragment pattern is valid"))
}

/// Header and body of a document, each including its own start and end tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regions {
    pub header: String,
    pub body: String,
}

/// The capability the pipeline needs from a markup parser
pub trait DocumentTree: Send + Sync {
    /// Locate the first `header_tag` and `body_tag` elements. A missing header is tolerated
    /// (empty string); a missing body is an error.
    fn extract_regions(&self, document: &str, header_tag: &str, body_tag: &str) -> Result<Regions, DocumentError>;

    /// Every markup fragment in `body`, in document order
    fn extract_fragments(&self, body: &str) -> Vec<String>;

    /// Replace every fragment with a whitespace-padded placeholder
    fn replace_with_placeholders(&self, body: &str) -> String;

    /// Wrap header and body in a root element
    fn serialize(&self, root: &str, header: &str, body: &str) -> String;
}

/// [`DocumentTree`] over raw markup text
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupTree;

impl MarkupTree {
    /// Byte range of the first `name` element, start tag through matching end tag
    pub fn find_element(document: &str, name: &str) -> Option<Range<usize>> {
        let pattern = format!(r"<(/?){}(?:\s[^>]*?)?(/?)>", regex_syntax::escape(name));
        let regex = Regex::new(&pattern).ok()?;

        let mut start: Option<usize> = None;
        let mut depth = 0usize;

        for caps in regex.captures_iter(document) {
            let (Some(whole), Some(closing), Some(self_closing)) = (caps.get_match(), caps.get_group(1), caps.get_group(2))
            else {
                continue;
            };
            let is_closing = !closing.is_empty();
            let is_self_closing = !self_closing.is_empty();

            match start {
                None if is_closing => continue,
                None if is_self_closing => return Some(whole.range()),
                None => {
                    start = Some(whole.start());
                    depth = 1;
                }
                Some(open) => {
                    if is_closing {
                        depth -= 1;
                        if depth == 0 {
                            return Some(open..whole.end());
                        }
                    } else if !is_self_closing {
                        depth += 1;
                    }
                }
            }
        }

        None
    }
}

impl DocumentTree for MarkupTree {
    fn extract_regions(&self, document: &str, header_tag: &str, body_tag: &str) -> Result<Regions, DocumentError> {
        let header = match Self::find_element(document, header_tag) {
            Some(range) => document[range].to_string(),
            None => {
                warn!("<{}> not found; continuing with an empty header", header_tag);
                String::new()
            }
        };

        let body = Self::find_element(document, body_tag)
            .map(|range| document[range].to_string())
            .ok_or_else(|| DocumentError::RegionMissing(body_tag.to_string()))?;

        Ok(Regions { header, body })
    }

    fn extract_fragments(&self, body: &str) -> Vec<String> {
        fragment_pattern()
            .find_iter(body)
            .map(|m| body[m.range()].to_string())
            .collect()
    }

    fn replace_with_placeholders(&self, body: &str) -> String {
        let mut out = String::with_capacity(body.len());
        let mut last = 0;
        for m in fragment_pattern().find_iter(body) {
            out.push_str(&body[last..m.start()]);
            out.push(' ');
            out.push_str(TAG_PLACEHOLDER);
            out.push(' ');
            last = m.end();
        }
        out.push_str(&body[last..]);
        out
    }

    fn serialize(&self, root: &str, header: &str, body: &str) -> String {
        format!("<{root}>{header}{body}</{root}>")
    }
}
