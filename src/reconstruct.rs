// Rebuilds a document body with one word element per token, restoring the original markup
// fragments where their placeholders sit.

use regex_automata::meta::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{ConfigError, DocumentError};

/// Placeholder standing in for an extracted markup fragment
pub const TAG_PLACEHOLDER: &str = "<tag>";

/// Element name used for rebuilt word units
pub const WORD_ELEMENT: &str = "w";

fn unit_pattern() -> &'static Regex {
    static UNIT: OnceLock<Regex> = OnceLock::new();
    UNIT.get_or_init(|| Regex::new(r"</?[^>]+>|\S+").expect("unit pattern is valid"))
}

/// A per-token annotation the external annotator can supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationColumn {
    Pos,
    Lemma,
}

impl AnnotationColumn {
    pub fn attribute_name(&self) -> &'static str {
        match self {
            AnnotationColumn::Pos => "pos",
            AnnotationColumn::Lemma => "lemma",
        }
    }
}

impl fmt::Display for AnnotationColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute_name())
    }
}

impl FromStr for AnnotationColumn {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pos" => Ok(AnnotationColumn::Pos),
            "lemma" => Ok(AnnotationColumn::Lemma),
            other => Err(ConfigError::InvalidAnnotationColumns(format!("unknown column {other:?}"))),
        }
    }
}

/// Requested annotation columns, in the order their attributes are emitted.
/// Each column appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationColumns(Vec<AnnotationColumn>);

impl AnnotationColumns {
    pub fn new(columns: Vec<AnnotationColumn>) -> Result<Self, ConfigError> {
        for (idx, column) in columns.iter().enumerate() {
            if columns[..idx].contains(column) {
                return Err(ConfigError::InvalidAnnotationColumns(format!("{column} requested twice")));
            }
        }
        Ok(Self(columns))
    }

    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn columns(&self) -> &[AnnotationColumn] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromStr for AnnotationColumns {
    type Err = ConfigError;

    /// Parse a comma-separated list such as `pos,lemma`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::none());
        }
        let columns = s
            .split(',')
            .map(AnnotationColumn::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns)
    }
}

/// A body unit: either a markup placeholder or a content token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit<'a> {
    Markup(&'a str),
    Token(&'a str),
}

/// Split a body into markup and token units with a single scan
pub fn split_units(body: &str) -> Vec<Unit<'_>> {
    unit_pattern()
        .find_iter(body)
        .map(|m| {
            let unit = &body[m.range()];
            if unit.starts_with('<') && unit.ends_with('>') {
                Unit::Markup(unit)
            } else {
                Unit::Token(unit)
            }
        })
        .collect()
}

/// The reconstruction unit: one per token, never per tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordNode {
    pub original: String,
    pub normalized: Option<String>,
    pub annotations: Vec<(AnnotationColumn, String)>,
}

impl WordNode {
    /// Attribute pairs in emission order: `Original`, `Normalized`, then annotations
    pub fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attrs = Vec::with_capacity(2 + self.annotations.len());
        attrs.push(("Original", self.original.as_str()));
        if let Some(normalized) = &self.normalized {
            attrs.push(("Normalized", normalized.as_str()));
        }
        for (column, value) in &self.annotations {
            attrs.push((column.attribute_name(), value.as_str()));
        }
        attrs
    }

    /// Render as `<w ...>original</w>`. A bare node (no normalization, no annotations)
    /// carries no attributes.
    pub fn render(&self) -> String {
        let mut out = format!("<{WORD_ELEMENT}");
        if self.normalized.is_some() || !self.annotations.is_empty() {
            for (key, value) in self.attributes() {
                out.push(' ');
                out.push_str(&attribute_pair(key, value));
            }
        }
        out.push('>');
        out.push_str(&escape_markup(&self.original, false));
        out.push_str(&format!("</{WORD_ELEMENT}>"));
        out
    }
}

fn attribute_pair(key: &str, value: &str) -> String {
    format!("{key}=\"{}\"", escape_markup(value, true))
}

/// Escape markup-significant characters. An `&` already opening a character or entity
/// reference is kept, since tokens carry the source's escaped text.
pub fn escape_markup(value: &str, in_attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        match c {
            '&' if starts_reference(&value[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn starts_reference(s: &str) -> bool {
    let Some(end) = s.find(';') else {
        return false;
    };
    let name = &s[1..end];
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else if let Some(dec) = name.strip_prefix('#') {
        !dec.is_empty() && dec.chars().all(|c| c.is_ascii_digit())
    } else {
        name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }
}

/// Rebuild the body.
///
/// Units of `tokenized` and `normalized` are walked in lockstep. Each placeholder consumes
/// the next tag in order; each token becomes a [`WordNode`] whose annotations come from
/// `annotation_values` at the same unit position (one row per requested column). Any
/// index shortfall is an error and nothing is produced.
pub fn rebuild(
    tokenized: &str,
    normalized: Option<&str>,
    tags: &[String],
    columns: &AnnotationColumns,
    annotation_values: &[Vec<String>],
) -> Result<String, DocumentError> {
    let units = split_units(tokenized);
    let normalized_units = normalized.map(split_units);

    if let Some(norm) = &normalized_units {
        if norm.len() < units.len() {
            return Err(DocumentError::NormalizedTooShort {
                tokenized: units.len(),
                normalized: norm.len(),
            });
        }
    }

    let mut pieces: Vec<String> = Vec::with_capacity(units.len());
    let mut tag_cursor = 0;

    for (idx, unit) in units.iter().enumerate() {
        match unit {
            Unit::Markup(_) => {
                let tag = tags.get(tag_cursor).ok_or(DocumentError::TagsExhausted {
                    unit: idx,
                    tags: tags.len(),
                })?;
                pieces.push(tag.clone());
                tag_cursor += 1;
            }
            Unit::Token(token) => {
                let normalized = normalized_units.as_ref().map(|norm| match norm[idx] {
                    Unit::Markup(s) | Unit::Token(s) => s.to_string(),
                });

                let mut annotations = Vec::with_capacity(columns.len());
                for (col_idx, column) in columns.columns().iter().enumerate() {
                    let values = annotation_values.get(col_idx).map(Vec::as_slice).unwrap_or(&[]);
                    let value = values.get(idx).ok_or_else(|| DocumentError::AnnotationTooShort {
                        column: column.to_string(),
                        len: values.len(),
                        unit: idx,
                    })?;
                    annotations.push((*column, value.clone()));
                }

                let node = WordNode {
                    original: token.to_string(),
                    normalized,
                    annotations,
                };
                pieces.push(node.render());
            }
        }
    }

    if tag_cursor != tags.len() {
        return Err(DocumentError::TagsLeftOver {
            used: tag_cursor,
            tags: tags.len(),
        });
    }

    Ok(pieces.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_split_units_classifies_markup() {
        let units = split_units("<tag> word1 <tag>word2 </p>");
        assert_eq!(
            units,
            vec![
                Unit::Markup("<tag>"),
                Unit::Token("word1"),
                Unit::Markup("<tag>"),
                Unit::Token("word2"),
                Unit::Markup("</p>"),
            ]
        );
    }

    #[test]
    fn test_tags_restored_in_place() {
        let body = rebuild("<tag> word1 word2", None, &strings(&["<hi>"]), &AnnotationColumns::none(), &[]).unwrap();
        assert_eq!(body, "<hi> <w>word1</w> <w>word2</w>");
    }

    #[test]
    fn test_normalized_attribute() {
        let body = rebuild(
            "<tag> vpon hill <tag>",
            Some("<tag> upon hill <tag>"),
            &strings(&["<p rend=\"x\">", "</p>"]),
            &AnnotationColumns::none(),
            &[],
        )
        .unwrap();
        assert_eq!(
            body,
            "<p rend=\"x\"> <w Original=\"vpon\" Normalized=\"upon\">vpon</w> <w Original=\"hill\" Normalized=\"hill\">hill</w> </p>"
        );
    }

    #[test]
    fn test_annotation_attribute_order_follows_request() {
        let columns: AnnotationColumns = "lemma,pos".parse().unwrap();
        let body = rebuild(
            "ran",
            None,
            &[],
            &columns,
            &[strings(&["run"]), strings(&["VBD"])],
        )
        .unwrap();
        assert_eq!(body, "<w Original=\"ran\" lemma=\"run\" pos=\"VBD\">ran</w>");
    }

    #[test]
    fn test_annotations_indexed_by_unit_position() {
        let columns: AnnotationColumns = "pos".parse().unwrap();
        let body = rebuild("<tag> I ran", None, &strings(&["<s>"]), &columns, &[strings(&["X", "PRP", "VBD"])]).unwrap();
        assert_eq!(body, "<s> <w Original=\"I\" pos=\"PRP\">I</w> <w Original=\"ran\" pos=\"VBD\">ran</w>");
    }

    #[test]
    fn test_short_annotation_column_is_error() {
        let columns: AnnotationColumns = "pos".parse().unwrap();
        let err = rebuild("a b c", None, &[], &columns, &[strings(&["DT", "NN"])]).unwrap_err();
        assert!(matches!(err, DocumentError::AnnotationTooShort { unit: 2, len: 2, .. }));
    }

    #[test]
    fn test_missing_tag_is_error() {
        let err = rebuild("<tag> a <tag>", None, &strings(&["<p>"]), &AnnotationColumns::none(), &[]).unwrap_err();
        assert!(matches!(err, DocumentError::TagsExhausted { unit: 2, tags: 1 }));
    }

    #[test]
    fn test_unused_tags_are_error() {
        let err = rebuild("a", None, &strings(&["<p>"]), &AnnotationColumns::none(), &[]).unwrap_err();
        assert!(matches!(err, DocumentError::TagsLeftOver { used: 0, tags: 1 }));
    }

    #[test]
    fn test_plain_text_round_trip() {
        let text = "  It   was\tthe best\nof times ";
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let body = rebuild(&tokens.join(" "), None, &[], &AnnotationColumns::none(), &[]).unwrap();
        let stripped = body.replace("<w>", "").replace("</w>", "");
        assert_eq!(stripped, "It was the best of times");
    }

    #[test]
    fn test_double_quote_value_is_escaped_in_attributes() {
        let node = WordNode {
            original: "\"".to_string(),
            normalized: Some("\"".to_string()),
            annotations: vec![],
        };
        assert_eq!(node.render(), "<w Original=\"&quot;\" Normalized=\"&quot;\">\"</w>");
    }

    #[test]
    fn test_bare_ampersand_in_annotation_is_escaped() {
        let columns: AnnotationColumns = "lemma".parse().unwrap();
        let body = rebuild("AT&T", Some("AT&T"), &[], &columns, &[strings(&["&"])]).unwrap();
        assert_eq!(
            body,
            r#"<w Original="AT&amp;T" Normalized="AT&amp;T" lemma="&amp;">AT&amp;T</w>"#
        );

        let columns: AnnotationColumns = "pos".parse().unwrap();
        let body = rebuild("x", None, &[], &columns, &[strings(&["<NN>"])]).unwrap();
        assert_eq!(body, r#"<w Original="x" pos="&lt;NN&gt;">x</w>"#);
    }

    #[test]
    fn test_existing_references_are_not_escaped_twice() {
        assert_eq!(escape_markup("&amp;c", true), "&amp;c");
        assert_eq!(escape_markup("&#233;t&#xE9;", true), "&#233;t&#xE9;");
        assert_eq!(escape_markup("a & b;", true), "a &amp; b;");
        assert_eq!(escape_markup("&;", false), "&amp;;");
    }

    #[test]
    fn test_column_parsing() {
        assert!("".parse::<AnnotationColumns>().unwrap().is_empty());
        assert_eq!("pos, lemma".parse::<AnnotationColumns>().unwrap().len(), 2);
        assert!("pos,pos".parse::<AnnotationColumns>().is_err());
        assert!("ner".parse::<AnnotationColumns>().is_err());
    }
}
