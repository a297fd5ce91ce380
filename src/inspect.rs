// Post-hoc checks over rebuilt documents.

use regex_automata::meta::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::normalizer::Normalizer;

/// Words checked at each end of a document by the spot check
pub const DEFAULT_CHECK_NUM: usize = 10;
/// Tolerated share of potential misalignments among checked words
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.1;

fn attribute_pattern() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| Regex::new(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern is valid"))
}

/// A word element read back from rebuilt markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordElement {
    pub attributes: Vec<(String, String)>,
    pub text: String,
}

impl WordElement {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Every `element` in `markup`, in order
pub fn word_elements(markup: &str, element: &str) -> Vec<WordElement> {
    let name = regex_syntax::escape(element);
    let pattern = format!(r"(?s)<{name}(\s[^>]*)?>(.*?)</{name}>");
    let Ok(regex) = Regex::new(&pattern) else {
        return Vec::new();
    };

    regex
        .captures_iter(markup)
        .map(|caps| {
            let attrs = caps.get_group(1).map(|s| &markup[s.range()]).unwrap_or("");
            let text = caps.get_group(2).map(|s| &markup[s.range()]).unwrap_or("");
            WordElement {
                attributes: parse_attributes(attrs),
                text: text.to_string(),
            }
        })
        .collect()
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    attribute_pattern()
        .captures_iter(raw)
        .filter_map(|caps| {
            let key = &raw[caps.get_group(1)?.range()];
            let value = caps.get_group(2).or_else(|| caps.get_group(3))?;
            Some((key.to_string(), unescape_attribute(&raw[value.range()])))
        })
        .collect()
}

fn unescape_attribute(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// A word whose two chosen attributes differ. A missing attribute shows as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDiff {
    pub index: usize,
    pub first: Option<String>,
    pub second: Option<String>,
}

/// Word elements whose `first` and `second` attributes differ, up to `limit` of them
pub fn attribute_differences(
    markup: &str,
    element: &str,
    first: &str,
    second: &str,
    limit: Option<usize>,
) -> Vec<AttributeDiff> {
    let diffs = word_elements(markup, element)
        .into_iter()
        .enumerate()
        .filter_map(|(index, word)| {
            let a = word.get(first).map(str::to_string);
            let b = word.get(second).map(str::to_string);
            (a != b).then_some(AttributeDiff {
                index,
                first: a,
                second: b,
            })
        });

    match limit {
        Some(n) => diffs.take(n).collect(),
        None => diffs.collect(),
    }
}

/// Outcome of re-normalizing the first and last words of a normalized document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotCheck {
    pub checked: usize,
    pub potential_errors: usize,
    pub error_rate: f64,
    pub threshold: f64,
    pub mismatches: Vec<AttributeDiff>,
}

impl SpotCheck {
    pub fn needs_manual_check(&self) -> bool {
        self.error_rate > self.threshold
    }
}

/// Re-normalize the `Original` of the first and last `check_num` words and compare it,
/// ignoring case, with the stored `Normalized` value. Agreement at both ends is taken as
/// evidence the whole document lines up.
pub fn alignment_spot_check(
    markup: &str,
    element: &str,
    normalizer: &Normalizer,
    check_num: usize,
    threshold: f64,
) -> SpotCheck {
    let words = word_elements(markup, element);
    let head = 0..check_num.min(words.len());
    let tail = words.len().saturating_sub(check_num)..words.len();
    let indices: BTreeSet<usize> = head.chain(tail).collect();

    let mut mismatches = Vec::new();
    for &index in &indices {
        let word = &words[index];
        let original = word.get("Original").unwrap_or(&word.text);
        let expected = normalizer.normalize(&original.to_lowercase());
        let actual = word.get("Normalized").map(str::to_lowercase);
        if actual.as_deref() != Some(expected.as_str()) {
            mismatches.push(AttributeDiff {
                index,
                first: Some(expected),
                second: actual,
            });
        }
    }

    let checked = indices.len();
    let error_rate = if checked == 0 {
        0.0
    } else {
        mismatches.len() as f64 / checked as f64
    };

    SpotCheck {
        checked,
        potential_errors: mismatches.len(),
        error_rate,
        threshold,
        mismatches,
    }
}

/// Log a spot check result for `label`
pub fn report_spot_check(label: &str, check: &SpotCheck) {
    for diff in &check.mismatches {
        info!(
            "Word {} in {}: expected {:?}, found {:?}",
            diff.index, label, diff.first, diff.second
        );
    }
    if check.needs_manual_check() {
        warn!(
            "{} needs manual check: potential error rate {:.3} over threshold {}",
            label, check.error_rate, check.threshold
        );
    } else {
        info!(
            "{} passed the alignment check: {} potential misalignments in {} words",
            label, check.potential_errors, check.checked
        );
    }
}

/// Which attributes to compare in a rebuilt file, and how many differences to keep
#[derive(Debug, Clone)]
pub struct DiffRequest {
    pub first: String,
    pub second: String,
    pub limit: Option<usize>,
}

impl Default for DiffRequest {
    fn default() -> Self {
        Self {
            first: "Original".to_string(),
            second: "Normalized".to_string(),
            limit: None,
        }
    }
}

/// Findings for one rebuilt file
#[derive(Debug, Clone, Serialize)]
pub struct FileInspection {
    pub file: PathBuf,
    pub words: usize,
    /// `None` when no word carries a `Normalized` attribute
    pub spot_check: Option<SpotCheck>,
    pub differences: Vec<AttributeDiff>,
}

impl FileInspection {
    pub fn needs_manual_check(&self) -> bool {
        self.spot_check.as_ref().is_some_and(SpotCheck::needs_manual_check)
    }
}

/// Read a rebuilt file back, spot-check it when it was normalized, and collect
/// attribute differences when `diff` is given
pub fn inspect_file(
    path: &Path,
    element: &str,
    normalizer: &Normalizer,
    check_num: usize,
    threshold: f64,
    diff: Option<&DiffRequest>,
) -> std::io::Result<FileInspection> {
    let markup = std::fs::read_to_string(path)?;
    let words = word_elements(&markup, element);
    let normalized = words.iter().any(|w| w.get("Normalized").is_some());

    let spot_check = normalized.then(|| alignment_spot_check(&markup, element, normalizer, check_num, threshold));
    let differences = diff
        .map(|d| attribute_differences(&markup, element, &d.first, &d.second, d.limit))
        .unwrap_or_default();

    Ok(FileInspection {
        file: path.to_path_buf(),
        words: words.len(),
        spot_check,
        differences,
    })
}
