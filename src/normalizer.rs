// Spelling and verb-inflection normalization for Early Modern English text.
// Builds on the rule engine and the verb tables; everything is compiled once per run.

use regex_automata::meta::Regex;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::rules::RuleSet;
use crate::verbs::{past_tense, IrregularVerbTable, VariantChoice, VerbTable};

/// Archaic long s
const LONG_S: char = 'ſ';

/// Default sentinel that preprocessing rules put in front of an ambiguous `'d` ending
pub const DEFAULT_MARKER: &str = "嗨";

/// Sentinel flagging genuine past-tense candidates such as `lov<marker>'d`.
///
/// It has to be a sequence real input never contains; [`PastTenseMarker::check_absent`]
/// is run over the raw corpus before any document is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastTenseMarker(String);

impl PastTenseMarker {
    pub fn new(marker: impl Into<String>) -> Result<Self, ConfigError> {
        let marker = marker.into();
        let invalid = |reason: &str| ConfigError::InvalidMarker {
            marker: marker.clone(),
            reason: reason.to_string(),
        };

        if marker.is_empty() {
            return Err(invalid("empty"));
        }
        if marker.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }
        if marker.contains(['\'', '<', '>']) {
            return Err(invalid("contains a quote or angle bracket"));
        }

        Ok(Self(marker))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The marker together with the ending it guards, e.g. `嗨'd`
    pub fn marked_suffix(&self) -> String {
        format!("{}'d", self.0)
    }

    /// Fail if `raw` already contains the marker
    pub fn check_absent(&self, raw: &str, path: &std::path::Path) -> Result<(), ConfigError> {
        if raw.contains(self.0.as_str()) {
            return Err(ConfigError::MarkerInCorpus {
                marker: self.0.clone(),
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Put the plain `'d` ending back once the marker has served its purpose
    pub fn revert(&self, text: &str) -> String {
        text.replace(&self.marked_suffix(), "'d")
    }
}

impl Default for PastTenseMarker {
    fn default() -> Self {
        Self(DEFAULT_MARKER.to_string())
    }
}

/// Rewrites preprocessed text toward modern spelling and inflection.
///
/// Steps, in order:
/// 1. long s becomes `s`
/// 2. the spelling rules are applied
/// 3. marked past-tense candidates are resolved through the verb tables
/// 4. archaic `-eth`/`-th` and `-est`/`'st` verb endings are rewritten
pub struct Normalizer {
    rules: RuleSet,
    verbs: VerbTable,
    irregular: IrregularVerbTable,
    variant: VariantChoice,
    marker: PastTenseMarker,
    marked_verb: Regex,
    verb_endings: Option<Regex>,
}

impl Normalizer {
    pub fn new(
        rules: RuleSet,
        verbs: VerbTable,
        irregular: Option<IrregularVerbTable>,
        marker: PastTenseMarker,
    ) -> Result<Self, ConfigError> {
        let irregular = irregular.ok_or(ConfigError::MissingIrregularTable)?;

        let marked_pattern = format!(r"\b\S+{}'d\b", regex_syntax::escape(marker.as_str()));
        let marked_verb = Regex::new(&marked_pattern).map_err(|e| ConfigError::InvalidMarker {
            marker: marker.as_str().to_string(),
            reason: e.to_string(),
        })?;

        let verb_endings = if verbs.is_empty() {
            None
        } else {
            // alternation keeps table order, so earlier verbs win exactly as a sequential pass would
            let alternatives: Vec<String> = verbs
                .records()
                .iter()
                .map(|r| regex_syntax::escape(&r.base))
                .collect();
            let pattern = format!(r"(?i)\b({})(e?th|'?e?st)\b", alternatives.join("|"));
            Some(Regex::new(&pattern).map_err(|e| ConfigError::InvalidPattern {
                index: 0,
                pattern: "<common verb endings>".to_string(),
                message: e.to_string(),
            })?)
        };

        Ok(Self {
            rules,
            verbs,
            irregular,
            variant: VariantChoice::First,
            marker,
            marked_verb,
            verb_endings,
        })
    }

    /// Pick the last accepted spelling for irregular verbs with two past forms
    pub fn with_variant(mut self, variant: VariantChoice) -> Self {
        self.variant = variant;
        self
    }

    pub fn marker(&self) -> &PastTenseMarker {
        &self.marker
    }

    pub fn normalize(&self, text: &str) -> String {
        let text: String = text
            .chars()
            .map(|c| if c == LONG_S { 's' } else { c })
            .collect();
        let text = self.rules.apply(&text, false);
        let text = self.resolve_marked_past_tense(&text);
        self.rewrite_verb_endings(&text)
    }

    fn resolve_marked_past_tense(&self, text: &str) -> String {
        let suffix_len = self.marker.marked_suffix().len();
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for m in self.marked_verb.find_iter(text) {
            let marked = &text[m.range()];
            let base = &marked[..marked.len() - suffix_len];
            let resolved = match self.verbs.lookup(base) {
                Some(record) => record.past_tense.clone(),
                None => match past_tense(base, Some(&self.irregular), self.variant) {
                    Ok(past) => past,
                    Err(e) => {
                        warn!("Leaving {} unresolved: {}", marked, e);
                        marked.to_string()
                    }
                },
            };
            debug!("Resolved past tense {} -> {}", marked, resolved);

            out.push_str(&text[last..m.start()]);
            out.push_str(&resolved);
            last = m.end();
        }

        out.push_str(&text[last..]);
        out
    }

    fn rewrite_verb_endings(&self, text: &str) -> String {
        let Some(regex) = &self.verb_endings else {
            return text.to_string();
        };

        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in regex.captures_iter(text) {
            let (Some(whole), Some(base), Some(ending)) = (caps.get_match(), caps.get_group(1), caps.get_group(2)) else {
                continue;
            };
            let Some(record) = self.verbs.lookup(&text[base.range()]) else {
                continue;
            };

            out.push_str(&text[last..whole.start()]);
            if text[ending.range()].to_lowercase().ends_with("th") {
                out.push_str(&record.third_person_singular);
            } else {
                out.push_str(&record.base);
            }
            last = whole.end();
        }

        out.push_str(&text[last..]);
        out
    }
}
