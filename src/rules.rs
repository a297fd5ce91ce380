// Ordered pattern-rewrite engine shared by preprocessing and normalization.
// Rules are compiled once when the tables load and are read-only afterwards.

use regex_automata::meta::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// A single `target -> replacement` rewrite as written in a rule table.
///
/// `target` uses the usual regex syntax; `replacement` may refer back to capture
/// groups as `\1` or `\g<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRule {
    pub target: String,
    pub replacement: String,
}

impl TransformRule {
    pub fn new(target: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            replacement: replacement.into(),
        }
    }

    /// Character-class rules match anywhere; every other rule is anchored to whole words
    pub fn is_character_class(&self) -> bool {
        self.target.contains(r"(\w)") || self.target.contains(r"(\S)")
    }
}

#[derive(Clone)]
struct CompiledRule {
    regex: Regex,
    template: String,
}

/// An ordered, compiled list of rules. Order matters: each rule sees the output of the previous one.
#[derive(Clone)]
pub struct RuleSet {
    source: Vec<TransformRule>,
    compiled: Vec<CompiledRule>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.source).finish()
    }
}

impl RuleSet {
    /// Compile every rule up front so a bad pattern fails before any document is touched
    pub fn compile(rules: &[TransformRule]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(rules.len());

        for (index, rule) in rules.iter().enumerate() {
            let pattern = if rule.is_character_class() {
                format!("(?i){}", rule.target)
            } else {
                format!(r"(?i)\b(?:{})\b", rule.target)
            };

            let regex = Regex::new(&pattern).map_err(|e| ConfigError::InvalidPattern {
                index,
                pattern: rule.target.clone(),
                message: e.to_string(),
            })?;

            compiled.push(CompiledRule {
                regex,
                template: translate_replacement(&rule.replacement),
            });
        }

        Ok(Self {
            source: rules.to_vec(),
            compiled,
        })
    }

    pub fn empty() -> Self {
        Self {
            source: Vec::new(),
            compiled: Vec::new(),
        }
    }

    pub fn rules(&self) -> &[TransformRule] {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Fold the rules over `text` in order. With `final_trim`, whitespace runs collapse to a
    /// single space and the ends are stripped.
    pub fn apply(&self, text: &str, final_trim: bool) -> String {
        let mut current = text.to_string();
        for rule in &self.compiled {
            current = replace_all_template(&rule.regex, &current, &rule.template);
        }

        if final_trim {
            collapse_whitespace(&current)
        } else {
            current
        }
    }
}

/// Free-function form of [`RuleSet::apply`]
pub fn apply_rules(rules: &RuleSet, text: &str, final_trim: bool) -> String {
    rules.apply(text, final_trim)
}

/// Replace every match, expanding `$1`/`${name}` references in `template`
pub(crate) fn replace_all_template(regex: &Regex, haystack: &str, template: &str) -> String {
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;

    for caps in regex.captures_iter(haystack) {
        let Some(m) = caps.get_match() else {
            continue;
        };
        out.push_str(&haystack[last..m.start()]);
        caps.interpolate_string_into(haystack, template, &mut out);
        last = m.end();
    }

    out.push_str(&haystack[last..]);
    out
}

/// Collapse whitespace runs into single spaces and trim both ends
pub fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for word in text.split_whitespace() {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }

    result
}

/// Rule tables write group references as `\1` or `\g<name>`; the matcher expects `${1}`.
/// A literal `$` must be doubled.
fn translate_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(&d) = chars.peek() {
                        if !d.is_ascii_digit() || group.len() == 2 {
                            break;
                        }
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|&c| c != '>').collect();
                        out.push_str(&format!("${{{name}}}"));
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                _ => out.push('\\'),
            },
            _ => out.push(ch),
        }
    }

    out
}
