// Verb inflection: third person singular and simple past, backed by a verified
// common-verb table and an irregular past-tense table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;

const VOWELS: [char; 5] = ['a', 'e', 'i', 'o', 'u'];

fn is_vowel(ch: Option<char>) -> bool {
    ch.is_some_and(|c| VOWELS.contains(&c))
}

/// A verified row of the common-verb table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbRecord {
    pub base: String,
    pub third_person_singular: String,
    pub past_tense: String,
}

/// Common verbs in table order, with a case-insensitive index on the base form
#[derive(Debug, Clone, Default)]
pub struct VerbTable {
    records: Vec<VerbRecord>,
    by_base: HashMap<String, usize>,
}

impl VerbTable {
    pub fn new(records: Vec<VerbRecord>) -> Self {
        let mut by_base = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            // first occurrence wins, matching a front-to-back table scan
            by_base.entry(record.base.to_lowercase()).or_insert(idx);
        }
        Self { records, by_base }
    }

    pub fn lookup(&self, base: &str) -> Option<&VerbRecord> {
        self.by_base
            .get(&base.to_lowercase())
            .map(|&idx| &self.records[idx])
    }

    pub fn records(&self) -> &[VerbRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accepted past tense and past participle spellings of one irregular verb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrregularVerbEntry {
    #[serde(rename = "VBD")]
    pub past_tense: Vec<String>,
    #[serde(rename = "VBN", default)]
    pub past_participle: Vec<String>,
}

/// Irregular verbs keyed by base form
pub type IrregularVerbTable = HashMap<String, IrregularVerbEntry>;

/// Which spelling to take when an irregular verb has two accepted past forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VariantChoice {
    #[default]
    First,
    Last,
}

/// Third person singular present of `verb`. Only the final one or two characters are
/// inspected, in the casing given.
pub fn third_person_singular(verb: &str) -> String {
    if verb.ends_with("ss")
        || verb.ends_with("zz")
        || verb.ends_with('x')
        || verb.ends_with("sh")
        || verb.ends_with("ch")
    {
        return format!("{verb}es");
    }
    if verb.ends_with("go") || verb.ends_with("do") {
        return format!("{verb}es");
    }

    let mut rev = verb.chars().rev();
    let last = rev.next();
    let before_last = rev.next();

    if let Some(last @ ('s' | 'z')) = last {
        if is_vowel(before_last) {
            return format!("{verb}{last}es");
        }
    }
    if last == Some('y') && before_last.is_some() && !is_vowel(before_last) {
        return format!("{}ies", &verb[..verb.len() - 1]);
    }
    if verb == "have" {
        return "has".to_string();
    }

    format!("{verb}s")
}

/// Simple past of `verb`.
///
/// Irregular verbs come from `irregular` at the chosen variant. Otherwise suffix rules
/// apply; the final consonant is doubled only for short consonant-vowel-consonant
/// verbs (five letters or fewer), since doubling in longer verbs depends on stress.
pub fn past_tense(
    verb: &str,
    irregular: Option<&IrregularVerbTable>,
    choice: VariantChoice,
) -> Result<String, ConfigError> {
    let irregular = irregular.ok_or(ConfigError::MissingIrregularTable)?;

    if let Some(entry) = irregular.get(verb) {
        let spelling = match choice {
            VariantChoice::First => entry.past_tense.first(),
            VariantChoice::Last => entry.past_tense.last(),
        };
        return spelling
            .cloned()
            .ok_or_else(|| ConfigError::EmptyIrregularEntry {
                verb: verb.to_string(),
            });
    }

    let chars: Vec<char> = verb.chars().collect();
    let n = chars.len();
    let last = chars.last().copied();
    let second = n.checked_sub(2).map(|i| chars[i]);
    let third = n.checked_sub(3).map(|i| chars[i]);

    if last == Some('e') {
        return Ok(format!("{verb}d"));
    }
    if last == Some('y') && second.is_some() && !is_vowel(second) {
        return Ok(format!("{}ied", &verb[..verb.len() - 1]));
    }
    if n <= 2 {
        return Ok(format!("{verb}ed"));
    }
    if let Some(final_consonant) = last {
        let doubles = !is_vowel(last)
            && !matches!(final_consonant, 'y' | 'x' | 'w')
            && is_vowel(second)
            && !is_vowel(third)
            && n <= 5;
        if doubles {
            return Ok(format!("{verb}{final_consonant}ed"));
        }
    }

    Ok(format!("{verb}ed"))
}
