// Table loading and run configuration.
// Tables are read once, validated with line-numbered errors, compiled, and then shared read-only.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::normalizer::{Normalizer, PastTenseMarker};
use crate::pipeline::LengthWindow;
use crate::reconstruct::AnnotationColumns;
use crate::rules::{RuleSet, TransformRule};
use crate::verbs::{IrregularVerbTable, VariantChoice, VerbRecord, VerbTable};

pub const NORMALIZING_RULES_FILE: &str = "normalizing_rules.txt";
pub const PREPROCESSING_RULES_FILE: &str = "preprocessing_rules.txt";
pub const COMMON_VERBS_FILE: &str = "common_verbs.txt";
pub const IRREGULAR_VERBS_FILE: &str = "irregular_v_past_inflections.json";
pub const TEST_SAMPLE_FILE: &str = "test_sample.txt";

const DELIMITER: char = '\t';

/// Shape of a tab-delimited table
#[derive(Debug, Clone, Copy)]
struct TableFormat {
    columns: usize,
    header: bool,
}

const RULE_TABLE: TableFormat = TableFormat { columns: 2, header: false };
const VERB_TABLE: TableFormat = TableFormat { columns: 3, header: true };
const SAMPLE_TABLE: TableFormat = TableFormat { columns: 3, header: true };

fn read_table(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Split `contents` into rows of at least `format.columns` fields.
/// Returns the good rows with their 1-based line numbers, plus one error per short line.
fn split_rows<'a>(path: &Path, contents: &'a str, format: TableFormat) -> (Vec<(usize, Vec<&'a str>)>, Vec<ConfigError>) {
    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        if format.header && idx == 0 {
            continue;
        }
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(DELIMITER).collect();
        if fields.len() < format.columns {
            errors.push(ConfigError::MalformedLine {
                path: path.to_path_buf(),
                line: line_no,
                expected: format.columns,
                found: fields.len(),
            });
            continue;
        }
        rows.push((line_no, fields));
    }

    (rows, errors)
}

fn strict_rows<'a>(path: &Path, contents: &'a str, format: TableFormat) -> Result<Vec<(usize, Vec<&'a str>)>, ConfigError> {
    let (rows, errors) = split_rows(path, contents, format);
    match errors.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(rows),
    }
}

/// Parse a `target<TAB>replacement` rule table
pub fn parse_rule_table(path: &Path, contents: &str) -> Result<Vec<TransformRule>, ConfigError> {
    Ok(strict_rows(path, contents, RULE_TABLE)?
        .into_iter()
        .map(|(_, fields)| TransformRule::new(fields[0], fields[1].trim_end()))
        .collect())
}

pub fn load_rule_table(path: &Path) -> Result<Vec<TransformRule>, ConfigError> {
    let rules = parse_rule_table(path, &read_table(path)?)?;
    debug!("Loaded {} rules from {}", rules.len(), path.display());
    Ok(rules)
}

/// Parse the `base<TAB>third<TAB>past` common-verb table (first line is a header)
pub fn parse_verb_table(path: &Path, contents: &str) -> Result<VerbTable, ConfigError> {
    let records = strict_rows(path, contents, VERB_TABLE)?
        .into_iter()
        .map(|(_, fields)| VerbRecord {
            base: fields[0].trim().to_string(),
            third_person_singular: fields[1].trim().to_string(),
            past_tense: fields[2].trim().to_string(),
        })
        .collect();
    Ok(VerbTable::new(records))
}

pub fn load_verb_table(path: &Path) -> Result<VerbTable, ConfigError> {
    parse_verb_table(path, &read_table(path)?)
}

/// Parse the irregular-verb JSON. Every entry needs at least one past tense spelling.
pub fn parse_irregular_table(path: &Path, contents: &str) -> Result<IrregularVerbTable, ConfigError> {
    let table: IrregularVerbTable = serde_json::from_str(contents).map_err(|source| ConfigError::InvalidIrregularTable {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some((verb, _)) = table.iter().find(|(_, entry)| entry.past_tense.is_empty()) {
        return Err(ConfigError::EmptyIrregularEntry { verb: verb.clone() });
    }
    Ok(table)
}

pub fn load_irregular_table(path: &Path) -> Result<IrregularVerbTable, ConfigError> {
    parse_irregular_table(path, &read_table(path)?)
}

/// One row of the rule test sample: raw input and the expected output of each stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    pub line: usize,
    pub raw: String,
    pub preprocessed: String,
    pub normalized: String,
}

pub fn load_test_sample(path: &Path) -> Result<Vec<SampleRow>, ConfigError> {
    let contents = read_table(path)?;
    Ok(strict_rows(path, &contents, SAMPLE_TABLE)?
        .into_iter()
        .map(|(line, fields)| SampleRow {
            line,
            raw: fields[0].to_string(),
            preprocessed: fields[1].to_string(),
            normalized: fields[2].trim().to_string(),
        })
        .collect())
}

/// Check every table in `config_dir` and report all format problems rather than the first.
/// The test sample is only checked when present.
pub fn check_table_formats(config_dir: &Path) -> Vec<ConfigError> {
    let mut problems = Vec::new();
    let mut tables = vec![
        (config_dir.join(COMMON_VERBS_FILE), VERB_TABLE),
        (config_dir.join(NORMALIZING_RULES_FILE), RULE_TABLE),
        (config_dir.join(PREPROCESSING_RULES_FILE), RULE_TABLE),
    ];
    let sample = config_dir.join(TEST_SAMPLE_FILE);
    if sample.exists() {
        tables.push((sample, SAMPLE_TABLE));
    }

    for (path, format) in tables {
        match read_table(&path) {
            Ok(contents) => problems.extend(split_rows(&path, &contents, format).1),
            Err(e) => problems.push(e),
        }
    }

    let irregular = config_dir.join(IRREGULAR_VERBS_FILE);
    if let Err(e) = load_irregular_table(&irregular) {
        problems.push(e);
    }

    problems
}

/// Every table a run needs, compiled and immutable
#[derive(Debug)]
pub struct Tables {
    pub normalizing_rules: RuleSet,
    pub preprocessing_rules: RuleSet,
    pub verbs: VerbTable,
    pub irregular: IrregularVerbTable,
}

impl Tables {
    /// Load and compile all tables from `config_dir`; any problem aborts the run
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let normalizing = load_rule_table(&config_dir.join(NORMALIZING_RULES_FILE))?;
        let preprocessing = load_rule_table(&config_dir.join(PREPROCESSING_RULES_FILE))?;
        let verbs = load_verb_table(&config_dir.join(COMMON_VERBS_FILE))?;
        let irregular = load_irregular_table(&config_dir.join(IRREGULAR_VERBS_FILE))?;

        let tables = Self {
            normalizing_rules: RuleSet::compile(&normalizing)?,
            preprocessing_rules: RuleSet::compile(&preprocessing)?,
            verbs,
            irregular,
        };
        info!(
            "Loaded tables from {}: {} normalizing rules, {} preprocessing rules, {} common verbs, {} irregular verbs",
            config_dir.display(),
            tables.normalizing_rules.len(),
            tables.preprocessing_rules.len(),
            tables.verbs.len(),
            tables.irregular.len()
        );
        Ok(tables)
    }

    /// Build the normalizer over these tables
    pub fn normalizer(&self, marker: PastTenseMarker, variant: VariantChoice) -> Result<Normalizer, ConfigError> {
        Ok(Normalizer::new(
            self.normalizing_rules.clone(),
            self.verbs.clone(),
            Some(self.irregular.clone()),
            marker,
        )?
        .with_variant(variant))
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

pub const DEFAULT_ROOT_TAG: &str = "TEI.2";
pub const DEFAULT_HEADER_TAG: &str = "teiHeader";
pub const DEFAULT_BODY_TAG: &str = "body";
pub const DEFAULT_UPPER_LEN: usize = 1_000_000;
pub const DEFAULT_BATCH_WIDTH: usize = 10;
pub const DEFAULT_LOG_DIR: &str = "word_misalignment_logs";

/// Options for one corpus run
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub header_tag: String,
    pub body_tag: String,
    pub root_tag: String,
    pub dest_dir: PathBuf,
    pub log_dir: PathBuf,
    pub apply_prep_rules: bool,
    pub normalize: bool,
    pub columns: AnnotationColumns,
    pub length_window: LengthWindow,
    pub overwrite: bool,
    pub alignment_check: bool,
    pub concurrent: bool,
    pub batch_width: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            header_tag: DEFAULT_HEADER_TAG.to_string(),
            body_tag: DEFAULT_BODY_TAG.to_string(),
            root_tag: DEFAULT_ROOT_TAG.to_string(),
            dest_dir: PathBuf::from("remade"),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            apply_prep_rules: false,
            normalize: false,
            columns: AnnotationColumns::none(),
            length_window: LengthWindow::default(),
            overwrite: false,
            alignment_check: false,
            concurrent: false,
            batch_width: DEFAULT_BATCH_WIDTH,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_width == 0 {
            return Err(ConfigError::ZeroBatchWidth);
        }
        Ok(())
    }

    /// Destination directory named after the corpus, e.g. `corpus` -> `corpus_remade`
    pub fn default_dest_dir(corpus_dir: &Path) -> PathBuf {
        let name = corpus_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "corpus".to_string());
        corpus_dir.with_file_name(format!("{name}_remade"))
    }
}
