// Per-document pipeline: extract -> strip tags -> tokenize/preprocess -> normalize ->
// reconcile -> annotate -> rebuild -> serialize. Stages run strictly in order; any
// document error stops this document only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aligner::{reconcile, write_report};
use crate::config::{RunConfig, Tables, DEFAULT_UPPER_LEN};
use crate::error::{ConfigError, DocumentError, ServiceError};
use crate::incremental::{create_complete_output, output_path, should_process};
use crate::inspect::{alignment_spot_check, report_spot_check, DEFAULT_CHECK_NUM, DEFAULT_ERROR_THRESHOLD};
use crate::markup::DocumentTree;
use crate::normalizer::{Normalizer, PastTenseMarker};
use crate::preprocess::preprocess;
use crate::reconstruct::{rebuild, split_units, Unit, WORD_ELEMENT};
use crate::service::{Annotates, Tokenizes};
use crate::verbs::VariantChoice;

/// Accepted body length in characters, both ends inclusive. No upper bound when `upper` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthWindow {
    pub lower: usize,
    pub upper: Option<usize>,
}

impl Default for LengthWindow {
    fn default() -> Self {
        Self {
            lower: 0,
            upper: Some(DEFAULT_UPPER_LEN),
        }
    }
}

impl LengthWindow {
    pub fn new(lower: usize, upper: Option<usize>) -> Self {
        Self { lower, upper }
    }

    /// Character length of `text` when it falls inside the window
    pub fn check(&self, text: &str) -> Result<usize, DocumentError> {
        let length = text.chars().count();
        let too_long = self.upper.is_some_and(|upper| length > upper);
        if length < self.lower || too_long {
            return Err(DocumentError::LengthGate {
                length,
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(length)
    }
}

/// A document between extraction and reconstruction.
/// `body` holds one placeholder per entry of `tags`, in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub header: String,
    pub tags: Vec<String>,
    pub body: String,
    pub normalized_body: Option<String>,
}

impl Document {
    pub fn placeholder_count(&self) -> usize {
        split_units(&self.body)
            .iter()
            .filter(|u| matches!(u, Unit::Markup(_)))
            .count()
    }

    pub fn token_count(&self) -> usize {
        split_units(&self.body)
            .iter()
            .filter(|u| matches!(u, Unit::Token(_)))
            .count()
    }
}

/// What happened to a document that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Written { output: PathBuf, tokens: usize },
    AlreadyExists { output: PathBuf },
}

/// Everything needed to process documents, shared read-only by every worker
pub struct Pipeline {
    config: RunConfig,
    tables: Arc<Tables>,
    marker: PastTenseMarker,
    normalizer: Option<Normalizer>,
    tokenizer: Arc<dyn Tokenizes>,
    annotator: Option<Arc<dyn Annotates>>,
    tree: Arc<dyn DocumentTree>,
}

impl Pipeline {
    pub fn new(
        config: RunConfig,
        tables: Arc<Tables>,
        marker: PastTenseMarker,
        tokenizer: Arc<dyn Tokenizes>,
        annotator: Option<Arc<dyn Annotates>>,
        tree: Arc<dyn DocumentTree>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if !config.columns.is_empty() && annotator.is_none() {
            return Err(ConfigError::InvalidAnnotationColumns(format!(
                "{:?} requested but no annotator is configured",
                config.columns.columns()
            )));
        }

        let normalizer = if config.normalize {
            Some(tables.normalizer(marker.clone(), VariantChoice::First)?)
        } else {
            None
        };

        Ok(Self {
            config,
            tables,
            marker,
            normalizer,
            tokenizer,
            annotator,
            tree,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn marker(&self) -> &PastTenseMarker {
        &self.marker
    }

    /// Extract, gate, tokenize and (optionally) normalize a raw document.
    /// An unrepairable token-count drift is logged under the log directory and returned as an error.
    pub fn prepare(&self, source: &Path, raw: &str) -> Result<Document, DocumentError> {
        let regions = self
            .tree
            .extract_regions(raw, &self.config.header_tag, &self.config.body_tag)?;
        let length = self.config.length_window.check(&regions.body)?;
        debug!("Body of {} is {} chars", source.display(), length);

        let tags = self.tree.extract_fragments(&regions.body);
        let placeholder_body = self.tree.replace_with_placeholders(&regions.body);
        let rules = self
            .config
            .apply_prep_rules
            .then_some(&self.tables.preprocessing_rules);
        let body = preprocess(&placeholder_body, self.tokenizer.as_ref(), rules, true)?;

        let Some(normalizer) = &self.normalizer else {
            return Ok(Document {
                header: regions.header,
                tags,
                body: self.marker.revert(&body),
                normalized_body: None,
            });
        };

        let normalized = normalizer.normalize(&body);
        let body = self.marker.revert(&body);

        let tokenized_seq: Vec<String> = body.split_whitespace().map(str::to_string).collect();
        let normalized_seq: Vec<String> = normalized.split_whitespace().map(str::to_string).collect();
        if tokenized_seq.len() == normalized_seq.len() {
            return Ok(Document {
                header: regions.header,
                tags,
                body,
                normalized_body: Some(normalized),
            });
        }

        let (repaired, report) = reconcile(&tokenized_seq, &normalized_seq);
        if !report.is_aligned() {
            if let Err(e) = write_report(&self.config.log_dir, source, &report) {
                warn!("Could not write misalignment log for {}: {}", source.display(), e);
            }
            return Err(DocumentError::Alignment(report));
        }

        info!(
            "Repaired token drift in {} ({} vs {} tokens)",
            source.display(),
            tokenized_seq.len(),
            normalized_seq.len()
        );
        Ok(Document {
            header: regions.header,
            tags,
            body: repaired.tokenized.join(" "),
            normalized_body: Some(repaired.normalized.join(" ")),
        })
    }

    /// Annotation rows for the normalized body when there is one, else the tokenized body
    pub fn annotate(&self, document: &Document) -> Result<Vec<Vec<String>>, DocumentError> {
        let columns = &self.config.columns;
        let Some(annotator) = &self.annotator else {
            return Ok(Vec::new());
        };
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let text = document.normalized_body.as_deref().unwrap_or(&document.body);
        let rows = annotator.annotate(text, columns)?;
        if rows.len() != columns.len() || rows.iter().any(Vec::is_empty) {
            return Err(ServiceError::Empty.into());
        }
        Ok(rows)
    }

    /// Rebuild the body and wrap it into the output document
    pub fn render(&self, document: &Document, annotations: &[Vec<String>]) -> Result<String, DocumentError> {
        let body = rebuild(
            &document.body,
            document.normalized_body.as_deref(),
            &document.tags,
            &self.config.columns,
            annotations,
        )?;
        Ok(self.tree.serialize(&self.config.root_tag, &document.header, &body))
    }

    /// Run one source file end to end
    pub fn process_file(&self, source: &Path) -> Result<DocumentOutcome, DocumentError> {
        let output = output_path(&self.config.dest_dir, source);
        if !should_process(&self.config.dest_dir, source, self.config.overwrite) {
            return Ok(DocumentOutcome::AlreadyExists { output });
        }

        let raw = std::fs::read_to_string(source)?;
        let document = self.prepare(source, &raw)?;
        let annotations = self.annotate(&document)?;
        let rendered = self.render(&document, &annotations)?;

        create_complete_output(&output, &rendered)?;
        info!("Wrote {} ({} tokens)", output.display(), document.token_count());

        if self.config.alignment_check {
            if let Some(normalizer) = &self.normalizer {
                let check = alignment_spot_check(
                    &rendered,
                    WORD_ELEMENT,
                    normalizer,
                    DEFAULT_CHECK_NUM,
                    DEFAULT_ERROR_THRESHOLD,
                );
                report_spot_check(&output.display().to_string(), &check);
            }
        }

        Ok(DocumentOutcome::Written {
            output,
            tokens: document.token_count(),
        })
    }
}
