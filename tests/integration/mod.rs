// Integration test utilities and common code

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use remarkup::markup::MarkupTree;
use remarkup::service::WhitespaceTokenizer;
use remarkup::{PastTenseMarker, Pipeline, RunConfig, Tables};

/// Config directory shipped with the crate
pub fn shipped_config_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config")
}

/// A small TEI-style document with the given header and body content
pub fn tei_document(title: &str, body: &str) -> String {
    format!(
        "<TEI.2><teiHeader><fileDesc><title>{title}</title></fileDesc></teiHeader><text><body>{body}</body></text></TEI.2>"
    )
}

/// Test fixture holding a corpus directory, an output directory and a log directory
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub corpus_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let corpus_dir = temp_dir.path().join("corpus");
        fs::create_dir_all(&corpus_dir).expect("Failed to create corpus directory");
        let dest_dir = temp_dir.path().join("corpus_remade");
        let log_dir = temp_dir.path().join("word_misalignment_logs");

        Self {
            temp_dir,
            corpus_dir,
            dest_dir,
            log_dir,
        }
    }

    /// Write a corpus file, creating parent directories as needed
    pub fn create_corpus_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.corpus_dir.join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&file_path, content).expect("Failed to write corpus file");
        file_path
    }

    /// Output path the pipeline writes for `name`
    pub fn output_for(&self, name: &str) -> PathBuf {
        self.dest_dir.join(name)
    }

    pub fn read_output(&self, name: &str) -> String {
        fs::read_to_string(self.output_for(name)).expect("Failed to read output file")
    }

    /// Run configuration pointing at this fixture's directories
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            dest_dir: self.dest_dir.clone(),
            log_dir: self.log_dir.clone(),
            ..RunConfig::default()
        }
    }

    /// Copy of the shipped tables with the normalizing rules replaced
    pub fn config_dir_with_rules(&self, normalizing_rules: &str) -> PathBuf {
        let dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&dir).expect("Failed to create config directory");
        for entry in fs::read_dir(shipped_config_dir()).expect("Failed to list shipped tables") {
            let entry = entry.expect("Failed to read table entry");
            fs::copy(entry.path(), dir.join(entry.file_name())).expect("Failed to copy table");
        }
        fs::write(dir.join("normalizing_rules.txt"), normalizing_rules).expect("Failed to write rules");
        dir
    }

    /// Pipeline over the shipped tables with the whitespace tokenizer and no annotator
    pub fn pipeline(&self, config: RunConfig) -> Pipeline {
        self.pipeline_with_tables(config, &shipped_config_dir())
    }

    pub fn pipeline_with_tables(&self, config: RunConfig, config_dir: &Path) -> Pipeline {
        let tables = Tables::load(config_dir)
            .expect("Failed to load tables")
            .shared();
        Pipeline::new(
            config,
            tables,
            PastTenseMarker::default(),
            Arc::new(WhitespaceTokenizer),
            None,
            Arc::new(MarkupTree),
        )
        .expect("Failed to build pipeline")
    }
}

/// Strip every element, leaving the words of a rebuilt body
pub fn text_only(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
