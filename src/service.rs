// Tokenizer/annotator collaborator.
// The core only sees the `Tokenizes`/`Annotates` capabilities; the chunked client adapts any
// backend that speaks CoreNLP JSON and keeps oversized inputs within what the backend accepts.

use serde::Deserialize;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::reconstruct::{AnnotationColumn, AnnotationColumns};

/// Largest text sent to a backend in one call, in characters
pub const SINGLE_CALL_LIMIT: usize = 100_000;
/// Tokens per chunk when an oversized text is sliced
pub const DEFAULT_CHUNK_STEP: usize = 5_000;
/// How much the chunk step shrinks after a failed chunk
pub const DEFAULT_STEP_NARROWING: usize = 500;

/// Environment variable through which a command backend learns what to run
pub const ANNOTATORS_ENV: &str = "REMARKUP_ANNOTATORS";

/// Splits text into an ordered sequence of tokens
pub trait Tokenizes: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<String>, ServiceError>;
}

/// Produces one row of values per requested column, each row as long as the token count
pub trait Annotates: Send + Sync {
    fn annotate(&self, text: &str, columns: &AnnotationColumns) -> Result<Vec<Vec<String>>, ServiceError>;
}

/// Tokenizer that splits on whitespace only
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizes for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>, ServiceError> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }
}

/// What a backend call is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Tokenize,
    Annotate,
}

impl Request {
    pub fn annotators(&self) -> &'static str {
        match self {
            Request::Tokenize => "tokenize",
            Request::Annotate => "tokenize,ssplit,pos,lemma",
        }
    }
}

/// A raw backend: text in, CoreNLP JSON out
pub trait Backend: Send + Sync {
    fn call(&self, text: &str, request: Request) -> Result<String, ServiceError>;
}

/// Runs an external program per call, writing the text to its stdin and reading JSON from stdout.
/// The requested annotators are passed in [`ANNOTATORS_ENV`].
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a command line such as `corenlp-json --whitespace`
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl Backend for CommandBackend {
    fn call(&self, text: &str, request: Request) -> Result<String, ServiceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(ANNOTATORS_ENV, request.annotators())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin is written on its own thread while stdout drains
        let stdin = child.stdin.take();
        let input = text.to_string();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ServiceError::BackendStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        writer
            .join()
            .map_err(|_| ServiceError::Unparseable("stdin writer thread panicked".to_string()))??;

        String::from_utf8(output.stdout).map_err(|e| ServiceError::Unparseable(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CoreNlpDocument {
    #[serde(default)]
    tokens: Vec<CoreNlpToken>,
    #[serde(default)]
    sentences: Vec<CoreNlpSentence>,
}

#[derive(Debug, Deserialize)]
struct CoreNlpSentence {
    tokens: Vec<CoreNlpToken>,
}

#[derive(Debug, Deserialize)]
struct CoreNlpToken {
    #[serde(rename = "originalText")]
    original_text: String,
    #[serde(default)]
    pos: Option<String>,
    #[serde(default)]
    lemma: Option<String>,
}

impl CoreNlpDocument {
    fn parse(raw: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(raw).map_err(|e| ServiceError::Unparseable(e.to_string()))
    }

    /// Top-level tokens when present, otherwise every sentence's tokens in order
    fn all_tokens(&self) -> Box<dyn Iterator<Item = &CoreNlpToken> + '_> {
        if self.tokens.is_empty() {
            Box::new(self.sentences.iter().flat_map(|s| s.tokens.iter()))
        } else {
            Box::new(self.tokens.iter())
        }
    }
}

impl CoreNlpToken {
    fn column(&self, column: AnnotationColumn) -> Result<String, ServiceError> {
        let value = match column {
            AnnotationColumn::Pos => &self.pos,
            AnnotationColumn::Lemma => &self.lemma,
        };
        value
            .clone()
            .ok_or_else(|| ServiceError::Unparseable(format!("token {:?} has no {column}", self.original_text)))
    }
}

/// Wraps a [`Backend`] with input slicing and a narrowing retry.
///
/// Texts within the single-call limit go out whole. Larger texts are cut into chunks of
/// `step` whitespace tokens. When any call fails the step shrinks by the narrowing amount
/// and the whole text is tried again; once the step reaches zero the client gives up.
#[derive(Debug, Clone)]
pub struct ChunkedClient<B> {
    backend: B,
    initial_step: usize,
    narrowing: usize,
    single_call_limit: usize,
}

impl<B: Backend> ChunkedClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            initial_step: DEFAULT_CHUNK_STEP,
            narrowing: DEFAULT_STEP_NARROWING,
            single_call_limit: SINGLE_CALL_LIMIT,
        }
    }

    pub fn with_step(mut self, initial_step: usize, narrowing: usize) -> Self {
        self.initial_step = initial_step;
        self.narrowing = narrowing.max(1);
        self
    }

    pub fn with_single_call_limit(mut self, limit: usize) -> Self {
        self.single_call_limit = limit;
        self
    }

    fn call_with_retry(&self, text: &str, request: Request) -> Result<Vec<CoreNlpDocument>, ServiceError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut whole = text.chars().count() <= self.single_call_limit;
        let mut step = self.initial_step;

        while step > 0 {
            match self.attempt(text, &tokens, step, whole, request) {
                Ok(documents) => return Ok(documents),
                Err(e) => {
                    let narrowed = step.saturating_sub(self.narrowing);
                    warn!("Annotator call failed ({}); narrowing chunk step from {} to {}", e, step, narrowed);
                    step = narrowed;
                    whole = false;
                }
            }
        }

        Err(ServiceError::Exhausted {
            initial_step: self.initial_step,
        })
    }

    fn attempt(
        &self,
        text: &str,
        tokens: &[&str],
        step: usize,
        whole: bool,
        request: Request,
    ) -> Result<Vec<CoreNlpDocument>, ServiceError> {
        if whole {
            let raw = self.backend.call(text, request)?;
            return Ok(vec![CoreNlpDocument::parse(&raw)?]);
        }

        debug!("Slicing {} tokens into chunks of {}", tokens.len(), step);
        tokens
            .chunks(step)
            .map(|chunk| {
                let raw = self.backend.call(&chunk.join(" "), request)?;
                CoreNlpDocument::parse(&raw)
            })
            .collect()
    }
}

impl<B: Backend> Tokenizes for ChunkedClient<B> {
    fn tokenize(&self, text: &str) -> Result<Vec<String>, ServiceError> {
        let documents = self.call_with_retry(text, Request::Tokenize)?;
        Ok(documents
            .iter()
            .flat_map(|d| d.all_tokens().map(|t| t.original_text.clone()))
            .collect())
    }
}

impl<B: Backend> Annotates for ChunkedClient<B> {
    fn annotate(&self, text: &str, columns: &AnnotationColumns) -> Result<Vec<Vec<String>>, ServiceError> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.call_with_retry(text, Request::Annotate)?;
        let mut rows: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
        for token in documents.iter().flat_map(|d| d.all_tokens()) {
            for (row, column) in rows.iter_mut().zip(columns.columns()) {
                row.push(token.column(*column)?);
            }
        }

        if rows.iter().all(Vec::is_empty) && !text.trim().is_empty() {
            return Err(ServiceError::Empty);
        }

        info!("Annotated {} tokens with {} columns", rows[0].len(), columns.len());
        Ok(rows)
    }
}
