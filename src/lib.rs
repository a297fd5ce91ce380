pub mod aligner;
pub mod batch;
pub mod config;
pub mod discovery;
pub mod error;
pub mod incremental;
pub mod inspect;
pub mod markup;
pub mod normalizer;
pub mod pipeline;
pub mod preprocess;
pub mod reconstruct;
pub mod rules;
pub mod service;
pub mod verbs;

// Re-export the core engine types for convenient access
pub use aligner::{reconcile, AlignmentReport, RepairedPair};
pub use error::{ConfigError, DocumentError, ServiceError};
pub use normalizer::{Normalizer, PastTenseMarker};
pub use reconstruct::{rebuild, AnnotationColumn, AnnotationColumns, WordNode};
pub use rules::{apply_rules, RuleSet, TransformRule};
pub use verbs::{past_tense, third_person_singular, VariantChoice, VerbRecord, VerbTable};

// Re-export the run-level types used by the binaries and integration tests
pub use batch::{BatchRunner, FileStats, FileStatus, RunStats};
pub use config::{RunConfig, Tables};
pub use pipeline::{Document, DocumentOutcome, LengthWindow, Pipeline};
