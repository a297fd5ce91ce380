use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use remarkup::config::{
    DEFAULT_BATCH_WIDTH, DEFAULT_BODY_TAG, DEFAULT_HEADER_TAG, DEFAULT_LOG_DIR, DEFAULT_ROOT_TAG, DEFAULT_UPPER_LEN,
};
use remarkup::discovery::{self, DiscoveryConfig, Selection};
use remarkup::markup::MarkupTree;
use remarkup::normalizer::DEFAULT_MARKER;
use remarkup::service::{Annotates, ChunkedClient, CommandBackend, Tokenizes, WhitespaceTokenizer};
use remarkup::{AnnotationColumns, BatchRunner, LengthWindow, PastTenseMarker, Pipeline, RunConfig, Tables};

#[derive(Parser, Debug)]
#[command(name = "remarkup")]
#[command(about = "Normalize, annotate and rebuild historical English XML corpora with their markup intact")]
#[command(version)]
struct Args {
    /// Directory holding the *.xml corpus
    corpus_dir: PathBuf,

    /// Element holding the document header
    #[arg(long, default_value = DEFAULT_HEADER_TAG)]
    header_tag: String,

    /// Element holding the document body
    #[arg(long, default_value = DEFAULT_BODY_TAG)]
    body_tag: String,

    /// Root element of rebuilt documents
    #[arg(long, default_value = DEFAULT_ROOT_TAG)]
    root_tag: String,

    /// Where rebuilt documents go [default: <corpus_dir>_remade]
    #[arg(long)]
    dest_dir: Option<PathBuf>,

    /// Directory with the rule and verb tables
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Apply the preprocessing rules after tokenization
    #[arg(long)]
    prep_rules: bool,

    /// Normalize spelling and verb inflections
    #[arg(long)]
    normalize: bool,

    /// Annotation columns to attach, e.g. "pos", "lemma" or "pos,lemma"
    #[arg(long)]
    annotate: Option<String>,

    /// Past-tense marker inserted by the preprocessing rules
    #[arg(long, default_value = DEFAULT_MARKER)]
    marker: String,

    /// Command speaking CoreNLP JSON on stdin/stdout, used for tokenization and annotation
    #[arg(long)]
    annotator_cmd: Option<String>,

    /// Smallest accepted body, in characters
    #[arg(long, default_value_t = 0)]
    lower_len: usize,

    /// Largest accepted body, in characters
    #[arg(long, default_value_t = DEFAULT_UPPER_LEN)]
    upper_len: usize,

    /// Accept bodies of any length
    #[arg(long)]
    no_upper_len: bool,

    /// Process only the first N files
    #[arg(long)]
    limit: Option<usize>,

    /// Process only this leading share of the files (0 < ratio < 1)
    #[arg(long)]
    ratio: Option<f64>,

    /// Include files in sub-directories
    #[arg(long)]
    recursive: bool,

    /// Visit files in random order; --limit and --ratio then pick a random sample
    #[arg(long)]
    shuffle: bool,

    /// Rebuild documents whose output already exists
    #[arg(long)]
    overwrite: bool,

    /// Process documents in concurrent batches
    #[arg(long)]
    concurrency: bool,

    /// Documents per concurrent batch
    #[arg(long, default_value_t = DEFAULT_BATCH_WIDTH)]
    batch_width: usize,

    /// Spot-check word alignment of each normalized output
    #[arg(long)]
    alignment_check: bool,

    /// Abort on first discovery error
    #[arg(long)]
    fail_fast: bool,

    /// Stats output file path
    #[arg(long, default_value = "run_stats.json")]
    stats_out: PathBuf,

    /// Directory for misalignment logs
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Suppress console progress bars
    #[arg(long)]
    no_progress: bool,
}

fn progress_bar(total: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files {msg}") {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();

    info!("Starting remarkup");
    info!(?args, "Parsed CLI arguments");

    if !args.corpus_dir.is_dir() {
        anyhow::bail!("Corpus directory does not exist or is not a directory: {}", args.corpus_dir.display());
    }

    let columns: AnnotationColumns = args.annotate.as_deref().unwrap_or("").parse()?;
    let marker = PastTenseMarker::new(args.marker.clone())?;
    let tables = Tables::load(&args.config_dir)
        .with_context(|| format!("Loading tables from {}", args.config_dir.display()))?
        .shared();

    let config = RunConfig {
        header_tag: args.header_tag.clone(),
        body_tag: args.body_tag.clone(),
        root_tag: args.root_tag.clone(),
        dest_dir: args
            .dest_dir
            .clone()
            .unwrap_or_else(|| RunConfig::default_dest_dir(&args.corpus_dir)),
        log_dir: args.log_dir.clone(),
        apply_prep_rules: args.prep_rules,
        normalize: args.normalize,
        columns,
        length_window: LengthWindow::new(args.lower_len, (!args.no_upper_len).then_some(args.upper_len)),
        overwrite: args.overwrite,
        alignment_check: args.alignment_check,
        concurrent: args.concurrency,
        batch_width: args.batch_width,
    };

    let (tokenizer, annotator): (Arc<dyn Tokenizes>, Option<Arc<dyn Annotates>>) = match &args.annotator_cmd {
        Some(command_line) => {
            let backend = CommandBackend::from_command_line(command_line)
                .with_context(|| format!("Empty annotator command: {command_line:?}"))?;
            let client = Arc::new(ChunkedClient::new(backend));
            let tokenizer: Arc<dyn Tokenizes> = client.clone();
            let annotator: Arc<dyn Annotates> = client;
            (tokenizer, Some(annotator))
        }
        None => (Arc::new(WhitespaceTokenizer) as Arc<dyn Tokenizes>, None),
    };

    let pipeline = Pipeline::new(config, tables, marker, tokenizer, annotator, Arc::new(MarkupTree))?;
    let runner = BatchRunner::new(pipeline);

    let discovery_config = DiscoveryConfig {
        fail_fast: args.fail_fast,
        recursive: args.recursive,
        shuffle: args.shuffle,
        selection: Selection::from_options(args.limit, args.ratio)?,
    };
    info!("Starting file discovery in: {}", args.corpus_dir.display());
    let files = discovery::find_corpus_files(&args.corpus_dir, discovery_config).await?;
    println!("remarkup v{} - found {} corpus files", env!("CARGO_PKG_VERSION"), files.len());

    runner.validate_corpus(&files).await?;

    let pb = progress_bar(files.len() as u64, args.no_progress);
    let stats = runner
        .run(&files, |file| {
            pb.set_message(file.path.clone());
            pb.inc(1);
        })
        .await;
    pb.finish_with_message("Complete");

    stats
        .write_json(&args.stats_out)
        .await
        .with_context(|| format!("Writing stats to {}", args.stats_out.display()))?;

    println!("Processing complete:");
    println!("  Processed: {} files ({} words)", stats.processed, stats.total_tokens);
    println!("  Skipped: {} files", stats.skipped);
    if stats.failed > 0 {
        println!("  Failed: {} files", stats.failed);
    }
    println!("  Stats written to {}", args.stats_out.display());

    Ok(())
}
