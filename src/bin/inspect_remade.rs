// Re-reads an already rebuilt corpus: spot-checks the word alignment of every normalized
// file and prints attribute differences between two chosen attributes.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use remarkup::config::Tables;
use remarkup::discovery::{self, DiscoveryConfig, Selection};
use remarkup::inspect::{inspect_file, report_spot_check, DiffRequest, DEFAULT_CHECK_NUM, DEFAULT_ERROR_THRESHOLD};
use remarkup::normalizer::DEFAULT_MARKER;
use remarkup::{PastTenseMarker, VariantChoice};

#[derive(Parser, Debug)]
#[command(name = "inspect_remade")]
#[command(about = "Spot-check and diff documents already rebuilt by remarkup")]
struct Args {
    /// Directory holding the rebuilt *.xml files
    remade_dir: PathBuf,

    /// Directory with the rule and verb tables used for the run
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Past-tense marker the preprocessing rules insert
    #[arg(long, default_value = DEFAULT_MARKER)]
    marker: String,

    /// Word element name
    #[arg(long, default_value = "w")]
    element: String,

    /// Words checked at each end of a document
    #[arg(long, default_value_t = DEFAULT_CHECK_NUM)]
    check_num: usize,

    /// Tolerated share of potential misalignments
    #[arg(long, default_value_t = DEFAULT_ERROR_THRESHOLD)]
    threshold: f64,

    /// Print differences between two attributes, e.g. "Original,Normalized"
    #[arg(long)]
    diff: Option<String>,

    /// Most differences printed per file [default: all]
    #[arg(long)]
    max_diffs: Option<usize>,

    /// Inspect only the first N files
    #[arg(long)]
    limit: Option<usize>,

    /// Inspect only this leading share of the files (0 < ratio < 1)
    #[arg(long)]
    ratio: Option<f64>,

    /// Pick the inspected files at random
    #[arg(long)]
    shuffle: bool,

    /// Write every file's findings to this JSON file
    #[arg(long)]
    report_out: Option<PathBuf>,
}

fn diff_request(spec: &str, limit: Option<usize>) -> Result<DiffRequest> {
    let (first, second) = spec
        .split_once(',')
        .with_context(|| format!("--diff expects two comma-separated attributes, got {spec:?}"))?;
    let (first, second) = (first.trim(), second.trim());
    if first.is_empty() || second.is_empty() {
        anyhow::bail!("--diff expects two attribute names, got {spec:?}");
    }
    Ok(DiffRequest {
        first: first.to_string(),
        second: second.to_string(),
        limit,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    if !args.remade_dir.is_dir() {
        anyhow::bail!("Not a directory: {}", args.remade_dir.display());
    }

    let diff = args
        .diff
        .as_deref()
        .map(|spec| diff_request(spec, args.max_diffs))
        .transpose()?;
    let tables = Tables::load(&args.config_dir)
        .with_context(|| format!("Loading tables from {}", args.config_dir.display()))?;
    let normalizer = tables.normalizer(PastTenseMarker::new(args.marker.clone())?, VariantChoice::First)?;

    let discovery_config = DiscoveryConfig {
        shuffle: args.shuffle,
        selection: Selection::from_options(args.limit, args.ratio)?,
        ..DiscoveryConfig::default()
    };
    let files = discovery::find_corpus_files(&args.remade_dir, discovery_config).await?;
    info!("Inspecting {} rebuilt files in {}", files.len(), args.remade_dir.display());

    let mut inspections = Vec::with_capacity(files.len());
    for path in &files {
        let inspection = match inspect_file(path, &args.element, &normalizer, args.check_num, args.threshold, diff.as_ref()) {
            Ok(inspection) => inspection,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                continue;
            }
        };

        let label = path.display().to_string();
        match &inspection.spot_check {
            Some(check) => report_spot_check(&label, check),
            None => println!("{label} is not normalized; only attribute differences can be shown"),
        }

        if let Some(request) = &diff {
            println!(
                "{} differences between {} and {} in {}",
                inspection.differences.len(),
                request.first,
                request.second,
                label
            );
            println!("{:<12}{:<24}{:<24}", "Word index", request.first, request.second);
            for d in &inspection.differences {
                println!(
                    "{:<12}{:<24}{:<24}",
                    d.index,
                    d.first.as_deref().unwrap_or("-"),
                    d.second.as_deref().unwrap_or("-")
                );
            }
        }
        inspections.push(inspection);
    }

    let flagged: Vec<&PathBuf> = inspections
        .iter()
        .filter(|i| i.needs_manual_check())
        .map(|i| &i.file)
        .collect();
    println!("Inspected {} files, {} need a manual check", inspections.len(), flagged.len());
    for file in &flagged {
        println!("  {}", file.display());
    }

    if let Some(report_out) = &args.report_out {
        let json = serde_json::to_string_pretty(&inspections)?;
        std::fs::write(report_out, json).with_context(|| format!("Writing report to {}", report_out.display()))?;
        println!("Report written to {}", report_out.display());
    }

    Ok(())
}
