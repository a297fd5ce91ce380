// Checks the table formats in a config directory and runs the rule test sample through
// preprocessing and normalization, reporting every divergence.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use remarkup::config::{check_table_formats, load_test_sample, Tables, TEST_SAMPLE_FILE};
use remarkup::normalizer::DEFAULT_MARKER;
use remarkup::preprocess::preprocess;
use remarkup::service::WhitespaceTokenizer;
use remarkup::{PastTenseMarker, VariantChoice};

#[derive(Parser, Debug)]
#[command(name = "verify_rules")]
#[command(about = "Verify rule tables against the test sample")]
struct Args {
    /// Directory with the rule and verb tables
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Past-tense marker the preprocessing rules insert
    #[arg(long, default_value = DEFAULT_MARKER)]
    marker: String,

    /// Print the sample rows before checking them
    #[arg(long)]
    show_sample: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let problems = check_table_formats(&args.config_dir);
    for problem in &problems {
        println!("Format error: {problem}");
    }
    if !problems.is_empty() {
        anyhow::bail!("{} table format problems in {}", problems.len(), args.config_dir.display());
    }
    println!("All tables in {} pass the format check", args.config_dir.display());

    let sample_path = args.config_dir.join(TEST_SAMPLE_FILE);
    if !sample_path.exists() {
        println!("No {} found; nothing more to verify", TEST_SAMPLE_FILE);
        return Ok(());
    }

    let tables = Tables::load(&args.config_dir)?;
    let normalizer = tables.normalizer(PastTenseMarker::new(args.marker)?, VariantChoice::First)?;
    let sample = load_test_sample(&sample_path)?;
    info!("Checking {} sample rows", sample.len());

    if args.show_sample {
        println!("{:<20}{:<28}{:<20}", "Raw Text", "Expected Preprocessed Text", "Expected Normalized Text");
        for row in &sample {
            println!("{:<20}{:<28}{:<20}", row.raw, row.preprocessed, row.normalized);
        }
        println!();
    }

    let mut divergences = 0;
    for row in &sample {
        let prepared = preprocess(&row.raw, &WhitespaceTokenizer, Some(&tables.preprocessing_rules), true)
            .with_context(|| format!("Preprocessing sample line {}", row.line))?;
        if prepared != row.preprocessed {
            divergences += 1;
            println!(
                "- Preprocessing error (line {}). Expected: [{}], but [{}] was given for [{}].",
                row.line, row.preprocessed, prepared, row.raw
            );
        }

        let normalized = normalizer.normalize(&prepared);
        if normalized != row.normalized {
            divergences += 1;
            println!(
                "- Normalizing error (line {}). Expected: [{}], but [{}] was given for [{}].",
                row.line, row.normalized, normalized, row.raw
            );
        }
    }

    if divergences > 0 {
        anyhow::bail!("{divergences} divergences found in the transformation rules");
    }
    println!("The transformation rules pass all {} sample rows", sample.len());
    Ok(())
}
