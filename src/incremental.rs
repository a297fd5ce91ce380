// Output and log path helpers for incremental runs: a document whose output already exists
// is skipped unless overwriting, and outputs only ever appear complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn base_name(source_path: &Path) -> String {
    source_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Output path for a source document.
/// Sub-directories of the corpus are flattened: only the base name is kept.
pub fn output_path(dest_dir: &Path, source_path: &Path) -> PathBuf {
    let name = base_name(source_path);
    if name.ends_with(".xml") {
        dest_dir.join(name)
    } else {
        dest_dir.join(format!("{name}.xml"))
    }
}

/// Check whether the rebuilt document for `source_path` is already in `dest_dir`
pub fn output_exists(dest_dir: &Path, source_path: &Path) -> bool {
    output_path(dest_dir, source_path).exists()
}

/// Whether a document needs processing given the overwrite setting
pub fn should_process(dest_dir: &Path, source_path: &Path, overwrite: bool) -> bool {
    overwrite || !output_exists(dest_dir, source_path)
}

/// Misalignment log location for a source document
pub fn misalignment_log_path(log_dir: &Path, source_path: &Path) -> PathBuf {
    log_dir.join(format!("{}.txt", base_name(source_path)))
}

/// Write `content` to `path` through a sibling temporary file, so a reader never sees a
/// partial document.
///
/// # Example
/// ```no_run
/// use remarkup::incremental::create_complete_output;
/// create_complete_output("remade/a.xml".as_ref(), "<TEI.2></TEI.2>").expect("Failed to write output");
/// ```
pub fn create_complete_output(path: &Path, content: &str) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = path.with_file_name(format!("{}.partial", base_name(path)));
    fs::write(&staging, content)?;
    fs::rename(&staging, path)
}
