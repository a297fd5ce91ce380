use anyhow::Result;
use futures::stream::{Stream, StreamExt};
use glob::glob;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Which part of the sorted corpus to process
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Selection {
    #[default]
    All,
    /// The first N files
    Limit(usize),
    /// A leading share of the files, strictly between 0 and 1
    Ratio(f64),
}

impl Selection {
    /// Build from the command-line options; at most one of them may be given
    pub fn from_options(limit: Option<usize>, ratio: Option<f64>) -> Result<Self> {
        match (limit, ratio) {
            (Some(_), Some(_)) => anyhow::bail!("--limit and --ratio cannot be combined"),
            (Some(n), None) => Ok(Selection::Limit(n)),
            (None, Some(r)) if r > 0.0 && r < 1.0 => Ok(Selection::Ratio(r)),
            (None, Some(r)) => anyhow::bail!("ratio must be strictly between 0 and 1, got {r}"),
            (None, None) => Ok(Selection::All),
        }
    }

    /// Number of files kept out of `total`
    pub fn count(&self, total: usize) -> usize {
        match *self {
            Selection::All => total,
            Selection::Limit(n) => n.min(total),
            Selection::Ratio(r) => ((total as f64) * r) as usize,
        }
    }
}

/// Configuration for file discovery behavior
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Whether to fail fast on first error or continue processing
    pub fail_fast: bool,
    /// Descend into sub-directories of the corpus directory
    pub recursive: bool,
    /// Visit files in random order instead of sorted; the selection applies after shuffling
    pub shuffle: bool,
    pub selection: Selection,
}

/// Result of file discovery validation
#[derive(Debug, Clone)]
pub struct FileValidation {
    pub path: PathBuf,
    pub error: Option<String>,
}

/// Discovers all `*.xml` files under the given corpus directory, descending into
/// sub-directories only when `config.recursive` is set.
/// Returns an async stream of validated file paths in glob order.
pub fn discover_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> impl Stream<Item = Result<FileValidation>> {
    let root_path = root_dir.as_ref().to_path_buf();

    futures::stream::unfold(
        DiscoveryState::new(root_path, config),
        |mut state| async move {
            state.next_file().await.map(|result| (result, state))
        }
    )
}

/// Internal state for file discovery iteration
struct DiscoveryState {
    root_dir: PathBuf,
    config: DiscoveryConfig,
    glob_iter: Option<glob::Paths>,
}

impl DiscoveryState {
    fn new(root_dir: PathBuf, config: DiscoveryConfig) -> Self {
        Self {
            root_dir,
            config,
            glob_iter: None,
        }
    }

    fn pattern(&self) -> String {
        let root = glob::Pattern::escape(&self.root_dir.display().to_string());
        if self.config.recursive {
            format!("{root}/**/*.xml")
        } else {
            format!("{root}/*.xml")
        }
    }

    async fn next_file(&mut self) -> Option<Result<FileValidation>> {
        // Initialize glob iterator on first call
        if self.glob_iter.is_none() {
            let pattern = self.pattern();
            debug!("Starting file discovery with pattern: {}", pattern);

            match glob(&pattern) {
                Ok(paths) => {
                    self.glob_iter = Some(paths);
                    info!("File discovery initialized for corpus: {}", self.root_dir.display());
                }
                Err(e) => {
                    return Some(Err(anyhow::anyhow!("Failed to create glob pattern: {}", e)));
                }
            }
        }

        let glob_iter = self.glob_iter.as_mut()?;
        loop {
            match glob_iter.next() {
                Some(Ok(path)) => {
                    debug!("Found file: {}", path.display());
                    return Some(validate_file(path, self.config.fail_fast).await);
                }
                Some(Err(e)) => {
                    let error_msg = format!("Glob iteration error: {e}");
                    warn!("{}", error_msg);

                    if self.config.fail_fast {
                        return Some(Err(anyhow::anyhow!(error_msg)));
                    }
                    // Continue to next file on non-fatal glob errors
                }
                None => {
                    info!("File discovery completed");
                    return None;
                }
            }
        }
    }
}

async fn validate_file(path: PathBuf, fail_fast: bool) -> Result<FileValidation> {
    match fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => Ok(FileValidation { path, error: None }),
        Ok(_) => {
            let error = format!("Path is not a file: {}", path.display());
            warn!("{}", error);
            Ok(FileValidation {
                path,
                error: Some(error),
            })
        }
        Err(e) => {
            let error = format!("Cannot access file {}: {}", path.display(), e);
            warn!("{}", error);

            if fail_fast {
                Err(anyhow::anyhow!(error))
            } else {
                Ok(FileValidation {
                    path,
                    error: Some(error),
                })
            }
        }
    }
}

/// Collect all discovered files, sorted by path (or shuffled), then narrowed to the
/// configured selection
pub async fn collect_discovered_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> Result<Vec<FileValidation>> {
    let selection = config.selection;
    let shuffle = config.shuffle;
    let mut files = Vec::new();
    let mut stream = Box::pin(discover_files(root_dir, config));

    while let Some(result) = stream.next().await {
        files.push(result?);
    }

    if shuffle {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        files.shuffle(&mut rng);
        debug!("Shuffled {} discovered files", files.len());
    } else {
        files.sort_by(|a, b| a.path.cmp(&b.path));
    }
    let total = files.len();
    files.truncate(selection.count(total));

    let valid_count = files.iter().filter(|f| f.error.is_none()).count();
    let invalid_count = files.len() - valid_count;
    if invalid_count > 0 {
        warn!("Found {} files with validation issues", invalid_count);
    }
    info!(
        "File discovery summary: {} of {} files selected, {} valid, {} invalid",
        files.len(),
        total,
        valid_count,
        invalid_count
    );

    Ok(files)
}

/// Convenience function returning only the valid corpus files
pub async fn find_corpus_files<P: AsRef<Path>>(root_dir: P, config: DiscoveryConfig) -> Result<Vec<PathBuf>> {
    let validations = collect_discovered_files(root_dir, config).await?;

    Ok(validations
        .into_iter()
        .filter(|v| v.error.is_none())
        .map(|v| v.path)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_file(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
        let file_path = dir.join(name);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file_path, content).await?;
        Ok(file_path)
    }

    fn names(files: &[FileValidation]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_discover_files_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let files = collect_discovered_files(temp_dir.path(), DiscoveryConfig::default()).await.unwrap();
        assert_eq!(files.len(), 0);
    }

    #[tokio::test]
    async fn test_only_xml_files_at_top_level_by_default() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "b.xml", "<TEI.2/>").await.unwrap();
        create_test_file(temp_dir.path(), "a.xml", "<TEI.2/>").await.unwrap();
        create_test_file(temp_dir.path(), "notes.txt", "skip").await.unwrap();
        create_test_file(temp_dir.path(), "sub/c.xml", "<TEI.2/>").await.unwrap();

        let files = collect_discovered_files(temp_dir.path(), DiscoveryConfig::default()).await.unwrap();
        assert_eq!(names(&files), vec!["a.xml", "b.xml"]);
    }

    #[tokio::test]
    async fn test_recursive_discovery() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "a.xml", "<TEI.2/>").await.unwrap();
        create_test_file(temp_dir.path(), "sub/c.xml", "<TEI.2/>").await.unwrap();

        let config = DiscoveryConfig {
            recursive: true,
            ..DiscoveryConfig::default()
        };
        let files = collect_discovered_files(temp_dir.path(), config).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.error.is_none()));
    }

    #[tokio::test]
    async fn test_selection_limits_sorted_list() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["d.xml", "a.xml", "c.xml", "b.xml"] {
            create_test_file(temp_dir.path(), name, "<TEI.2/>").await.unwrap();
        }

        let limited = DiscoveryConfig {
            selection: Selection::Limit(3),
            ..DiscoveryConfig::default()
        };
        let files = collect_discovered_files(temp_dir.path(), limited).await.unwrap();
        assert_eq!(names(&files), vec!["a.xml", "b.xml", "c.xml"]);

        let half = DiscoveryConfig {
            selection: Selection::Ratio(0.5),
            ..DiscoveryConfig::default()
        };
        let paths = find_corpus_files(temp_dir.path(), half).await.unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[tokio::test]
    async fn test_shuffled_selection_draws_from_whole_corpus() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..20 {
            create_test_file(temp_dir.path(), &format!("A{i:05}.xml"), "<TEI.2/>").await.unwrap();
        }

        let config = DiscoveryConfig {
            shuffle: true,
            ..DiscoveryConfig::default()
        };
        let mut all = names(&collect_discovered_files(temp_dir.path(), config.clone()).await.unwrap());
        all.sort();
        let expected: Vec<String> = (0..20).map(|i| format!("A{i:05}.xml")).collect();
        assert_eq!(all, expected);

        let limited = DiscoveryConfig {
            selection: Selection::Limit(5),
            ..config
        };
        let picked = collect_discovered_files(temp_dir.path(), limited).await.unwrap();
        assert_eq!(picked.len(), 5);
        assert!(picked.iter().all(|f| f.error.is_none()));
    }

    #[test]
    fn test_selection_from_options() {
        assert_eq!(Selection::from_options(None, None).unwrap(), Selection::All);
        assert_eq!(Selection::from_options(Some(4), None).unwrap(), Selection::Limit(4));
        assert!(Selection::from_options(None, Some(1.5)).is_err());
        assert!(Selection::from_options(Some(1), Some(0.5)).is_err());
        assert_eq!(Selection::Limit(10).count(3), 3);
    }
}
