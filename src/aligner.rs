// Token-stream reconciliation between a tokenized body and its normalized counterpart.
// Normalization is expected to rewrite tokens in place; any length drift is either repaired
// by a single local deletion or reported so the document can be skipped.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One row of diagnostic context around a misaligned position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentRow {
    pub index: usize,
    pub tokenized: Option<String>,
    pub normalized: Option<String>,
}

/// Outcome of reconciling two token sequences.
///
/// `total_gap` is the length difference left after repair; a non-zero gap means the
/// document must not be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub total_gap: usize,
    pub tokenized_len: usize,
    pub normalized_len: usize,
    pub misaligned_indices: Vec<usize>,
    pub context: Vec<AlignmentRow>,
}

impl AlignmentReport {
    pub fn is_aligned(&self) -> bool {
        self.total_gap == 0
    }
}

/// Token sequences after any accepted repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedPair {
    pub tokenized: Vec<String>,
    pub normalized: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Longer {
    Tokenized,
    Normalized,
}

/// Reconcile `tokenized` against `normalized`.
///
/// Positions are scanned up to the shorter length. An isolated mismatch is taken as an
/// in-place substitution. Two adjacent mismatches at `s` and `s + 1` mean a token was
/// inserted or dropped: deleting the longer sequence's element at `s`, then at `s + 1`,
/// is tried, and a candidate is accepted only if the element after it lines up with the
/// shorter sequence. Unrepairable positions are recorded; scanning ends once the gap closes.
pub fn reconcile(tokenized: &[String], normalized: &[String]) -> (RepairedPair, AlignmentReport) {
    let mut tk = tokenized.to_vec();
    let mut nm = normalized.to_vec();
    let mut gap = tk.len().abs_diff(nm.len());
    let mut misaligned: Vec<usize> = Vec::new();

    if gap > 0 {
        let longer = if nm.len() > tk.len() {
            Longer::Normalized
        } else {
            Longer::Tokenized
        };
        let mut previous_mismatch: Option<usize> = None;
        let mut i = 0;

        while gap > 0 && i < tk.len().min(nm.len()) {
            if tk[i] == nm[i] {
                i += 1;
                continue;
            }

            let adjacent = i > 0 && previous_mismatch == Some(i - 1);
            if !adjacent {
                previous_mismatch = Some(i);
                i += 1;
                continue;
            }

            let start = i - 1;
            let (long, short) = match longer {
                Longer::Normalized => (&mut nm, &tk),
                Longer::Tokenized => (&mut tk, &nm),
            };

            match repair_candidate(long, short, start) {
                Some(at) => {
                    debug!("Dropping {:?} at {} to restore alignment", long[at], at);
                    long.remove(at);
                    gap -= 1;
                    previous_mismatch = None;
                    i = start;
                }
                None => {
                    if !misaligned.contains(&start) {
                        misaligned.push(start);
                    }
                    previous_mismatch = Some(i);
                    i += 1;
                }
            }
        }

        if gap > 0 && misaligned.is_empty() {
            // drift sits past the end of the shorter sequence
            misaligned.push(tk.len().min(nm.len()));
        }
    }

    let context = if gap > 0 {
        context_rows(&tk, &nm, &misaligned)
    } else {
        Vec::new()
    };
    let report = AlignmentReport {
        total_gap: gap,
        tokenized_len: tokenized.len(),
        normalized_len: normalized.len(),
        misaligned_indices: if gap > 0 { misaligned } else { Vec::new() },
        context,
    };

    (
        RepairedPair {
            tokenized: tk,
            normalized: nm,
        },
        report,
    )
}

fn repair_candidate(long: &[String], short: &[String], start: usize) -> Option<usize> {
    [start, start + 1].into_iter().find(|&at| {
        matches!((long.get(at + 1), short.get(at)), (Some(next), Some(expected)) if next == expected)
    })
}

fn context_rows(tk: &[String], nm: &[String], indices: &[usize]) -> Vec<AlignmentRow> {
    let mut rows = Vec::new();
    for &idx in indices {
        for at in idx.saturating_sub(1)..=idx + 1 {
            if at >= tk.len().max(nm.len()) {
                continue;
            }
            rows.push(AlignmentRow {
                index: at,
                tokenized: tk.get(at).cloned(),
                normalized: nm.get(at).cloned(),
            });
        }
    }
    rows
}

/// Render a report as the fixed-width table written to the misalignment log
pub fn format_report(source: &Path, report: &AlignmentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Original filepath: {}, tokenized token numbers: {}, normalized token numbers: {}\n",
        source.display(),
        report.tokenized_len,
        report.normalized_len
    );
    let _ = writeln!(out, "{:<20}{:<20}{:<20}", "Word Index", "Preprocessed", "Normalized");

    let mut previous: Option<usize> = None;
    for row in &report.context {
        if previous.is_some_and(|p| row.index <= p) {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{:<20}{:<20}{:<20}",
            row.index,
            row.tokenized.as_deref().unwrap_or("-"),
            row.normalized.as_deref().unwrap_or("-")
        );
        previous = Some(row.index);
    }

    out
}

/// Write `report` to `<log_dir>/<file name>.txt`, leaving an existing log alone.
/// Returns the log path when a new log was written.
pub fn write_report(log_dir: &Path, source: &Path, report: &AlignmentReport) -> std::io::Result<Option<PathBuf>> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = crate::incremental::misalignment_log_path(log_dir, source);

    if log_path.exists() {
        info!("Misalignment for {} already logged in {}", source.display(), log_path.display());
        return Ok(None);
    }

    std::fs::write(&log_path, format_report(source, report))?;
    info!("Logged misalignment for {} to {}", source.display(), log_path.display());
    Ok(Some(log_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_equal_sequences_have_zero_gap() {
        let (pair, report) = reconcile(&toks(&["a", "b", "c"]), &toks(&["a", "b", "c"]));
        assert_eq!(report.total_gap, 0);
        assert!(report.misaligned_indices.is_empty());
        assert_eq!(pair.tokenized, toks(&["a", "b", "c"]));
    }

    #[test]
    fn test_equal_length_substitutions_are_not_reported() {
        let (_, report) = reconcile(&toks(&["vpon", "the", "hill"]), &toks(&["upon", "the", "hill"]));
        assert!(report.is_aligned());
    }

    #[test]
    fn test_trailing_insertion_is_reported_unrepaired() {
        let (_, report) = reconcile(
            &toks(&["the", "quik", "fox"]),
            &toks(&["the", "quick", "fox", "jumps"]),
        );
        assert_eq!(report.total_gap, 1);
        assert_eq!(report.misaligned_indices, vec![3]);
        let indices: Vec<usize> = report.context.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3]);
        assert_eq!(report.context[1].normalized.as_deref(), Some("jumps"));
        assert_eq!(report.context[1].tokenized, None);
    }

    #[test]
    fn test_single_inserted_token_is_repaired() {
        let (pair, report) = reconcile(
            &toks(&["a", "b", "c", "d"]),
            &toks(&["a", "x", "b", "c", "d"]),
        );
        assert!(report.is_aligned());
        assert_eq!(pair.normalized, toks(&["a", "b", "c", "d"]));
        assert_eq!(pair.tokenized, toks(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_insertion_after_substitution_is_repaired() {
        let (pair, report) = reconcile(
            &toks(&["he", "lov'd", "her", "well"]),
            &toks(&["he", "loved", "extra", "her", "well"]),
        );
        assert!(report.is_aligned());
        assert_eq!(pair.normalized, toks(&["he", "loved", "her", "well"]));
    }

    #[test]
    fn test_dropped_token_is_repaired_in_tokenized() {
        let (pair, report) = reconcile(
            &toks(&["a", "b", "c", "d", "e"]),
            &toks(&["a", "c", "d", "e"]),
        );
        assert!(report.is_aligned());
        assert_eq!(pair.tokenized, toks(&["a", "c", "d", "e"]));
    }

    #[test]
    fn test_multi_token_drift_is_reported() {
        let (_, report) = reconcile(
            &toks(&["a", "b", "c", "d"]),
            &toks(&["a", "x", "y", "z", "w", "v"]),
        );
        assert_eq!(report.total_gap, 2);
        assert!(!report.misaligned_indices.is_empty());
        assert!(report.misaligned_indices.iter().all(|&i| i >= 1));
    }

    #[test]
    fn test_format_report_lists_context() {
        let (_, report) = reconcile(&toks(&["the", "fox"]), &toks(&["the", "fox", "ran"]));
        let text = format_report(Path::new("corpus/a.xml"), &report);
        assert!(text.starts_with("Original filepath: corpus/a.xml, tokenized token numbers: 2, normalized token numbers: 3"));
        assert!(text.contains("ran"));
    }

    #[test]
    fn test_write_report_does_not_overwrite() {
        let dir = tempfile::TempDir::new().unwrap();
        let (_, report) = reconcile(&toks(&["a"]), &toks(&["a", "b"]));
        let first = write_report(dir.path(), Path::new("x/doc.xml"), &report).unwrap();
        assert_eq!(first, Some(dir.path().join("doc.xml.txt")));
        let second = write_report(dir.path(), Path::new("x/doc.xml"), &report).unwrap();
        assert_eq!(second, None);
    }
}
