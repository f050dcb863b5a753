//! Per-file and per-run counters

use serde::Serialize;
use std::path::PathBuf;

use crate::pipeline::LoadMode;

/// Counters for one ingested file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub category: String,
    /// Every line read, blank ones included
    pub lines_read: usize,
    pub reviews: usize,
    pub persons_created: usize,
    /// Known persons re-staged because their display name changed
    pub persons_merged: usize,
    pub products_created: usize,
    pub product_types_created: usize,
    pub rejected_lines: usize,
    /// Optional fields nulled on lines that were still loaded
    pub field_issues: usize,
    pub flushes: usize,
    pub cancelled: bool,
}

impl FileStats {
    pub fn new(path: impl Into<PathBuf>, category: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: category.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: LoadMode,
    pub files: Vec<FileStats>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(mode: LoadMode, files: Vec<FileStats>, cancelled: bool) -> Self {
        Self {
            mode,
            files,
            cancelled,
        }
    }

    pub fn total(&self, field: impl Fn(&FileStats) -> usize) -> usize {
        self.files.iter().map(field).sum()
    }

    pub fn reviews(&self) -> usize {
        self.total(|f| f.reviews)
    }

    pub fn rejected_lines(&self) -> usize {
        self.total(|f| f.rejected_lines)
    }

    pub fn field_issues(&self) -> usize {
        self.total(|f| f.field_issues)
    }

    /// One-line description for the final log entry
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} load: {} file(s), {} reviews, {} new persons ({} merged), {} new products, {} new product types, {} rejected lines, {} field issues",
            self.mode,
            self.files.len(),
            self.reviews(),
            self.total(|f| f.persons_created),
            self.total(|f| f.persons_merged),
            self.total(|f| f.products_created),
            self.total(|f| f.product_types_created),
            self.rejected_lines(),
            self.field_issues(),
        );
        if self.cancelled {
            text.push_str(" (cancelled)");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_totals() {
        let mut games = FileStats::new("data/Video_Games_5.json", "Video_Games");
        games.reviews = 10;
        games.persons_created = 4;
        games.rejected_lines = 1;
        let mut toys = FileStats::new("data/Toys_and_Games_5.json", "Toys_and_Games");
        toys.reviews = 5;
        toys.field_issues = 2;

        let summary = RunSummary::new(LoadMode::Bulk, vec![games, toys], false);
        assert_eq!(summary.reviews(), 15);
        assert_eq!(summary.rejected_lines(), 1);
        assert_eq!(summary.field_issues(), 2);
        assert!(summary.summary().starts_with("bulk load: 2 file(s), 15 reviews, 4 new persons"));
    }

    #[test]
    fn test_cancelled_summary() {
        let summary = RunSummary::new(LoadMode::Incremental, Vec::new(), true);
        assert!(summary.summary().ends_with("(cancelled)"));
        assert!(summary.summary().starts_with("incremental load"));
    }
}
