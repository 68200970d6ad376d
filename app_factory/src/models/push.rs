//! Outcome of pushing a generated app into a repository.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub file_path: String,
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    /// `owner/name` of the target repository.
    pub repository: String,
    pub files_count: usize,
    pub uploaded_count: usize,
    pub failed_files: Vec<FailedFile>,
    pub success: bool,
    pub has_failures: bool,
    /// Whole-number percentage of files uploaded.
    pub success_rate: u32,
}

impl PushResult {
    pub fn new(repository: impl Into<String>, files_count: usize, failed_files: Vec<FailedFile>) -> Self {
        let uploaded_count = files_count.saturating_sub(failed_files.len());
        let success_rate = if files_count == 0 {
            0
        } else {
            (uploaded_count as f64 / files_count as f64 * 100.0).round() as u32
        };
        Self {
            repository: repository.into(),
            files_count,
            uploaded_count,
            success: uploaded_count > 0,
            has_failures: !failed_files.is_empty(),
            failed_files,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failures(n: usize) -> Vec<FailedFile> {
        (0..n)
            .map(|i| FailedFile {
                file_path: format!("f{i}"),
                error: "boom".into(),
                kind: ErrorKind::Server,
            })
            .collect()
    }

    #[test]
    fn success_rate_rounds_to_nearest_percent() {
        let r = PushResult::new("o/r", 3, failures(1));
        assert_eq!(r.uploaded_count, 2);
        assert_eq!(r.success_rate, 67);
        assert!(r.success);
        assert!(r.has_failures);

        let r = PushResult::new("o/r", 8, failures(1));
        assert_eq!(r.success_rate, 88);
    }

    #[test]
    fn all_failed_is_not_success() {
        let r = PushResult::new("o/r", 2, failures(2));
        assert_eq!(r.success_rate, 0);
        assert!(!r.success);
    }

    #[test]
    fn clean_push() {
        let r = PushResult::new("o/r", 5, Vec::new());
        assert_eq!(r.success_rate, 100);
        assert!(r.success);
        assert!(!r.has_failures);
    }
}
