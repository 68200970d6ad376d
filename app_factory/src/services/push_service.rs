//! Repository push: uploads a generated file set through the contents API.
//!
//! One PUT per file, priority files first, bounded retries with exponential
//! backoff. Per-file failures are collected; the push only fails outright
//! when nothing was uploaded.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;

use crate::error::{ApiError, ErrorKind};
use crate::events::{EventBus, RepoEvent};
use crate::models::{Author, FailedFile, GeneratedFile, PushResult, Repository};
use crate::services::github::{ContentUpload, GitHubApi};

/// Uploaded first, in this order, so a partial push still yields a buildable project.
pub const PRIORITY_FILES: [&str; 3] = ["config.xml", "package.json", "www/index.html"];

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Attempts per file, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Successful uploads between rate-limit pauses.
    pub batch_size: usize,
    pub batch_pause: Duration,
    /// Target branch; the repository default when `None`.
    pub branch: Option<String>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            batch_size: 10,
            batch_pause: Duration::from_secs(1),
            branch: None,
        }
    }
}

impl PushOptions {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

pub struct RepoPusher {
    api: Arc<dyn GitHubApi>,
    events: EventBus,
    options: PushOptions,
}

impl RepoPusher {
    pub fn new(api: Arc<dyn GitHubApi>, events: EventBus, options: PushOptions) -> Self {
        Self {
            api,
            events,
            options,
        }
    }

    /// Upload `files` into `repo`, committing as `author`.
    pub async fn push(
        &self,
        repo: &Repository,
        files: &[GeneratedFile],
        author: &Author,
    ) -> Result<PushResult, ApiError> {
        let ordered = order_files(files);
        let total = ordered.len();
        if total == 0 {
            return Err(ApiError::validation("no files to push"));
        }

        tracing::info!(repo = %repo.full_name, files = total, existing = repo.existing, "Pushing files");
        self.events.emit(RepoEvent::PushStart {
            repository: repo.full_name.clone(),
            files: total,
        });

        let started = Instant::now();
        let mut failed = Vec::new();
        let mut uploaded = 0usize;

        for (idx, file) in ordered.iter().enumerate() {
            let outcome = self.upload_file(repo, file, author).await;
            let ok = outcome.is_ok();

            match outcome {
                Ok(()) => {
                    uploaded += 1;
                    crate::metrics::file_uploaded();
                }
                Err(e) => {
                    tracing::warn!(
                        repo = %repo.full_name,
                        path = %file.path,
                        kind = %e.kind,
                        "File upload failed: {}",
                        e.message
                    );
                    crate::metrics::upload_failed(e.kind.as_str());
                    failed.push(FailedFile {
                        file_path: file.path.clone(),
                        error: e.message,
                        kind: e.kind,
                    });
                }
            }

            self.events.emit(RepoEvent::PushProgress {
                repository: repo.full_name.clone(),
                file_path: file.path.clone(),
                completed: idx + 1,
                total,
                ok,
            });

            if ok && uploaded % self.options.batch_size.max(1) == 0 && idx + 1 < total {
                tracing::debug!(uploaded, "Pausing between upload batches");
                tokio::time::sleep(self.options.batch_pause).await;
            }
        }

        crate::metrics::push_duration(started.elapsed().as_millis() as u64);
        let result = PushResult::new(repo.full_name.clone(), total, failed);

        if result.uploaded_count == 0 {
            let first = result.failed_files.first();
            let kind = first.map(|f| f.kind).unwrap_or(ErrorKind::Api);
            let message = format!(
                "no files uploaded to {}: {}",
                repo.full_name,
                first.map(|f| f.error.as_str()).unwrap_or("unknown error")
            );
            tracing::error!(repo = %repo.full_name, "{message}");
            self.events.emit(RepoEvent::PushError {
                repository: repo.full_name.clone(),
                message: message.clone(),
            });
            return Err(ApiError::new(kind, message));
        }

        if result.has_failures {
            tracing::warn!(
                repo = %repo.full_name,
                uploaded = result.uploaded_count,
                failed = result.failed_files.len(),
                success_rate = result.success_rate,
                "Push partially succeeded"
            );
            self.events.emit(RepoEvent::PushPartial {
                result: result.clone(),
            });
        } else {
            tracing::info!(repo = %repo.full_name, uploaded = result.uploaded_count, "Push complete");
            self.events.emit(RepoEvent::PushSuccess {
                result: result.clone(),
            });
        }

        Ok(result)
    }

    /// Validate one file, then upload it with retries.
    async fn upload_file(
        &self,
        repo: &Repository,
        file: &GeneratedFile,
        author: &Author,
    ) -> Result<(), ApiError> {
        let path = sanitize_path(&file.path)?;
        validate_email(&author.email)?;
        let content = encode_content(&file.content);

        let mut lookup_sha = repo.existing;
        let mut attempt = 1;
        loop {
            match self
                .attempt_upload(repo, &path, &content, author, lookup_sha)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_retryable() || attempt >= self.options.max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    // A stale or missing SHA means the file exists; look it up next time.
                    lookup_sha |= e.kind == ErrorKind::Conflict;
                    let delay = self.options.backoff_delay(attempt);
                    tracing::debug!(
                        path = %path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        kind = %e.kind,
                        "Retrying upload"
                    );
                    crate::metrics::upload_retried();
                    self.events.emit(RepoEvent::FileRetry {
                        repository: repo.full_name.clone(),
                        file_path: path.clone(),
                        attempt,
                        kind: e.kind,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt_upload(
        &self,
        repo: &Repository,
        path: &str,
        content: &str,
        author: &Author,
        lookup_sha: bool,
    ) -> Result<(), ApiError> {
        let sha = if lookup_sha {
            self.api.get_file_sha(&repo.full_name, path).await?
        } else {
            None
        };

        let verb = if sha.is_some() { "Update" } else { "Add" };
        let upload = ContentUpload {
            path: path.to_string(),
            message: format!("{verb} {path}"),
            content: content.to_string(),
            sha,
            branch: self.options.branch.clone(),
            committer: author.clone(),
        };
        self.api.put_file(&repo.full_name, &upload).await
    }
}

/// Priority files first (in [`PRIORITY_FILES`] order), then the rest by path.
pub fn order_files(files: &[GeneratedFile]) -> Vec<GeneratedFile> {
    let priority_of = |path: &str| {
        let normalized = path.trim_start_matches('/');
        PRIORITY_FILES.iter().position(|p| *p == normalized)
    };

    let mut ordered = files.to_vec();
    ordered.sort_by(|a, b| match (priority_of(&a.path), priority_of(&b.path)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    });
    ordered
}

/// Strip leading slashes and collapse duplicate separators.
pub fn sanitize_path(path: &str) -> Result<String, ApiError> {
    let segments: Vec<&str> = path
        .trim()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(ApiError::validation(format!("invalid file path {path:?}")));
    }
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(ApiError::validation(format!(
            "file path {path:?} must not contain relative segments"
        )));
    }
    Ok(segments.join("/"))
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if EMAIL_REGEX.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ApiError::validation(format!("invalid author email {email:?}")))
    }
}

/// Base64 of the file's UTF-8 bytes, as the contents API expects.
pub fn encode_content(content: &str) -> String {
    BASE64.encode(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> GeneratedFile {
        GeneratedFile::new(path, "x")
    }

    #[test]
    fn priority_files_lead_then_lexicographic() {
        let files = vec![
            file("www/js/index.js"),
            file("www/index.html"),
            file("README.md"),
            file("package.json"),
            file(".gitignore"),
            file("config.xml"),
        ];
        let paths: Vec<_> = order_files(&files).into_iter().map(|f| f.path).collect();
        assert_eq!(
            paths,
            vec![
                "config.xml",
                "package.json",
                "www/index.html",
                ".gitignore",
                "README.md",
                "www/js/index.js",
            ]
        );
    }

    #[test]
    fn sanitizes_paths() {
        assert_eq!(sanitize_path("/www//css///index.css").unwrap(), "www/css/index.css");
        assert_eq!(sanitize_path("config.xml").unwrap(), "config.xml");
        assert!(sanitize_path("///").is_err());
        assert!(sanitize_path("www/../secret").is_err());
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("dev@example.com").is_ok());
        assert!(validate_email("dev.team+apps@sub.example.org").is_ok());
        for bad in ["", "dev", "dev@", "@example.com", "dev@example", "a b@example.com"] {
            let err = validate_email(bad).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{bad}");
        }
    }

    #[test]
    fn encodes_ascii_and_unicode() {
        assert_eq!(encode_content("hello"), "aGVsbG8=");
        // "héllo ✓" as UTF-8 bytes.
        assert_eq!(encode_content("héllo ✓"), "aMOpbGxvIOKckw==");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let options = PushOptions::default();
        assert_eq!(options.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(options.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(options.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(options.backoff_delay(4), Duration::from_secs(5));
        assert_eq!(options.backoff_delay(30), Duration::from_secs(5));
    }
}
