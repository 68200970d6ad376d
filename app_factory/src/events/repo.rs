//! Repository creation and push events.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::{PushResult, Repository};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RepoEvent {
    CreateStart { name: String },
    Created { repository: Repository },
    CreateError { name: String, message: String },
    PushStart { repository: String, files: usize },
    /// One file finished, successfully or not.
    PushProgress {
        repository: String,
        file_path: String,
        completed: usize,
        total: usize,
        ok: bool,
    },
    FileRetry {
        repository: String,
        file_path: String,
        attempt: u32,
        kind: ErrorKind,
    },
    PushSuccess { result: PushResult },
    PushPartial { result: PushResult },
    PushError { repository: String, message: String },
    PagesEnabled { repository: String, url: Option<String> },
}

impl RepoEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RepoEvent::CreateStart { .. } => "repo:create:start",
            RepoEvent::Created { .. } => "repo:create:success",
            RepoEvent::CreateError { .. } => "repo:create:error",
            RepoEvent::PushStart { .. } => "repo:push:start",
            RepoEvent::PushProgress { .. } => "repo:push:progress",
            RepoEvent::FileRetry { .. } => "repo:push:retry",
            RepoEvent::PushSuccess { .. } => "repo:push:success",
            RepoEvent::PushPartial { .. } => "repo:push:partial",
            RepoEvent::PushError { .. } => "repo:push:error",
            RepoEvent::PagesEnabled { .. } => "repo:pages:enabled",
        }
    }
}
