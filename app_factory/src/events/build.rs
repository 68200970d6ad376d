//! Build tracking events.

use serde::{Deserialize, Serialize};

use crate::models::{BuildRecord, BuildStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    /// A record was inserted or merged into history.
    Saved { build_id: String },
    /// A poll produced a fresh record.
    Updated { record: BuildRecord },
    /// The build reached a terminal status.
    Completed {
        build_id: String,
        status: BuildStatus,
    },
    PollingStarted { build_id: String },
    PollingStopped { build_id: String },
    /// A poll or persistence step failed; polling continues.
    Error {
        build_id: Option<String>,
        message: String,
    },
    /// Expired records were dropped at initialization.
    Expired { removed: usize },
    HistoryCleared,
}

impl BuildEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BuildEvent::Saved { .. } => "build:saved",
            BuildEvent::Updated { .. } => "build:updated",
            BuildEvent::Completed { .. } => "build:completed",
            BuildEvent::PollingStarted { .. } => "build:polling:started",
            BuildEvent::PollingStopped { .. } => "build:polling:stopped",
            BuildEvent::Error { .. } => "build:error",
            BuildEvent::Expired { .. } => "build:expired",
            BuildEvent::HistoryCleared => "build:history:cleared",
        }
    }
}
