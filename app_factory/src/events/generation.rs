//! Orchestrator progress events.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GenerationEvent {
    Started { apps: usize },
    AppGenerated { app_name: String, files: usize },
    BuildPrepared { app_name: String },
    AppFailed { app_name: String, message: String },
    BuildTriggered { app_name: String, build_id: String },
    Cancelled { skipped: usize },
    Finished { succeeded: usize, failed: usize },
}

impl GenerationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GenerationEvent::Started { .. } => "generation:start",
            GenerationEvent::AppGenerated { .. } => "generation:app",
            GenerationEvent::BuildPrepared { .. } => "generation:build-prep",
            GenerationEvent::AppFailed { .. } => "generation:app:error",
            GenerationEvent::BuildTriggered { .. } => "generation:build:triggered",
            GenerationEvent::Cancelled { .. } => "generation:cancelled",
            GenerationEvent::Finished { .. } => "generation:complete",
        }
    }
}
