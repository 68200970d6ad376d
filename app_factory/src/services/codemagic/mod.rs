//! Codemagic integration: REST client, session and test double.

pub mod client;
pub mod mock;
pub mod session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::BuildArtifact;

pub use client::CodemagicClient;
pub use mock::MockCodemagic;
pub use session::CodemagicSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodemagicApp {
    pub id: String,
    pub name: String,
}

/// Build state as reported by Codemagic, before local mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBuild {
    pub id: String,
    /// Raw Codemagic status (`preparing`, `finished`, ...).
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CodemagicApi: Send + Sync {
    /// `GET /apps`
    async fn list_apps(&self) -> Result<Vec<CodemagicApp>, ApiError>;

    /// `POST /apps`
    async fn add_application(&self, repository_url: &str) -> Result<CodemagicApp, ApiError>;

    /// `POST /builds`; returns the new build id.
    async fn start_build(
        &self,
        app_id: &str,
        workflow_id: &str,
        branch: &str,
    ) -> Result<String, ApiError>;

    /// `GET /builds/{id}`
    async fn get_build(&self, build_id: &str) -> Result<RemoteBuild, ApiError>;

    /// Artefacts attached to a finished build.
    async fn get_artifacts(&self, build_id: &str) -> Result<Vec<BuildArtifact>, ApiError>;

    /// `POST /builds/{id}/cancel`
    async fn cancel_build(&self, build_id: &str) -> Result<(), ApiError>;
}
