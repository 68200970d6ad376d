//! GitHub integration: REST client, session and test double.

pub mod client;
pub mod mock;
pub mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Author, Repository};

pub use client::GitHubClient;
pub use mock::MockGitHub;
pub use session::GitHubSession;

/// Authenticated user as reported by `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Parsed `X-OAuth-Scopes`; `None` when the header was absent (fine-grained tokens).
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
}

/// One contents-API write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpload {
    pub path: String,
    pub message: String,
    /// Base64-encoded file body.
    pub content: String,
    /// Blob SHA of the file being replaced; `None` creates the file.
    pub sha: Option<String>,
    pub branch: Option<String>,
    pub committer: Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagesSite {
    pub url: Option<String>,
    pub status: Option<String>,
}

/// The slice of the GitHub REST v3 API the factory uses.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /user`
    async fn get_user(&self) -> Result<GitHubUser, ApiError>;

    /// `POST /user/repos`
    async fn create_repository(&self, repo: &NewRepository) -> Result<Repository, ApiError>;

    /// `GET /repos/{owner}/{repo}`
    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, ApiError>;

    /// `GET /repos/{full_name}/contents/{path}`; `Ok(None)` when the file does not exist.
    async fn get_file_sha(&self, full_name: &str, path: &str) -> Result<Option<String>, ApiError>;

    /// `PUT /repos/{full_name}/contents/{path}`
    async fn put_file(&self, full_name: &str, upload: &ContentUpload) -> Result<(), ApiError>;

    /// `POST /repos/{full_name}/pages`
    async fn enable_pages(&self, full_name: &str, branch: &str) -> Result<PagesSite, ApiError>;

    /// `GET /repos/{full_name}/pages`
    async fn get_pages(&self, full_name: &str) -> Result<PagesSite, ApiError>;
}
