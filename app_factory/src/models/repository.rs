//! Remote GitHub repository handle, held for one generation run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    pub html_url: String,
    pub clone_url: String,
    /// Set when this run created the repository.
    pub created: bool,
    /// Set when the repository already existed before this run.
    pub existing: bool,
}

impl Repository {
    pub fn owner(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or(&self.full_name)
    }
}
