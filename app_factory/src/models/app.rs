//! Apps to generate and the file sets rendered for them.

use serde::{Deserialize, Serialize};

/// Commit author recorded on every uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// One app requested by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    pub name: String,
    /// Reverse-domain Cordova widget id, e.g. `com.example.demo`.
    pub package_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_template")]
    pub template_id: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_template() -> String {
    crate::services::template_service::BASIC_TEMPLATE_ID.to_string()
}

/// A file to write into the app repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A rendered app ready to push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedApp {
    pub spec: AppSpec,
    pub repo_name: String,
    pub files: Vec<GeneratedFile>,
}

impl GeneratedApp {
    pub fn has_file(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }
}
