//! App templates: file sets with `{{placeholder}}` tokens.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub files: Vec<TemplateFile>,
    /// Shipped with the binary; never persisted.
    #[serde(skip)]
    pub builtin: bool,
}
