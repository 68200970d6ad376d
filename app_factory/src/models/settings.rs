//! Versioned factory settings document and its forward migrations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::app::{AppSpec, Author};

pub const CURRENT_SETTINGS_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubSettings {
    /// Informational; repositories are created for the authenticated user.
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub private_repos: bool,
    #[serde(default)]
    pub enable_pages: bool,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            private_repos: true,
            enable_pages: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodemagicSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_workflow")]
    pub workflow_id: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for CodemagicSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            workflow_id: default_workflow(),
            branch: default_branch(),
        }
    }
}

fn default_workflow() -> String {
    "cordova-android".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorySettings {
    pub version: u32,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub github: GitHubSettings,
    #[serde(default)]
    pub codemagic: CodemagicSettings,
    #[serde(default = "default_true")]
    pub prepare_build: bool,
    #[serde(default)]
    pub apps: Vec<AppSpec>,
}

fn default_true() -> bool {
    true
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self {
            version: CURRENT_SETTINGS_VERSION,
            author: Author::default(),
            github: GitHubSettings::default(),
            codemagic: CodemagicSettings::default(),
            prepare_build: true,
            apps: Vec::new(),
        }
    }
}

/// Bring a raw settings document up to [`CURRENT_SETTINGS_VERSION`].
///
/// Documents without a `version` field are treated as version 1.
pub fn migrate(mut doc: Value) -> anyhow::Result<Value> {
    if !doc.is_object() {
        anyhow::bail!("settings document must be a JSON object");
    }

    let mut version = doc
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    if version > CURRENT_SETTINGS_VERSION {
        anyhow::bail!(
            "settings version {version} is newer than supported version {CURRENT_SETTINGS_VERSION}"
        );
    }

    while version < CURRENT_SETTINGS_VERSION {
        doc = match version {
            1 => migrate_v1_to_v2(&doc),
            other => anyhow::bail!("no migration registered for settings v{other}"),
        };
        version += 1;
        tracing::info!(version, "Migrated settings document");
    }

    Ok(doc)
}

/// v1 was flat; v2 groups author, GitHub and Codemagic options.
fn migrate_v1_to_v2(doc: &Value) -> Value {
    let text = |key: &str| doc.get(key).and_then(Value::as_str).unwrap_or_default();
    let flag = |key: &str, default: bool| doc.get(key).and_then(Value::as_bool).unwrap_or(default);

    let workflow = match text("workflowId") {
        "" => default_workflow(),
        w => w.to_string(),
    };
    let branch = match text("branch") {
        "" => default_branch(),
        b => b.to_string(),
    };

    json!({
        "version": 2,
        "author": {
            "name": text("authorName"),
            "email": text("authorEmail"),
        },
        "github": {
            "owner": text("githubOwner"),
            "privateRepos": flag("privateRepos", true),
            "enablePages": false,
        },
        "codemagic": {
            "enabled": flag("useCodemagic", false),
            "workflowId": workflow,
            "branch": branch,
        },
        "prepareBuild": flag("prepareBuild", true),
        "apps": doc.get("apps").cloned().unwrap_or_else(|| json!([])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn v1_document_migrates_to_current() {
        let v1 = json!({
            "authorName": "Ada",
            "authorEmail": "ada@example.com",
            "githubOwner": "ada",
            "privateRepos": false,
            "useCodemagic": true,
            "workflowId": "android-release",
            "apps": [{"name": "Demo", "packageId": "com.example.demo"}]
        });

        let migrated = migrate(v1).unwrap();
        let settings: FactorySettings = serde_json::from_value(migrated).unwrap();

        assert_eq!(settings.version, 2);
        assert_eq!(settings.author.email, "ada@example.com");
        assert_eq!(settings.github.owner, "ada");
        assert!(!settings.github.private_repos);
        assert!(settings.codemagic.enabled);
        assert_eq!(settings.codemagic.workflow_id, "android-release");
        assert_eq!(settings.codemagic.branch, "main");
        assert_eq!(settings.apps.len(), 1);
        assert_eq!(settings.apps[0].version, "1.0.0");
    }

    #[test]
    fn current_document_is_untouched() {
        let doc = serde_json::to_value(FactorySettings::default()).unwrap();
        assert_eq!(migrate(doc.clone()).unwrap(), doc);
    }

    #[test]
    fn rejects_future_versions_and_non_objects() {
        assert!(migrate(json!({"version": 99})).is_err());
        assert!(migrate(json!([1, 2])).is_err());
    }
}
