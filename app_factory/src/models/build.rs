//! Build record: one Codemagic build tracked locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local build status. Remote vocabularies are mapped onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    #[default]
    Queued,
    Building,
    Success,
    Failed,
    Cancelled,
    Timeout,
}

impl BuildStatus {
    /// Map a Codemagic status string. Total: unknown input is `Queued`.
    pub fn from_codemagic(remote: &str) -> Self {
        match remote.trim().to_ascii_lowercase().as_str() {
            "queued" => BuildStatus::Queued,
            "preparing" | "building" | "testing" | "publishing" => BuildStatus::Building,
            "success" | "finished" => BuildStatus::Success,
            "failed" => BuildStatus::Failed,
            "cancelled" | "canceled" | "skipped" => BuildStatus::Cancelled,
            "timeout" => BuildStatus::Timeout,
            _ => BuildStatus::Queued,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::Failed | BuildStatus::Cancelled | BuildStatus::Timeout
        )
    }

    fn rank(self) -> u8 {
        match self {
            BuildStatus::Queued => 0,
            BuildStatus::Building => 1,
            _ => 2,
        }
    }

    /// Next status given a freshly observed one; never moves backwards.
    pub fn advance(self, observed: BuildStatus) -> BuildStatus {
        if self.is_terminal() || observed.rank() < self.rank() {
            self
        } else {
            observed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Building => "building",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Cancelled => "cancelled",
            BuildStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A file produced by a build (APK, log bundle, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub artifact_type: String,
    #[serde(default)]
    pub size: u64,
}

/// Persisted build history entry. Identity is `build_id`.
///
/// Optional fields are omitted when serialized so that merging a partial
/// record onto a stored one never erases known values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub id: String,
    pub build_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    pub status: BuildStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<BuildArtifact>,
    /// Wall-clock build duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl BuildRecord {
    /// A fresh `queued` record for a just-triggered build.
    pub fn new(build_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            build_id: build_id.into(),
            app_name: None,
            application_id: None,
            status: BuildStatus::Queued,
            workflow_id: None,
            branch: None,
            build_url: None,
            project_url: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            artifacts: Vec::new(),
            duration: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Link to the build page on codemagic.io.
    pub fn codemagic_url(application_id: &str, build_id: &str) -> String {
        format!("https://codemagic.io/app/{application_id}/build/{build_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_documented_codemagic_status() {
        let cases = [
            ("queued", BuildStatus::Queued),
            ("preparing", BuildStatus::Building),
            ("building", BuildStatus::Building),
            ("testing", BuildStatus::Building),
            ("publishing", BuildStatus::Building),
            ("success", BuildStatus::Success),
            ("finished", BuildStatus::Success),
            ("failed", BuildStatus::Failed),
            ("cancelled", BuildStatus::Cancelled),
            ("skipped", BuildStatus::Cancelled),
            ("timeout", BuildStatus::Timeout),
        ];
        for (remote, expected) in cases {
            assert_eq!(BuildStatus::from_codemagic(remote), expected, "{remote}");
        }
    }

    #[test]
    fn mapping_is_case_insensitive_and_total() {
        assert_eq!(BuildStatus::from_codemagic("FINISHED"), BuildStatus::Success);
        assert_eq!(BuildStatus::from_codemagic(" Building "), BuildStatus::Building);
        for junk in ["", "warming-up", "🚀", "SUCCESSFUL", "null"] {
            assert_eq!(BuildStatus::from_codemagic(junk), BuildStatus::Queued, "{junk}");
        }
    }

    #[test]
    fn advance_is_forward_only() {
        assert_eq!(BuildStatus::Building.advance(BuildStatus::Queued), BuildStatus::Building);
        assert_eq!(BuildStatus::Queued.advance(BuildStatus::Building), BuildStatus::Building);
        assert_eq!(BuildStatus::Building.advance(BuildStatus::Failed), BuildStatus::Failed);
        assert_eq!(BuildStatus::Success.advance(BuildStatus::Building), BuildStatus::Success);
        assert_eq!(BuildStatus::Failed.advance(BuildStatus::Success), BuildStatus::Failed);
    }

    #[test]
    fn partial_records_omit_unknown_fields() {
        let record = BuildRecord::new("b-1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["buildId"], "b-1");
        assert_eq!(json["status"], "queued");
        assert!(json.get("appName").is_none());
        assert!(json.get("artifacts").is_none());
    }
}
