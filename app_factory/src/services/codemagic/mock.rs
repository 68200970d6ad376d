use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{CodemagicApi, CodemagicApp, RemoteBuild};
use crate::error::ApiError;
use crate::models::BuildArtifact;

/// In-memory Codemagic for tests: each build replays a scripted status sequence.
#[derive(Default)]
pub struct MockCodemagic {
    /// key: build id → statuses returned by successive `get_build` calls;
    /// the last one repeats once the queue is down to it
    statuses: Mutex<HashMap<String, VecDeque<Result<String, ApiError>>>>,
    artifacts: Mutex<HashMap<String, Vec<BuildArtifact>>>,
    apps: Mutex<Vec<CodemagicApp>>,
    reject_token: Mutex<bool>,
    next_build: Mutex<u32>,
    pub get_build_calls: Mutex<Vec<String>>,
    pub artifact_calls: Mutex<Vec<String>>,
    /// (app_id, workflow_id, branch)
    pub started_builds: Mutex<Vec<(String, String, String)>>,
    pub cancelled_builds: Mutex<Vec<String>>,
}

impl MockCodemagic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the statuses a build reports, in order.
    pub fn script_statuses(&self, build_id: &str, statuses: &[&str]) {
        let queue = statuses.iter().map(|s| Ok(s.to_string())).collect();
        self.statuses
            .lock()
            .unwrap()
            .insert(build_id.to_string(), queue);
    }

    /// Append one status to a build's script.
    pub fn push_status(&self, build_id: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .entry(build_id.to_string())
            .or_default()
            .push_back(Ok(status.to_string()));
    }

    /// Append a failing poll to a build's script.
    pub fn push_error(&self, build_id: &str, error: ApiError) {
        self.statuses
            .lock()
            .unwrap()
            .entry(build_id.to_string())
            .or_default()
            .push_back(Err(error));
    }

    pub fn set_artifacts(&self, build_id: &str, artifacts: Vec<BuildArtifact>) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(build_id.to_string(), artifacts);
    }

    pub fn reject_token(&self) {
        *self.reject_token.lock().unwrap() = true;
    }

    pub fn get_build_count(&self, build_id: &str) -> usize {
        self.get_build_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == build_id)
            .count()
    }
}

#[async_trait]
impl CodemagicApi for MockCodemagic {
    async fn list_apps(&self) -> Result<Vec<CodemagicApp>, ApiError> {
        if *self.reject_token.lock().unwrap() {
            return Err(ApiError::authentication("Invalid token").with_status(401));
        }
        Ok(self.apps.lock().unwrap().clone())
    }

    async fn add_application(&self, repository_url: &str) -> Result<CodemagicApp, ApiError> {
        let mut apps = self.apps.lock().unwrap();
        let name = repository_url
            .trim_end_matches(".git")
            .rsplit('/')
            .next()
            .unwrap_or(repository_url)
            .to_string();
        let app = CodemagicApp {
            id: format!("app-{}", apps.len() + 1),
            name,
        };
        apps.push(app.clone());
        Ok(app)
    }

    async fn start_build(
        &self,
        app_id: &str,
        workflow_id: &str,
        branch: &str,
    ) -> Result<String, ApiError> {
        self.started_builds.lock().unwrap().push((
            app_id.to_string(),
            workflow_id.to_string(),
            branch.to_string(),
        ));
        let mut next = self.next_build.lock().unwrap();
        *next += 1;
        Ok(format!("build-{}", *next))
    }

    async fn get_build(&self, build_id: &str) -> Result<RemoteBuild, ApiError> {
        self.get_build_calls.lock().unwrap().push(build_id.to_string());

        let mut statuses = self.statuses.lock().unwrap();
        let queue = statuses
            .get_mut(build_id)
            .ok_or_else(|| ApiError::not_found(format!("no build {build_id}")).with_status(404))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        let status = next.unwrap_or_else(|| Ok("queued".to_string()))?;

        let now = Utc::now();
        let finished = matches!(status.as_str(), "finished" | "success" | "failed" | "canceled" | "cancelled");
        Ok(RemoteBuild {
            id: build_id.to_string(),
            status,
            started_at: Some(now),
            finished_at: finished.then_some(now),
        })
    }

    async fn get_artifacts(&self, build_id: &str) -> Result<Vec<BuildArtifact>, ApiError> {
        self.artifact_calls.lock().unwrap().push(build_id.to_string());
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .get(build_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cancel_build(&self, build_id: &str) -> Result<(), ApiError> {
        self.cancelled_builds.lock().unwrap().push(build_id.to_string());
        self.script_statuses(build_id, &["canceled"]);
        Ok(())
    }
}
