//! `reqwest` implementation of [`CodemagicApi`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;

use super::{CodemagicApi, CodemagicApp, RemoteBuild};
use crate::error::ApiError;
use crate::models::BuildArtifact;

pub struct CodemagicClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct AppJson {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "appName", default)]
    app_name: String,
}

#[derive(Deserialize)]
struct AppsJson {
    #[serde(default)]
    applications: Vec<AppJson>,
}

#[derive(Deserialize)]
struct StartBuildJson {
    #[serde(rename = "buildId")]
    build_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildJson {
    #[serde(rename = "_id")]
    id: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    artefacts: Vec<BuildArtifact>,
}

#[derive(Deserialize)]
struct BuildEnvelope {
    build: BuildJson,
}

impl CodemagicClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-auth-token", &self.token)
            .header("Accept", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let resp = builder.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let err = ApiError::from_response(status, None, &body);
        tracing::debug!(status, kind = %err.kind, "Codemagic request failed: {}", err.message);
        Err(err)
    }

    async fn fetch_build(&self, build_id: &str) -> Result<BuildJson, ApiError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/builds/{build_id}")))
            .await?;
        let envelope: BuildEnvelope = resp.json().await?;
        Ok(envelope.build)
    }
}

#[async_trait]
impl CodemagicApi for CodemagicClient {
    async fn list_apps(&self) -> Result<Vec<CodemagicApp>, ApiError> {
        let resp = self.send(self.request(Method::GET, "/apps")).await?;
        let apps: AppsJson = resp.json().await?;
        Ok(apps
            .applications
            .into_iter()
            .map(|a| CodemagicApp {
                id: a.id,
                name: a.app_name,
            })
            .collect())
    }

    async fn add_application(&self, repository_url: &str) -> Result<CodemagicApp, ApiError> {
        let body = serde_json::json!({ "repositoryUrl": repository_url });
        let resp = self
            .send(self.request(Method::POST, "/apps").json(&body))
            .await?;
        let app: AppJson = resp.json().await?;
        Ok(CodemagicApp {
            id: app.id,
            name: app.app_name,
        })
    }

    async fn start_build(
        &self,
        app_id: &str,
        workflow_id: &str,
        branch: &str,
    ) -> Result<String, ApiError> {
        let body = serde_json::json!({
            "appId": app_id,
            "workflowId": workflow_id,
            "branch": branch,
        });
        let resp = self
            .send(self.request(Method::POST, "/builds").json(&body))
            .await?;
        let started: StartBuildJson = resp.json().await?;
        Ok(started.build_id)
    }

    async fn get_build(&self, build_id: &str) -> Result<RemoteBuild, ApiError> {
        let build = self.fetch_build(build_id).await?;
        Ok(RemoteBuild {
            id: build.id,
            status: build.status,
            started_at: build.started_at,
            finished_at: build.finished_at,
        })
    }

    async fn get_artifacts(&self, build_id: &str) -> Result<Vec<BuildArtifact>, ApiError> {
        Ok(self.fetch_build(build_id).await?.artefacts)
    }

    async fn cancel_build(&self, build_id: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::POST, &format!("/builds/{build_id}/cancel")))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_envelope() {
        let raw = r#"{
            "application": {"_id": "app-1", "appName": "demo"},
            "build": {
                "_id": "b-1",
                "status": "finished",
                "startedAt": "2024-05-01T10:00:00Z",
                "finishedAt": "2024-05-01T10:07:30Z",
                "artefacts": [{"name": "app-debug.apk", "url": "https://cdn/app.apk", "type": "apk", "size": 1024}]
            }
        }"#;
        let envelope: BuildEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.build.status, "finished");
        assert_eq!(envelope.build.artefacts.len(), 1);
        assert_eq!(envelope.build.artefacts[0].artifact_type, "apk");
        assert!(envelope.build.finished_at.is_some());
    }
}
