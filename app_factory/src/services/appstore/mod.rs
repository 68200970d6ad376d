//! Amazon Appstore submission API client.
//!
//! Every call first goes through [`AppstoreClient::ensure_token`], which
//! refreshes the OAuth token when it is missing or about to expire.

pub mod token;

use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::events::{AuthEvent, EventBus, Provider};

pub use token::AccessToken;
use token::{grant_form, TokenResponse};

const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppstoreApp {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// A staged change set to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Concurrency token from the `ETag` header; required to commit.
    #[serde(skip)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkUpload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version_code: Option<u64>,
}

#[derive(Deserialize)]
struct UploadUrlJson {
    url: String,
}

pub struct AppstoreClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
    events: EventBus,
}

impl AppstoreClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        events: EventBus,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
            events,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.needs_refresh(Utc::now()))
    }

    /// Obtain a fresh token with the client-credentials grant.
    pub async fn authenticate(&self) -> Result<(), ApiError> {
        self.events.emit(AuthEvent::Start {
            provider: Provider::Appstore,
        });

        let mut slot = self.token.lock().await;
        match self.fetch_token(None).await {
            Ok(token) => {
                *slot = Some(token);
                tracing::info!("Amazon Appstore authenticated");
                self.events.emit(AuthEvent::Success {
                    provider: Provider::Appstore,
                    account: self.client_id.clone(),
                });
                Ok(())
            }
            Err(e) => {
                *slot = None;
                tracing::warn!(kind = %e.kind, "Amazon Appstore authentication failed: {}", e.message);
                self.events.emit(AuthEvent::Error {
                    provider: Provider::Appstore,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// A usable access token, refreshed first when it is within a minute of expiry.
    pub async fn ensure_token(&self) -> Result<String, ApiError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if !token.needs_refresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let refresh = slot.as_ref().and_then(|t| t.refresh_token.clone());
        let fresh = match refresh {
            Some(refresh) => match self.fetch_token(Some(&refresh)).await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(kind = %e.kind, "Token refresh failed, requesting a new token");
                    self.fetch_token(None).await?
                }
            },
            None => self.fetch_token(None).await?,
        };
        tracing::debug!(expires_at = %fresh.expires_at, "Amazon access token refreshed");
        let access = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(access)
    }

    async fn fetch_token(&self, refresh_token: Option<&str>) -> Result<AccessToken, ApiError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(ApiError::authentication(
                "Amazon client id and secret are required",
            ));
        }
        let form = grant_form(&self.client_id, &self.client_secret, refresh_token);
        let resp = send(self.http.post(&self.token_url).form(&form)).await?;
        let body: TokenResponse = resp.json().await?;
        let mut token = AccessToken::from_response(body, Utc::now());
        // A refresh grant does not always rotate the refresh token.
        if token.refresh_token.is_none() {
            token.refresh_token = refresh_token.map(str::to_string);
        }
        Ok(token)
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.ensure_token().await?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    pub async fn create_application(&self, title: &str) -> Result<AppstoreApp, ApiError> {
        let body = serde_json::json!({ "title": title });
        let builder = self.request(Method::POST, "/v1/applications").await?;
        let app: AppstoreApp = send(builder.json(&body)).await?.json().await?;
        tracing::info!(app_id = %app.id, title, "Appstore application created");
        Ok(app)
    }

    pub async fn create_edit(&self, app_id: &str) -> Result<Edit, ApiError> {
        let builder = self
            .request(Method::POST, &format!("/v1/applications/{app_id}/edits"))
            .await?;
        let edit = read_edit(send(builder).await?).await?;
        tracing::info!(app_id, edit_id = %edit.id, "Appstore edit created");
        Ok(edit)
    }

    pub async fn get_edit(&self, app_id: &str, edit_id: &str) -> Result<Edit, ApiError> {
        let builder = self
            .request(
                Method::GET,
                &format!("/v1/applications/{app_id}/edits/{edit_id}"),
            )
            .await?;
        read_edit(send(builder).await?).await
    }

    /// Request an upload URL for the edit, then PUT the APK bytes to it.
    pub async fn upload_apk(
        &self,
        app_id: &str,
        edit_id: &str,
        apk: Vec<u8>,
    ) -> Result<ApkUpload, ApiError> {
        if apk.is_empty() {
            return Err(ApiError::validation("APK is empty"));
        }
        let size = apk.len();

        let builder = self
            .request(
                Method::POST,
                &format!("/v1/applications/{app_id}/edits/{edit_id}/apks/upload-url"),
            )
            .await?;
        let target: UploadUrlJson = send(builder).await?.json().await?;

        let token = self.ensure_token().await?;
        let resp = send(
            self.http
                .put(&target.url)
                .bearer_auth(token)
                .header("Content-Type", APK_CONTENT_TYPE)
                .body(apk),
        )
        .await?;

        let upload = resp.json::<ApkUpload>().await.unwrap_or(ApkUpload {
            id: None,
            version_code: None,
        });
        tracing::info!(app_id, edit_id, bytes = size, "APK uploaded");
        Ok(upload)
    }

    pub async fn commit_edit(&self, app_id: &str, edit: &Edit) -> Result<Edit, ApiError> {
        let mut builder = self
            .request(
                Method::POST,
                &format!("/v1/applications/{app_id}/edits/{}/commit", edit.id),
            )
            .await?;
        if let Some(etag) = &edit.etag {
            builder = builder.header("If-Match", etag);
        }
        let committed = read_edit(send(builder).await?).await?;
        tracing::info!(app_id, edit_id = %committed.id, "Appstore edit committed");
        Ok(committed)
    }

    /// Create an edit, upload the APK and commit the edit for review.
    pub async fn submit_for_review(&self, app_id: &str, apk: Vec<u8>) -> Result<Edit, ApiError> {
        let edit = self.create_edit(app_id).await?;
        self.upload_apk(app_id, &edit.id, apk).await?;
        // Uploading changes the edit's ETag.
        let current = self.get_edit(app_id, &edit.id).await?;
        self.commit_edit(app_id, &current).await
    }
}

async fn send(builder: RequestBuilder) -> Result<Response, ApiError> {
    let resp = builder.send().await?;
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let err = ApiError::from_response(status, None, &body);
    tracing::debug!(status, kind = %err.kind, "Appstore request failed: {}", err.message);
    Err(err)
}

async fn read_edit(resp: Response) -> Result<Edit, ApiError> {
    let etag = resp
        .headers()
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut edit: Edit = resp.json().await?;
    edit.etag = etag;
    Ok(edit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn client(id: &str, secret: &str) -> AppstoreClient {
        AppstoreClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/api/appstore/",
            "http://127.0.0.1:9/auth/o2/token",
            id,
            secret,
            EventBus::new(),
        )
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(client("id", "s").base_url, "http://127.0.0.1:9/api/appstore");
    }

    #[tokio::test]
    async fn missing_credentials_fail_authentication_without_network() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let appstore = AppstoreClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9/token",
            "",
            "",
            bus,
        );

        let err = appstore.authenticate().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert!(!appstore.is_authenticated().await);

        let names: Vec<_> = crate::events::drain(&mut rx)
            .iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(names, vec!["auth:start", "auth:error"]);
    }

    #[tokio::test]
    async fn remote_calls_require_credentials() {
        let appstore = client("", "");
        let err = appstore.create_application("Demo App").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn fresh_token_is_reused() {
        let appstore = client("id", "secret");
        *appstore.token.lock().await = Some(AccessToken {
            access_token: "Atza|cached".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        });
        assert_eq!(appstore.ensure_token().await.unwrap(), "Atza|cached");
        assert!(appstore.is_authenticated().await);
    }

    #[test]
    fn edit_parses_without_etag() {
        let edit: Edit = serde_json::from_str(r#"{"id":"amzn1.edit.1","status":"IN_PROGRESS"}"#).unwrap();
        assert_eq!(edit.id, "amzn1.edit.1");
        assert_eq!(edit.status.as_deref(), Some("IN_PROGRESS"));
        assert!(edit.etag.is_none());
    }
}
