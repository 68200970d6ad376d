//! `reqwest` implementation of [`GitHubApi`].

use async_trait::async_trait;
use reqwest::{IntoUrl, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use super::{ContentUpload, GitHubApi, GitHubUser, NewRepository, PagesSite};
use crate::error::ApiError;
use crate::models::Repository;

pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct RepoJson {
    name: String,
    full_name: String,
    html_url: String,
    clone_url: String,
}

#[derive(Deserialize)]
struct UserJson {
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct ContentJson {
    sha: String,
}

#[derive(Deserialize)]
struct PagesJson {
    html_url: Option<String>,
    status: Option<String>,
}

impl GitHubClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_url(method, format!("{}{}", self.base_url, path))
    }

    fn request_url(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// `{base}/repos/{owner}/{repo}/contents/{path}`, each path segment percent-encoded.
    fn contents_url(&self, full_name: &str, path: &str) -> Result<Url, ApiError> {
        let invalid = || ApiError::validation(format!("invalid GitHub API URL {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("repos")
            .extend(full_name.split('/'))
            .push("contents")
            .extend(path.split('/'));
        Ok(url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let resp = builder.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(error_from(resp).await)
    }
}

/// Turn a non-success response into a classified error.
async fn error_from(resp: Response) -> ApiError {
    let status = resp.status().as_u16();
    let remaining = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    let err = ApiError::from_response(status, remaining.as_deref(), &body);
    tracing::debug!(status, kind = %err.kind, "GitHub request failed: {}", err.message);
    err
}

/// Split `X-OAuth-Scopes: repo, user` into its scope names.
pub fn parse_scopes(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn to_repository(json: RepoJson, created: bool) -> Repository {
    Repository {
        name: json.name,
        full_name: json.full_name,
        html_url: json.html_url,
        clone_url: json.clone_url,
        created,
        existing: !created,
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn get_user(&self) -> Result<GitHubUser, ApiError> {
        // A malformed token never reaches the network.
        super::session::validate_token_format(&self.token)?;
        let resp = self.send(self.request(Method::GET, "/user")).await?;
        let scopes = resp
            .headers()
            .get("x-oauth-scopes")
            .and_then(|v| v.to_str().ok())
            .map(parse_scopes);
        let user: UserJson = resp.json().await?;
        Ok(GitHubUser {
            login: user.login,
            name: user.name,
            email: user.email,
            scopes,
        })
    }

    async fn create_repository(&self, repo: &NewRepository) -> Result<Repository, ApiError> {
        let resp = self
            .send(self.request(Method::POST, "/user/repos").json(repo))
            .await?;
        let json: RepoJson = resp.json().await?;
        Ok(to_repository(json, true))
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, ApiError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/repos/{owner}/{name}")))
            .await?;
        let json: RepoJson = resp.json().await?;
        Ok(to_repository(json, false))
    }

    async fn get_file_sha(&self, full_name: &str, path: &str) -> Result<Option<String>, ApiError> {
        let url = self.contents_url(full_name, path)?;
        let resp = self.request_url(Method::GET, url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let content: ContentJson = resp.json().await?;
        Ok(Some(content.sha))
    }

    async fn put_file(&self, full_name: &str, upload: &ContentUpload) -> Result<(), ApiError> {
        let mut body = serde_json::json!({
            "message": upload.message,
            "content": upload.content,
            "committer": {
                "name": upload.committer.name,
                "email": upload.committer.email,
            },
        });
        if let Some(sha) = &upload.sha {
            body["sha"] = serde_json::Value::String(sha.clone());
        }
        if let Some(branch) = &upload.branch {
            body["branch"] = serde_json::Value::String(branch.clone());
        }

        let url = self.contents_url(full_name, &upload.path)?;
        self.send(self.request_url(Method::PUT, url).json(&body)).await?;
        Ok(())
    }

    async fn enable_pages(&self, full_name: &str, branch: &str) -> Result<PagesSite, ApiError> {
        let body = serde_json::json!({ "source": { "branch": branch, "path": "/" } });
        let resp = self
            .send(
                self.request(Method::POST, &format!("/repos/{full_name}/pages"))
                    .json(&body),
            )
            .await?;
        let pages: PagesJson = resp.json().await?;
        Ok(PagesSite {
            url: pages.html_url,
            status: pages.status,
        })
    }

    async fn get_pages(&self, full_name: &str) -> Result<PagesSite, ApiError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/repos/{full_name}/pages")))
            .await?;
        let pages: PagesJson = resp.json().await?;
        Ok(PagesSite {
            url: pages.html_url,
            status: pages.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scope_header() {
        assert_eq!(parse_scopes("repo, user,  workflow"), vec!["repo", "user", "workflow"]);
        assert!(parse_scopes("").is_empty());
    }

    #[test]
    fn contents_url_encodes_each_segment() {
        let client = GitHubClient::new(reqwest::Client::new(), "https://api.github.com/", "t");
        let url = client.contents_url("octocat/demo-app", "www/css/index.css").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octocat/demo-app/contents/www/css/index.css"
        );

        let url = client.contents_url("octocat/demo-app", "res/my icon#1.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octocat/demo-app/contents/res/my%20icon%231.png"
        );
    }

    #[test]
    fn contents_url_keeps_an_enterprise_prefix() {
        let client = GitHubClient::new(reqwest::Client::new(), "https://git.example.com/api/v3", "t");
        let url = client.contents_url("team/app", "config.xml").unwrap();
        assert_eq!(
            url.as_str(),
            "https://git.example.com/api/v3/repos/team/app/contents/config.xml"
        );
    }

    #[tokio::test]
    async fn probe_rejects_malformed_tokens_offline() {
        let client = GitHubClient::new(reqwest::Client::new(), "http://127.0.0.1:9", "nope");
        let err = client.get_user().await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Authentication);
        assert_eq!(err.status, None);
    }
}
