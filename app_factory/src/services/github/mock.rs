use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ContentUpload, GitHubApi, GitHubUser, NewRepository, PagesSite};
use crate::error::{ApiError, ErrorKind};
use crate::models::Repository;

/// In-memory GitHub for tests: scripted failures, recorded calls.
pub struct MockGitHub {
    user: Mutex<Result<GitHubUser, ApiError>>,
    repos: Mutex<HashMap<String, Repository>>,
    /// key: file path → errors returned by the next PUT attempts, in order
    scripted_failures: Mutex<HashMap<String, VecDeque<ApiError>>>,
    /// key: file path → error returned by every PUT attempt
    permanent_failures: Mutex<HashMap<String, ApiError>>,
    /// key: "{full_name}/{path}" → blob sha
    files: Mutex<HashMap<String, String>>,
    /// every PUT attempt: (full_name, upload)
    pub put_calls: Mutex<Vec<(String, ContentUpload)>>,
    /// every SHA lookup: "{full_name}/{path}"
    pub sha_lookups: Mutex<Vec<String>>,
    pub created_repos: Mutex<Vec<NewRepository>>,
    /// error returned by the next repository creation
    create_failure: Mutex<Option<ApiError>>,
    pub pages_enabled: Mutex<Vec<String>>,
}

impl Default for MockGitHub {
    fn default() -> Self {
        Self {
            user: Mutex::new(Ok(GitHubUser {
                login: "octocat".to_string(),
                name: Some("The Octocat".to_string()),
                email: Some("octocat@example.com".to_string()),
                scopes: Some(vec!["repo".to_string(), "user".to_string()]),
            })),
            repos: Mutex::new(HashMap::new()),
            scripted_failures: Mutex::new(HashMap::new()),
            permanent_failures: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            put_calls: Mutex::new(Vec::new()),
            sha_lookups: Mutex::new(Vec::new()),
            created_repos: Mutex::new(Vec::new()),
            create_failure: Mutex::new(None),
            pages_enabled: Mutex::new(Vec::new()),
        }
    }
}

impl MockGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// `GET /user` answers with this user.
    pub fn set_user(&self, user: GitHubUser) {
        *self.user.lock().unwrap() = Ok(user);
    }

    /// `GET /user` answers 401.
    pub fn reject_token(&self) {
        *self.user.lock().unwrap() =
            Err(ApiError::authentication("Bad credentials").with_status(401));
    }

    /// Register a repository that exists before the run.
    pub fn add_existing_repo(&self, name: &str) {
        let login = self.login();
        self.repos
            .lock()
            .unwrap()
            .insert(name.to_string(), repository(&login, name, false));
    }

    /// The next repository creation fails with `error`.
    pub fn fail_create_repository(&self, error: ApiError) {
        *self.create_failure.lock().unwrap() = Some(error);
    }

    /// The next `times` PUTs of `path` fail with `error`, then succeed.
    pub fn fail_file(&self, path: &str, times: usize, error: ApiError) {
        let queue = std::iter::repeat(error).take(times).collect();
        self.scripted_failures
            .lock()
            .unwrap()
            .insert(path.to_string(), queue);
    }

    /// Every PUT of `path` fails with `error`.
    pub fn fail_file_always(&self, path: &str, error: ApiError) {
        self.permanent_failures
            .lock()
            .unwrap()
            .insert(path.to_string(), error);
    }

    /// Seed a file that already exists in a repository.
    pub fn set_file_sha(&self, full_name: &str, path: &str, sha: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(format!("{full_name}/{path}"), sha.to_string());
    }

    /// Number of PUT attempts made for `path`.
    pub fn put_attempts(&self, path: &str) -> usize {
        self.put_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| u.path == path)
            .count()
    }

    /// Paths in the order of their first PUT attempt.
    pub fn attempted_paths(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (_, upload) in self.put_calls.lock().unwrap().iter() {
            if !seen.contains(&upload.path) {
                seen.push(upload.path.clone());
            }
        }
        seen
    }

    fn login(&self) -> String {
        match &*self.user.lock().unwrap() {
            Ok(u) => u.login.clone(),
            Err(_) => "octocat".to_string(),
        }
    }
}

fn repository(owner: &str, name: &str, created: bool) -> Repository {
    Repository {
        name: name.to_string(),
        full_name: format!("{owner}/{name}"),
        html_url: format!("https://github.com/{owner}/{name}"),
        clone_url: format!("https://github.com/{owner}/{name}.git"),
        created,
        existing: !created,
    }
}

#[async_trait]
impl GitHubApi for MockGitHub {
    async fn get_user(&self) -> Result<GitHubUser, ApiError> {
        self.user.lock().unwrap().clone()
    }

    async fn create_repository(&self, repo: &NewRepository) -> Result<Repository, ApiError> {
        self.created_repos.lock().unwrap().push(repo.clone());
        if let Some(error) = self.create_failure.lock().unwrap().take() {
            return Err(error);
        }
        let login = self.login();
        let mut repos = self.repos.lock().unwrap();
        if repos.contains_key(&repo.name) {
            return Err(ApiError::new(
                ErrorKind::Conflict,
                "Repository creation failed: name already exists on this account",
            )
            .with_status(422));
        }
        let created = repository(&login, &repo.name, true);
        repos.insert(repo.name.clone(), created.clone());
        Ok(created)
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, ApiError> {
        self.repos
            .lock()
            .unwrap()
            .get(name)
            .filter(|r| r.owner() == owner)
            .map(|r| repository(owner, &r.name, false))
            .ok_or_else(|| ApiError::not_found("Not Found").with_status(404))
    }

    async fn get_file_sha(&self, full_name: &str, path: &str) -> Result<Option<String>, ApiError> {
        let key = format!("{full_name}/{path}");
        self.sha_lookups.lock().unwrap().push(key.clone());
        Ok(self.files.lock().unwrap().get(&key).cloned())
    }

    async fn put_file(&self, full_name: &str, upload: &ContentUpload) -> Result<(), ApiError> {
        self.put_calls
            .lock()
            .unwrap()
            .push((full_name.to_string(), upload.clone()));

        if let Some(err) = self.permanent_failures.lock().unwrap().get(&upload.path) {
            return Err(err.clone());
        }
        if let Some(queue) = self.scripted_failures.lock().unwrap().get_mut(&upload.path) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }

        let key = format!("{full_name}/{}", upload.path);
        let mut files = self.files.lock().unwrap();
        if files.contains_key(&key) && upload.sha.as_deref() != files.get(&key).map(String::as_str) {
            return Err(ApiError::new(ErrorKind::Conflict, "sha does not match").with_status(409));
        }
        let next_sha = format!("sha-{}", files.len() + 1);
        files.insert(key, next_sha);
        Ok(())
    }

    async fn enable_pages(&self, full_name: &str, _branch: &str) -> Result<PagesSite, ApiError> {
        self.pages_enabled.lock().unwrap().push(full_name.to_string());
        let (owner, name) = full_name.split_once('/').unwrap_or((full_name, ""));
        Ok(PagesSite {
            url: Some(format!("https://{owner}.github.io/{name}/")),
            status: Some("building".to_string()),
        })
    }

    async fn get_pages(&self, full_name: &str) -> Result<PagesSite, ApiError> {
        let (owner, name) = full_name.split_once('/').unwrap_or((full_name, ""));
        Ok(PagesSite {
            url: Some(format!("https://{owner}.github.io/{name}/")),
            status: Some("built".to_string()),
        })
    }
}
