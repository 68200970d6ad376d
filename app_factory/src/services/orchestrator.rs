//! End-to-end generation run: validate, authenticate, generate, push, build.
//!
//! A GitHub authentication failure aborts the run. Past that point every app
//! is processed best-effort and its outcome recorded in the report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::FactoryConfig;
use crate::error::ApiError;
use crate::events::{EventBus, GenerationEvent};
use crate::models::settings::{CodemagicSettings, GitHubSettings};
use crate::models::{AppSpec, Author, BuildRecord, FactorySettings, GeneratedApp, PushResult, Repository};
use crate::services::appstore::AppstoreClient;
use crate::services::build_status::{BuildStatusTracker, PollSettings};
use crate::services::codemagic::{CodemagicApi, CodemagicClient, CodemagicSession};
use crate::services::cordova_build::prepare_build;
use crate::services::generator::AppGenerator;
use crate::services::github::{GitHubApi, GitHubClient, GitHubSession};
use crate::services::push_service::{validate_email, PushOptions, RepoPusher};
use crate::services::settings_service::SettingsManager;
use crate::services::template_service::TemplateManager;
use crate::store::{FileStore, KeyValueStore};

/// Branch served by GitHub Pages; repositories are auto-initialised on it.
pub const PAGES_BRANCH: &str = "main";

/// Shared handles for one process. Built once in `main`, or from mocks in tests.
pub struct FactoryContext {
    pub events: EventBus,
    pub store: Arc<dyn KeyValueStore>,
    pub templates: Arc<TemplateManager>,
    pub settings: Arc<SettingsManager>,
    pub github: Arc<GitHubSession>,
    /// Absent when no Codemagic token is configured.
    pub codemagic: Option<Arc<CodemagicSession>>,
    pub tracker: Option<Arc<BuildStatusTracker>>,
    /// Absent when no Amazon credentials are configured.
    pub appstore: Option<Arc<AppstoreClient>>,
    pub push_options: PushOptions,
}

impl FactoryContext {
    pub fn new(
        events: EventBus,
        store: Arc<dyn KeyValueStore>,
        github: Arc<dyn GitHubApi>,
        codemagic: Option<Arc<dyn CodemagicApi>>,
        poll: PollSettings,
    ) -> Self {
        let tracker = codemagic.as_ref().map(|api| {
            BuildStatusTracker::new(Arc::clone(&store), Arc::clone(api), events.clone(), poll)
        });
        Self {
            templates: Arc::new(TemplateManager::new(Arc::clone(&store))),
            settings: Arc::new(SettingsManager::new(Arc::clone(&store))),
            github: Arc::new(GitHubSession::new(github, events.clone())),
            codemagic: codemagic.map(|api| Arc::new(CodemagicSession::new(api, events.clone()))),
            tracker,
            appstore: None,
            push_options: PushOptions::default(),
            events,
            store,
        }
    }

    /// Wire the real HTTP clients and the file store from configuration.
    pub fn from_config(config: &FactoryConfig) -> anyhow::Result<Self> {
        let http = config.http_client()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(config.data_dir.clone())?);
        let events = EventBus::new();

        let github: Arc<dyn GitHubApi> = Arc::new(GitHubClient::new(
            http.clone(),
            &config.github_api_url,
            &config.github_token,
        ));
        let codemagic: Option<Arc<dyn CodemagicApi>> = if config.codemagic_token.is_empty() {
            None
        } else {
            Some(Arc::new(CodemagicClient::new(
                http.clone(),
                &config.codemagic_api_url,
                &config.codemagic_token,
            )))
        };
        let poll = PollSettings {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        };

        let mut ctx = Self::new(events, store, github, codemagic, poll);
        if !config.amazon_client_id.is_empty() && !config.amazon_client_secret.is_empty() {
            ctx.appstore = Some(Arc::new(AppstoreClient::new(
                http,
                &config.appstore_api_url,
                &config.amazon_token_url,
                &config.amazon_client_id,
                &config.amazon_client_secret,
                ctx.events.clone(),
            )));
        }
        Ok(ctx)
    }

    /// Start-of-process step for commands that poll builds: drop expired
    /// history and resume polling unfinished builds. Returns how many resumed.
    pub fn resume_tracking(&self) -> usize {
        match &self.tracker {
            Some(tracker) => tracker.initialize(),
            None => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub apps: Vec<AppSpec>,
    pub author: Author,
    pub github: GitHubSettings,
    pub codemagic: CodemagicSettings,
    pub prepare_build: bool,
}

impl From<&FactorySettings> for GenerationRequest {
    fn from(settings: &FactorySettings) -> Self {
        Self {
            apps: settings.apps.clone(),
            author: settings.author.clone(),
            github: settings.github.clone(),
            codemagic: settings.codemagic.clone(),
            prepare_build: settings.prepare_build,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOutcome {
    pub app_name: String,
    pub status: OutcomeStatus,
    pub repository: Option<Repository>,
    pub push: Option<PushResult>,
    pub pages_url: Option<String>,
    pub build: Option<BuildRecord>,
    /// Why the app failed.
    pub error: Option<String>,
    /// Optional steps (Pages, Codemagic) that failed without failing the app.
    pub warnings: Vec<String>,
}

impl AppOutcome {
    fn new(app_name: &str, status: OutcomeStatus) -> Self {
        Self {
            app_name: app_name.to_string(),
            status,
            repository: None,
            push: None,
            pages_url: None,
            build: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    fn failed(app_name: &str, error: &ApiError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(app_name, OutcomeStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub apps: Vec<AppOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

impl GenerationReport {
    fn from_outcomes(apps: Vec<AppOutcome>, cancelled: bool) -> Self {
        let count = |s: OutcomeStatus| apps.iter().filter(|a| a.status == s).count();
        Self {
            succeeded: count(OutcomeStatus::Succeeded),
            failed: count(OutcomeStatus::Failed),
            skipped: count(OutcomeStatus::Skipped),
            cancelled,
            apps,
        }
    }
}

pub struct Orchestrator {
    ctx: Arc<FactoryContext>,
    generator: AppGenerator,
    cancelled: AtomicBool,
}

impl Orchestrator {
    pub fn new(ctx: Arc<FactoryContext>) -> Self {
        Self {
            generator: AppGenerator::new(Arc::clone(&ctx.templates)),
            ctx,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Stop after the app currently in flight; remaining apps are reported as skipped.
    pub fn cancel_generation(&self) {
        tracing::info!("Generation cancel requested");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn run(&self, request: &GenerationRequest) -> Result<GenerationReport, ApiError> {
        self.cancelled.store(false, Ordering::SeqCst);
        self.validate(request)?;

        let events = &self.ctx.events;
        events.emit(GenerationEvent::Started {
            apps: request.apps.len(),
        });
        tracing::info!(apps = request.apps.len(), "Generation started");

        // Nothing is created remotely without a working GitHub login.
        self.ctx.github.authenticate().await?;

        let build_enabled = request.codemagic.enabled && self.authenticate_codemagic().await;

        let mut outcomes = Vec::with_capacity(request.apps.len());
        let mut cancelled = false;
        for (idx, spec) in request.apps.iter().enumerate() {
            if self.is_cancelled() {
                let skipped = request.apps.len() - idx;
                tracing::warn!(skipped, "Generation cancelled");
                events.emit(GenerationEvent::Cancelled { skipped });
                outcomes.extend(
                    request.apps[idx..]
                        .iter()
                        .map(|s| AppOutcome::new(&s.name, OutcomeStatus::Skipped)),
                );
                cancelled = true;
                break;
            }

            let outcome = self.process_app(spec, request, build_enabled).await;
            if let Some(error) = &outcome.error {
                events.emit(GenerationEvent::AppFailed {
                    app_name: spec.name.clone(),
                    message: error.clone(),
                });
            }
            outcomes.push(outcome);
        }

        let report = GenerationReport::from_outcomes(outcomes, cancelled);
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Generation finished"
        );
        events.emit(GenerationEvent::Finished {
            succeeded: report.succeeded,
            failed: report.failed,
        });
        Ok(report)
    }

    fn validate(&self, request: &GenerationRequest) -> Result<(), ApiError> {
        if request.apps.is_empty() {
            return Err(ApiError::validation("at least one app is required"));
        }
        validate_email(&request.author.email)?;
        if request.author.name.trim().is_empty() {
            return Err(ApiError::validation("author name must not be empty"));
        }
        for spec in &request.apps {
            self.generator.validate(spec)?;
        }
        if request.codemagic.enabled && request.codemagic.workflow_id.trim().is_empty() {
            return Err(ApiError::validation("a Codemagic workflow id is required"));
        }
        Ok(())
    }

    /// Codemagic problems disable builds for this run instead of aborting it.
    async fn authenticate_codemagic(&self) -> bool {
        let Some(session) = &self.ctx.codemagic else {
            tracing::warn!("Codemagic builds requested but no Codemagic token is configured");
            return false;
        };
        match session.authenticate().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = %e.kind, "Continuing without Codemagic builds");
                false
            }
        }
    }

    async fn process_app(
        &self,
        spec: &AppSpec,
        request: &GenerationRequest,
        build_enabled: bool,
    ) -> AppOutcome {
        let events = &self.ctx.events;

        let mut app = match self.generator.generate(spec, &request.author) {
            Ok(app) => app,
            Err(e) => return AppOutcome::failed(&spec.name, &e),
        };
        events.emit(GenerationEvent::AppGenerated {
            app_name: spec.name.clone(),
            files: app.files.len(),
        });

        if request.prepare_build {
            prepare_build(&mut app, &request.codemagic.workflow_id);
            events.emit(GenerationEvent::BuildPrepared {
                app_name: spec.name.clone(),
            });
        }

        let repo = match self
            .ctx
            .github
            .create_repository(&app.repo_name, &spec.description, request.github.private_repos)
            .await
        {
            Ok(repo) => repo,
            Err(e) => return AppOutcome::failed(&spec.name, &e),
        };

        let pusher = RepoPusher::new(
            Arc::clone(self.ctx.github.api()),
            events.clone(),
            self.ctx.push_options.clone(),
        );
        let push = match pusher.push(&repo, &app.files, &request.author).await {
            Ok(push) => push,
            Err(e) => {
                let mut outcome = AppOutcome::failed(&spec.name, &e);
                outcome.repository = Some(repo);
                return outcome;
            }
        };

        let mut outcome = AppOutcome::new(&spec.name, OutcomeStatus::Succeeded);

        if request.github.enable_pages {
            match self.ctx.github.enable_pages(&repo, PAGES_BRANCH).await {
                Ok(site) => outcome.pages_url = site.url,
                Err(e) => {
                    tracing::warn!(repo = %repo.full_name, kind = %e.kind, "Pages not enabled: {}", e.message);
                    outcome.warnings.push(format!("GitHub Pages: {e}"));
                }
            }
        }

        if build_enabled {
            match self.start_build(&app, &repo, &request.codemagic).await {
                Ok(build) => {
                    events.emit(GenerationEvent::BuildTriggered {
                        app_name: spec.name.clone(),
                        build_id: build.build_id.clone(),
                    });
                    outcome.build = Some(build);
                }
                Err(e) => {
                    tracing::warn!(app = %spec.name, kind = %e.kind, "Build not started: {}", e.message);
                    outcome.warnings.push(format!("Codemagic: {e}"));
                }
            }
        }

        outcome.repository = Some(repo);
        outcome.push = Some(push);
        outcome
    }

    async fn start_build(
        &self,
        app: &GeneratedApp,
        repo: &Repository,
        codemagic: &CodemagicSettings,
    ) -> Result<BuildRecord, ApiError> {
        let (Some(session), Some(tracker)) = (&self.ctx.codemagic, &self.ctx.tracker) else {
            return Err(ApiError::validation("Codemagic is not configured"));
        };

        let cm_app = session.add_application(repo).await?;
        let record = session
            .trigger_build(&cm_app, &app.spec.name, repo, &codemagic.workflow_id, &codemagic.branch)
            .await?;

        let saved = tracker.save_build(&record).unwrap_or(record);
        tracker.start_polling(&saved.build_id);
        Ok(saved)
    }
}
