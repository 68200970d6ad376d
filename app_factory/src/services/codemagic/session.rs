//! Codemagic session: token probe, application setup, build trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{CodemagicApi, CodemagicApp};
use crate::error::ApiError;
use crate::events::{AuthEvent, EventBus, Provider};
use crate::models::{BuildRecord, Repository};

pub struct CodemagicSession {
    api: Arc<dyn CodemagicApi>,
    events: EventBus,
    authenticated: AtomicBool,
}

impl CodemagicSession {
    pub fn new(api: Arc<dyn CodemagicApi>, events: EventBus) -> Self {
        Self {
            api,
            events,
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> &Arc<dyn CodemagicApi> {
        &self.api
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Validate the token with a lightweight `GET /apps`.
    pub async fn authenticate(&self) -> Result<(), ApiError> {
        self.events.emit(AuthEvent::Start {
            provider: Provider::Codemagic,
        });

        match self.api.list_apps().await {
            Ok(apps) => {
                tracing::info!(apps = apps.len(), "Codemagic authenticated");
                self.authenticated.store(true, Ordering::SeqCst);
                self.events.emit(AuthEvent::Success {
                    provider: Provider::Codemagic,
                    account: format!("{} applications", apps.len()),
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = %e.kind, "Codemagic authentication failed: {}", e.message);
                self.authenticated.store(false, Ordering::SeqCst);
                self.events.emit(AuthEvent::Error {
                    provider: Provider::Codemagic,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Register a repository as a Codemagic application.
    pub async fn add_application(&self, repo: &Repository) -> Result<CodemagicApp, ApiError> {
        let app = self.api.add_application(&repo.clone_url).await?;
        tracing::info!(app_id = %app.id, repo = %repo.full_name, "Codemagic application created");
        Ok(app)
    }

    /// Start a build and describe it as a fresh `queued` record.
    pub async fn trigger_build(
        &self,
        app: &CodemagicApp,
        app_name: &str,
        repo: &Repository,
        workflow_id: &str,
        branch: &str,
    ) -> Result<BuildRecord, ApiError> {
        let build_id = self.api.start_build(&app.id, workflow_id, branch).await?;
        tracing::info!(build_id = %build_id, app_id = %app.id, workflow = workflow_id, "Build triggered");

        let mut record = BuildRecord::new(&build_id);
        record.app_name = Some(app_name.to_string());
        record.application_id = Some(app.id.clone());
        record.workflow_id = Some(workflow_id.to_string());
        record.branch = Some(branch.to_string());
        record.build_url = Some(BuildRecord::codemagic_url(&app.id, &build_id));
        record.project_url = Some(repo.html_url.clone());
        Ok(record)
    }

    pub async fn cancel_build(&self, build_id: &str) -> Result<(), ApiError> {
        self.api.cancel_build(build_id).await?;
        tracing::info!(build_id, "Build cancel requested");
        Ok(())
    }
}
