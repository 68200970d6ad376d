use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use app_factory::error::{ApiError, ErrorKind};
use app_factory::events::{drain, BuildEvent, EventBus, FactoryEvent, RepoEvent};
use app_factory::models::settings::{CodemagicSettings, GitHubSettings};
use app_factory::models::{AppSpec, Author, BuildRecord, BuildStatus, Template, TemplateFile};
use app_factory::services::build_status::PollSettings;
use app_factory::services::codemagic::{CodemagicApi, MockCodemagic};
use app_factory::services::github::MockGitHub;
use app_factory::services::orchestrator::OutcomeStatus;
use app_factory::store::MemoryStore;
use app_factory::{FactoryContext, GenerationRequest, Orchestrator};

struct Harness {
    ctx: Arc<FactoryContext>,
    github: Arc<MockGitHub>,
    codemagic: Arc<MockCodemagic>,
    events: broadcast::Receiver<FactoryEvent>,
}

fn harness() -> Harness {
    let bus = EventBus::new();
    let events = bus.subscribe();
    let github = Arc::new(MockGitHub::new());
    let codemagic = Arc::new(MockCodemagic::new());
    let cm: Arc<dyn CodemagicApi> = codemagic.clone();
    let ctx = FactoryContext::new(
        bus,
        Arc::new(MemoryStore::new()),
        github.clone(),
        Some(cm),
        PollSettings {
            interval: Duration::from_secs(30),
            max_attempts: 100,
        },
    );
    Harness {
        ctx: Arc::new(ctx),
        github,
        codemagic,
        events,
    }
}

fn app(name: &str, package_id: &str) -> AppSpec {
    AppSpec {
        name: name.to_string(),
        package_id: package_id.to_string(),
        version: "1.0.0".to_string(),
        description: format!("{name} generated in tests"),
        template_id: "cordova-basic".to_string(),
    }
}

fn request(apps: Vec<AppSpec>) -> GenerationRequest {
    GenerationRequest {
        apps,
        author: Author {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        },
        github: GitHubSettings::default(),
        codemagic: CodemagicSettings::default(),
        prepare_build: false,
    }
}

fn names(events: &[FactoryEvent]) -> Vec<&'static str> {
    events.iter().map(FactoryEvent::name).collect()
}

#[tokio::test(start_paused = true)]
async fn demo_app_is_created_and_pushed_despite_transient_failures() {
    let mut h = harness();
    // Third file in upload order fails twice, then succeeds.
    h.github.fail_file(
        "www/index.html",
        2,
        ApiError::new(ErrorKind::Server, "Server Error").with_status(502),
    );

    let orchestrator = Orchestrator::new(h.ctx.clone());
    let report = orchestrator
        .run(&request(vec![app("Demo App", "com.example.demo")]))
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert!(!report.cancelled);

    let outcome = &report.apps[0];
    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    let repo = outcome.repository.as_ref().unwrap();
    assert_eq!(repo.full_name, "octocat/demo-app");
    assert!(repo.created);
    assert!(!repo.existing);

    let push = outcome.push.as_ref().unwrap();
    assert_eq!(push.files_count, 5);
    assert!(push.failed_files.is_empty());
    assert!(push.success);
    assert_eq!(h.github.put_attempts("www/index.html"), 3);

    let created = h.github.created_repos.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert!(created[0].private);

    let events = drain(&mut h.events);
    let seen = names(&events);
    assert_eq!(seen.first(), Some(&"generation:start"));
    assert!(seen.contains(&"auth:success"));
    assert!(seen.contains(&"repo:create:success"));
    assert!(seen.contains(&"repo:push:success"));
    assert_eq!(seen.last(), Some(&"generation:complete"));
}

#[tokio::test]
async fn github_authentication_failure_aborts_the_run() {
    let mut h = harness();
    h.github.reject_token();

    let err = Orchestrator::new(h.ctx.clone())
        .run(&request(vec![app("Demo App", "com.example.demo")]))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Authentication);
    assert!(h.github.created_repos.lock().unwrap().is_empty());
    assert!(h.github.put_calls.lock().unwrap().is_empty());

    let seen = names(&drain(&mut h.events));
    assert!(seen.contains(&"auth:error"));
    assert!(!seen.contains(&"generation:complete"));
}

#[tokio::test]
async fn invalid_request_is_rejected_before_authenticating() {
    let mut h = harness();

    let err = Orchestrator::new(h.ctx.clone())
        .run(&request(vec![app("Demo App", "demo")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let empty = Orchestrator::new(h.ctx.clone())
        .run(&request(vec![]))
        .await
        .unwrap_err();
    assert_eq!(empty.kind, ErrorKind::Validation);

    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn existing_repository_is_reused() {
    let h = harness();
    h.github.add_existing_repo("demo-app");
    h.github.set_file_sha("octocat/demo-app", "config.xml", "old-config");

    let report = Orchestrator::new(h.ctx.clone())
        .run(&request(vec![app("Demo App", "com.example.demo")]))
        .await
        .unwrap();

    let outcome = &report.apps[0];
    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    let repo = outcome.repository.as_ref().unwrap();
    assert!(repo.existing);
    assert!(!repo.created);

    let calls = h.github.put_calls.lock().unwrap();
    let config = &calls.iter().find(|(_, u)| u.path == "config.xml").unwrap().1;
    assert_eq!(config.sha.as_deref(), Some("old-config"));
}

#[tokio::test]
async fn one_failing_app_does_not_stop_the_others() {
    let h = harness();
    h.ctx
        .templates
        .save(Template {
            id: "landing".to_string(),
            name: "Landing page".to_string(),
            description: String::new(),
            files: vec![TemplateFile {
                path: "www/landing.html".to_string(),
                content: "<h1>{{appName}}</h1>".to_string(),
            }],
            builtin: false,
        })
        .unwrap();
    // Every file of the basic template is rejected.
    for path in [
        "config.xml",
        "package.json",
        "www/index.html",
        "www/css/index.css",
        "www/js/index.js",
    ] {
        h.github
            .fail_file_always(path, ApiError::permission("Resource not accessible").with_status(403));
    }

    let mut landing = app("Landing App", "com.example.landing");
    landing.template_id = "landing".to_string();
    let report = Orchestrator::new(h.ctx.clone())
        .run(&request(vec![app("Broken App", "com.example.broken"), landing]))
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.apps[0].status, OutcomeStatus::Failed);
    assert!(report.apps[0].error.as_deref().unwrap().contains("no files uploaded"));
    assert_eq!(report.apps[1].status, OutcomeStatus::Succeeded);
    assert_eq!(h.github.put_attempts("www/landing.html"), 1);
}

#[tokio::test(start_paused = true)]
async fn codemagic_build_is_triggered_and_tracked_to_completion() {
    let mut h = harness();
    h.codemagic
        .script_statuses("build-1", &["building", "building", "building", "success"]);

    let mut req = request(vec![app("Demo App", "com.example.demo")]);
    req.codemagic.enabled = true;
    req.prepare_build = true;

    let report = Orchestrator::new(h.ctx.clone()).run(&req).await.unwrap();
    let outcome = &report.apps[0];
    let build = outcome.build.as_ref().unwrap();
    assert_eq!(build.build_id, "build-1");
    assert_eq!(build.app_name.as_deref(), Some("Demo App"));
    assert_eq!(
        build.build_url.as_deref(),
        Some("https://codemagic.io/app/app-1/build/build-1")
    );
    assert!(outcome.warnings.is_empty());

    // Scaffolding was pushed alongside the template files.
    let push = outcome.push.as_ref().unwrap();
    assert_eq!(push.files_count, 8);
    assert_eq!(h.github.put_attempts("codemagic.yaml"), 1);

    let tracker = h.ctx.tracker.as_ref().unwrap();
    assert!(tracker.is_polling("build-1"));

    let mut completed = Vec::new();
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            if let FactoryEvent::Build(BuildEvent::Completed { build_id, status }) =
                h.events.recv().await.unwrap()
            {
                completed.push((build_id, status));
                break;
            }
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_secs(300)).await;
    for event in drain(&mut h.events) {
        if let FactoryEvent::Build(BuildEvent::Completed { build_id, status }) = event {
            completed.push((build_id, status));
        }
    }

    assert_eq!(completed, vec![("build-1".to_string(), BuildStatus::Success)]);
    assert_eq!(h.codemagic.get_build_count("build-1"), 4);
    assert!(!tracker.is_polling("build-1"));
    assert_eq!(
        tracker.get_build("build-1").unwrap().status,
        BuildStatus::Success
    );
}

#[tokio::test]
async fn codemagic_authentication_failure_only_skips_builds() {
    let h = harness();
    h.codemagic.reject_token();

    let mut req = request(vec![app("Demo App", "com.example.demo")]);
    req.codemagic.enabled = true;

    let report = Orchestrator::new(h.ctx.clone()).run(&req).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(report.apps[0].build.is_none());
    assert!(h.codemagic.started_builds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn pages_are_enabled_when_requested() {
    let h = harness();
    let mut req = request(vec![app("Demo App", "com.example.demo")]);
    req.github.enable_pages = true;

    let report = Orchestrator::new(h.ctx.clone()).run(&req).await.unwrap();
    assert_eq!(
        report.apps[0].pages_url.as_deref(),
        Some("https://octocat.github.io/demo-app/")
    );
    assert_eq!(
        *h.github.pages_enabled.lock().unwrap(),
        vec!["octocat/demo-app".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_skips_the_remaining_apps() {
    let mut h = harness();
    // Force a backoff sleep during the first app so the run yields mid-flight.
    h.github.fail_file(
        "config.xml",
        1,
        ApiError::new(ErrorKind::Server, "Server Error").with_status(500),
    );

    let orchestrator = Arc::new(Orchestrator::new(h.ctx.clone()));
    let runner = Arc::clone(&orchestrator);
    let run = tokio::spawn(async move {
        runner
            .run(&request(vec![
                app("First App", "com.example.first"),
                app("Second App", "com.example.second"),
                app("Third App", "com.example.third"),
            ]))
            .await
    });

    loop {
        if let FactoryEvent::Repo(RepoEvent::FileRetry { .. }) = h.events.recv().await.unwrap() {
            orchestrator.cancel_generation();
            break;
        }
    }

    let report = run.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.apps[0].status, OutcomeStatus::Succeeded);
    assert_eq!(report.apps[1].status, OutcomeStatus::Skipped);
    assert_eq!(report.apps[2].status, OutcomeStatus::Skipped);
    assert_eq!(h.github.created_repos.lock().unwrap().len(), 1);

    let seen = names(&drain(&mut h.events));
    assert!(seen.contains(&"generation:cancelled"));
}

#[tokio::test(start_paused = true)]
async fn resume_tracking_drops_expired_builds_and_polls_unfinished_ones() {
    let h = harness();
    let tracker = h.ctx.tracker.as_ref().unwrap();

    let mut expired = BuildRecord::new("expired");
    expired.status = BuildStatus::Building;
    expired.created_at = chrono::Utc::now() - chrono::Duration::days(45);
    tracker.save_build(&expired);
    let mut running = BuildRecord::new("running");
    running.status = BuildStatus::Building;
    tracker.save_build(&running);
    let mut done = BuildRecord::new("done");
    done.status = BuildStatus::Success;
    tracker.save_build(&done);
    h.codemagic.script_statuses("running", &["building"]);

    assert_eq!(h.ctx.resume_tracking(), 1);
    assert!(tracker.get_build("expired").is_none());
    assert!(tracker.is_polling("running"));
    assert!(!tracker.is_polling("done"));
    tracker.stop_all_polling();
}
