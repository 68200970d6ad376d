//! Cordova App Factory CLI.
//!
//! Generates Cordova apps from templates, pushes each into its own GitHub
//! repository and optionally builds them on Codemagic.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use app_factory::config::FactoryConfig;
use app_factory::events::{BuildEvent, FactoryEvent, GenerationEvent, RepoEvent};
use app_factory::models::BuildRecord;
use app_factory::services::build_status::BuildStatusTracker;
use app_factory::{FactoryContext, GenerationRequest, Orchestrator};

#[derive(Parser)]
#[command(name = "app-factory", about = "Cordova multi-app generator", version)]
struct Cli {
    /// Directory for build history, templates and settings
    #[arg(long, env = "APP_FACTORY_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, push and optionally build every configured app
    Generate {
        /// Import this settings file before running
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Skip Codemagic even when enabled in settings
        #[arg(long)]
        no_build: bool,
        /// Wait for triggered builds to finish
        #[arg(long)]
        watch: bool,
    },
    /// Inspect and manage tracked Codemagic builds
    Builds {
        #[command(subcommand)]
        action: BuildsAction,
    },
    /// Show or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Browse app templates
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },
    /// Amazon Appstore submission
    Appstore {
        #[command(subcommand)]
        action: AppstoreAction,
    },
}

#[derive(Subcommand)]
enum BuildsAction {
    /// List tracked builds, newest first
    List,
    /// Show one build, refreshing it from Codemagic
    Status {
        build_id: String,
        /// Refresh even if the build already finished
        #[arg(long)]
        force: bool,
    },
    /// Poll builds until they finish (all unfinished builds when none given)
    Watch { build_ids: Vec<String> },
    /// Cancel a running build
    Cancel { build_id: String },
    /// Forget all tracked builds
    Clear,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Export { path: PathBuf },
    Import { path: PathBuf },
    Reset,
}

#[derive(Subcommand)]
enum TemplatesAction {
    List,
    Show { id: String },
}

#[derive(Subcommand)]
enum AppstoreAction {
    /// Register a new application listing
    CreateApp {
        #[arg(long)]
        title: String,
    },
    /// Upload an APK to a new edit and commit it for review
    Submit {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        apk: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let mut config = FactoryConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    app_factory::metrics::init_metrics(config.metrics_addr.as_deref());

    let ctx = Arc::new(FactoryContext::from_config(&config)?);

    match cli.command {
        Command::Generate {
            settings,
            no_build,
            watch,
        } => generate(ctx, settings, no_build, watch).await,
        Command::Builds { action } => builds(ctx, action).await,
        Command::Settings { action } => settings_cmd(&ctx, action),
        Command::Templates { action } => templates_cmd(&ctx, action),
        Command::Appstore { action } => appstore_cmd(&ctx, action).await,
    }
}

async fn generate(
    ctx: Arc<FactoryContext>,
    settings_path: Option<PathBuf>,
    no_build: bool,
    watch: bool,
) -> anyhow::Result<()> {
    let settings = match settings_path {
        Some(path) => ctx.settings.import(&path)?,
        None => ctx.settings.load()?,
    };
    let mut request = GenerationRequest::from(&settings);
    if no_build {
        request.codemagic.enabled = false;
    }

    let rx = ctx.events.subscribe();
    let printer = tokio::spawn(print_events(rx));
    ctx.resume_tracking();

    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&ctx)));
    let canceller = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received SIGINT, finishing the current app");
            canceller.cancel_generation();
        }
    });

    let report = orchestrator.run(&request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let build_ids: Vec<String> = report
        .apps
        .iter()
        .filter_map(|a| a.build.as_ref().map(|b| b.build_id.clone()))
        .collect();
    if watch && !build_ids.is_empty() {
        if let Some(tracker) = &ctx.tracker {
            wait_for_builds(tracker, build_ids).await;
        }
    }

    printer.abort();
    if report.failed > 0 {
        anyhow::bail!("{} of {} apps failed", report.failed, report.apps.len());
    }
    Ok(())
}

async fn builds(ctx: Arc<FactoryContext>, action: BuildsAction) -> anyhow::Result<()> {
    let tracker = ctx
        .tracker
        .as_ref()
        .context("APP_FACTORY_CODEMAGIC_TOKEN is required for build commands")?;

    match action {
        BuildsAction::List => {
            for record in tracker.list_builds() {
                print_record(&record);
            }
        }
        BuildsAction::Status { build_id, force } => {
            tracker.clean_expired_builds();
            let record = tracker.update_build_status(&build_id, force).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        BuildsAction::Watch { build_ids } => {
            let printer = tokio::spawn(print_events(ctx.events.subscribe()));
            ctx.resume_tracking();
            let ids = if build_ids.is_empty() {
                tracker
                    .active_builds()
                    .into_iter()
                    .map(|r| r.build_id)
                    .collect()
            } else {
                build_ids
            };
            if ids.is_empty() {
                printer.abort();
                println!("No unfinished builds");
                return Ok(());
            }
            wait_for_builds(tracker, ids).await;
            printer.abort();
        }
        BuildsAction::Cancel { build_id } => {
            let codemagic = ctx
                .codemagic
                .as_ref()
                .context("APP_FACTORY_CODEMAGIC_TOKEN is required")?;
            codemagic.cancel_build(&build_id).await?;
            let record = tracker.update_build_status(&build_id, true).await?;
            print_record(&record);
        }
        BuildsAction::Clear => {
            tracker.clear_history()?;
            println!("Build history cleared");
        }
    }
    Ok(())
}

/// Poll `build_ids` until each reports a terminal status or Ctrl+C.
async fn wait_for_builds(tracker: &Arc<BuildStatusTracker>, build_ids: Vec<String>) {
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received SIGINT, stopping build polling");
        }
    };
    let unfinished = tracker.watch(build_ids, shutdown).await;
    if !unfinished.is_empty() {
        tracing::info!(count = unfinished.len(), "Stopped watching unfinished builds");
    }
    tracker.stop_all_polling();

    for record in tracker.list_builds() {
        print_record(&record);
    }
}

fn settings_cmd(ctx: &FactoryContext, action: SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = ctx.settings.load()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Export { path } => {
            ctx.settings.export(&path)?;
            println!("Settings written to {}", path.display());
        }
        SettingsAction::Import { path } => {
            let settings = ctx.settings.import(&path)?;
            println!("Imported settings with {} apps", settings.apps.len());
        }
        SettingsAction::Reset => {
            ctx.settings.reset()?;
            println!("Settings reset to defaults");
        }
    }
    Ok(())
}

fn templates_cmd(ctx: &FactoryContext, action: TemplatesAction) -> anyhow::Result<()> {
    match action {
        TemplatesAction::List => {
            for template in ctx.templates.list()? {
                let origin = if template.builtin { "built-in" } else { "custom" };
                println!(
                    "{:<20} {:<9} {} ({} files)",
                    template.id,
                    origin,
                    template.name,
                    template.files.len()
                );
            }
        }
        TemplatesAction::Show { id } => {
            let template = ctx
                .templates
                .get(&id)?
                .with_context(|| format!("unknown template {id}"))?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
    }
    Ok(())
}

async fn appstore_cmd(ctx: &FactoryContext, action: AppstoreAction) -> anyhow::Result<()> {
    let appstore = ctx.appstore.as_ref().context(
        "APP_FACTORY_AMAZON_CLIENT_ID and APP_FACTORY_AMAZON_CLIENT_SECRET are required",
    )?;

    match action {
        AppstoreAction::CreateApp { title } => {
            appstore.authenticate().await?;
            let app = appstore.create_application(&title).await?;
            println!("Created application {} ({})", app.id, app.title);
        }
        AppstoreAction::Submit { app_id, apk } => {
            let bytes = tokio::fs::read(&apk)
                .await
                .with_context(|| format!("Failed to read {}", apk.display()))?;
            appstore.authenticate().await?;
            let edit = appstore.submit_for_review(&app_id, bytes).await?;
            println!(
                "Edit {} committed ({})",
                edit.id,
                edit.status.as_deref().unwrap_or("submitted")
            );
        }
    }
    Ok(())
}

fn print_record(record: &BuildRecord) {
    println!(
        "{:<28} {:<10} {:<24} {}",
        record.build_id,
        record.status,
        record.app_name.as_deref().unwrap_or("-"),
        record.build_url.as_deref().unwrap_or(""),
    );
}

/// Human-readable progress lines for the interesting events.
async fn print_events(mut rx: broadcast::Receiver<FactoryEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        };
        match event {
            FactoryEvent::Repo(RepoEvent::PushProgress {
                repository,
                file_path,
                completed,
                total,
                ok,
            }) => {
                let mark = if ok { "ok" } else { "FAILED" };
                println!("[{repository}] {completed}/{total} {file_path} {mark}");
            }
            FactoryEvent::Repo(RepoEvent::FileRetry {
                file_path, attempt, kind, ..
            }) => println!("  retrying {file_path} after attempt {attempt} ({kind})"),
            FactoryEvent::Generation(GenerationEvent::AppFailed { app_name, message }) => {
                println!("{app_name}: {message}")
            }
            FactoryEvent::Generation(GenerationEvent::BuildTriggered { app_name, build_id }) => {
                println!("{app_name}: build {build_id} started")
            }
            FactoryEvent::Build(BuildEvent::Completed { build_id, status }) => {
                println!("build {build_id} finished: {status}")
            }
            _ => {}
        }
    }
}
