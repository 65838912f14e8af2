mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataaftaler_core::{
    create_overview, handle_queue, load_config, metrics, open_queue, upload_queue,
    validate_config, Config, Notification, Notifier, ProcessorSummary, RateLimiter,
    RegistrySession, SanitizedConfig, StilRegistryClient, TracingNotifier, WorkQueue,
};

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_configuration(&cli)?;
    let notifier = TracingNotifier::new(config.notification_mail.clone());
    let stage = cli.command.stage();

    info!(stage, version = env!("CARGO_PKG_VERSION"), "Starting robot");

    let result = match cli.command {
        Command::CreateOverview { replace_existing } => {
            run_create_overview(&config, replace_existing).await
        }
        Command::UploadQueue => run_upload_queue(&config),
        Command::HandleQueue => run_handle_queue(&config, &notifier).await,
    };

    debug!(metrics = %metrics::gather_text(), "Stage metrics");

    if let Err(e) = &result {
        notify(
            &notifier,
            Notification::new(
                format!("Dataaftaler: {} failed", stage),
                format!("{:#}", e),
            ),
        )
        .await;
    }

    result
}

fn load_configuration(cli: &Cli) -> Result<Config> {
    info!("Loading configuration from {:?}", cli.config);
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    cli.apply_overrides(&mut config);
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    info!(config = %sanitized, "Configuration loaded");

    Ok(config)
}

fn registry_session(config: &Config) -> Result<Arc<dyn RegistrySession>> {
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let client = StilRegistryClient::new(&config.registry, limiter)
        .context("Failed to open registry session")?;
    Ok(Arc::new(client))
}

fn work_queue(config: &Config) -> Result<Arc<dyn WorkQueue>> {
    let queue = open_queue(config).context("Failed to open work queue")?;
    Ok(Arc::new(queue))
}

async fn run_create_overview(config: &Config, replace_existing: bool) -> Result<()> {
    let session = registry_session(config)?;
    let today = chrono::Local::now().date_naive();

    let outcome = create_overview(config, session, replace_existing, today)
        .await
        .context("Failed to create overview")?;

    info!(
        path = %outcome.artifacts.overview.display(),
        rows = outcome.artifacts.rows,
        institutions = outcome.report.institutions_visited,
        skipped = outcome.report.failures.len(),
        "Overview ready for review"
    );
    if let Some(log) = &outcome.artifacts.error_log {
        warn!(path = %log.display(), "Some institutions are missing from the overview");
    }
    Ok(())
}

fn run_upload_queue(config: &Config) -> Result<()> {
    let queue = work_queue(config)?;

    let report = upload_queue(config, queue).context("Failed to upload status changes")?;

    info!(
        source = %report.source.display(),
        rows = report.rows_read,
        queued = report.queued.len(),
        already_queued = report.already_queued.len(),
        unchanged = report.unchanged.len(),
        "Status changes uploaded"
    );
    Ok(())
}

async fn run_handle_queue(config: &Config, notifier: &TracingNotifier) -> Result<()> {
    let session = registry_session(config)?;
    let queue = work_queue(config)?;

    let summary = handle_queue(config, session, queue)
        .await
        .context("Failed to handle queue")?;

    if summary.has_failures() {
        notify(
            notifier,
            Notification::new(
                format!(
                    "Dataaftaler: {} status change(s) failed",
                    summary.failures.len()
                ),
                failure_report(&summary),
            ),
        )
        .await;
    }
    Ok(())
}

fn failure_report(summary: &ProcessorSummary) -> String {
    let mut lines = vec![format!(
        "{} succeeded, {} failed, {} awaiting retry",
        summary.succeeded,
        summary.failures.len(),
        summary.pending_retries
    )];
    for failure in &summary.failures {
        lines.push(format!(
            "{} {} ({}): {}",
            failure.target.token(),
            failure.agreement_id,
            failure.institution,
            failure.message
        ));
    }
    lines.join("\n")
}

async fn notify(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        warn!(error = %e, "Failed to send notification");
    }
}
