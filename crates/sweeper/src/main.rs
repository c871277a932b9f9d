use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use storage::services::auto_miss::{self, AutoMissScheduler};
use storage::services::notify::{LogNotifier, Notifier, WebhookNotifier};
use storage::services::verification;
use storage::{Database, LifecycleSettings, OverduePolicy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lifecycle-sweep")]
#[command(about = "Auto-miss sweep and verification backlog for competition entries", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    notify_webhook_url: Option<String>,

    #[command(flatten)]
    lifecycle: LifecycleArgs,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::Args, Debug)]
struct LifecycleArgs {
    #[arg(long, env = "VERIFICATION_DEADLINE_HOURS", default_value_t = 72)]
    verification_deadline_hours: i64,

    #[arg(long, env = "SWEEP_BATCH_SIZE", default_value_t = 100)]
    batch_size: i64,

    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value_t = 900)]
    interval_seconds: u64,

    #[arg(long, env = "OVERDUE_VERIFICATION_POLICY", default_value_t = OverduePolicy::Escalate)]
    overdue_policy: OverduePolicy,
}

impl LifecycleArgs {
    fn settings(&self) -> anyhow::Result<LifecycleSettings> {
        let verification_deadline = Duration::try_hours(self.verification_deadline_hours)
            .context("Verification deadline is out of range")?;
        let settings = LifecycleSettings {
            verification_deadline,
            sweep_batch_size: self.batch_size,
            sweep_interval: std::time::Duration::from_secs(self.interval_seconds),
            overdue_policy: self.overdue_policy,
            ..Default::default()
        };
        settings
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid sweep configuration")?;
        Ok(settings)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sweep and print its summary as JSON.
    Once,
    /// Create missing verification records for win claims.
    Backlog,
    /// Sweep on an interval until Ctrl-C.
    Daemon,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("lifecycle_sweep={},storage={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = cli.lifecycle.settings()?;

    tracing::info!(
        "Connecting to database at: {}",
        cli.database_url
            .split('@')
            .next_back()
            .unwrap_or("unknown")
    );
    let db = Database::new(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = db.lifecycle_store();
    let notifier: Arc<dyn Notifier> =
        match cli.notify_webhook_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Arc::new(
                WebhookNotifier::new(url).context("Failed to build notification webhook client")?,
            ),
            None => Arc::new(LogNotifier),
        };

    match cli.command {
        Commands::Once => {
            let summary =
                auto_miss::run_sweep(store.as_ref(), notifier.as_ref(), &settings, Utc::now())
                    .await
                    .context("Sweep failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.errored > 0 {
                tracing::warn!(
                    errored = summary.errored,
                    "Some candidates failed; they will be retried on the next run"
                );
            }
        }
        Commands::Backlog => {
            let summary = verification::ensure_backlog(store.as_ref(), &settings, Utc::now())
                .await
                .context("Backlog reconciliation failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Daemon => {
            AutoMissScheduler::new(store, notifier, settings)
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                })
                .await;
        }
    }

    Ok(())
}
