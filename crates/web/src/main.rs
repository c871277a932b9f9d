use std::sync::Arc;

use anyhow::Context;
use storage::Database;
use storage::services::auto_miss::AutoMissScheduler;
use storage::services::notify::{LogNotifier, Notifier, WebhookNotifier};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod app;
mod config;
mod error;
mod features;
mod middleware;
mod state;

use config::Config;
use middleware::auth::ApiKeys;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        features::entries::handlers::create_entry,
        features::entries::handlers::get_entry,
        features::entries::handlers::report_outcome,
        features::verification::handlers::get_verification,
        features::verification::handlers::attach_evidence,
        features::verification::handlers::move_to_under_review,
        features::verification::handlers::approve,
        features::verification::handlers::reject,
        features::audit::handlers::get_audit_trail,
        features::sweeps::handlers::run_auto_miss_sweep,
        features::sweeps::handlers::run_verification_backlog,
    ),
    components(
        schemas(
            storage::dto::entry::CreateEntryRequest,
            storage::dto::entry::ReportOutcomeRequest,
            storage::dto::entry::EntryResponse,
            storage::dto::entry::EntryStatusResponse,
            storage::dto::verification::AttachEvidenceRequest,
            storage::dto::verification::ReviewActionRequest,
            storage::dto::verification::VerificationResponse,
            storage::dto::audit::AuditTrailResponse,
            storage::dto::sweep::SweepSummary,
            storage::dto::sweep::BatchSummary,
            storage::dto::sweep::BacklogSummary,
            storage::models::Entry,
            storage::models::EntryStatus,
            storage::models::EntryOutcome,
            storage::models::VerificationRecord,
            storage::models::ReviewStatus,
            storage::models::ReviewAction,
            storage::models::Witness,
            storage::models::DocumentRef,
            storage::models::Evidence,
            storage::models::AuditEvent,
            storage::models::AuditEntity,
            storage::OverduePolicy,
        )
    ),
    tags(
        (name = "entries", description = "Paid entries and outcome self-reports"),
        (name = "verification", description = "Win claim evidence and staff review"),
        (name = "audit", description = "Lifecycle audit trail"),
        (name = "sweeps", description = "Scheduler triggers"),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("API Key")
                        .build(),
                ),
            )
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting entry lifecycle API");

    let config = Config::from_env().context("Failed to load API configuration")?;
    tracing::info!(
        attempt_window_minutes = config.lifecycle.attempt_window.num_minutes(),
        verification_deadline_hours = config.lifecycle.verification_deadline.num_hours(),
        overdue_policy = %config.lifecycle.overdue_policy,
        "Configuration loaded successfully"
    );

    tracing::info!(
        "Connecting to database at: {}",
        config
            .database_url
            .split('@')
            .next_back()
            .unwrap_or("unknown")
    );
    let db = Database::new(&config.database_url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations");
    db.run_migrations()
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database migrations completed successfully");

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            let webhook = WebhookNotifier::new(url.clone())
                .context("Failed to build notification webhook client")?;
            tracing::info!("Posting lifecycle notifications to {}", webhook.host());
            Arc::new(webhook)
        }
        None => Arc::new(LogNotifier),
    };
    let store = db.lifecycle_store();

    let api_keys = ApiKeys::from_comma_separated(&config.api_keys);
    if api_keys.is_empty() {
        tracing::warn!("API_KEYS is empty; every mutating endpoint will answer 401");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = AutoMissScheduler::new(
        store.clone(),
        notifier.clone(),
        config.lifecycle.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(async move {
        let mut rx = shutdown_rx;
        let _ = rx.wait_for(|stop| *stop).await;
    }));

    let state = AppState::new(store, notifier, config.lifecycle.clone());
    let app = app::router(state, api_keys).merge(
        SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    let bind_address = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server at http://{}", bind_address);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", bind_address);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    scheduler_handle
        .await
        .context("Auto-miss scheduler task panicked")?;

    Ok(())
}
