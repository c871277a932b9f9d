use anyhow::{Context, Result};
use chrono::Duration;
use storage::{LifecycleSettings, OverduePolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub api_keys: String,
    /// Downstream mailer endpoint; notifications are only logged when unset.
    pub notify_webhook_url: Option<String>,
    pub lifecycle: LifecycleSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").context("Cannot load HOST env variable")?,
            port: std::env::var("PORT")
                .context("PORT must be a number")?
                .parse()?,
            database_url: std::env::var("DATABASE_URL")
                .context("Cannot load DATABASE_URL env variable")?,
            api_keys: std::env::var("API_KEYS").unwrap_or_default(),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            lifecycle: lifecycle_from_env()?,
        })
    }
}

fn lifecycle_from_env() -> Result<LifecycleSettings> {
    let defaults = LifecycleSettings::default();

    let settings = LifecycleSettings {
        attempt_window: span(
            "ATTEMPT_WINDOW_MINUTES",
            env_or("ATTEMPT_WINDOW_MINUTES", defaults.attempt_window.num_minutes())?,
            Duration::try_minutes,
        )?,
        verification_deadline: span(
            "VERIFICATION_DEADLINE_HOURS",
            env_or(
                "VERIFICATION_DEADLINE_HOURS",
                defaults.verification_deadline.num_hours(),
            )?,
            Duration::try_hours,
        )?,
        sweep_batch_size: env_or("SWEEP_BATCH_SIZE", defaults.sweep_batch_size)?,
        sweep_interval: env_or("SWEEP_INTERVAL_SECONDS", defaults.sweep_interval.as_secs())
            .map(std::time::Duration::from_secs)?,
        overdue_policy: match std::env::var("OVERDUE_VERIFICATION_POLICY") {
            Ok(raw) => raw
                .parse::<OverduePolicy>()
                .map_err(anyhow::Error::msg)
                .context("Invalid OVERDUE_VERIFICATION_POLICY")?,
            Err(_) => defaults.overdue_policy,
        },
    };

    settings
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid lifecycle configuration")?;

    Ok(settings)
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number")),
        Err(_) => Ok(default),
    }
}

fn span(key: &str, amount: i64, build: fn(i64) -> Option<Duration>) -> Result<Duration> {
    build(amount).with_context(|| format!("{key} is out of range"))
}
