use std::time::Duration;

use anyhow::Context;

use crate::models::booking::BookingStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyBackend {
    Log,
    Webhook,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub listen_addr: String,
    pub cors_origins: Vec<String>,
    pub timezone: chrono_tz::Tz,
    pub admission_lock_timeout: Duration,
    pub initial_status: BookingStatus,
    pub notify_backend: NotifyBackend,
    pub notify_webhook_url: Option<String>,
    pub notify_max_attempts: u32,
    pub log_format: LogFormat,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let store_backend = match var_or("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let timezone: chrono_tz::Tz = var_or("DEALERSHIP_TIMEZONE", "UTC")
            .parse()
            .map_err(|e| anyhow::anyhow!("DEALERSHIP_TIMEZONE is not a valid IANA zone: {}", e))?;

        let lock_timeout_ms: u64 = var_or("ADMISSION_LOCK_TIMEOUT_MS", "2000")
            .parse()
            .context("ADMISSION_LOCK_TIMEOUT_MS must be a number")?;
        if lock_timeout_ms == 0 {
            anyhow::bail!("ADMISSION_LOCK_TIMEOUT_MS must be greater than zero");
        }

        let initial_status: BookingStatus = var_or("BOOKING_INITIAL_STATUS", "pending")
            .parse()
            .map_err(|e| anyhow::anyhow!("BOOKING_INITIAL_STATUS: {}", e))?;
        if !initial_status.holds_capacity() {
            anyhow::bail!("BOOKING_INITIAL_STATUS must be 'pending' or 'confirmed'");
        }

        let notify_backend = match var_or("NOTIFY_BACKEND", "log").as_str() {
            "log" => NotifyBackend::Log,
            "webhook" => NotifyBackend::Webhook,
            other => anyhow::bail!("NOTIFY_BACKEND must be 'log' or 'webhook', got '{}'", other),
        };
        let notify_webhook_url = std::env::var("NOTIFY_WEBHOOK_URL").ok();
        if notify_backend == NotifyBackend::Webhook && notify_webhook_url.is_none() {
            anyhow::bail!("NOTIFY_WEBHOOK_URL must be set when NOTIFY_BACKEND=webhook");
        }

        let log_format = match var_or("LOG_FORMAT", "pretty").as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections: var_or("DATABASE_MAX_CONNECTIONS", "20")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a number")?,
            listen_addr: var_or("LISTEN_ADDR", "0.0.0.0:8080"),
            cors_origins: var_or("CORS_ORIGINS", "http://localhost:5173")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            timezone,
            admission_lock_timeout: Duration::from_millis(lock_timeout_ms),
            initial_status,
            notify_backend,
            notify_webhook_url,
            notify_max_attempts: var_or("NOTIFY_MAX_ATTEMPTS", "3")
                .parse::<u32>()
                .context("NOTIFY_MAX_ATTEMPTS must be a number")?
                .max(1),
            log_format,
        })
    }
}
