use std::{sync::Arc, time::Duration};

use axum::http::{HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dealer_booking_backend::{
    api,
    config::{Config, LogFormat, NotifyBackend, StoreBackend},
    notify::{LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier},
    scheduling::ZonedClock,
    store::{BookingStore, CalendarStore, MemoryStore, PgStore},
    AppState,
};

const NOTIFY_BACKOFF: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (dev convenience)
    let _ = dotenvy::dotenv();

    let cfg = Config::from_env()?;

    // Tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match cfg.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    let (calendar, bookings): (Arc<dyn CalendarStore>, Arc<dyn BookingStore>) =
        match cfg.store_backend {
            StoreBackend::Postgres => {
                let url = cfg
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
                let pool = PgPoolOptions::new()
                    .max_connections(cfg.database_max_connections)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(url)
                    .await?;

                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database connected and migrations applied");

                let store = Arc::new(PgStore::new(pool, cfg.admission_lock_timeout));
                (store.clone(), store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store, bookings are lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let notifier: Arc<dyn Notifier> = match cfg.notify_backend {
        NotifyBackend::Log => Arc::new(LogNotifier),
        NotifyBackend::Webhook => {
            let url = cfg
                .notify_webhook_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("NOTIFY_WEBHOOK_URL must be set"))?;
            Arc::new(WebhookNotifier::new(url)?)
        }
    };

    let state = AppState::new(
        calendar,
        bookings,
        Arc::new(ZonedClock::new(cfg.timezone)),
        cfg.admission_lock_timeout,
        cfg.initial_status,
        NotificationDispatcher::new(notifier, cfg.notify_max_attempts, NOTIFY_BACKOFF),
    );

    // CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(
            cfg.cors_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        );

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(CompressionLayer::new()),
    );

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!(
        timezone = %cfg.timezone,
        initial_status = ?cfg.initial_status,
        "Listening on {}",
        cfg.listen_addr
    );

    axum::serve(listener, app).await?;

    Ok(())
}
