//! Storefront service entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::catalog::SpreadsheetIngestor;
use storefront::routes::{router, AppState};
use storefront::storage::{
    MemoryOrderStore, MemoryProductStore, MemorySessionStore, OrderStore, PgOrderStore, PgProductStore, PgSessionStore,
    ProductStore, SessionStore,
};
use storefront::Config;

type Stores = (Arc<dyn ProductStore>, Arc<dyn OrderStore>, Arc<dyn SessionStore>);

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

async fn stores(config: &Config) -> Result<Stores> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, using in-memory storage");
        let products: Arc<dyn ProductStore> = Arc::new(MemoryProductStore::default());
        let orders: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::default());
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(config.session_ttl));
        return Ok((products, orders, sessions));
    };
    let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    info!("connected to Postgres, migrations applied");
    let products: Arc<dyn ProductStore> = Arc::new(PgProductStore::new(db.clone()));
    let orders: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(db.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(db, config.session_ttl));
    Ok((products, orders, sessions))
}

/// Drops expired session data once an hour.
async fn purge_sessions(sessions: Arc<dyn SessionStore>) {
    let mut interval = time::interval(SESSION_PURGE_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        match sessions.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired sessions removed"),
            Err(e) => warn!(error = %e, "session purge failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let (products, orders, sessions) = stores(&config).await?;
    tokio::spawn(purge_sessions(Arc::clone(&sessions)));
    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => { warn!(error = %e, "NATS unavailable, events disabled"); None }
        },
        None => None,
    };
    let catalog = Arc::new(SpreadsheetIngestor::new(config.ingest()));
    let port = config.port;
    let state = AppState { products, orders, sessions, catalog, config: Arc::new(config), nats };

    let app = router(state);
    info!("Storefront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}
