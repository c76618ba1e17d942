//! ProjectHub API server binary.
//!
//! Loads `.env`, connects to PostgreSQL, applies migrations, and serves the
//! API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use projecthub_api::config::ApiConfig;
use projecthub_api::middleware::rate_limit::RateLimitConfig;
use projecthub_api::{AppState, router};
use projecthub_core::store::{MemoryCache, MemoryCredentialStore, PgCache};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// How often expired cache entries (bans, one-time tokens) and idle
/// rate-limit buckets are swept.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Which cache the sweeper purges.
enum Sweep {
    Postgres(PgCache),
    Memory(Arc<MemoryCache>),
}

async fn sweep_once(limits: &RateLimitConfig, sweep: &Sweep) {
    limits.retain_recent();
    match sweep {
        Sweep::Postgres(cache) => match cache.purge_expired().await {
            Ok(0) => {}
            Ok(n) => info!(purged = n, "expired cache entries removed"),
            Err(e) => warn!(error = %e, "cache purge failed"),
        },
        Sweep::Memory(cache) => cache.cleanup(),
    }
}

fn spawn_sweeper(limits: Arc<RateLimitConfig>, sweep: Sweep) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            sweep_once(&limits, &sweep).await;
        }
    });
}

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "projecthub_api_server", about = "ProjectHub API server")]
struct Args {
    /// Port to listen on; overrides the port in `BIND_ADDR` (0 = ephemeral).
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/projecthub"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep users, sessions, and the cache in process memory instead of PostgreSQL.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

fn bind_addr(configured: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => {
            let host = configured
                .rsplit_once(':')
                .map(|(host, _)| host)
                .unwrap_or("127.0.0.1");
            format!("{host}:{port}")
        }
        None => configured.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,projecthub_api=debug,projecthub_core=debug",
                )
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    config.database_url = args.database_url.clone();
    config.bind_addr = bind_addr(&config.bind_addr, args.port);

    let state = if args.in_memory {
        warn!("running with in-memory stores; all data is lost on exit");
        let cache = Arc::new(MemoryCache::new());
        let state = AppState::new(
            config.clone(),
            Arc::new(MemoryCredentialStore::new()),
            cache.clone(),
        );
        spawn_sweeper(state.rate_limits.clone(), Sweep::Memory(cache));
        state
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;

        info!("running database migrations");
        projecthub_api::migrate(&pool).await?;

        let state = AppState::with_postgres(config.clone(), pool.clone());
        spawn_sweeper(state.rate_limits.clone(), Sweep::Postgres(PgCache::new(pool)));
        state
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        access_ttl_secs = config.access_token_ttl.num_seconds(),
        refresh_ttl_secs = config.refresh_token_ttl.num_seconds(),
        cookie_secure = config.cookie_secure,
        "REST API listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_keeps_host() {
        assert_eq!(bind_addr("0.0.0.0:5000", Some(8080)), "0.0.0.0:8080");
        assert_eq!(bind_addr("127.0.0.1:5000", None), "127.0.0.1:5000");
    }

    #[tokio::test]
    async fn memory_sweep_evicts_expired_entries() {
        use projecthub_api::middleware::rate_limit::RateLimitSettings;
        use projecthub_core::store::Cache;

        let cache = Arc::new(MemoryCache::new());
        cache
            .set("verify:stale", "u1", Some(Duration::ZERO))
            .await
            .unwrap();
        cache.set("blocklist:u2", "1", None).await.unwrap();
        assert_eq!(cache.len(), 2);

        let limits = RateLimitConfig::new(&RateLimitSettings::default());
        sweep_once(&limits, &Sweep::Memory(cache.clone())).await;
        assert_eq!(cache.len(), 1);
    }
}
