//! Murmur HTTP server.
//!
//! Serves the moderation, social-graph and notification API over axum with
//! cookie sessions, per-client rate limiting and an SSE notification
//! stream. A background task lifts expired bans.
//!
//! ## Usage
//!
//! ```bash
//! murmur-server --bind 0.0.0.0:3000 --data-dir /var/lib/murmur \
//!     --gateway-secret "$SECRET"
//! ```
//!
//! Every flag has an environment fallback (`MURMUR_BIND`, `MURMUR_DATA_DIR`,
//! ...). Logging is controlled by `RUST_LOG`.

mod auth;
mod error;
mod handlers;
mod rate_limit;
mod router;
mod state;

use clap::Parser;
use murmur::{Coordinator, ServiceConfig, SystemClock};
use router::{build_router, log_routes, RouterOptions};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "murmur-server", version, about = "Murmur moderation and notification server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "MURMUR_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Directory holding the database.
    #[arg(long, env = "MURMUR_DATA_DIR", default_value = "murmur_data")]
    data_dir: PathBuf,

    /// Keep all state in memory; nothing survives a restart.
    #[arg(long, env = "MURMUR_IN_MEMORY")]
    in_memory: bool,

    /// Seconds between ban expiry sweeps.
    #[arg(long, env = "MURMUR_SWEEP_INTERVAL", default_value_t = 60)]
    sweep_interval: u64,

    /// Seconds without events after which a notification stream is closed.
    #[arg(long, env = "MURMUR_STREAM_IDLE_TIMEOUT", default_value_t = 300)]
    stream_idle_timeout: u64,

    /// Shared secret for `/internal` routes. Without it they are closed.
    #[arg(long, env = "MURMUR_GATEWAY_SECRET", hide_env_values = true)]
    gateway_secret: Option<String>,

    /// Mark the session cookie Secure. Enable behind HTTPS.
    #[arg(long, env = "MURMUR_SECURE_COOKIES")]
    secure_cookies: bool,

    /// Rate limit by X-Forwarded-For / X-Real-IP.
    #[arg(long, env = "TRUST_PROXY_HEADERS")]
    trust_proxy_headers: bool,
}

impl Args {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval),
            stream_idle_timeout: Duration::from_secs(self.stream_idle_timeout),
            data_dir: self.data_dir.clone(),
            in_memory: self.in_memory,
            ..ServiceConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "murmur=info,murmur_server=info,tower_http=debug".into()
        }))
        .init();

    let args = Args::parse();
    let config = args.service_config();

    let coordinator = match Coordinator::open(config.clone(), Arc::new(SystemClock)) {
        Ok(coordinator) => Arc::new(coordinator),
        Err(e) => {
            error!("Failed to open service state: {}", e);
            return Err(e.into());
        }
    };
    if config.in_memory {
        warn!("Running in memory - state is lost on shutdown");
    } else {
        info!("State loaded from {}", config.data_dir.display());
    }

    if args.gateway_secret.is_none() {
        warn!("No gateway secret set - /internal routes are disabled");
    }
    if args.secure_cookies {
        info!("Secure cookies enabled - cookies will only be sent over HTTPS");
    } else {
        warn!("Secure cookies disabled - set MURMUR_SECURE_COOKIES=true for production");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::new(coordinator.ban_scheduler()).spawn(config.sweep_interval, shutdown_rx);

    let state = AppState::new(coordinator, args.gateway_secret.clone());
    let app = build_router(
        state,
        RouterOptions {
            secure_cookies: args.secure_cookies,
            trust_proxy_headers: args.trust_proxy_headers,
        },
    );

    let listener = TcpListener::bind(args.bind).await?;
    info!("Murmur server running on http://{}", args.bind);
    info!("");
    log_routes();

    // Connect info feeds the per-IP rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!("Ban sweep task ended abnormally: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["murmur-server"]).unwrap();
        let config = args.service_config();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.stream_idle_timeout, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_override() {
        let args = Args::try_parse_from([
            "murmur-server",
            "--bind",
            "0.0.0.0:8080",
            "--in-memory",
            "--sweep-interval",
            "5",
        ])
        .unwrap();
        assert_eq!(args.bind.port(), 8080);
        let config = args.service_config();
        assert!(config.in_memory);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }
}
