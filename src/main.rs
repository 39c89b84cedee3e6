//! sitekit server
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (Axum, request ID, limits)
//!                        │
//!                        ▼
//!                     app::shell ──▶ dispatch.before / after events
//!                        │
//!                        ▼
//!                     routing::Router ──▶ handlers ──▶ sql / store
//!                        │
//!                        ▼
//!                     output.before / filter / after events
//!     Client Response    │
//!     ◀──────────────────┘
//! ```
//!
//! Cross-cutting: config (TOML), observability (tracing, Prometheus),
//! lifecycle (graceful shutdown).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value as Json;
use tokio::net::TcpListener;

use sitekit::config::{load_config, SiteConfig};
use sitekit::http::HttpServer;
use sitekit::observability::{logging, metrics};
use sitekit::routing::{Handler, HandlerError};
use sitekit::{App, Shutdown};

#[derive(Parser)]
#[command(name = "sitekit")]
#[command(about = "Serve a sitekit site", long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => SiteConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sitekit starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        database = config.database.dsn.as_deref().unwrap_or("none"),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut app = App::new(&config)?;
    mount_site(&mut app)?;
    let app = Arc::new(app);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();
    HttpServer::new(app, &config).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// The built-in site: a landing page plus small store-backed endpoints.
fn mount_site(app: &mut App) -> Result<(), sitekit::routing::RouteError> {
    let router = app.router_mut();

    router.get(
        "/",
        Handler::function(|cx| {
            cx.echo("<h1>sitekit</h1>\n");
            Ok(())
        }),
    )?;

    router.group("/kv", |kv| {
        kv.get(
            "/{any}",
            Handler::function(|cx| {
                let key = cx.arg(0).unwrap_or_default().to_string();
                let value = cx.kv()?.get_json(&key)?;
                match value {
                    Some(value) => cx.echo(&value.to_string()),
                    None => cx.set_status(axum::http::StatusCode::NOT_FOUND),
                }
                Ok(())
            }),
        )?;
        kv.post(
            "/{any}",
            Handler::function(|cx| {
                let key = cx.arg(0).unwrap_or_default().to_string();
                let value = cx.request().input("value").unwrap_or_default();
                cx.kv()?.set(&key, &value)?;
                cx.echo("ok");
                Ok(())
            }),
        )
    })?;

    router.group("/docs", |docs| {
        docs.post(
            "/",
            Handler::function(|cx| {
                let body = Json::Object(cx.request().inputs());
                let id = cx
                    .docs()?
                    .put(body)?
                    .ok_or_else(|| HandlerError::msg("document was not stored"))?;
                cx.echo(&id);
                Ok(())
            }),
        )?;
        docs.get(
            "/{any}",
            Handler::function(|cx| {
                let id = cx.arg(0).unwrap_or_default().to_string();
                let record = cx.docs()?.find(&id)?;
                match record {
                    Some(record) => cx.echo(&record.body.to_string()),
                    None => cx.set_status(axum::http::StatusCode::NOT_FOUND),
                }
                Ok(())
            }),
        )
    })
}
