//! imgdrop server binary.
//!
//! A small image hosting service: uploads are sniffed for an allowed image
//! type, written to a flat directory, and listed straight from the
//! filesystem. Every request passes a per-client sliding-window rate limiter.

mod app;
mod background;
mod config;
mod error;
mod http;
mod images;
mod logging;
mod rate_limit;
mod sniff;
mod store;
mod tls;

use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::app::{RouterOptions, build_router};
use crate::background::spawn_background_tasks;
use crate::config::{Args, RATE_LIMIT_WINDOW_SECS};
use crate::rate_limit::RateLimiter;
use crate::store::ImageStore;

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let args = Args::parse();
    logging::init_logging(&args.log_level);

    let store = Arc::new(ImageStore::new(
        PathBuf::from(&args.upload_dir),
        args.allowed_types(),
    ));
    store.ensure_root().await?;
    let limiter = Arc::new(RateLimiter::new(
        args.rate_limit,
        Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
    ));

    let app = build_router(
        store.clone(),
        limiter.clone(),
        &RouterOptions {
            cors_origins: args.cors_origins(),
            max_upload_bytes: args.max_upload_bytes,
        },
    );

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let tls_config = tls::load_rustls_config(&args).await?;
    let handle = Handle::new();

    info!(
        upload_dir = %store.root_path().display(),
        rate_limit = args.rate_limit,
        "serving images"
    );
    spawn_background_tasks(limiter);

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let server = async {
        match tls_config {
            Some(tls_config) => {
                info!("Starting HTTPS server at {}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
            None => {
                info!("Starting HTTP server at {}", addr);
                axum_server::bind(addr)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
        }
    };

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle.clone()) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
