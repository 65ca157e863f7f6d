//! Server bootstrap and graceful shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use super::engine::Engine;
use super::http::{self, AppState};
use super::obs;
use super::store::Store;
use crate::Result;
use crate::config::Config;

/// Run the server in the current process.
///
/// Returns once a shutdown signal arrives and the listener has drained.
pub async fn run(config: Config) -> Result<()> {
    let store = Store::open(&config.database)?;
    let bridge = obs::spawn(config.obs.clone());
    let engine = Engine::new(store, bridge.clone());
    let state = Arc::new(AppState {
        engine,
        obs: bridge,
    });

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, db = %config.database.display(), "timeloom listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
