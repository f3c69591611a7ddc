//! Relay server lifecycle.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use super::router::router;
use super::state::RelayState;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::relay::RelayConfig;

/// Bind `config.bind` and serve until `shutdown` resolves.
///
/// On shutdown every open push stream is cancelled so in-flight responses
/// complete and the server can drain.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn serve<F>(state: RelayState, config: &RelayConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config.bind.parse().map_err(|e| ConfigError::InvalidValue {
        field: "relay.bind",
        reason: format!("{e}"),
    })?;

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, path = %config.path, "Relay listening");

    let sessions = state.shutdown().clone();
    let app = router(state, config);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutting down relay");
            sessions.cancel();
        })
        .await?;

    Ok(())
}
