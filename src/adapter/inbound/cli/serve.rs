//! Handler for `pkgstream serve`.

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::command::ServeArgs;
use super::output;
use crate::adapter::inbound::http::serve;
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::settings::Config;

/// Run the relay until Ctrl-C.
pub async fn execute(config: &Config, args: &ServeArgs) -> Result<()> {
    let mut config = config.clone();
    if let Some(bind) = &args.bind {
        config.relay.bind.clone_from(bind);
    }

    let state = bootstrap::build_relay_state(&config, CancellationToken::new())?;

    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Listening", &config.relay.bind);
    output::field("Path", &config.relay.path);
    output::field("Source", state.env().source_description());
    if !state.env().configured {
        output::warning(&format!(
            "Missing environment variables: {}",
            state.env().missing.join(", ")
        ));
        output::hint("stream requests will receive an error frame until these are set");
    }

    serve(state, &config.relay, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await?;

    output::success("Relay stopped");
    Ok(())
}
