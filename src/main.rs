//! Window Buffer Server - Binary Entry Point
//!
//! Configuration comes from `BUFFER_SERVER_*` environment variables; see
//! [`BrokerConfig::from_env`].

use tracing::{error, info};

use window_buffer::config::BrokerConfig;
use window_buffer::telemetry::init_tracing;
use window_buffer::{BrokerResult, BufferServer, NAME, VERSION};

#[tokio::main]
async fn main() -> BrokerResult<()> {
    let config = BrokerConfig::from_env()?;
    init_tracing(&config.log_filter);
    info!(name = NAME, version = VERSION, "starting");

    let server = BufferServer::bind(config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {e}");
            }
        })
        .await
}
