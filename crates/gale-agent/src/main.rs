//! Gale Agent entry point.

use std::time::Duration;

use gale_agent::connection::{Client, WsStream};
use gale_agent::{Config, Result};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Gale Agent...");

    let config = load_config()?;
    info!(
        "Configuration loaded: server={}, sandbox={:?}",
        config.server_url, config.working_dir
    );

    tokio::fs::create_dir_all(config.pipelines_dir()).await?;

    let client = Client::new(config.clone());
    run_agent_loop(client, config).await
}

fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

async fn run_agent_loop(client: Client, config: Config) -> Result<()> {
    loop {
        let stream = connect_with_retry(&client, &config).await;
        match client.handle_stream(stream).await {
            Ok(()) => warn!("channel closed, reconnecting..."),
            Err(e) => error!("channel error: {e}"),
        }
    }
}

async fn connect_with_retry(client: &Client, config: &Config) -> WsStream {
    let mut delay_ms = config.reconnect_initial_delay_ms;
    let max_delay = config.reconnect_max_delay_ms;

    loop {
        match client.connect().await {
            Ok(stream) => {
                info!("Connected to server at {}", config.server_url);
                return stream;
            }
            Err(e) => {
                warn!("Failed to connect to server: {e}");
                warn!("Retrying in {delay_ms}ms...");

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff
                delay_ms = (delay_ms * 2).min(max_delay);
            }
        }
    }
}
