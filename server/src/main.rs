use clap::Parser;
use log::{error, info};
use server::config::{self, ServerConfig};
use server::network::{Server, ServerMessage};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = config::DEFAULT_HOST)]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = config::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Maximum number of simultaneous players
    #[arg(short, long, default_value_t = config::DEFAULT_MAX_PLAYERS)]
    max_players: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value_t = 5)]
    client_timeout: u64,

    /// Largest tolerated position error of a client report
    #[arg(long, default_value_t = config::DEFAULT_POSITION_TOLERANCE)]
    tolerance: f32,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            tick_rate: self.tick_rate,
            max_players: self.max_players,
            client_timeout: Duration::from_secs(self.client_timeout),
            position_tolerance: self.tolerance,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    info!(
        "Starting server on {} at {}Hz for up to {} players",
        config.bind_address(),
        config.tick_rate,
        config.max_players
    );

    let mut server = Server::new(config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                let _ = shutdown.send(ServerMessage::Shutdown);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
