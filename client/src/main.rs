use clap::{Parser, ValueEnum};
use client::config::{self, ClientConfig};
use client::input::{IdleInput, InputSource, ScriptedInput};
use client::network::Client;
use log::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pilot {
    /// Fly a looping demo course
    Demo,
    /// Leave the controls alone
    Idle,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = config::DEFAULT_SERVER_ADDR)]
    server: String,

    /// Local simulation frames per second
    #[arg(short, long, default_value_t = config::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Who is at the controls
    #[arg(short, long, value_enum, default_value_t = Pilot::Demo)]
    pilot: Pilot,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let config = ClientConfig {
        server_addr: args.server,
        tick_rate: args.tick_rate,
        fake_ping_ms: args.fake_ping,
        ..Default::default()
    };
    let input_source: Box<dyn InputSource> = match args.pilot {
        Pilot::Demo => Box::new(ScriptedInput::demo()),
        Pilot::Idle => Box::new(IdleInput),
    };

    let mut client = Client::new(config, input_source).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, leaving the game...");
        }
    }

    client.disconnect().await;

    Ok(())
}
