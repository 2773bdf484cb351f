use clap::Parser;
use log::info;
use server::config::{RetryPolicy, ServerConfig};
use server::network::Server;
use shared::WinRule;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Outbound messages buffered per connection
    #[arg(long, default_value = "8")]
    queue_capacity: usize,

    /// Delivery attempts before a message to a busy client is dropped
    #[arg(long, default_value = "5")]
    retry_attempts: u32,

    /// Delay between delivery attempts in milliseconds
    #[arg(long, default_value = "500")]
    retry_delay_ms: u64,

    /// Seconds between sweeps of finished and abandoned rooms
    #[arg(long, default_value = "60")]
    reap_interval: u64,

    /// Count six or more in a row as a win
    #[arg(long)]
    allow_overlines: bool,

    /// Seed for the first-mover coin flips
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let bind_addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;

        Ok(ServerConfig {
            bind_addr,
            queue_capacity: self.queue_capacity,
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                delay: Duration::from_millis(self.retry_delay_ms),
            },
            win_rule: if self.allow_overlines {
                WinRule::FiveOrMore
            } else {
                WinRule::ExactlyFive
            },
            reap_interval: Duration::from_secs(self.reap_interval),
            seed: self.seed,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    info!("Starting server...");

    let handle = Arc::new(Server::new(config)).start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");
    handle.stop().await;

    Ok(())
}
