//! Demo world server binary.
//!
//! Serves a small flat level, echoes chat, and confirms block changes. One
//! session per client; no shared world state.
//!
//! # Usage
//!
//! ```bash
//! classic-server --bind 0.0.0.0 --port 25565 --name "Demo" --motd "Welcome"
//! ```

use async_trait::async_trait;
use clap::Parser;
use classic_core::{ClientConnection, ServerHandler};
use classic_proto::{Position, Result};
use classic_server::Server;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Classic protocol demo server
#[derive(Parser, Debug)]
#[command(name = "classic-server")]
#[command(about = "Minecraft Classic demo world server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(short, long, default_value = "25565")]
    port: u16,

    /// World name sent in the identification frame
    #[arg(long, default_value = "classic-server demo")]
    name: String,

    /// Message of the day
    #[arg(long, default_value = "A tiny flat world")]
    motd: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Flat demo level: stone up to the midline, one grass layer on top, air
/// above. Block order is x-major within each y layer, as the wire expects.
fn flat_level(width: u16, height: u16, depth: u16) -> Vec<u8> {
    const STONE: u8 = 1;
    const GRASS: u8 = 2;
    const AIR: u8 = 0;

    let surface = height / 2;
    let mut blocks = Vec::with_capacity(usize::from(width) * usize::from(height) * usize::from(depth));
    for y in 0..height {
        for _z in 0..depth {
            for _x in 0..width {
                blocks.push(if y < surface {
                    STONE
                } else if y == surface {
                    GRASS
                } else {
                    AIR
                });
            }
        }
    }
    blocks
}

/// Per-session handler: greets, echoes chat, confirms block changes.
struct DemoHandler {
    name: String,
    motd: String,
    username: String,
}

#[async_trait]
impl ServerHandler for DemoHandler {
    async fn ready(&mut self, conn: &mut dyn ClientConnection) -> Result<()> {
        conn.world_info(&self.name, &self.motd, false).await?;

        let (width, height, depth) = (32u16, 16u16, 32u16);
        conn.send_level(Position::new(width / 2, height / 2 + 2, depth / 2), &flat_level(width, height, depth))
            .await?;

        conn.send_message(&format!("Welcome, {}!", self.username)).await
    }

    async fn change_block(
        &mut self,
        conn: &mut dyn ClientConnection,
        position: Position,
        placed: bool,
        holding: u8,
    ) -> Result<()> {
        // No world model: just confirm the client's own change.
        conn.set_block(position, if placed { holding } else { 0 }).await
    }

    async fn submit_message(
        &mut self,
        conn: &mut dyn ClientConnection,
        message: &str,
    ) -> Result<()> {
        tracing::info!(user = %self.username, %message, "chat");
        conn.send_message(&format!("{}: {}", self.username, message)).await
    }

    async fn disconnect(&mut self) {
        tracing::info!(user = %self.username, "left");
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let name = args.name.clone();
    let motd = args.motd.clone();
    let server = Server::bind(
        move |info| {
            Box::new(DemoHandler {
                name: name.clone(),
                motd: motd.clone(),
                username: info.username.clone().unwrap_or_else(|| "player".to_string()),
            })
        },
        &args.bind,
        args.port,
    )
    .await?;

    server.run().await
}
