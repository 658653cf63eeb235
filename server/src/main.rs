use clap::Parser;
use log::info;
use server::input_queue::DEFAULT_INPUT_LIMIT;
use server::network::Server;
use server::{AckPolicy, BroadcastMode, ServerConfig, SpawnRegion};
use shared::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, FRICTION, PLAYER_SPEED, SPAWN_HEIGHT, SPAWN_MIN_X,
    SPAWN_MIN_Y, SPAWN_WIDTH,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks (and snapshots) per second
    #[arg(short, long, env = "TICK_RATE", default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Movement speed in units per second at full input
    #[arg(long, env = "PLAYER_SPEED", default_value_t = PLAYER_SPEED)]
    speed: f32,

    /// Velocity multiplier applied once per tick, in (0, 1)
    #[arg(long, env = "FRICTION", default_value_t = FRICTION)]
    friction: f32,

    #[arg(long, default_value_t = SPAWN_MIN_X, allow_negative_numbers = true)]
    spawn_min_x: f32,

    #[arg(long, default_value_t = SPAWN_MIN_Y, allow_negative_numbers = true)]
    spawn_min_y: f32,

    #[arg(long, default_value_t = SPAWN_WIDTH)]
    spawn_width: f32,

    #[arg(long, default_value_t = SPAWN_HEIGHT)]
    spawn_height: f32,

    /// Snapshot shape sent each tick
    #[arg(long, env = "BROADCAST_MODE", value_enum, default_value_t = BroadcastMode::Batched)]
    broadcast_mode: BroadcastMode,

    /// How the per-player input acknowledgment advances
    #[arg(long, env = "ACK_POLICY", value_enum, default_value_t = AckPolicy::LastApplied)]
    ack_policy: AckPolicy,

    /// Messages buffered per connection before snapshots are dropped
    #[arg(long, default_value_t = 256)]
    outbound_buffer: usize,

    /// Intents a player may queue between ticks before new ones are dropped
    #[arg(long, default_value_t = DEFAULT_INPUT_LIMIT)]
    max_queued_inputs: usize,

    /// Evict players silent for this many seconds (0 disables)
    #[arg(long, env = "IDLE_TIMEOUT", default_value_t = 0)]
    idle_timeout: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            tick_rate: args.tick_rate,
            speed: args.speed,
            friction: args.friction,
            spawn: SpawnRegion {
                min_x: args.spawn_min_x,
                min_y: args.spawn_min_y,
                width: args.spawn_width,
                height: args.spawn_height,
            },
            broadcast_mode: args.broadcast_mode,
            ack_policy: args.ack_policy,
            outbound_buffer: args.outbound_buffer,
            max_queued_inputs: args.max_queued_inputs,
            idle_timeout: (args.idle_timeout > 0).then(|| Duration::from_secs(args.idle_timeout)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!("Starting server on {}", config.address());

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
