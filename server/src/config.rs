//! Runtime configuration for the position server.

use crate::error::ServerError;
use crate::input_queue::DEFAULT_INPUT_LIMIT;
use clap::ValueEnum;
use rand::Rng;
use shared::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, FRICTION, PLAYER_SPEED, SPAWN_HEIGHT, SPAWN_MIN_X,
    SPAWN_MIN_Y, SPAWN_WIDTH,
};
use std::time::Duration;

/// How each tick's snapshot is fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BroadcastMode {
    /// One `update_state` message listing every player.
    #[default]
    Batched,
    /// One `update_position` message per player.
    PerEntity,
}

/// How `last_seq_processed` advances when an intent is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AckPolicy {
    /// Ack the seq of the last intent applied, even if it is lower than the
    /// previous ack. A seq of 0 leaves the ack untouched.
    #[default]
    LastApplied,
    /// Ack the highest seq ever applied; the ack never moves backward.
    Highest,
}

/// Axis-aligned spawn rectangle, `[min, min + size)` on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRegion {
    pub min_x: f32,
    pub min_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for SpawnRegion {
    fn default() -> Self {
        Self {
            min_x: SPAWN_MIN_X,
            min_y: SPAWN_MIN_Y,
            width: SPAWN_WIDTH,
            height: SPAWN_HEIGHT,
        }
    }
}

impl SpawnRegion {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (f32, f32) {
        let x = self.min_x + rng.gen::<f32>() * self.width;
        let y = self.min_y + rng.gen::<f32>() * self.height;
        (x, y)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x
            && x <= self.min_x + self.width
            && y >= self.min_y
            && y <= self.min_y + self.height
    }
}

/// Highest accepted tick rate.
pub const MAX_TICK_RATE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Ticks per second; also the broadcast cadence.
    pub tick_rate: u32,
    /// Velocity for a fully deflected axis, in units per second.
    pub speed: f32,
    /// Per-tick velocity decay factor, strictly between 0 and 1.
    pub friction: f32,
    pub spawn: SpawnRegion,
    pub broadcast_mode: BroadcastMode,
    pub ack_policy: AckPolicy,
    /// Messages a connection may have waiting before snapshots are dropped.
    pub outbound_buffer: usize,
    /// Intents a player may queue between ticks before new ones are dropped.
    pub max_queued_inputs: usize,
    /// Evict players with no input for this long. `None` disables eviction.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            speed: PLAYER_SPEED,
            friction: FRICTION,
            spawn: SpawnRegion::default(),
            broadcast_mode: BroadcastMode::default(),
            ack_policy: AckPolicy::default(),
            outbound_buffer: 256,
            max_queued_inputs: DEFAULT_INPUT_LIMIT,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fixed simulation step in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if !(1..=MAX_TICK_RATE).contains(&self.tick_rate) {
            return Err(ServerError::Config(format!(
                "tick rate must be between 1 and {}, got {}",
                MAX_TICK_RATE, self.tick_rate
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ServerError::Config(format!(
                "speed must be positive, got {}",
                self.speed
            )));
        }
        if !(self.friction > 0.0 && self.friction < 1.0) {
            return Err(ServerError::Config(format!(
                "friction must be in (0, 1), got {}",
                self.friction
            )));
        }
        let spawn = &self.spawn;
        if !(spawn.width > 0.0 && spawn.height > 0.0)
            || !(spawn.min_x.is_finite() && spawn.min_y.is_finite())
            || !(spawn.width.is_finite() && spawn.height.is_finite())
        {
            return Err(ServerError::Config(format!(
                "spawn region must be non-empty, got {:?}",
                spawn
            )));
        }
        if self.idle_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ServerError::Config("idle timeout must be non-zero when set".into()));
        }
        if self.outbound_buffer == 0 {
            return Err(ServerError::Config("outbound buffer must be at least 1".into()));
        }
        if self.max_queued_inputs == 0 {
            return Err(ServerError::Config("input queue limit must be at least 1".into()));
        }
        Ok(())
    }
}
