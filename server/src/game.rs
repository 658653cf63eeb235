//! The tick driver: simulate, snapshot, broadcast, repeat.

use crate::broadcast::{fan_out, snapshot_messages};
use crate::config::{BroadcastMode, ServerConfig};
use crate::registry::SharedRegistry;
use crate::simulation::{step, SimParams, StepReport};
use crate::utils::get_timestamp;
use log::{debug, info};
use shared::ServerMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

const DIAGNOSTICS_EVERY: u64 = 100;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub step: StepReport,
    pub deliveries: usize,
}

pub struct GameLoop {
    registry: SharedRegistry,
    params: SimParams,
    mode: BroadcastMode,
    tick_duration: Duration,
    tick: u64,
}

impl GameLoop {
    pub fn new(registry: SharedRegistry, config: &ServerConfig) -> Self {
        Self {
            registry,
            params: SimParams::from(config),
            mode: config.broadcast_mode,
            tick_duration: config.tick_duration(),
            tick: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Runs one simulation step and broadcasts the resulting snapshot.
    ///
    /// The registry write lock is held from the first drain until the last
    /// send is queued. Sends never wait, so the lock is held for a time
    /// bounded by player count and queued input.
    pub async fn tick_once(&mut self) -> TickReport {
        let mut registry = self.registry.write().await;

        let step = step(&mut registry, &self.params);
        self.tick += 1;

        let snapshot = registry.snapshot_all();
        let messages: Vec<Arc<ServerMessage>> =
            snapshot_messages(&snapshot, self.mode, get_timestamp())
                .into_iter()
                .map(Arc::new)
                .collect();
        let deliveries = fan_out(&registry, &messages, None);

        if self.tick % DIAGNOSTICS_EVERY == 0 && !registry.is_empty() {
            debug!(
                "Tick {}: {} players, {} inputs applied, {} messages queued",
                self.tick, step.players, step.intents, deliveries
            );
        }

        TickReport {
            tick: self.tick,
            step,
            deliveries,
        }
    }

    /// Ticks at the configured rate for as long as the process lives.
    pub async fn run(mut self) {
        let mut ticker = interval(self.tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick fires immediately
        ticker.tick().await;
        info!(
            "Game loop running at {:.1} Hz ({:?} per tick)",
            1.0 / self.params.dt,
            self.tick_duration
        );

        loop {
            ticker.tick().await;
            self.tick_once().await;
        }
    }
}
