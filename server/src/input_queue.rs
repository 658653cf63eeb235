//! Per-player FIFO of movement intents awaiting the next tick.
//!
//! Connection handlers push while the tick driver drains, possibly from
//! different tasks at the same time. Both sides go through one short-lived
//! mutex, so an intent pushed during a drain lands either in that drain or in
//! the next one, never both and never neither.
//!
//! A queue holds at most `limit` intents between ticks. Intents arriving at a
//! full queue are dropped.

use log::debug;
use shared::InputIntent;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug)]
struct Pending {
    intents: VecDeque<InputIntent>,
    last_activity: Instant,
}

/// Intents a player may have waiting for one tick.
pub const DEFAULT_INPUT_LIMIT: usize = 64;

#[derive(Debug)]
pub struct InputQueue {
    pending: Mutex<Pending>,
    limit: usize,
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InputQueue {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_INPUT_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Mutex::new(Pending {
                intents: VecDeque::new(),
                last_activity: Instant::now(),
            }),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends intents in the order given and refreshes the activity clock.
    /// Returns how many were accepted before the queue filled up.
    ///
    /// The activity clock moves even for an empty batch: the client is alive.
    pub fn push_batch<I>(&self, intents: I) -> usize
    where
        I: IntoIterator<Item = InputIntent>,
    {
        let mut pending = self.lock();
        pending.last_activity = Instant::now();

        let mut accepted = 0;
        let mut dropped = 0;
        for intent in intents {
            if pending.intents.len() < self.limit {
                pending.intents.push_back(intent);
                accepted += 1;
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("Input queue full, dropped {} intents", dropped);
        }
        accepted
    }

    pub fn push(&self, intent: InputIntent) -> bool {
        self.push_batch(std::iter::once(intent)) == 1
    }

    /// Empties the queue, returning its prior contents in arrival order.
    pub fn drain(&self) -> Vec<InputIntent> {
        let mut pending = self.lock();
        std::mem::take(&mut pending.intents).into()
    }

    pub fn len(&self) -> usize {
        self.lock().intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().intents.is_empty()
    }

    pub fn last_activity(&self) -> Instant {
        self.lock().last_activity
    }
}
