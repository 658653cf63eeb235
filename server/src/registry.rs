//! Session registry: the authoritative set of connected players.
//!
//! Each registered id owns exactly one [`PlayerState`], one [`InputQueue`] and
//! one outbound connection handle. Membership only changes through
//! [`SessionRegistry::create`] and [`SessionRegistry::remove`].
//!
//! The registry is shared as a [`SharedRegistry`]. Membership changes and the
//! tick take the write lock, so a tick never sees a half-added or
//! half-removed player. Input submission only needs the read lock because each
//! queue carries its own mutex.

use crate::broadcast::Outbound;
use crate::config::SpawnRegion;
use crate::error::ServerError;
use crate::input_queue::{InputQueue, DEFAULT_INPUT_LIMIT};
use log::info;
use shared::{InputIntent, PlayerId, PlayerSummary, PlayerUpdate};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub type SharedRegistry = Arc<RwLock<SessionRegistry>>;

/// Authoritative simulation record for one player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Ack returned to the owner for reconciliation.
    pub last_seq_processed: u64,
}

impl PlayerState {
    pub fn new(id: PlayerId, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            last_seq_processed: 0,
        }
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            uuid: self.id,
            x: self.x,
            y: self.y,
        }
    }

    pub fn update(&self, t: u64) -> PlayerUpdate {
        PlayerUpdate {
            uuid: self.id,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            seq_ack: self.last_seq_processed,
            t,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub state: PlayerState,
    pub queue: InputQueue,
    outbound: Outbound,
    joined: u64,
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<PlayerId, Session>,
    spawn: SpawnRegion,
    input_limit: usize,
    next_join: u64,
}

impl SessionRegistry {
    pub fn new(spawn: SpawnRegion) -> Self {
        Self {
            sessions: HashMap::new(),
            spawn,
            input_limit: DEFAULT_INPUT_LIMIT,
            next_join: 0,
        }
    }

    /// Caps how many intents each player may queue between ticks.
    pub fn with_input_limit(mut self, limit: usize) -> Self {
        self.input_limit = limit;
        self
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn shared(spawn: SpawnRegion) -> SharedRegistry {
        Self::new(spawn).into_shared()
    }

    /// Registers a player at a random point inside the spawn region.
    pub fn create(&mut self, id: PlayerId, outbound: Outbound) -> Result<PlayerState, ServerError> {
        let (x, y) = self.spawn.sample(&mut rand::thread_rng());
        self.create_at(id, x, y, outbound)
    }

    /// Registers a player at a fixed position.
    ///
    /// Fails with [`ServerError::DuplicatePlayer`] if `id` is already live;
    /// the existing session is left untouched.
    pub fn create_at(
        &mut self,
        id: PlayerId,
        x: f32,
        y: f32,
        outbound: Outbound,
    ) -> Result<PlayerState, ServerError> {
        if self.sessions.contains_key(&id) {
            return Err(ServerError::DuplicatePlayer(id));
        }

        let state = PlayerState::new(id, x, y);
        let joined = self.next_join;
        self.next_join += 1;

        self.sessions.insert(
            id,
            Session {
                state: state.clone(),
                queue: InputQueue::with_limit(self.input_limit),
                outbound,
                joined,
            },
        );
        info!("Player {} joined at ({:.1}, {:.1})", id, x, y);

        Ok(state)
    }

    /// Removes a player. Removing an unknown id is a no-op returning `None`.
    pub fn remove(&mut self, id: &PlayerId) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        info!("Player {} left", id);
        Some(session)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.sessions.get(id).map(|session| &session.state)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Point-in-time copy of every player, in join order.
    pub fn snapshot_all(&self) -> Vec<(PlayerId, PlayerState)> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by_key(|session| session.joined);
        sessions
            .into_iter()
            .map(|session| (session.state.id, session.state.clone()))
            .collect()
    }

    /// Queues one intent. Returns false if it was dropped, either because the
    /// player is unknown or because its queue is full.
    pub fn enqueue(&self, id: &PlayerId, intent: InputIntent) -> bool {
        self.enqueue_batch(id, std::iter::once(intent)) == Some(1)
    }

    /// Queues intents in order. Returns how many were accepted, or `None`
    /// (dropping them all) for an unknown player.
    pub fn enqueue_batch<I>(&self, id: &PlayerId, intents: I) -> Option<usize>
    where
        I: IntoIterator<Item = InputIntent>,
    {
        self.sessions
            .get(id)
            .map(|session| session.queue.push_batch(intents))
    }

    /// Takes every pending intent for `id` in arrival order.
    pub fn drain_all(&self, id: &PlayerId) -> Vec<InputIntent> {
        self.sessions
            .get(id)
            .map(|session| session.queue.drain())
            .unwrap_or_default()
    }

    pub fn last_activity(&self, id: &PlayerId) -> Option<Instant> {
        self.sessions
            .get(id)
            .map(|session| session.queue.last_activity())
    }

    /// Players whose last input is older than `timeout`.
    pub fn idle_players(&self, timeout: Duration) -> Vec<PlayerId> {
        self.sessions
            .iter()
            .filter(|(_, session)| session.queue.last_activity().elapsed() > timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn connections(&self) -> impl Iterator<Item = (PlayerId, &Outbound)> {
        self.sessions
            .iter()
            .map(|(id, session)| (*id, &session.outbound))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
