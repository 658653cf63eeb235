//! Fixed-step movement integration.
//!
//! Each tick drains every player's queue and applies the intents in arrival
//! order. An intent overwrites velocity outright (no blending with earlier
//! intents of the same tick) and advances position by one full step. Friction
//! is applied once per tick after all intents, however many there were.

use crate::config::{AckPolicy, ServerConfig};
use crate::registry::{PlayerState, SessionRegistry};
use shared::InputIntent;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Fixed step in seconds.
    pub dt: f32,
    pub speed: f32,
    pub friction: f32,
    pub ack_policy: AckPolicy,
}

impl From<&ServerConfig> for SimParams {
    fn from(config: &ServerConfig) -> Self {
        Self {
            dt: config.dt(),
            speed: config.speed,
            friction: config.friction,
            ack_policy: config.ack_policy,
        }
    }
}

/// What one call to [`step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub players: usize,
    pub intents: usize,
}

/// Clamps one input axis to `[-1, 1]`. NaN counts as no input.
pub fn clamp_axis(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Applies one tick's worth of intents to a single player.
pub fn integrate(state: &mut PlayerState, intents: &[InputIntent], params: &SimParams) {
    for intent in intents {
        state.vx = clamp_axis(intent.dx) * params.speed;
        state.vy = clamp_axis(intent.dy) * params.speed;

        state.x += state.vx * params.dt;
        state.y += state.vy * params.dt;

        state.last_seq_processed = next_ack(state.last_seq_processed, intent.seq, params.ack_policy);
    }

    state.vx *= params.friction;
    state.vy *= params.friction;
}

fn next_ack(current: u64, seq: u64, policy: AckPolicy) -> u64 {
    match policy {
        // seq 0 means the client sent none, keep what we have
        AckPolicy::LastApplied if seq == 0 => current,
        AckPolicy::LastApplied => seq,
        AckPolicy::Highest => current.max(seq),
    }
}

/// Runs one simulation step over every registered player.
///
/// Requires exclusive access to the registry, so membership cannot change
/// while a step is in flight.
pub fn step(registry: &mut SessionRegistry, params: &SimParams) -> StepReport {
    let mut report = StepReport::default();

    for session in registry.sessions_mut() {
        let intents = session.queue.drain();
        integrate(&mut session.state, &intents, params);

        report.players += 1;
        report.intents += intents.len();
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Outbound;
    use crate::config::SpawnRegion;
    use assert_approx_eq::assert_approx_eq;
    use shared::PlayerId;

    fn params(ack_policy: AckPolicy) -> SimParams {
        SimParams {
            dt: 0.05,
            speed: 180.0,
            friction: 0.9,
            ack_policy,
        }
    }

    fn player() -> PlayerState {
        PlayerState::new(PlayerId::new(), 100.0, 100.0)
    }

    fn intent(seq: u64, dx: f32, dy: f32) -> InputIntent {
        InputIntent::new(seq, dx, dy, 0)
    }

    #[test]
    fn test_single_intent_moves_and_decays() {
        let params = params(AckPolicy::LastApplied);
        let mut state = player();

        integrate(&mut state, &[intent(1, 1.0, 0.0)], &params);

        assert_approx_eq!(state.x, 100.0 + 180.0 * 0.05, 1e-3);
        assert_approx_eq!(state.y, 100.0, 1e-4);
        assert_approx_eq!(state.vx, 180.0 * 0.9, 1e-3);
        assert_approx_eq!(state.vy, 0.0);
        assert_eq!(state.last_seq_processed, 1);
    }

    #[test]
    fn test_friction_applied_once_without_input() {
        let params = params(AckPolicy::LastApplied);
        let mut state = player();
        state.vx = 50.0;
        state.vy = -20.0;

        integrate(&mut state, &[], &params);

        assert_approx_eq!(state.vx, 45.0, 1e-4);
        assert_approx_eq!(state.vy, -18.0, 1e-4);
        // Residual velocity is reported but does not move the player
        assert_approx_eq!(state.x, 100.0);
        assert_eq!(state.last_seq_processed, 0);
    }

    #[test]
    fn test_friction_applied_once_with_many_intents() {
        let params = params(AckPolicy::LastApplied);
        let mut state = player();

        let intents: Vec<InputIntent> = (1..=10).map(|seq| intent(seq, 0.0, 1.0)).collect();
        integrate(&mut state, &intents, &params);

        assert_approx_eq!(state.vy, 180.0 * 0.9, 1e-3);
        assert_approx_eq!(state.y, 100.0 + 10.0 * 180.0 * 0.05, 1e-3);
        assert_eq!(state.last_seq_processed, 10);
    }

    #[test]
    fn test_last_intent_wins_velocity_but_all_move() {
        let params = params(AckPolicy::LastApplied);
        let mut state = player();

        integrate(
            &mut state,
            &[intent(1, 1.0, 0.0), intent(2, -1.0, 0.0), intent(3, 0.0, 1.0)],
            &params,
        );

        // +9, -9 on x, then +9 on y
        assert_approx_eq!(state.x, 100.0, 1e-4);
        assert_approx_eq!(state.y, 109.0, 1e-4);
        assert_approx_eq!(state.vx, 0.0);
        assert_approx_eq!(state.vy, 162.0, 1e-3);
    }

    #[test]
    fn test_axes_are_clamped() {
        let params = params(AckPolicy::LastApplied);

        for (dx, dy) in [(5.0, -7.0), (-100.0, 2.5), (f32::INFINITY, f32::NEG_INFINITY), (1e30, -1e30)] {
            let mut state = player();
            integrate(&mut state, &[intent(1, dx, dy)], &params);

            assert!(state.vx.abs() <= params.speed, "vx {} for dx {}", state.vx, dx);
            assert!(state.vy.abs() <= params.speed, "vy {} for dy {}", state.vy, dy);
            assert!((state.x - 100.0).abs() <= params.speed * params.dt + 1e-3);
            assert!((state.y - 100.0).abs() <= params.speed * params.dt + 1e-3);
        }
    }

    #[test]
    fn test_nan_axis_is_no_input() {
        assert_eq!(clamp_axis(f32::NAN), 0.0);
        assert_eq!(clamp_axis(0.5), 0.5);
        assert_eq!(clamp_axis(-3.0), -1.0);
    }

    #[test]
    fn test_last_applied_ack_can_move_backward() {
        let params = params(AckPolicy::LastApplied);
        let mut state = player();

        integrate(&mut state, &[intent(5, 0.0, 0.0), intent(3, 0.0, 0.0)], &params);
        assert_eq!(state.last_seq_processed, 3);

        integrate(&mut state, &[intent(2, 0.0, 0.0)], &params);
        assert_eq!(state.last_seq_processed, 2);
    }

    #[test]
    fn test_last_applied_ack_ignores_missing_seq() {
        let params = params(AckPolicy::LastApplied);
        let mut state = player();

        integrate(&mut state, &[intent(4, 1.0, 0.0), intent(0, 1.0, 0.0)], &params);
        assert_eq!(state.last_seq_processed, 4);
    }

    #[test]
    fn test_highest_ack_never_moves_backward() {
        let params = params(AckPolicy::Highest);
        let mut state = player();

        integrate(&mut state, &[intent(5, 0.0, 0.0), intent(3, 0.0, 0.0)], &params);
        assert_eq!(state.last_seq_processed, 5);

        integrate(&mut state, &[intent(2, 0.0, 0.0)], &params);
        assert_eq!(state.last_seq_processed, 5);

        integrate(&mut state, &[intent(9, 0.0, 0.0)], &params);
        assert_eq!(state.last_seq_processed, 9);
    }

    #[test]
    fn test_step_drains_every_player() {
        let params = params(AckPolicy::LastApplied);
        let mut registry = SessionRegistry::new(SpawnRegion::default());
        let a = PlayerId::new();
        let b = PlayerId::new();
        registry.create_at(a, 0.0, 0.0, Outbound::channel(1).0).unwrap();
        registry.create_at(b, 0.0, 0.0, Outbound::channel(1).0).unwrap();

        registry.enqueue_batch(&a, vec![intent(1, 1.0, 0.0), intent(2, 1.0, 0.0)]);

        let report = step(&mut registry, &params);
        assert_eq!(report, StepReport { players: 2, intents: 2 });

        assert_approx_eq!(registry.get(&a).unwrap().x, 18.0, 1e-4);
        assert_eq!(registry.get(&a).unwrap().last_seq_processed, 2);
        assert_eq!(registry.get(&b).unwrap().x, 0.0);

        // Consumed exactly once
        let report = step(&mut registry, &params);
        assert_eq!(report.intents, 0);
        assert_approx_eq!(registry.get(&a).unwrap().x, 18.0, 1e-4);
    }

    #[test]
    fn test_params_from_config() {
        let config = ServerConfig {
            tick_rate: 10,
            speed: 50.0,
            friction: 0.5,
            ack_policy: AckPolicy::Highest,
            ..ServerConfig::default()
        };
        let params = SimParams::from(&config);
        assert_approx_eq!(params.dt, 0.1);
        assert_eq!(params.speed, 50.0);
        assert_eq!(params.friction, 0.5);
        assert_eq!(params.ack_policy, AckPolicy::Highest);
    }
}
