use crate::types::{ActuationCommand, BlindState, Direction};

pub const DEFAULT_BLIND_STEPS: u32 = 512;

/// ULN2003 coil patterns for IN1..IN4, bit 3 = IN1. Walking the table forward
/// opens the blind, walking it backward closes it.
pub const COIL_SEQUENCE: [u8; 4] = [0b1100, 0b0110, 0b0011, 0b1001];

/// Remembers the last commanded blind state and turns measurement/goal pairs
/// into actuation commands.
#[derive(Debug, Clone)]
pub struct BlindStateMachine {
    current: BlindState,
    steps: u32,
}

impl Default for BlindStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl BlindStateMachine {
    pub fn new() -> Self {
        Self::with_steps(DEFAULT_BLIND_STEPS)
    }

    pub fn with_steps(steps: u32) -> Self {
        Self {
            current: BlindState::Unknown,
            steps,
        }
    }

    pub fn state(&self) -> BlindState {
        self.current
    }

    /// Above the goal opens, below closes, exactly equal keeps the last state.
    /// A command is only emitted when the desired state differs from the
    /// current one, so repeated evaluations never re-actuate.
    pub fn decide(&mut self, measurement: f64, goal: f64) -> Option<ActuationCommand> {
        let desired = if measurement > goal {
            BlindState::Open
        } else if measurement < goal {
            BlindState::Closed
        } else {
            self.current
        };

        if desired == self.current {
            return None;
        }

        let direction = match desired {
            BlindState::Open => Direction::Open,
            BlindState::Closed => Direction::Close,
            BlindState::Unknown => return None,
        };
        self.current = desired;
        Some(ActuationCommand {
            direction,
            steps: self.steps,
        })
    }
}

/// Coil patterns for one full step in `direction`.
pub fn coil_patterns(direction: Direction) -> [u8; 4] {
    let mut patterns = COIL_SEQUENCE;
    if direction == Direction::Close {
        patterns.reverse();
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn machine_in(state: BlindState) -> BlindStateMachine {
        let mut machine = BlindStateMachine::new();
        machine.current = state;
        machine
    }

    #[test]
    fn below_goal_closes_from_unknown() {
        let mut machine = BlindStateMachine::new();
        assert_eq!(machine.state(), BlindState::Unknown);

        let command = machine.decide(50.0, 100.0);

        assert_eq!(
            command,
            Some(ActuationCommand {
                direction: Direction::Close,
                steps: 512,
            })
        );
        assert_eq!(machine.state(), BlindState::Closed);
    }

    #[test]
    fn repeated_decision_is_idempotent() {
        let mut machine = BlindStateMachine::new();
        assert!(machine.decide(50.0, 100.0).is_some());
        assert_eq!(machine.decide(50.0, 100.0), None);
        assert_eq!(machine.decide(75.0, 100.0), None);
        assert_eq!(machine.state(), BlindState::Closed);
    }

    #[test]
    fn crossing_the_goal_opens() {
        let mut machine = BlindStateMachine::new();
        let _ = machine.decide(50.0, 100.0);

        let command = machine.decide(150.0, 100.0);

        assert_eq!(
            command,
            Some(ActuationCommand {
                direction: Direction::Open,
                steps: 512,
            })
        );
        assert_eq!(machine.state(), BlindState::Open);
    }

    #[test]
    fn equality_never_changes_state() {
        for state in [BlindState::Open, BlindState::Closed, BlindState::Unknown] {
            let mut machine = machine_in(state);
            assert_eq!(machine.decide(100.0, 100.0), None);
            assert_eq!(machine.state(), state);
        }
    }

    #[test]
    fn nan_measurement_holds_state() {
        let mut machine = machine_in(BlindState::Open);
        assert_eq!(machine.decide(f64::NAN, 100.0), None);
        assert_eq!(machine.state(), BlindState::Open);
    }

    #[test]
    fn configured_step_count_is_used() {
        let mut machine = BlindStateMachine::with_steps(64);
        assert_eq!(machine.decide(200.0, 100.0).map(|cmd| cmd.steps), Some(64));
    }

    #[test]
    fn close_walks_the_sequence_backwards() {
        assert_eq!(coil_patterns(Direction::Open), [0b1100, 0b0110, 0b0011, 0b1001]);
        assert_eq!(coil_patterns(Direction::Close), [0b1001, 0b0011, 0b0110, 0b1100]);
    }
}
