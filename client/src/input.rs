//! Client input management with sequencing and change detection

use shared::{PlayerId, PlayerInput};

/// Raw controls as sampled from an input device or a script.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    pub thrust_forward: bool,
    pub thrust_backward: bool,
    pub rotate_left: bool,
    pub rotate_right: bool,
    /// Held state of the switch control; only presses are forwarded.
    pub switch_vehicle: bool,
    pub thrust_level: f32,
}

/// Anything that can be polled for controls once per frame.
pub trait InputSource: Send {
    fn sample(&mut self, time: f32) -> ControlState;
}

/// Source that never touches the controls.
#[derive(Debug, Default)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn sample(&mut self, _time: f32) -> ControlState {
        ControlState::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub duration: f32,
    pub controls: ControlState,
}

/// Replays a looping list of timed control states.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    steps: Vec<ScriptStep>,
    total: f32,
}

impl ScriptedInput {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        let steps: Vec<ScriptStep> = steps
            .into_iter()
            .filter(|step| step.duration > 0.0 && step.duration.is_finite())
            .collect();
        let total = steps.iter().map(|step| step.duration).sum();
        Self { steps, total }
    }

    /// Lifts off, turns, coasts and comes back around.
    pub fn demo() -> Self {
        let thrust = ControlState {
            thrust_forward: true,
            thrust_level: 1.0,
            ..Default::default()
        };
        let turn = ControlState {
            rotate_right: true,
            thrust_level: 1.0,
            ..Default::default()
        };
        let coast = ControlState {
            thrust_level: 1.0,
            ..Default::default()
        };
        let brake = ControlState {
            thrust_backward: true,
            thrust_level: 0.5,
            ..Default::default()
        };

        Self::new(vec![
            ScriptStep { duration: 1.5, controls: thrust },
            ScriptStep { duration: 0.4, controls: turn },
            ScriptStep { duration: 3.0, controls: coast },
            ScriptStep { duration: 0.8, controls: brake },
            ScriptStep { duration: 2.0, controls: coast },
        ])
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self, time: f32) -> ControlState {
        if self.total <= 0.0 {
            return ControlState::default();
        }
        let mut remaining = time.max(0.0) % self.total;
        for step in &self.steps {
            if remaining < step.duration {
                return step.controls;
            }
            remaining -= step.duration;
        }
        self.steps
            .last()
            .map(|step| step.controls)
            .unwrap_or_default()
    }
}

/// Turns sampled controls into numbered network inputs
pub struct InputManager {
    next_sequence: u32,
    prev_switch: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            prev_switch: false,
        }
    }

    /// Builds the input for one frame. The switch intent is only set on the
    /// frame the switch control goes down.
    pub fn update(
        &mut self,
        controls: &ControlState,
        player_id: PlayerId,
        delta_time: f32,
        client_timestamp: f32,
        server_timestamp: f32,
    ) -> PlayerInput {
        let switch_pressed = controls.switch_vehicle && !self.prev_switch;
        self.prev_switch = controls.switch_vehicle;

        let input = PlayerInput {
            player_id,
            sequence: self.next_sequence,
            thrust_forward: controls.thrust_forward,
            thrust_backward: controls.thrust_backward,
            rotate_left: controls.rotate_left,
            rotate_right: controls.rotate_right,
            switch_vehicle: switch_pressed,
            thrust_level: controls.thrust_level.clamp(0.0, 1.0),
            delta_time,
            client_timestamp,
            server_timestamp,
            client_state: None,
        };

        self.next_sequence = self.next_sequence.wrapping_add(1);
        input
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::new();
        assert_eq!(input_manager.next_sequence, 1);
        assert!(!input_manager.prev_switch);
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut manager = InputManager::new();
        let controls = ControlState::default();
        let first = manager.update(&controls, 1, 0.016, 0.0, 0.0);
        let second = manager.update(&controls, 1, 0.016, 0.016, 0.0);
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(manager.next_sequence, 3);
    }

    #[test]
    fn test_switch_is_edge_triggered() {
        let mut manager = InputManager::new();
        let held = ControlState {
            switch_vehicle: true,
            ..Default::default()
        };
        let released = ControlState::default();

        assert!(manager.update(&held, 1, 0.016, 0.0, 0.0).switch_vehicle);
        assert!(!manager.update(&held, 1, 0.016, 0.0, 0.0).switch_vehicle);
        assert!(!manager.update(&released, 1, 0.016, 0.0, 0.0).switch_vehicle);
        assert!(manager.update(&held, 1, 0.016, 0.0, 0.0).switch_vehicle);
    }

    #[test]
    fn test_thrust_level_clamped() {
        let mut manager = InputManager::new();
        let controls = ControlState {
            thrust_level: 3.0,
            ..Default::default()
        };
        assert_eq!(manager.update(&controls, 1, 0.016, 0.0, 0.0).thrust_level, 1.0);
    }

    #[test]
    fn test_script_loops() {
        let mut script = ScriptedInput::new(vec![
            ScriptStep {
                duration: 1.0,
                controls: ControlState {
                    thrust_forward: true,
                    ..Default::default()
                },
            },
            ScriptStep {
                duration: 1.0,
                controls: ControlState::default(),
            },
        ]);

        assert!(script.sample(0.5).thrust_forward);
        assert!(!script.sample(1.5).thrust_forward);
        assert!(script.sample(2.5).thrust_forward);
    }

    #[test]
    fn test_empty_script_is_idle() {
        let mut script = ScriptedInput::new(Vec::new());
        assert_eq!(script.sample(3.0), ControlState::default());
        assert_eq!(IdleInput.sample(3.0), ControlState::default());
    }
}
