//! Supervisor Lifecycle State Machine
//!
//! Defines valid lifecycle transitions: Idle -> Connecting -> Running ->
//! Stopping -> Terminated.

use std::fmt;

/// Lifecycle state of the control loop supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Running,
    Stopping,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "Idle",
            LifecycleState::Connecting => "Connecting",
            LifecycleState::Running => "Running",
            LifecycleState::Stopping => "Stopping",
            LifecycleState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Events that can trigger lifecycle transitions
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// start() was called
    StartRequested,
    /// Serial session opened
    Connected,
    /// Serial session or audio stream could not be opened
    StartFailed,
    /// stop() was called
    StopRequested,
    /// Recognition loop joined (or abandoned) and resources released
    Released,
}

/// Result of a state transition attempt
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(LifecycleState),
    /// Transition was invalid from current state
    Invalid {
        from: LifecycleState,
        event: LifecycleEvent,
    },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success(_))
    }
}

#[derive(Debug)]
pub struct LifecycleStateMachine {
    current_state: LifecycleState,
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: LifecycleState::Idle,
        }
    }

    /// Get current state
    pub fn state(&self) -> LifecycleState {
        self.current_state
    }

    /// True once the supervisor can never run again
    pub fn is_terminal(&self) -> bool {
        self.current_state == LifecycleState::Terminated
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        match self.get_next_state(&event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &LifecycleEvent) -> Option<LifecycleState> {
        use LifecycleEvent::*;
        use LifecycleState::*;

        match (self.current_state, event) {
            (Idle, StartRequested) => Some(Connecting),

            (Connecting, Connected) => Some(Running),
            (Connecting, StartFailed) => Some(Terminated),
            // startup abandoned before the loop was launched
            (Connecting, StopRequested) => Some(Stopping),

            (Running, StopRequested) => Some(Stopping),
            (Stopping, Released) => Some(Terminated),

            // Stop before start never runs anything
            (Idle, StopRequested) => Some(Terminated),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = LifecycleStateMachine::new();
        assert_eq!(fsm.state(), LifecycleState::Idle);
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut fsm = LifecycleStateMachine::new();

        let result = fsm.process_event(LifecycleEvent::StartRequested);
        assert!(matches!(result, TransitionResult::Success(LifecycleState::Connecting)));

        let result = fsm.process_event(LifecycleEvent::Connected);
        assert!(matches!(result, TransitionResult::Success(LifecycleState::Running)));

        let result = fsm.process_event(LifecycleEvent::StopRequested);
        assert!(matches!(result, TransitionResult::Success(LifecycleState::Stopping)));

        let result = fsm.process_event(LifecycleEvent::Released);
        assert!(matches!(result, TransitionResult::Success(LifecycleState::Terminated)));
        assert!(fsm.is_terminal());
    }

    #[test]
    fn test_start_failure_terminates() {
        let mut fsm = LifecycleStateMachine::new();
        fsm.process_event(LifecycleEvent::StartRequested);

        let result = fsm.process_event(LifecycleEvent::StartFailed);
        assert!(matches!(result, TransitionResult::Success(LifecycleState::Terminated)));
    }

    #[test]
    fn test_stop_while_connecting_terminates() {
        let mut fsm = LifecycleStateMachine::new();
        fsm.process_event(LifecycleEvent::StartRequested);

        let result = fsm.process_event(LifecycleEvent::StopRequested);
        assert!(matches!(result, TransitionResult::Success(LifecycleState::Stopping)));

        let result = fsm.process_event(LifecycleEvent::Released);
        assert!(matches!(result, TransitionResult::Success(LifecycleState::Terminated)));
    }

    #[test]
    fn test_second_stop_is_invalid() {
        let mut fsm = LifecycleStateMachine::new();
        fsm.process_event(LifecycleEvent::StartRequested);
        fsm.process_event(LifecycleEvent::Connected);
        fsm.process_event(LifecycleEvent::StopRequested);

        let result = fsm.process_event(LifecycleEvent::StopRequested);
        assert!(matches!(
            result,
            TransitionResult::Invalid {
                from: LifecycleState::Stopping,
                ..
            }
        ));
    }

    #[test]
    fn test_terminated_cannot_restart() {
        let mut fsm = LifecycleStateMachine::new();
        fsm.process_event(LifecycleEvent::StopRequested);
        assert!(fsm.is_terminal());

        let result = fsm.process_event(LifecycleEvent::StartRequested);
        assert!(!result.is_success());
        assert_eq!(fsm.state(), LifecycleState::Terminated);
    }
}
