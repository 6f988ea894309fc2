//! In-memory session state machine.
//!
//! The machine enforces the transition table of [`SessionState`] and keeps
//! a bounded history for diagnostics. Persistence is not its concern: the
//! session runner commits each transition to the durable store before
//! calling [`StateMachine::transition_to`].
//!
//! # Valid Transitions
//!
//! - Idle → Auth → SessionStart → Monitor → Processing → Sync → Idle
//! - Auth → Idle (card rejected)
//!
//! ```
//! use stockroom_controller::StateMachine;
//! use stockroom_core::SessionState;
//!
//! let mut machine = StateMachine::new();
//! machine.transition_to(SessionState::Auth).unwrap();
//! assert!(machine.transition_to(SessionState::Monitor).is_err());
//! assert_eq!(machine.current_state(), &SessionState::Auth);
//! ```
//!
//! For crash recovery the machine can start mid-flow:
//!
//! ```
//! use stockroom_controller::StateMachine;
//! use stockroom_core::SessionState;
//!
//! let machine = StateMachine::builder()
//!     .with_initial_state(SessionState::Monitor)
//!     .build();
//! assert!(machine.is_busy());
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use stockroom_core::{Error, Result, SessionState};
use tokio::time::Instant;

/// Maximum number of state transitions to keep in history.
///
/// A full visit is six transitions, so this covers the last sixteen
/// sessions.
const MAX_HISTORY_SIZE: usize = 100;

/// A single state transition with its monotonic timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: SessionState, to: SessionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// State machine for one door's session flow.
///
/// Not thread-safe; the supervisor guards it, together with the rest of the
/// session runner, with a `tokio::sync::Mutex`.
#[derive(Debug)]
pub struct StateMachine {
    current_state: SessionState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::default()
    }

    pub fn current_state(&self) -> &SessionState {
        &self.current_state
    }

    /// Returns `true` unless the machine is idle.
    pub fn is_busy(&self) -> bool {
        self.current_state != SessionState::Idle
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Get the last N state transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` and leaves the machine
    /// unchanged if the table does not allow the move.
    pub fn transition_to(&mut self, new_state: SessionState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Force the machine back to Idle regardless of the current state.
    ///
    /// Used after a session pipeline aborted on a storage failure.
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.current_state, SessionState::Idle);
        self.perform_state_change(SessionState::Idle, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: SessionState, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();

        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing `StateMachine` instances, e.g. when resuming a
/// session found in the store at startup.
#[derive(Debug)]
pub struct StateMachineBuilder {
    initial_state: SessionState,
}

impl StateMachineBuilder {
    pub fn with_initial_state(mut self, state: SessionState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn build(self) -> StateMachine {
        StateMachine {
            current_state: self.initial_state,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }
}

impl Default for StateMachineBuilder {
    fn default() -> Self {
        Self {
            initial_state: SessionState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FULL_VISIT: [SessionState; 6] = [
        SessionState::Auth,
        SessionState::SessionStart,
        SessionState::Monitor,
        SessionState::Processing,
        SessionState::Sync,
        SessionState::Idle,
    ];

    #[test]
    fn test_new_machine_starts_idle() {
        let machine = StateMachine::new();
        assert_eq!(machine.current_state(), &SessionState::Idle);
        assert!(!machine.is_busy());
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_full_visit() {
        let mut machine = StateMachine::new();
        for state in FULL_VISIT {
            machine.transition_to(state).unwrap();
        }

        assert_eq!(machine.current_state(), &SessionState::Idle);
        assert_eq!(machine.history().len(), FULL_VISIT.len());
        assert_eq!(machine.history()[0].from, SessionState::Idle);
        assert_eq!(machine.history()[0].to, SessionState::Auth);
    }

    #[test]
    fn test_rejected_card_returns_to_idle() {
        let mut machine = StateMachine::new();
        machine.transition_to(SessionState::Auth).unwrap();
        machine.transition_to(SessionState::Idle).unwrap();
        assert!(!machine.is_busy());
    }

    #[rstest]
    #[case(SessionState::Idle, SessionState::Monitor)]
    #[case(SessionState::Idle, SessionState::SessionStart)]
    #[case(SessionState::Auth, SessionState::Processing)]
    #[case(SessionState::SessionStart, SessionState::Idle)]
    #[case(SessionState::Monitor, SessionState::Sync)]
    #[case(SessionState::Monitor, SessionState::Auth)]
    #[case(SessionState::Processing, SessionState::Idle)]
    #[case(SessionState::Sync, SessionState::Auth)]
    fn test_invalid_transitions_leave_state_unchanged(
        #[case] from: SessionState,
        #[case] to: SessionState,
    ) {
        let mut machine = StateMachine::builder().with_initial_state(from).build();

        let result = machine.transition_to(to);
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { .. })
        ));
        assert_eq!(machine.current_state(), &from);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = StateMachine::new();
        for _ in 0..30 {
            for state in FULL_VISIT {
                machine.transition_to(state).unwrap();
            }
        }

        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        let last = machine.last_transitions(2);
        assert_eq!(last[0].to, SessionState::Sync);
        assert_eq!(last[1].to, SessionState::Idle);
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut machine = StateMachine::builder()
            .with_initial_state(SessionState::Processing)
            .build();

        let transition = machine.reset();
        assert_eq!(transition.from, SessionState::Processing);
        assert_eq!(machine.current_state(), &SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_in_state_follows_tokio_clock() {
        let machine = StateMachine::new();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(machine.time_in_current_state() >= Duration::from_secs(5));
    }
}
