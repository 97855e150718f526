//! Per-subscription lifecycle
//!
//! ```text
//! INIT --start--> PENDING --data--> ACTIVE
//! PENDING|ACTIVE --complete--> COMPLETED --release--> CLOSED
//! PENDING|ACTIVE|STOPPING --error--> ERRORED
//! PENDING|ACTIVE --unsubscribe--> STOPPING --complete/grace--> CLOSED
//! ```
//!
//! Terminal states (COMPLETED, ERRORED, CLOSED) never re-enter a live state.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Init,
    Pending,
    Active,
    Stopping,
    Completed,
    Errored,
    Closed,
}

impl SubscriptionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Completed | SubscriptionState::Errored | SubscriptionState::Closed
        )
    }

    /// States where operation frames are routed to listeners
    pub fn accepts_frames(&self) -> bool {
        matches!(self, SubscriptionState::Pending | SubscriptionState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Init => "INIT",
            SubscriptionState::Pending => "PENDING",
            SubscriptionState::Active => "ACTIVE",
            SubscriptionState::Stopping => "STOPPING",
            SubscriptionState::Completed => "COMPLETED",
            SubscriptionState::Errored => "ERRORED",
            SubscriptionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateInput {
    /// Start frame written
    SendStart,
    /// Data frame for this operation
    Data,
    /// Server error frame for this operation
    ServerError,
    /// Operation-scoped decode failure
    DecodeFailure,
    /// Server complete frame
    Complete,
    /// Caller asked to stop
    Unsubscribe,
    /// Stop grace period elapsed without acknowledgement
    StopTimeout,
    /// Stop frame written on a vocabulary with no stop acknowledgement
    StopSent,
    /// Connection-wide failure
    ConnectionError,
    /// Caller no longer holds the subscription
    Release,
    /// Frame kind the vocabulary does not allow for an operation
    UnexpectedFrame,
}

/// An input that is not legal in the current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation {operation_id}: {input:?} is not legal in state {state}")]
pub struct ProtocolError {
    pub operation_id: String,
    pub state: SubscriptionState,
    pub input: StateInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SubscriptionState,
    pub to: SubscriptionState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Transition table; `None` means the input is illegal
pub fn next_state(state: SubscriptionState, input: StateInput) -> Option<SubscriptionState> {
    use StateInput::*;
    use SubscriptionState::*;

    match (state, input) {
        (Init, SendStart) => Some(Pending),

        (Pending | Active, Data) => Some(Active),

        (Pending | Active, Complete) => Some(Completed),
        // Complete while stopping is the server's stop acknowledgement
        (Stopping, Complete | StopTimeout | StopSent) => Some(Closed),

        (Pending | Active | Stopping, ServerError) => Some(Errored),
        (Pending | Active, DecodeFailure) => Some(Errored),

        (Init, Unsubscribe) => Some(Closed),
        (Pending | Active, Unsubscribe) => Some(Stopping),
        (Stopping | Completed | Errored | Closed, Unsubscribe) => Some(state),

        (Init | Pending | Active | Stopping, ConnectionError) => Some(Errored),
        (Completed | Errored | Closed, ConnectionError) => Some(state),

        (Completed, Release) => Some(Closed),
        (Errored | Closed, Release) => Some(state),

        _ => None,
    }
}

/// State of one operation, identified for error reporting
#[derive(Debug, Clone)]
pub struct StateMachine {
    operation_id: String,
    state: SubscriptionState,
}

impl StateMachine {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            state: SubscriptionState::Init,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Apply an input, rejecting it without changing state if illegal
    pub fn apply(&mut self, input: StateInput) -> Result<Transition, ProtocolError> {
        let from = self.state;
        match next_state(from, input) {
            Some(to) => {
                self.state = to;
                Ok(Transition { from, to })
            }
            None => Err(ProtocolError {
                operation_id: self.operation_id.clone(),
                state: from,
                input,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StateInput::*;
    use SubscriptionState::*;

    fn started() -> StateMachine {
        let mut machine = StateMachine::new("op1");
        machine.apply(SendStart).unwrap();
        machine
    }

    #[test]
    fn test_happy_path() {
        let mut machine = started();
        assert_eq!(machine.state(), Pending);

        machine.apply(Data).unwrap();
        machine.apply(Data).unwrap();
        assert_eq!(machine.state(), Active);

        machine.apply(Complete).unwrap();
        assert_eq!(machine.state(), Completed);

        let transition = machine.apply(Release).unwrap();
        assert_eq!(transition.to, Closed);
        assert!(transition.changed());
    }

    #[test]
    fn test_terminal_states_reject_frames() {
        for terminal in [Completed, Errored, Closed] {
            for input in [Data, Complete, DecodeFailure, SendStart] {
                assert_eq!(next_state(terminal, input), None, "{:?} in {:?}", input, terminal);
            }
        }
    }

    #[test]
    fn test_rejection_leaves_state_unchanged() {
        let mut machine = started();
        machine.apply(Complete).unwrap();

        let err = machine.apply(Data).unwrap_err();
        assert_eq!(err.state, Completed);
        assert_eq!(err.input, Data);
        assert_eq!(err.operation_id, "op1");
        assert_eq!(machine.state(), Completed);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut machine = started();
        machine.apply(Unsubscribe).unwrap();
        assert_eq!(machine.state(), Stopping);

        let again = machine.apply(Unsubscribe).unwrap();
        assert!(!again.changed());

        machine.apply(Complete).unwrap();
        assert_eq!(machine.state(), Closed);
        assert!(!machine.apply(Unsubscribe).unwrap().changed());
    }

    #[test]
    fn test_stop_grace_timeout_closes() {
        let mut machine = started();
        machine.apply(Unsubscribe).unwrap();
        machine.apply(StopTimeout).unwrap();
        assert_eq!(machine.state(), Closed);
    }

    #[test]
    fn test_data_while_stopping_is_rejected() {
        let mut machine = started();
        machine.apply(Unsubscribe).unwrap();
        assert!(machine.apply(Data).is_err());
        assert_eq!(machine.state(), Stopping);
    }

    #[test]
    fn test_connection_error_from_every_live_state() {
        for live in [Init, Pending, Active, Stopping] {
            assert_eq!(next_state(live, ConnectionError), Some(Errored));
        }
        assert_eq!(next_state(Completed, ConnectionError), Some(Completed));
    }

    #[test]
    fn test_errored_survives_release() {
        let mut machine = started();
        machine.apply(ServerError).unwrap();
        machine.apply(Release).unwrap();
        assert_eq!(machine.state(), Errored);
    }

    #[test]
    fn test_unsubscribe_before_start_closes() {
        let mut machine = StateMachine::new("op9");
        machine.apply(Unsubscribe).unwrap();
        assert_eq!(machine.state(), Closed);
        assert!(machine.apply(SendStart).is_err());
    }

    #[test]
    fn test_unexpected_frame_always_rejected() {
        for state in [Init, Pending, Active, Stopping, Completed, Errored, Closed] {
            assert_eq!(next_state(state, UnexpectedFrame), None);
        }
    }
}
