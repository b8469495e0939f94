//! Response Listener Lifecycle
//!
//! Defines valid lifecycle transitions for the response listener:
//! ```text
//! Idle --Start--> Listening --Stop--> Stopped --Start--> Listening
//! ```
//! There is no way back to `Idle`; a stopped listener restarts fresh.

/// Lifecycle state of a response listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerState {
    /// Never started
    #[default]
    Idle,
    /// Socket bound and receive loop running
    Listening,
    /// Socket closed and receive loop joined
    Stopped,
}

/// Events that can trigger lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    /// Socket bound and receive loop spawned
    Started,
    /// Stop requested by the owner
    StopRequested,
    /// Receive loop ended on its own (socket error)
    LoopEnded,
}

/// Result of a lifecycle transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ListenerState),
    /// Event does not change anything in the current state
    Unchanged(ListenerState),
    /// Transition was invalid from current state
    Invalid { from: ListenerState, event: ListenerEvent },
}

/// The lifecycle state machine for the response listener
#[derive(Debug, Default)]
pub struct ListenerLifecycle {
    current_state: ListenerState,
    /// Number of times the listener has entered `Listening`
    starts: u32,
}

impl ListenerLifecycle {
    /// Create a new lifecycle in Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> ListenerState {
        self.current_state
    }

    /// How many times the listener has been started
    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn is_listening(&self) -> bool {
        self.current_state == ListenerState::Listening
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ListenerEvent) -> TransitionResult {
        use ListenerEvent::*;
        use ListenerState::*;

        let next = match (self.current_state, event) {
            (Idle | Stopped, Started) => Some(Listening),

            // A loop that died on its own is already stopped as far as
            // the owner is concerned; stop() still has to join it
            (Listening, StopRequested | LoopEnded) => Some(Stopped),

            // Stopping something that never ran is a no-op
            (Idle | Stopped, StopRequested | LoopEnded) => {
                return TransitionResult::Unchanged(self.current_state);
            }

            (Listening, Started) => None,
        };

        match next {
            Some(state) => {
                if state == Listening {
                    self.starts += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }
}
