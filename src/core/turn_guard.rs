//! Keeps at most one turn in flight.
//!
//! Input that arrives while a turn is running (or still winding down after a
//! cancel) is rejected rather than queued; the caller shows the rejection
//! message to the user.

use std::fmt;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    TurnInFlight,
    Cancelling,
}

#[derive(Debug, Clone)]
pub struct TurnTicket {
    pub turn_id: u64,
    pub cancel_token: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRejected {
    Busy,
    Cancelling,
}

impl fmt::Display for TurnRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRejected::Busy => write!(
                f,
                "A response is still in progress. Press Esc to cancel it first."
            ),
            TurnRejected::Cancelling => {
                write!(f, "Cancelling the current response, please wait.")
            }
        }
    }
}

impl std::error::Error for TurnRejected {}

#[derive(Debug)]
struct GuardState {
    phase: TurnPhase,
    current_id: u64,
    cancel_token: Option<CancellationToken>,
}

#[derive(Debug)]
pub struct TurnGuard {
    state: Mutex<GuardState>,
}

impl Default for TurnGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnGuard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GuardState {
                phase: TurnPhase::Idle,
                current_id: 0,
                cancel_token: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> TurnPhase {
        self.lock().phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == TurnPhase::Idle
    }

    pub fn try_begin(&self) -> Result<TurnTicket, TurnRejected> {
        let mut state = self.lock();
        match state.phase {
            TurnPhase::TurnInFlight => Err(TurnRejected::Busy),
            TurnPhase::Cancelling => Err(TurnRejected::Cancelling),
            TurnPhase::Idle => {
                state.current_id += 1;
                let cancel_token = CancellationToken::new();
                state.phase = TurnPhase::TurnInFlight;
                state.cancel_token = Some(cancel_token.clone());
                debug!(turn_id = state.current_id, "Turn started");
                Ok(TurnTicket {
                    turn_id: state.current_id,
                    cancel_token,
                })
            }
        }
    }

    /// Requests cancellation of the in-flight turn. Returns `true` when a
    /// running turn was asked to stop.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        if state.phase != TurnPhase::TurnInFlight {
            return false;
        }
        state.phase = TurnPhase::Cancelling;
        if let Some(token) = &state.cancel_token {
            token.cancel();
        }
        debug!(turn_id = state.current_id, "Turn cancellation requested");
        true
    }

    /// Marks the turn finished. Ids from earlier turns are ignored.
    pub fn finish(&self, turn_id: u64) {
        let mut state = self.lock();
        if turn_id != state.current_id || state.phase == TurnPhase::Idle {
            return;
        }
        state.phase = TurnPhase::Idle;
        state.cancel_token = None;
        debug!(turn_id, "Turn finished");
    }

    pub fn shutdown(&self) {
        let mut state = self.lock();
        if let Some(token) = state.cancel_token.take() {
            token.cancel();
        }
        if state.phase != TurnPhase::Idle {
            state.phase = TurnPhase::Cancelling;
        }
    }
}
