use serde::{Deserialize, Serialize};
use std::fmt;

/// The observable lifecycle states of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No transport handle exists.
    #[default]
    Disconnected,
    /// A connect attempt has been issued; waiting for the transport to confirm.
    Connecting,
    /// Transport confirmed the session. Turns and metrics flow.
    Connected,
    /// Last attempt or live session failed. Handle released, retry permitted.
    Error,
}

impl SessionStatus {
    /// Terminal states clear conversation and telemetry.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Disconnected | SessionStatus::Error)
    }

    pub fn can_connect(self) -> bool {
        self.is_terminal()
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "Disconnected",
            SessionStatus::Connecting => "Connecting",
            SessionStatus::Connected => "Connected",
            SessionStatus::Error => "Error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Requests that may move the session between states.
/// These are REQUESTS, not forces. The graph decides whether they apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRequest {
    ConnectRequested,
    ConnectFailed,
    TransportConnected,
    TransportDisconnected,
    TransportError,
    DisconnectRequested,
    Shutdown,
}

/// The state machine that governs session transitions.
pub struct StatusGraph;

impl StatusGraph {
    /// Pure function: (Current State, Request) -> New State.
    /// Returns None if the request does not apply in the current state.
    pub fn transition(current: SessionStatus, request: StatusRequest) -> Option<SessionStatus> {
        use SessionStatus::*;
        use StatusRequest::*;

        match (current, request) {
            // --- Connect is only legal from a terminal state ---
            (Disconnected | Error, ConnectRequested) => Some(Connecting),

            // --- From Connecting ---
            (Connecting, TransportConnected) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Error),

            // --- From anywhere ---
            (_, TransportDisconnected) => Some(Disconnected),
            (_, TransportError) => Some(Error),
            (_, DisconnectRequested) => Some(Disconnected),
            (_, Shutdown) => Some(Disconnected),

            _ => None,
        }
    }
}
