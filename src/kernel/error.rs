use std::fmt;
use thiserror::Error;

use crate::services::transport::TransportError;

/// Which half of a connect attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    DeviceInit,
    Open,
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectStage::DeviceInit => f.write_str("device initialization"),
            ConnectStage::Open => f.write_str("session open"),
        }
    }
}

/// Session failures. None of these leave the controller: each one becomes a
/// log line plus a state transition.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Error connecting ({stage}): {source}")]
    ConnectFailure {
        stage: ConnectStage,
        #[source]
        source: TransportError,
    },

    #[error("Error disconnecting: {0}")]
    DisconnectFailure(#[source] TransportError),

    #[error("Message error: {0}")]
    ProtocolMessage(String),

    #[error("Transport error: {0}")]
    Transport(String),
}
