use serde_json::Value;
use tokio::sync::mpsc;

use crate::kernel::ledger::Speaker;

/// Everything the transport capability can tell the session, as one tagged stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    BotReady(Value),
    Transcript {
        speaker: Speaker,
        text: String,
        is_final: bool,
    },
    /// Raw, untyped metrics bag. Shape is validated by the aggregator, not here.
    Metrics(Value),
    MessageError(String),
    Error(String),
}

impl TransportEvent {
    pub fn user_transcript(text: &str, is_final: bool) -> Self {
        TransportEvent::Transcript {
            speaker: Speaker::User,
            text: text.to_string(),
            is_final,
        }
    }

    pub fn agent_transcript(text: &str) -> Self {
        TransportEvent::Transcript {
            speaker: Speaker::Agent,
            text: text.to_string(),
            is_final: true,
        }
    }
}

/// A transport event stamped with the generation of the handle that emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Operator commands. Nothing else is accepted from outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
}

/// Write end of the event queue handed to each transport handle.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the session loop has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Envelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}
