//! RTVI text frames (`{"label": "rtvi-ai", "type": ..., "data": ...}`).

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::kernel::event::TransportEvent;

pub const RTVI_LABEL: &str = "rtvi-ai";
pub const RTVI_PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize)]
struct RtviMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Greeting sent right after the socket opens.
pub fn client_ready() -> String {
    json!({
        "label": RTVI_LABEL,
        "type": "client-ready",
        "id": Uuid::new_v4().to_string(),
        "data": {
            "version": RTVI_PROTOCOL_VERSION,
            "about": {
                "library": env!("CARGO_PKG_NAME"),
                "library_version": env!("CARGO_PKG_VERSION"),
            },
        },
    })
    .to_string()
}

/// Maps one inbound frame to a transport event.
///
/// Returns None for message types the session does not consume. A frame that
/// cannot be decoded, or a transcript without text, becomes `MessageError`.
pub fn decode(text: &str) -> Option<TransportEvent> {
    let message: RtviMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => return Some(TransportEvent::MessageError(format!("undecodable frame: {err}"))),
    };

    match message.kind.as_str() {
        "bot-ready" => Some(TransportEvent::BotReady(message.data)),
        "user-transcription" => Some(match transcript_text(&message.data) {
            Some(text) => {
                let is_final = message.data.get("final").and_then(Value::as_bool).unwrap_or(false);
                TransportEvent::user_transcript(text, is_final)
            }
            None => TransportEvent::MessageError("user-transcription without text".into()),
        }),
        "bot-transcription" => Some(match transcript_text(&message.data) {
            Some(text) => TransportEvent::agent_transcript(text),
            None => TransportEvent::MessageError("bot-transcription without text".into()),
        }),
        "metrics" => Some(TransportEvent::Metrics(message.data)),
        "error" => Some(TransportEvent::Error(error_text(&message.data))),
        "error-response" => Some(TransportEvent::MessageError(error_text(&message.data))),
        _ => None,
    }
}

fn transcript_text(data: &Value) -> Option<&str> {
    data.get("text").and_then(Value::as_str)
}

fn error_text(data: &Value) -> String {
    data.get("error")
        .or_else(|| data.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}
