use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::kernel::time::Timestamp;

/// Bucket for samples whose processor is missing, non-string or blank.
pub const UNKNOWN_PROCESSOR: &str = "unknown";

/// Known metric kinds plus an open variant for anything the agent adds later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Ttfb,
    Processing,
    Tokens,
    Characters,
    Other(String),
}

impl MetricKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "ttfb" => MetricKind::Ttfb,
            "processing" => MetricKind::Processing,
            "tokens" => MetricKind::Tokens,
            "characters" => MetricKind::Characters,
            other => MetricKind::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MetricKind::Ttfb => "ttfb",
            MetricKind::Processing => "processing",
            MetricKind::Tokens => "tokens",
            MetricKind::Characters => "characters",
            MetricKind::Other(name) => name,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for MetricKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Token sub-components reported by language-generation stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TokenUsage {
    pub completion: f64,
    pub prompt: f64,
    pub total: f64,
}

/// Kind-specific part of a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum EntryDetail {
    /// ttfb / processing / characters: the value is the whole sample.
    Sample,
    Tokens(TokenUsage),
    /// Unknown kinds keep every field except `processor` and `value`.
    Opaque(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEntry {
    pub processor: String,
    /// None when the payload carried no numeric value.
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub detail: EntryDetail,
}

impl MetricEntry {
    /// Lenient decode: never fails, only normalizes.
    pub fn from_value(kind: &MetricKind, raw: &Value) -> Self {
        let processor = normalize_processor(raw.get("processor"));
        let model = raw.get("model").and_then(Value::as_str).map(str::to_string);

        match kind {
            MetricKind::Tokens => {
                let usage = token_usage(raw);
                MetricEntry {
                    processor,
                    value: Some(usage.total),
                    model,
                    detail: EntryDetail::Tokens(usage),
                }
            }
            MetricKind::Other(_) => {
                let fields = raw
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter(|(key, _)| key.as_str() != "processor" && key.as_str() != "value")
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                MetricEntry {
                    processor,
                    value: numeric(raw.get("value")),
                    model,
                    detail: EntryDetail::Opaque(fields),
                }
            }
            _ => MetricEntry {
                processor,
                value: numeric(raw.get("value")),
                model,
                detail: EntryDetail::Sample,
            },
        }
    }
}

/// All entries of one kind inside a single metrics message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricBatch {
    pub kind: MetricKind,
    pub entries: Vec<MetricEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawMetricEvent {
    pub id: String,
    pub received_at: Timestamp,
    pub batches: Vec<MetricBatch>,
}

impl RawMetricEvent {
    /// Decodes a raw metrics bag (`kind -> [entry, ...]`).
    ///
    /// Kinds whose value is not a list are dropped here; a bag that is not an
    /// object yields an event with no batches.
    pub fn from_bag(bag: &Value, received_at: Timestamp) -> Self {
        let batches = bag
            .as_object()
            .map(|kinds| {
                kinds
                    .iter()
                    .filter_map(|(name, value)| {
                        let entries = value.as_array()?;
                        let kind = MetricKind::from_name(name);
                        let entries = entries
                            .iter()
                            .map(|raw| MetricEntry::from_value(&kind, raw))
                            .collect();
                        Some(MetricBatch { kind, entries })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4().to_string(),
            received_at,
            batches,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.batches.iter().map(|b| b.entries.len()).sum()
    }
}

pub fn normalize_processor(raw: Option<&Value>) -> String {
    match raw.and_then(Value::as_str).map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_PROCESSOR.to_string(),
    }
}

fn numeric(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}

// Token fields may sit on the entry itself or inside an object-valued `value`.
fn token_usage(raw: &Value) -> TokenUsage {
    let nested = raw.get("value").filter(|v| v.is_object());
    let field = |name: &str| {
        numeric(raw.get(name)).or_else(|| numeric(nested.and_then(|n| n.get(name))))
    };

    let completion = field("completion_tokens").unwrap_or(0.0);
    let prompt = field("prompt_tokens").unwrap_or(0.0);
    let total = field("total_tokens")
        .or_else(|| numeric(raw.get("value")))
        .unwrap_or(completion + prompt);

    TokenUsage { completion, prompt, total }
}
