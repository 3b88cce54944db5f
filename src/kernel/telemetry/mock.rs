use chrono::Duration;
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::kernel::time::Timestamp;

pub const MOCK_PROCESSORS: [&str; 3] = ["openai-llm", "elevenlabs-tts", "whisper-stt"];
const SPACING_MS: i64 = 3_000;

/// Plausible metrics traffic for demos and tests: one candidate message every
/// three seconds, each kind present with its own probability. Empty messages
/// are skipped, so fewer than `count` bags may come back.
pub fn generate_mock_metrics<R: Rng>(rng: &mut R, start: Timestamp, count: usize) -> Vec<(Timestamp, Value)> {
    let mut out = Vec::with_capacity(count);

    for i in 0..count {
        let at = start + Duration::milliseconds(SPACING_MS * i as i64);
        let mut bag = Map::new();

        if rng.gen::<f64>() > 0.7 {
            bag.insert(
                "ttfb".into(),
                json!([{ "processor": pick(rng), "value": rng.gen_range(50.0..250.0) }]),
            );
        }

        if rng.gen::<f64>() > 0.4 {
            bag.insert(
                "processing".into(),
                json!([{ "processor": pick(rng), "value": rng.gen_range(200.0..1700.0) }]),
            );
        }

        if rng.gen::<f64>() > 0.6 {
            let completion: u64 = rng.gen_range(20..170);
            let prompt: u64 = rng.gen_range(30..130);
            bag.insert(
                "tokens".into(),
                json!([{
                    "processor": "openai-llm",
                    "value": completion + prompt,
                    "completion_tokens": completion,
                    "prompt_tokens": prompt,
                    "total_tokens": completion + prompt,
                }]),
            );
        }

        if rng.gen::<f64>() > 0.5 {
            bag.insert(
                "characters".into(),
                json!([{ "processor": "elevenlabs-tts", "value": rng.gen_range(50..250) }]),
            );
        }

        if !bag.is_empty() {
            out.push((at, Value::Object(bag)));
        }
    }

    out
}

fn pick<R: Rng>(rng: &mut R) -> &'static str {
    MOCK_PROCESSORS[rng.gen_range(0..MOCK_PROCESSORS.len())]
}
