use serde::{Deserialize, Serialize};

use crate::kernel::time::{now, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    /// Monotonic across the whole process, never reused after a reset.
    pub id: String,
    pub speaker: Speaker,
    pub text: String,
    pub created_at: Timestamp,
}

/// Append-only record of the conversation, in delivery order.
///
/// Partial user transcripts never become turns. They only raise the
/// `listening` flag until the final transcript arrives.
#[derive(Debug, Default)]
pub struct ConversationLedger {
    turns: Vec<ConversationTurn>,
    listening: bool,
    next_ordinal: u64,
}

impl ConversationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the appended turn, or None for a partial transcript.
    pub fn on_user_utterance(&mut self, text: &str, is_final: bool) -> Option<&ConversationTurn> {
        if !is_final {
            self.listening = true;
            return None;
        }
        self.listening = false;
        Some(self.push(Speaker::User, text))
    }

    pub fn on_agent_utterance(&mut self, text: &str) -> &ConversationTurn {
        self.push(Speaker::Agent, text)
    }

    /// Clears all turns and the listening flag. Ids keep counting.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.listening = false;
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, speaker: Speaker, text: &str) -> &ConversationTurn {
        self.next_ordinal += 1;
        let idx = self.turns.len();
        self.turns.push(ConversationTurn {
            id: format!("turn-{:08}", self.next_ordinal),
            speaker,
            text: text.to_string(),
            created_at: now(),
        });
        &self.turns[idx]
    }
}
