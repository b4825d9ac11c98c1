//! Transcript data model and log file writer
//!
//! The transcript is the ordered, append-only record of a conversation
//! run. Turn indices are assigned on append, so they are strictly
//! increasing with no gaps by construction. The log file carries the
//! message array plus a summary block and is written with the same
//! write-new-then-rename strategy as the cache.

use crate::constants::LOG_FILE_PREFIX;
use crate::llm::Usage;
use crate::usage::UsageAggregator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One turn's contribution plus its bookkeeping. Never mutated after
/// append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub speaker: String,
    pub turn_index: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Model that produced the text; absent for scripted and system
    /// messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub cache_hit: bool,
}

/// Why a run ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The character turn limit was reached.
    TurnLimit,
    /// A character uttered the configured stop phrase.
    StopPhrase,
    /// The word budget was exhausted.
    WordBudget,
    /// The estimated reading time crossed the limit.
    ReadingTime,
    /// The manager judged the meeting goal met.
    GoalReached,
    /// No eligible speaker remained and no termination rule fired.
    NoEligibleSpeaker { detail: String },
    /// A connector failed fatally under the terminate policy.
    ConnectorFailure { speaker: String },
}

/// Summary block persisted alongside the messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSummary {
    /// All transcript entries, system messages included.
    pub total_turns: u64,
    /// Turns taken by characters only.
    pub character_turns: u64,
    pub usage: UsageAggregator,
    pub termination_reason: TerminationReason,
}

/// Ordered sequence of messages owned by exactly one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TranscriptSummary>,
}

impl Transcript {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            summary: None,
        }
    }

    /// Append a message, assigning the next turn index.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        speaker: impl Into<String>,
        text: impl Into<String>,
        model: Option<String>,
        usage: Usage,
        cache_hit: bool,
        timestamp: DateTime<Utc>,
    ) -> &Message {
        let message = Message {
            speaker: speaker.into(),
            turn_index: self.messages.len() as u64,
            text: text.into(),
            timestamp,
            model,
            usage,
            cache_hit,
        };
        self.messages.push(message);
        self.messages.last().expect("just pushed")
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Render the conversation so far as "Speaker: text" lines, optionally
    /// limited to the most recent `window` messages. Pure function of the
    /// message list, so it is safe to fingerprint prompts built from it.
    pub fn conversation_text(&self, window: Option<usize>) -> String {
        let start = match window {
            Some(n) => self.messages.len().saturating_sub(n),
            None => 0,
        };
        self.messages[start..]
            .iter()
            .map(|m| format!("{}: {}", m.speaker, m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Approximate total word count across all messages.
    pub fn word_count(&self) -> u64 {
        self.messages
            .iter()
            .map(|m| m.text.split_whitespace().count() as u64)
            .sum()
    }

    pub fn finalize(&mut self, summary: TranscriptSummary) {
        self.summary = Some(summary);
    }
}

/// Writes a transcript to a timestamped JSON file.
pub struct TranscriptWriter {
    path: PathBuf,
}

impl TranscriptWriter {
    /// Create a writer targeting `<dir>/meeting_log_<timestamp>.json`.
    pub fn create(
        directory: impl AsRef<Path>,
        started_at: DateTime<Utc>,
    ) -> std::io::Result<Self> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;
        let stamp = started_at.format("%Y%m%d_%H%M%S");
        let path = directory.join(format!("{LOG_FILE_PREFIX}_{stamp}.json"));
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole transcript. Called incrementally after each append
    /// when configured, and always once at run completion.
    pub fn write(&self, transcript: &Transcript) -> std::io::Result<()> {
        let payload = serde_json::to_string_pretty(transcript)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), messages = transcript.len(), "transcript flushed");
        Ok(())
    }
}
