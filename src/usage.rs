//! Usage and metrics aggregation
//!
//! Accumulates token usage per speaker and for the whole run, plus cache
//! and connector counters. Purely additive; the transcript serializer
//! reads a snapshot for the persisted summary.

use crate::llm::Usage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-speaker accumulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeakerUsage {
    pub turns: u64,
    pub usage: Usage,
}

/// Run-wide usage accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageAggregator {
    pub totals: Usage,
    pub per_speaker: BTreeMap<String, SpeakerUsage>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Individual generation attempts, including retried ones.
    pub connector_calls: u64,
    /// Attempts beyond the first for any turn.
    pub retries: u64,
    /// Turns whose generation failed after exhausting the retry budget.
    pub connector_failures: u64,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a spoken turn and its usage.
    pub fn record_turn(&mut self, speaker: &str, usage: &Usage) {
        self.totals.accumulate(usage);
        let entry = self.per_speaker.entry(speaker.to_string()).or_default();
        entry.turns += 1;
        entry.usage.accumulate(usage);
    }

    /// Record usage that did not produce a transcript turn, such as a
    /// manager nomination.
    pub fn record_overhead(&mut self, speaker: &str, usage: &Usage) {
        self.totals.accumulate(usage);
        self.per_speaker
            .entry(speaker.to_string())
            .or_default()
            .usage
            .accumulate(usage);
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    /// Record the attempts a successful generation took.
    pub fn record_attempts(&mut self, attempts: u32) {
        self.connector_calls += attempts as u64;
        self.retries += attempts.saturating_sub(1) as u64;
    }

    pub fn record_failure(&mut self) {
        self.connector_failures += 1;
    }

    /// Read-only copy for the transcript summary.
    pub fn snapshot(&self) -> UsageAggregator {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(total: u64) -> Usage {
        Usage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
            latency_ms: 10,
        }
    }

    #[test]
    fn turns_accumulate_per_speaker_and_in_totals() {
        let mut agg = UsageAggregator::new();
        agg.record_turn("Aria", &usage(30));
        agg.record_turn("Bran", &usage(10));
        agg.record_turn("Aria", &usage(20));

        assert_eq!(agg.totals.total_tokens, 60);
        assert_eq!(agg.per_speaker["Aria"].turns, 2);
        assert_eq!(agg.per_speaker["Aria"].usage.total_tokens, 50);
        assert_eq!(agg.per_speaker["Bran"].turns, 1);
    }

    #[test]
    fn overhead_counts_tokens_but_not_turns() {
        let mut agg = UsageAggregator::new();
        agg.record_overhead("Manager", &usage(12));

        assert_eq!(agg.totals.total_tokens, 12);
        assert_eq!(agg.per_speaker["Manager"].turns, 0);
        assert_eq!(agg.per_speaker["Manager"].usage.total_tokens, 12);
    }

    #[test]
    fn attempts_split_into_calls_and_retries() {
        let mut agg = UsageAggregator::new();
        agg.record_attempts(3);
        agg.record_attempts(1);

        assert_eq!(agg.connector_calls, 4);
        assert_eq!(agg.retries, 2);
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let mut agg = UsageAggregator::new();
        agg.record_cache_hit();
        let snap = agg.snapshot();
        agg.record_cache_hit();

        assert_eq!(snap.cache_hits, 1);
        assert_eq!(agg.cache_hits, 2);
    }
}
