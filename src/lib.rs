//! Convoke: multi-model meeting simulator
//!
//! Orchestrates scripted conversations among LLM-backed characters. A
//! turn scheduler picks the next speaker (manager-driven, round-robin, or
//! seeded random), renders a deterministic prompt from shared world state,
//! resolves it through a fingerprint-keyed response cache, and records the
//! result in an append-only transcript with usage accounting.

pub mod cache;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod llm;
pub mod setup;
pub mod transcript;
pub mod usage;

pub use cache::ResponseCache;
pub use config::{CacheConfig, RuntimeConfig};
pub use conversation::{ConversationRuntime, RunError, RunHandle, RunState, StepOutcome};
pub use setup::{Setup, SetupError};
pub use transcript::{Message, TerminationReason, Transcript};
