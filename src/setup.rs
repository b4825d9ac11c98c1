//! Setup data model
//!
//! The setup file describes everything a run needs: the character roster,
//! the world they inhabit, and the meeting parameters. It is produced by an
//! external collaborator (interactively or via API), persisted before a run
//! begins, and consumed read-only by the core.

use crate::llm::ModelParams;
use serde::{Deserialize, Serialize};

/// A persona bound to a specific model backend. Immutable once a
/// conversation starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    /// Unique name within the setup; doubles as the speaker id.
    pub name: String,
    /// Display title, e.g. "Hand of the Queen".
    pub position: String,
    /// Persona description injected into prompts.
    pub role: String,
    /// Hierarchy level, 1 is highest.
    pub hierarchy: u8,
    /// Model string; the provider is inferred from it.
    pub assigned_model: String,
    /// Per-character sampling knobs.
    #[serde(default)]
    pub params: ModelParams,
}

/// Structured world description injected into every prompt. Immutable
/// during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorldContext {
    #[serde(default)]
    pub era: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub season: String,
    #[serde(default)]
    pub technological_level: String,
    #[serde(default)]
    pub culture_and_society: String,
    #[serde(default)]
    pub religions: Vec<String>,
    #[serde(default)]
    pub magic_and_myths: String,
    #[serde(default)]
    pub political_climate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PurposeAndContext {
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    #[serde(default)]
    pub objectives: Vec<String>,
}

/// Scripted first message of the meeting, spoken before any model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpeningMessage {
    pub speaker: String,
    pub message: String,
}

/// How the next speaker is chosen each turn.
///
/// Default is round-robin in declared character order; `random` draws from
/// the eligible characters using the meeting seed; `manager` asks the
/// configured manager model to nominate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerPolicy {
    #[default]
    RoundRobin,
    Random,
    Manager,
}

/// What to do when a character's connector fails fatally mid-run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record a system message and move on without the character's turn.
    #[default]
    SkipSpeaker,
    /// Record a system message and end the conversation.
    Terminate,
}

/// Turn budget, termination rules, and speaker selection mode. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeetingParameters {
    /// Hard limit on character turns.
    pub turn_limit: u32,

    /// Optional cap on turns any single character may take.
    #[serde(default)]
    pub max_turns_per_character: Option<u32>,

    /// End the meeting once a character utters this phrase.
    #[serde(default)]
    pub stop_phrase: Option<String>,

    /// Soft limit on total words across the transcript.
    #[serde(default)]
    pub word_budget: Option<u32>,

    /// Soft limit on estimated reading time in minutes.
    #[serde(default)]
    pub reading_minutes: Option<f32>,

    /// Sampling seed shared by every request; enables deterministic
    /// replay against a warm cache.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub speaker_policy: SpeakerPolicy,

    /// Model used for nominations, goal checks, and closing decisions.
    #[serde(default)]
    pub manager_model: Option<String>,

    /// Ask the manager after each turn whether the goal has been met.
    #[serde(default)]
    pub goal_check: bool,

    /// Ask the manager to nominate a closing speaker at termination.
    #[serde(default)]
    pub closing_message: bool,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub purpose_and_context: PurposeAndContext,

    #[serde(default)]
    pub goal: Goal,

    #[serde(default)]
    pub recent_events: Vec<String>,

    #[serde(default)]
    pub opening_message: Option<OpeningMessage>,
}

/// Transcript logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Logkeeper {
    /// Directory the transcript log is written to.
    #[serde(default = "default_log_directory")]
    pub directory: String,
    /// Rewrite the log after every message instead of only at the end.
    #[serde(default)]
    pub incremental: bool,
    /// Skip writing a log file entirely.
    #[serde(default)]
    pub disabled: bool,
}

fn default_log_directory() -> String {
    ".".to_string()
}

impl Default for Logkeeper {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            incremental: false,
            disabled: false,
        }
    }
}

/// Aggregate setup for one conversation. Read-only input to a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Setup {
    pub conversation_id: String,
    pub version: String,
    pub characters: Vec<Character>,
    pub world_context: WorldContext,
    pub meeting_parameters: MeetingParameters,
    #[serde(default)]
    pub logkeeper: Logkeeper,
}

impl Setup {
    /// Parse a setup from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, SetupError> {
        serde_json::from_str(raw).map_err(SetupError::Parse)
    }

    /// Load a setup file from disk.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, SetupError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Fill in a fresh conversation id when the producer left it empty.
    pub fn ensure_conversation_id(&mut self) {
        if self.conversation_id.trim().is_empty() {
            self.conversation_id = uuid::Uuid::new_v4().to_string();
        }
    }

    pub fn character(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }

    /// Validate the setup before any turn runs. All failures here are
    /// fatal: a run never starts from a bad setup.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.conversation_id.trim().is_empty() {
            return Err(SetupError::EmptyConversationId);
        }
        if self.characters.is_empty() {
            return Err(SetupError::EmptyRoster);
        }

        let mut seen = std::collections::HashSet::new();
        for character in &self.characters {
            if character.name.trim().is_empty() {
                return Err(SetupError::UnnamedCharacter);
            }
            if !seen.insert(character.name.as_str()) {
                return Err(SetupError::DuplicateCharacter(character.name.clone()));
            }
            if character.assigned_model.trim().is_empty() {
                return Err(SetupError::MissingModel(character.name.clone()));
            }
        }

        let meeting = &self.meeting_parameters;
        if meeting.turn_limit == 0 {
            return Err(SetupError::ZeroTurnLimit);
        }
        if meeting.speaker_policy == SpeakerPolicy::Manager && meeting.manager_model.is_none() {
            return Err(SetupError::ManagerPolicyWithoutModel);
        }
        if (meeting.goal_check || meeting.closing_message) && meeting.manager_model.is_none() {
            return Err(SetupError::ManagerFeatureWithoutModel);
        }

        Ok(())
    }
}

/// Validation and loading failures for setups. Surfaced before any turn runs.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("conversation_id must not be empty")]
    EmptyConversationId,

    #[error("setup declares no characters")]
    EmptyRoster,

    #[error("character with empty name")]
    UnnamedCharacter,

    #[error("duplicate character name: {0}")]
    DuplicateCharacter(String),

    #[error("character '{0}' has no assigned model")]
    MissingModel(String),

    #[error("turn_limit must be at least 1")]
    ZeroTurnLimit,

    #[error("speaker_policy is 'manager' but no manager_model is configured")]
    ManagerPolicyWithoutModel,

    #[error("goal_check/closing_message require a manager_model")]
    ManagerFeatureWithoutModel,

    #[error("failed to read setup file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse setup JSON: {0}")]
    Parse(#[from] serde_json::Error),
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::council_setup;
    use super::*;

    #[test]
    fn valid_setup_passes_validation() {
        council_setup().validate().unwrap();
    }

    #[test]
    fn duplicate_character_names_are_rejected() {
        let mut setup = council_setup();
        setup.characters[1].name = "Aria".to_string();
        assert!(matches!(
            setup.validate(),
            Err(SetupError::DuplicateCharacter(name)) if name == "Aria"
        ));
    }

    #[test]
    fn zero_turn_limit_is_rejected() {
        let mut setup = council_setup();
        setup.meeting_parameters.turn_limit = 0;
        assert!(matches!(setup.validate(), Err(SetupError::ZeroTurnLimit)));
    }

    #[test]
    fn manager_policy_requires_a_manager_model() {
        let mut setup = council_setup();
        setup.meeting_parameters.speaker_policy = SpeakerPolicy::Manager;
        assert!(matches!(
            setup.validate(),
            Err(SetupError::ManagerPolicyWithoutModel)
        ));

        setup.meeting_parameters.manager_model = Some("scripted-manager".to_string());
        setup.validate().unwrap();
    }

    #[test]
    fn goal_check_requires_a_manager_model() {
        let mut setup = council_setup();
        setup.meeting_parameters.goal_check = true;
        assert!(matches!(
            setup.validate(),
            Err(SetupError::ManagerFeatureWithoutModel)
        ));
    }

    #[test]
    fn ensure_conversation_id_fills_blank_ids_only() {
        let mut setup = council_setup();
        setup.ensure_conversation_id();
        assert_eq!(setup.conversation_id, "war-council-001");

        setup.conversation_id = "  ".to_string();
        setup.ensure_conversation_id();
        assert!(uuid::Uuid::parse_str(&setup.conversation_id).is_ok());
    }

    #[test]
    fn setup_json_round_trips_with_defaults() {
        let raw = r#"{
            "conversation_id": "c-1",
            "version": "2.0",
            "characters": [
                {
                    "name": "Aria",
                    "position": "Queen",
                    "role": "Ruler",
                    "hierarchy": 1,
                    "assigned_model": "gpt-4o"
                }
            ],
            "world_context": {"era": "Modern"},
            "meeting_parameters": {
                "turn_limit": 3,
                "purpose_and_context": {"purpose": "Decide", "context": "Now"}
            }
        }"#;

        let setup = Setup::from_json(raw).unwrap();
        setup.validate().unwrap();
        assert_eq!(setup.meeting_parameters.speaker_policy, SpeakerPolicy::RoundRobin);
        assert_eq!(setup.meeting_parameters.failure_policy, FailurePolicy::SkipSpeaker);
        assert_eq!(setup.logkeeper.directory, ".");
        assert_eq!(setup.characters[0].params.temperature, 0.7);
    }
}
