//! Conversation run state machine
//!
//! A run moves through
//! `Initializing -> SelectingSpeaker -> BuildingPrompt -> AwaitingResponse
//! -> Recording -> (loop) -> Terminating -> Terminated`, with `Failed` for
//! unrecovered fatal errors. `step()` drives exactly one turn; the handle
//! never blocks on user input, so interactive drivers call `step()` once
//! per user action.

use crate::cache::{fingerprint, ResponseCache};
use crate::config::RuntimeConfig;
use crate::constants::{MANAGER_SPEAKER, MAX_TURN_FAILURES, READING_WPM, SYSTEM_SPEAKER};
use crate::conversation::prompt;
use crate::conversation::scheduler::{self, TurnLedger};
use crate::llm::{
    generate_with_retry, Connector, ConnectorError, ConnectorFactory, ModelParams, Usage,
};
use crate::setup::{Character, FailurePolicy, Setup, SetupError, SpeakerPolicy};
use crate::transcript::{
    Message, TerminationReason, Transcript, TranscriptSummary, TranscriptWriter,
};
use crate::usage::UsageAggregator;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// States of a conversation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    SelectingSpeaker,
    BuildingPrompt,
    AwaitingResponse,
    Recording,
    Terminating,
    Terminated,
    Failed,
}

/// Result of driving one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A message was appended to the transcript this step.
    Spoke(Message),
    /// The run is over; repeated calls return the same reason.
    Terminated(TerminationReason),
}

/// Fatal, run-level errors. Per-turn connector failures are handled by the
/// failure policy and recorded in the transcript instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid setup: {0}")]
    Setup(#[from] SetupError),

    #[error("connector for '{speaker}' could not be created: {source}")]
    ConnectorSetup {
        speaker: String,
        #[source]
        source: ConnectorError,
    },

    #[error("transcript log error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run already failed: {0}")]
    AlreadyFailed(String),
}

/// Handle to a single conversation run. Owns its transcript exclusively.
pub struct RunHandle {
    setup: Setup,
    config: RuntimeConfig,
    cache: Arc<ResponseCache>,
    connectors: HashMap<String, Arc<dyn Connector>>,
    manager_params: ModelParams,
    state: RunState,
    transcript: Transcript,
    usage: UsageAggregator,
    ledger: TurnLedger,
    cursor: usize,
    rng: StdRng,
    writer: Option<TranscriptWriter>,
    termination: Option<TerminationReason>,
    failure: Option<String>,
    finished: bool,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("termination", &self.termination)
            .field("failure", &self.failure)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    /// Initialize a run: validate the setup, build every connector, prune
    /// the cache, and emit the scripted opening message if one is
    /// configured. All failures here surface before any turn runs.
    pub(crate) fn start(
        mut setup: Setup,
        config: RuntimeConfig,
        cache: Arc<ResponseCache>,
        factory: &dyn ConnectorFactory,
    ) -> Result<Self, RunError> {
        setup.validate()?;

        // Characters without their own seed inherit the meeting seed so
        // fingerprints stay stable across replays.
        let meeting_seed = setup.meeting_parameters.seed;
        for character in &mut setup.characters {
            if character.params.seed.is_none() {
                character.params.seed = meeting_seed;
            }
        }

        let mut connectors: HashMap<String, Arc<dyn Connector>> = HashMap::new();
        for character in &setup.characters {
            if !connectors.contains_key(&character.assigned_model) {
                let connector = factory.create(&character.assigned_model).map_err(|source| {
                    RunError::ConnectorSetup {
                        speaker: character.name.clone(),
                        source,
                    }
                })?;
                connectors.insert(character.assigned_model.clone(), connector);
            }
        }
        if let Some(model) = &setup.meeting_parameters.manager_model {
            if !connectors.contains_key(model) {
                let connector =
                    factory.create(model).map_err(|source| RunError::ConnectorSetup {
                        speaker: MANAGER_SPEAKER.to_string(),
                        source,
                    })?;
                connectors.insert(model.clone(), connector);
            }
        }

        cache.prune(Utc::now());

        let writer = if setup.logkeeper.disabled {
            None
        } else {
            Some(TranscriptWriter::create(
                &setup.logkeeper.directory,
                Utc::now(),
            )?)
        };

        let manager_params = ModelParams {
            seed: meeting_seed,
            ..ModelParams::default()
        };

        let mut run = Self {
            transcript: Transcript::new(&setup.conversation_id),
            rng: StdRng::seed_from_u64(meeting_seed.unwrap_or_else(rand::random)),
            setup,
            config,
            cache,
            connectors,
            manager_params,
            state: RunState::Initializing,
            usage: UsageAggregator::new(),
            ledger: TurnLedger::new(),
            cursor: 0,
            writer,
            termination: None,
            failure: None,
            finished: false,
        };

        if let Some(opening) = run.setup.meeting_parameters.opening_message.clone() {
            run.transcript.append(
                opening.speaker,
                opening.message,
                None,
                Usage::default(),
                false,
                Utc::now(),
            );
            run.flush_incremental();
        }

        info!(
            conversation_id = %run.setup.conversation_id,
            characters = run.setup.characters.len(),
            policy = ?run.setup.meeting_parameters.speaker_policy,
            "conversation run started"
        );
        run.state = RunState::SelectingSpeaker;
        Ok(run)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn usage(&self) -> &UsageAggregator {
        &self.usage
    }

    /// Path of the transcript log file, when logging is enabled.
    pub fn log_path(&self) -> Option<&Path> {
        self.writer.as_ref().map(|w| w.path())
    }

    /// Drive one turn of the conversation.
    pub async fn step(&mut self) -> Result<StepOutcome, RunError> {
        match self.state {
            RunState::Terminated => {
                let reason = self.termination.clone().expect("terminated run has a reason");
                return Ok(StepOutcome::Terminated(reason));
            }
            RunState::Failed => {
                return Err(RunError::AlreadyFailed(
                    self.failure.clone().unwrap_or_default(),
                ));
            }
            RunState::Terminating => return self.finish().await,
            _ => {}
        }

        self.state = RunState::SelectingSpeaker;

        if self.ledger.total_turns() >= self.setup.meeting_parameters.turn_limit as u64 {
            self.begin_termination(TerminationReason::TurnLimit);
            return self.finish().await;
        }

        let Some(character) = self.select_speaker().await else {
            let detail =
                "no eligible speaker remains and no termination rule fired".to_string();
            warn!(conversation_id = %self.setup.conversation_id, "scheduling deadlock");
            self.begin_termination(TerminationReason::NoEligibleSpeaker { detail });
            return self.finish().await;
        };

        self.state = RunState::BuildingPrompt;
        let conversation = self.transcript.conversation_text(self.config.prompt_window);
        let prompt_text = prompt::character_prompt(&character, &self.setup, &conversation);

        self.state = RunState::AwaitingResponse;
        let resolved = self
            .resolve(&character.assigned_model, &prompt_text, &character.params)
            .await;

        self.state = RunState::Recording;
        let message = match resolved {
            Ok((text, usage, cache_hit)) => {
                let message = self
                    .transcript
                    .append(
                        &character.name,
                        text,
                        Some(character.assigned_model.clone()),
                        usage,
                        cache_hit,
                        Utc::now(),
                    )
                    .clone();
                self.ledger.record_turn(&character.name);
                self.usage.record_turn(&character.name, &usage);
                self.flush_incremental();
                self.check_termination(&message.text).await;
                message
            }
            Err(error) => {
                self.usage.record_failure();
                warn!(
                    speaker = %character.name,
                    model = %character.assigned_model,
                    error = %error,
                    "turn failed"
                );
                let note = format!("{} failed to respond: {}", character.name, error);
                let message = self
                    .transcript
                    .append(SYSTEM_SPEAKER, note, None, Usage::default(), false, Utc::now())
                    .clone();
                let failures = self.ledger.record_failure(&character.name);
                if error.excuses_character() || failures >= MAX_TURN_FAILURES {
                    self.ledger.excuse(&character.name);
                }
                self.flush_incremental();
                if self.setup.meeting_parameters.failure_policy == FailurePolicy::Terminate {
                    self.begin_termination(TerminationReason::ConnectorFailure {
                        speaker: character.name.clone(),
                    });
                }
                message
            }
        };

        if self.state != RunState::Terminating {
            self.state = RunState::SelectingSpeaker;
        }
        Ok(StepOutcome::Spoke(message))
    }

    /// Step until the run terminates, returning the termination reason.
    pub async fn run_to_completion(&mut self) -> Result<TerminationReason, RunError> {
        loop {
            if let StepOutcome::Terminated(reason) = self.step().await? {
                return Ok(reason);
            }
        }
    }

    /// Pick the next speaker per the configured policy.
    async fn select_speaker(&mut self) -> Option<Character> {
        let cap = self.setup.meeting_parameters.max_turns_per_character;
        match self.setup.meeting_parameters.speaker_policy {
            SpeakerPolicy::RoundRobin => {
                let (character, next_cursor) =
                    scheduler::next_round_robin(&self.setup.characters, &self.ledger, cap, self.cursor)?;
                let chosen = character.clone();
                self.cursor = next_cursor;
                Some(chosen)
            }
            SpeakerPolicy::Random => {
                scheduler::pick_random(&self.setup.characters, &self.ledger, cap, &mut self.rng)
                    .cloned()
            }
            SpeakerPolicy::Manager => {
                // Nobody eligible means deadlock regardless of the nominee.
                scheduler::fallback_in_declared_order(&self.setup.characters, &self.ledger, cap)?;

                match self.nominate_speaker().await {
                    Some(name) => {
                        let nominee = self
                            .setup
                            .character(&name)
                            .filter(|c| self.ledger.is_eligible(c, cap))
                            .cloned();
                        match nominee {
                            Some(character) => Some(character),
                            None => {
                                warn!(nominee = %name, "manager nominated an ineligible speaker, falling back");
                                scheduler::fallback_in_declared_order(
                                    &self.setup.characters,
                                    &self.ledger,
                                    cap,
                                )
                                .cloned()
                            }
                        }
                    }
                    None => scheduler::fallback_in_declared_order(
                        &self.setup.characters,
                        &self.ledger,
                        cap,
                    )
                    .cloned(),
                }
            }
        }
    }

    /// Ask the manager model who should speak next. Usage is attributed to
    /// the manager; nominations do not appear in the transcript.
    async fn nominate_speaker(&mut self) -> Option<String> {
        let manager_model = self.setup.meeting_parameters.manager_model.clone()?;
        let conversation = self.transcript.conversation_text(self.config.prompt_window);
        let prompt_text = {
            let names: Vec<&str> = self
                .setup
                .characters
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            prompt::nomination_prompt(&conversation, &names)
        };

        let params = self.manager_params.clone();
        match self.resolve(&manager_model, &prompt_text, &params).await {
            Ok((text, usage, _)) => {
                self.usage.record_overhead(MANAGER_SPEAKER, &usage);
                let names: Vec<&str> = self
                    .setup
                    .characters
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect();
                prompt::parse_nominee(&text, &names).map(str::to_string)
            }
            Err(error) => {
                warn!(error = %error, "manager nomination failed, falling back");
                None
            }
        }
    }

    /// Resolve a prompt through the cache, generating on a miss.
    async fn resolve(
        &mut self,
        model: &str,
        prompt_text: &str,
        params: &ModelParams,
    ) -> Result<(String, Usage, bool), ConnectorError> {
        let connector = self
            .connectors
            .get(model)
            .cloned()
            .ok_or_else(|| ConnectorError::Config(format!("no connector for model '{model}'")))?;

        let fp = fingerprint(prompt_text, model, params);
        if let Some(entry) = self.cache.lookup(&fp, Utc::now()) {
            self.usage.record_cache_hit();
            return Ok((entry.response, entry.usage, true));
        }
        self.usage.record_cache_miss();

        let outcome =
            generate_with_retry(connector.as_ref(), prompt_text, params, &self.config.retry)
                .await?;
        self.usage.record_attempts(outcome.attempts);
        self.cache.store(
            &fp,
            &outcome.completion.text,
            outcome.completion.usage,
            self.config.cache.ttl,
            Utc::now(),
        );
        Ok((outcome.completion.text, outcome.completion.usage, false))
    }

    /// Evaluate termination rules after a recorded character turn.
    async fn check_termination(&mut self, last_text: &str) {
        let meeting = self.setup.meeting_parameters.clone();

        if self.ledger.total_turns() >= meeting.turn_limit as u64 {
            self.begin_termination(TerminationReason::TurnLimit);
            return;
        }

        if let Some(phrase) = &meeting.stop_phrase {
            if !phrase.is_empty()
                && last_text.to_lowercase().contains(&phrase.to_lowercase())
            {
                self.begin_termination(TerminationReason::StopPhrase);
                return;
            }
        }

        let words = self.transcript.word_count();
        if let Some(budget) = meeting.word_budget {
            if words >= budget as u64 {
                self.begin_termination(TerminationReason::WordBudget);
                return;
            }
        }
        if let Some(minutes) = meeting.reading_minutes {
            if words as f32 / READING_WPM as f32 >= minutes {
                self.begin_termination(TerminationReason::ReadingTime);
                return;
            }
        }

        if meeting.goal_check {
            if let Some(manager_model) = &meeting.manager_model {
                let conversation = self.transcript.conversation_text(self.config.prompt_window);
                let prompt_text =
                    prompt::goal_check_prompt(&conversation, &meeting.goal.objectives);
                let params = self.manager_params.clone();
                match self.resolve(manager_model, &prompt_text, &params).await {
                    Ok((text, usage, cache_hit)) => {
                        let affirmative = prompt::is_affirmative(&text);
                        self.transcript.append(
                            SYSTEM_SPEAKER,
                            format!("[Goal check] {text}"),
                            Some(manager_model.clone()),
                            usage,
                            cache_hit,
                            Utc::now(),
                        );
                        self.usage.record_turn(SYSTEM_SPEAKER, &usage);
                        self.flush_incremental();
                        if affirmative {
                            self.begin_termination(TerminationReason::GoalReached);
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "goal check failed, continuing");
                    }
                }
            }
        }
    }

    fn begin_termination(&mut self, reason: TerminationReason) {
        if self.termination.is_none() {
            self.termination = Some(reason);
        }
        self.state = RunState::Terminating;
    }

    /// Finish the run: optional closing message, summary, final flush.
    /// Idempotent; repeated calls return the recorded reason.
    async fn finish(&mut self) -> Result<StepOutcome, RunError> {
        let reason = self.termination.clone().expect("terminating run has a reason");
        self.state = RunState::Terminating;

        if !self.finished {
            self.finished = true;

            if self.setup.meeting_parameters.closing_message {
                self.emit_closing_message().await;
            }

            let summary = TranscriptSummary {
                total_turns: self.transcript.len() as u64,
                character_turns: self.ledger.total_turns(),
                usage: self.usage.snapshot(),
                termination_reason: reason.clone(),
            };
            self.transcript.finalize(summary);
            if let Some(writer) = &self.writer {
                if let Err(error) = writer.write(&self.transcript) {
                    self.state = RunState::Failed;
                    self.failure = Some(format!("final transcript flush failed: {error}"));
                    return Err(RunError::Io(error));
                }
            }
            info!(
                conversation_id = %self.setup.conversation_id,
                reason = ?reason,
                messages = self.transcript.len(),
                "conversation terminated"
            );
        }

        self.state = RunState::Terminated;
        Ok(StepOutcome::Terminated(reason))
    }

    /// Ask the manager whether a closer is needed and, if so, let that
    /// character wrap up. Best effort: failures only log.
    async fn emit_closing_message(&mut self) {
        let Some(manager_model) = self.setup.meeting_parameters.manager_model.clone() else {
            return;
        };

        let conversation = self.transcript.conversation_text(self.config.prompt_window);
        let params = self.manager_params.clone();
        let nomination = match self
            .resolve(
                &manager_model,
                &prompt::closing_nomination_prompt(&conversation),
                &params,
            )
            .await
        {
            Ok((text, usage, _)) => {
                self.usage.record_overhead(MANAGER_SPEAKER, &usage);
                text
            }
            Err(error) => {
                warn!(error = %error, "closing nomination failed, skipping closing message");
                return;
            }
        };

        let closer = {
            let names: Vec<&str> = self
                .setup
                .characters
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            prompt::parse_nominee(&nomination, &names).map(str::to_string)
        };
        let Some(closer) = closer else {
            return;
        };
        let Some(character) = self.setup.character(&closer).cloned() else {
            return;
        };

        match self
            .resolve(
                &character.assigned_model,
                &prompt::closing_prompt(&character.name),
                &character.params,
            )
            .await
        {
            Ok((text, usage, cache_hit)) => {
                self.transcript.append(
                    &character.name,
                    text,
                    Some(character.assigned_model.clone()),
                    usage,
                    cache_hit,
                    Utc::now(),
                );
                self.usage.record_turn(&character.name, &usage);
            }
            Err(error) => {
                warn!(speaker = %character.name, error = %error, "closing message failed");
            }
        }
    }

    /// Rewrite the log file after an append when incremental logging is on.
    /// Failures are warnings; the final flush in `finish` is authoritative.
    fn flush_incremental(&self) {
        if !self.setup.logkeeper.incremental {
            return;
        }
        if let Some(writer) = &self.writer {
            if let Err(error) = writer.write(&self.transcript) {
                warn!(error = %error, "incremental transcript flush failed");
            }
        }
    }
}
