//! Prompt rendering
//!
//! Every prompt is a pure function of its inputs. That purity is load
//! bearing: the cache fingerprints the rendered text, so two runs over
//! identical state must render byte-identical prompts.

use crate::setup::{Character, Setup};

/// Prompt for a character's turn.
pub fn character_prompt(character: &Character, setup: &Setup, conversation: &str) -> String {
    let world = &setup.world_context;
    let meeting = &setup.meeting_parameters;

    let mut prompt = format!(
        "You are {}, a {}.\nRole: {}.\n\n",
        character.name, character.position, character.role
    );

    prompt.push_str(&format!(
        "World: {} ({}, {}). Technology: {}. Society: {}. Politics: {}.\n",
        world.era,
        world.year,
        world.season,
        world.technological_level,
        world.culture_and_society,
        world.political_climate
    ));
    if !world.magic_and_myths.is_empty() {
        prompt.push_str(&format!("Magic and myths: {}.\n", world.magic_and_myths));
    }

    prompt.push_str(&format!(
        "\nMeeting purpose: {}.\nContext: {}.\n",
        meeting.purpose_and_context.purpose, meeting.purpose_and_context.context
    ));
    if !meeting.goal.objectives.is_empty() {
        prompt.push_str(&format!("Objectives: {}.\n", meeting.goal.objectives.join("; ")));
    }
    if !meeting.recent_events.is_empty() {
        prompt.push_str(&format!("Recent events: {}.\n", meeting.recent_events.join(" ")));
    }

    if conversation.is_empty() {
        prompt.push_str("\nThe meeting is just beginning.\n");
    } else {
        prompt.push_str(&format!("\nConversation so far:\n{conversation}\n"));
    }

    prompt.push_str(&format!(
        "\nPlease respond in-character as {}.",
        character.name
    ));
    prompt
}

/// Prompt asking the manager model to nominate the next speaker.
pub fn nomination_prompt(conversation: &str, character_names: &[&str]) -> String {
    format!(
        "You are the group chat manager.\n\
         Here is the conversation so far:\n\
         ----------------------\n\
         {conversation}\n\
         ----------------------\n\
         Available characters: {}\n\
         Which single character should speak next? Return just the name (no explanation).",
        character_names.join(", ")
    )
}

/// Prompt asking the manager whether the meeting goal has been met.
pub fn goal_check_prompt(conversation: &str, objectives: &[String]) -> String {
    format!(
        "Conversation so far:\n{conversation}\n\n\
         Meeting goal: {}\n\n\
         Have we met the goal or purpose? Reply YES or NO.",
        objectives.join("; ")
    )
}

/// Prompt asking the manager whether (and who) should close the meeting.
pub fn closing_nomination_prompt(conversation: &str) -> String {
    format!(
        "Based on the conversation, do we need a final closing message to wrap up?\n\
         If yes, provide the EXACT name of who should speak. If no, just say 'NO'.\n\n\
         Conversation so far:\n{conversation}\n"
    )
}

/// Prompt for the nominated closer's final message.
pub fn closing_prompt(character_name: &str) -> String {
    format!("You are {character_name}. Please provide a final closing message for this meeting.")
}

/// Extract a nominated character name from a manager response.
///
/// Tolerates quoting and trailing punctuation; matching is
/// case-insensitive against the declared names.
pub fn parse_nominee<'a>(response: &str, character_names: &[&'a str]) -> Option<&'a str> {
    let cleaned = response
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '!')
        .trim();
    character_names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(cleaned))
        .copied()
}

/// Whether a goal-check response affirms the goal was met.
pub fn is_affirmative(response: &str) -> bool {
    response.to_uppercase().contains("YES")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::test_fixtures::council_setup;

    #[test]
    fn character_prompt_is_deterministic() {
        let setup = council_setup();
        let character = &setup.characters[0];
        let a = character_prompt(character, &setup, "Bran: We should strike now.");
        let b = character_prompt(character, &setup, "Bran: We should strike now.");
        assert_eq!(a, b);
    }

    #[test]
    fn character_prompt_mentions_persona_world_and_purpose() {
        let setup = council_setup();
        let prompt = character_prompt(&setup.characters[1], &setup, "");

        assert!(prompt.contains("You are Bran, a Hand of the Queen."));
        assert!(prompt.contains("Medieval Fantasy"));
        assert!(prompt.contains("Plan the reclamation of the throne"));
        assert!(prompt.contains("The meeting is just beginning."));
        assert!(prompt.ends_with("Please respond in-character as Bran."));
    }

    #[test]
    fn nomination_prompt_lists_every_candidate() {
        let prompt = nomination_prompt("A: hi", &["Aria", "Bran", "Cole"]);
        assert!(prompt.contains("Available characters: Aria, Bran, Cole"));
        assert!(prompt.contains("Return just the name"));
    }

    #[test]
    fn parse_nominee_tolerates_quotes_case_and_punctuation() {
        let names = ["Aria", "Bran", "Cole"];
        assert_eq!(parse_nominee("Bran", &names), Some("Bran"));
        assert_eq!(parse_nominee("  \"bran\". ", &names), Some("Bran"));
        assert_eq!(parse_nominee("BRAN!", &names), Some("Bran"));
        assert_eq!(parse_nominee("Someone else entirely", &names), None);
        assert_eq!(parse_nominee("", &names), None);
    }

    #[test]
    fn affirmative_detection_matches_the_original_contract() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("yes, the goal is met"));
        assert!(!is_affirmative("NO"));
        assert!(!is_affirmative("not yet"));
    }
}
