//! Speaker selection
//!
//! Pure selection logic over the character roster: eligibility, rotation,
//! seeded random draws, and the declared-order fallback used when a
//! manager nomination is invalid. The manager call itself lives in the run
//! loop; this module never does I/O.

use crate::setup::Character;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Tracks how often each character has spoken, failed, and who has been
/// excused.
#[derive(Debug, Default)]
pub struct TurnLedger {
    turns_taken: HashMap<String, u32>,
    failures: HashMap<String, u32>,
    excused: HashSet<String>,
}

impl TurnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_turn(&mut self, name: &str) {
        *self.turns_taken.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Record a failed turn; returns the character's failure count so far.
    pub fn record_failure(&mut self, name: &str) -> u32 {
        let count = self.failures.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Remove a character from all future selection.
    pub fn excuse(&mut self, name: &str) {
        self.excused.insert(name.to_string());
    }

    pub fn turns_taken(&self, name: &str) -> u32 {
        self.turns_taken.get(name).copied().unwrap_or(0)
    }

    /// Total character turns taken so far.
    pub fn total_turns(&self) -> u64 {
        self.turns_taken.values().map(|&v| v as u64).sum()
    }

    /// A character is eligible while not excused and under the per-character
    /// cap.
    pub fn is_eligible(&self, character: &Character, cap: Option<u32>) -> bool {
        if self.excused.contains(&character.name) {
            return false;
        }
        match cap {
            Some(cap) => self.turns_taken(&character.name) < cap,
            None => true,
        }
    }
}

/// Characters still allowed to speak, in declared order.
pub fn eligible<'a>(
    characters: &'a [Character],
    ledger: &TurnLedger,
    cap: Option<u32>,
) -> Vec<&'a Character> {
    characters
        .iter()
        .filter(|c| ledger.is_eligible(c, cap))
        .collect()
}

/// Round-robin selection in declared order.
///
/// `cursor` is the declared-order index to try first; the scan skips
/// ineligible characters. Returns the chosen character and the cursor for
/// the next turn.
pub fn next_round_robin<'a>(
    characters: &'a [Character],
    ledger: &TurnLedger,
    cap: Option<u32>,
    cursor: usize,
) -> Option<(&'a Character, usize)> {
    let n = characters.len();
    for offset in 0..n {
        let index = (cursor + offset) % n;
        let character = &characters[index];
        if ledger.is_eligible(character, cap) {
            return Some((character, index + 1));
        }
    }
    None
}

/// Seeded random draw from the eligible characters.
pub fn pick_random<'a>(
    characters: &'a [Character],
    ledger: &TurnLedger,
    cap: Option<u32>,
    rng: &mut StdRng,
) -> Option<&'a Character> {
    let pool = eligible(characters, ledger, cap);
    if pool.is_empty() {
        return None;
    }
    let index = rng.gen_range(0..pool.len());
    Some(pool[index])
}

/// Fallback for an invalid or ineligible manager nomination: the first
/// eligible character in declared order.
pub fn fallback_in_declared_order<'a>(
    characters: &'a [Character],
    ledger: &TurnLedger,
    cap: Option<u32>,
) -> Option<&'a Character> {
    characters.iter().find(|c| ledger.is_eligible(c, cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::test_fixtures::council_setup;
    use rand::SeedableRng;

    #[test]
    fn round_robin_cycles_in_declared_order() {
        let setup = council_setup();
        let mut ledger = TurnLedger::new();
        let mut cursor = 0;
        let mut order = Vec::new();

        for _ in 0..5 {
            let (character, next) =
                next_round_robin(&setup.characters, &ledger, None, cursor).unwrap();
            ledger.record_turn(&character.name);
            order.push(character.name.clone());
            cursor = next;
        }

        assert_eq!(order, vec!["Aria", "Bran", "Cole", "Aria", "Bran"]);
    }

    #[test]
    fn round_robin_skips_capped_characters() {
        let setup = council_setup();
        let mut ledger = TurnLedger::new();
        ledger.record_turn("Aria");
        ledger.record_turn("Aria");

        let (character, _) = next_round_robin(&setup.characters, &ledger, Some(2), 0).unwrap();
        assert_eq!(character.name, "Bran");
    }

    #[test]
    fn round_robin_returns_none_when_everyone_is_exhausted() {
        let setup = council_setup();
        let mut ledger = TurnLedger::new();
        for character in &setup.characters {
            ledger.record_turn(&character.name);
        }

        assert!(next_round_robin(&setup.characters, &ledger, Some(1), 0).is_none());
    }

    #[test]
    fn excused_characters_never_speak_again() {
        let setup = council_setup();
        let mut ledger = TurnLedger::new();
        ledger.excuse("Aria");

        let pool = eligible(&setup.characters, &ledger, None);
        let names: Vec<&str> = pool.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bran", "Cole"]);
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let setup = council_setup();
        let ledger = TurnLedger::new();

        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            let a = pick_random(&setup.characters, &ledger, None, &mut rng_a).unwrap();
            let b = pick_random(&setup.characters, &ledger, None, &mut rng_b).unwrap();
            assert_eq!(a.name, b.name);
        }
    }

    #[test]
    fn fallback_takes_first_eligible_in_declared_order() {
        let setup = council_setup();
        let mut ledger = TurnLedger::new();
        ledger.record_turn("Aria");

        let fallback = fallback_in_declared_order(&setup.characters, &ledger, Some(1)).unwrap();
        assert_eq!(fallback.name, "Bran");

        ledger.record_turn("Bran");
        let fallback = fallback_in_declared_order(&setup.characters, &ledger, Some(1)).unwrap();
        assert_eq!(fallback.name, "Cole");
    }
}
