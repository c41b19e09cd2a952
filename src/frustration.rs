//! Frustration scan (§4.6 step 3): keyword hits, all-caps ratio, and
//! repeated-intent detection feed into the session's [`FrustrationLevel`].

use crate::memory::session::FrustrationLevel;

const FRUSTRATION_KEYWORDS: &[&str] = &[
    "droga", "merda", "não funciona", "nao funciona", "horrível", "horrivel", "cansei", "desisto",
    "absurdo", "ridículo", "ridiculo", "péssimo", "pessimo",
];

const CAPS_RATIO_THRESHOLD: f32 = 0.6;
const REPEATED_INTENT_OVERLAP: f32 = 0.8;

/// One-shot scan of a single utterance against the keyword list and the
/// all-caps heuristic. Each hit contributes 1, capped at 3 by
/// [`FrustrationLevel::add`].
pub fn scan_utterance(normalized_text: &str, raw_text: &str) -> u8 {
    let mut delta = 0u8;

    if FRUSTRATION_KEYWORDS.iter().any(|kw| normalized_text.contains(kw)) {
        delta += 1;
    }

    if is_mostly_caps(raw_text) {
        delta += 1;
    }

    delta.min(3)
}

fn is_mostly_caps(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 4 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    (upper as f32 / letters.len() as f32) >= CAPS_RATIO_THRESHOLD
}

/// Bag-of-words overlap between two normalized utterances, used to detect
/// the customer repeating the same request (§4.6 step 3: three repeats
/// bump frustration).
pub fn intent_overlap(a: &str, b: &str) -> f32 {
    use std::collections::HashSet;

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f32 / union as f32
}

pub fn is_repeated_intent(a: &str, b: &str) -> bool {
    intent_overlap(a, b) >= REPEATED_INTENT_OVERLAP
}

/// Apply one turn's contribution to `level`, given the last few normalized
/// utterances (most recent last) so repeated-intent bumps can be detected.
pub fn apply_turn(level: &mut FrustrationLevel, normalized_text: &str, raw_text: &str, recent_normalized: &[String]) {
    level.add(scan_utterance(normalized_text, raw_text));

    let repeats = recent_normalized
        .iter()
        .rev()
        .take(3)
        .filter(|prior| is_repeated_intent(prior, normalized_text))
        .count();

    if repeats >= 3 {
        level.add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_hit_contributes_one() {
        assert_eq!(scan_utterance("isso não funciona de jeito nenhum", "isso não funciona"), 1);
    }

    #[test]
    fn shouting_contributes_one() {
        assert_eq!(scan_utterance("preciso de ajuda", "PRECISO DE AJUDA AGORA"), 1);
    }

    #[test]
    fn both_signals_combine_and_cap_at_three() {
        let delta = scan_utterance("isso não funciona", "ISSO NÃO FUNCIONA");
        assert_eq!(delta, 2);
    }

    #[test]
    fn identical_utterances_are_fully_overlapping() {
        assert!(is_repeated_intent("cartão bloqueado", "cartão bloqueado"));
    }

    #[test]
    fn unrelated_utterances_do_not_overlap() {
        assert!(!is_repeated_intent("cartão bloqueado", "quero investir no cdb"));
    }

    #[test]
    fn three_repeats_bump_frustration() {
        let mut level = FrustrationLevel::new(0);
        let history = vec!["cartão bloqueado".to_string(), "cartão bloqueado".to_string(), "cartão bloqueado".to_string()];
        apply_turn(&mut level, "cartão bloqueado", "cartão bloqueado", &history);
        assert!(level.value() >= 1);
    }
}
