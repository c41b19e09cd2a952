//! Utterance normalization (§4.6 step 1): lowercasing, abbreviation
//! expansion and a fixed misspelling dictionary, applied before keyword
//! matching. The original text is never discarded — callers keep both.

/// `(pattern, replacement)` pairs applied as whole-word substitutions.
/// Order matters: longer/more specific patterns first so they aren't
/// shadowed by a shorter one (e.g. `"tb"` after `"também"` would be moot,
/// but `"pq"` before `"porque"` would double-replace if reversed).
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("cartao", "cartão"),
    ("nao", "não"),
    ("pra", "para"),
    ("vc", "você"),
    ("pq", "porque"),
    ("tb", "também"),
    ("ta", "está"),
];

/// Normalize one utterance: lowercase, then apply each fixed substitution
/// on whole-word boundaries. Idempotent — normalizing the output again
/// yields the same string (§8), since every replacement target is itself
/// left untouched by the substitution table (no replacement value is also
/// a pattern).
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut words: Vec<String> = lowered.split_whitespace().map(str::to_string).collect();

    for word in words.iter_mut() {
        let (core, trailing_punct) = split_trailing_punctuation(word);
        if let Some(replacement) = lookup(core) {
            *word = format!("{replacement}{trailing_punct}");
        }
    }

    words.join(" ")
}

fn lookup(word: &str) -> Option<&'static str> {
    SUBSTITUTIONS.iter().find(|(pattern, _)| *pattern == word).map(|(_, replacement)| *replacement)
}

fn split_trailing_punctuation(word: &str) -> (&str, &str) {
    let trim_end = word.trim_end_matches(|c: char| c.is_ascii_punctuation());
    (trim_end, &word[trim_end.len()..])
}
