//! Built-in stop word lists.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::analysis::language::Language;

static ENGLISH: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

static FRENCH: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "du", "elle", "en", "et", "il",
        "je", "la", "le", "les", "leur", "lui", "ma", "mais", "me", "mes", "ne", "nous", "on",
        "ou", "par", "pas", "pour", "qu", "que", "qui", "sa", "se", "ses", "son", "sur", "ta",
        "te", "tes", "ton", "tu", "un", "une", "vous",
    ]
    .into_iter()
    .collect()
});

static GERMAN: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "aber", "als", "am", "an", "auch", "auf", "aus", "bei", "bin", "bis", "das", "dass",
        "dem", "den", "der", "des", "die", "du", "ein", "eine", "einem", "einen", "einer",
        "eines", "er", "es", "für", "hat", "ich", "ihr", "im", "in", "ist", "mit", "nach",
        "nicht", "oder", "sie", "sind", "so", "und", "von", "vor", "war", "wie", "wir", "zu",
        "zum", "zur",
    ]
    .into_iter()
    .collect()
});

static SPANISH: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "al", "con", "de", "del", "el", "en", "es", "esta", "este", "la", "las", "lo",
        "los", "más", "no", "o", "para", "pero", "por", "que", "se", "sin", "su", "sus", "un",
        "una", "y",
    ]
    .into_iter()
    .collect()
});

static EMPTY: LazyLock<HashSet<&'static str>> = LazyLock::new(HashSet::new);

/// The stop words removed for a language.
pub fn stop_words(language: Language) -> &'static HashSet<&'static str> {
    match language {
        Language::English => &ENGLISH,
        Language::French => &FRENCH,
        Language::German => &GERMAN,
        Language::Spanish => &SPANISH,
        _ => &EMPTY,
    }
}
