//! Analyzers combine segmentation, normalization, stop words and stemming.

use std::collections::HashSet;
use std::sync::Arc;

use rust_stemmers::Stemmer;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::language::Language;
use crate::analysis::stop_words::stop_words;
use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Terms longer than this (in bytes) are dropped.
pub const MAX_TOKEN_LENGTH: usize = 255;

/// Trait for analyzers that convert text into a stream of tokens.
///
/// Analysis must be deterministic: the same text always yields the same tokens.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Analyze text into tokens.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Name of this analyzer, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Split text into words and normalize each one (NFKC + lowercase).
///
/// Returns `(word, position, start, end)` for every word, in order.
fn normalized_words(text: &str) -> Vec<(String, u32, usize, usize)> {
    text.unicode_word_indices()
        .enumerate()
        .filter_map(|(position, (start, word))| {
            let normalized: String = word.nfkc().flat_map(char::to_lowercase).collect();
            if normalized.is_empty() || normalized.len() > MAX_TOKEN_LENGTH {
                return None;
            }
            Some((normalized, position as u32, start, start + word.len()))
        })
        .collect()
}

/// Segments on Unicode word boundaries and lowercases. No stemming, no stop words.
///
/// This is the fallback for languages without a dedicated analyzer.
#[derive(Debug, Clone, Default)]
pub struct SimpleAnalyzer;

impl SimpleAnalyzer {
    pub fn new() -> Self {
        SimpleAnalyzer
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = normalized_words(text)
            .into_iter()
            .map(|(word, position, start, end)| Token::new(word, position, start, end))
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Emits the whole input, trimmed, as a single token.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let start = text.len() - text.trim_start().len();
        let token = Token::new(trimmed, 0, start, start + trimmed.len());
        Ok(Box::new(std::iter::once(token)))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Language-aware analyzer: segmentation, NFKC, lowercase, stop words and
/// Snowball stemming.
///
/// With `prefix_terms` enabled, a word whose stem differs from its surface
/// form is emitted twice at the same position (stem first, then the surface
/// form), so prefix queries written against the surface form still match.
pub struct StandardAnalyzer {
    language: Language,
    stemmer: Stemmer,
    stop_words: &'static HashSet<&'static str>,
    prefix_terms: bool,
}

impl std::fmt::Debug for StandardAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardAnalyzer")
            .field("language", &self.language)
            .field("prefix_terms", &self.prefix_terms)
            .finish()
    }
}

impl StandardAnalyzer {
    pub fn new(language: Language) -> Self {
        StandardAnalyzer {
            language,
            stemmer: Stemmer::create(language.stemming_algorithm()),
            stop_words: stop_words(language),
            prefix_terms: false,
        }
    }

    /// Also emit unstemmed forms alongside their stems.
    pub fn with_prefix_terms(mut self, prefix_terms: bool) -> Self {
        self.prefix_terms = prefix_terms;
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        for (word, position, start, end) in normalized_words(text) {
            if self.stop_words.contains(word.as_str()) {
                continue;
            }
            let stem = self.stemmer.stem(&word).into_owned();
            let emit_surface = self.prefix_terms && stem != word;
            tokens.push(Token::new(stem, position, start, end));
            if emit_surface {
                tokens.push(Token::new(word, position, start, end));
            }
        }
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Build the analyzer configured for a language code.
///
/// Unknown or empty codes fall back to [`SimpleAnalyzer`].
pub fn analyzer_for_language(code: &str, prefix_terms: bool) -> Arc<dyn Analyzer> {
    match Language::from_code(code) {
        Some(language) => {
            Arc::new(StandardAnalyzer::new(language).with_prefix_terms(prefix_terms))
        }
        None => Arc::new(SimpleAnalyzer::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(analyzer: &dyn Analyzer, text: &str) -> Vec<String> {
        analyzer.analyze(text).unwrap().map(|t| t.text).collect()
    }

    #[test]
    fn test_standard_english() {
        let analyzer = StandardAnalyzer::new(Language::English);
        assert_eq!(
            texts(&analyzer, "The Runners were running, quickly!"),
            vec!["runner", "were", "run", "quick"]
        );
    }

    #[test]
    fn test_stop_words_keep_positions() {
        let analyzer = StandardAnalyzer::new(Language::English);
        let tokens: Vec<Token> = analyzer.analyze("the cat and the hat").unwrap().collect();
        let positions: Vec<u32> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 4]);
        assert_eq!(tokens[0].start_offset, 4);
        assert_eq!(tokens[0].end_offset, 7);
    }

    #[test]
    fn test_prefix_terms_emit_surface_form() {
        let analyzer = StandardAnalyzer::new(Language::English).with_prefix_terms(true);
        let tokens: Vec<Token> = analyzer.analyze("running dog").unwrap().collect();
        let pairs: Vec<(&str, u32)> =
            tokens.iter().map(|t| (t.text.as_str(), t.position)).collect();
        assert_eq!(pairs, vec![("run", 0), ("running", 0), ("dog", 1)]);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let analyzer = analyzer_for_language("en", false);
        let text = "Hello from the SwiftPM sample integration";
        assert_eq!(texts(analyzer.as_ref(), text), texts(analyzer.as_ref(), text));
    }

    #[test]
    fn test_unknown_language_falls_back_to_simple() {
        let analyzer = analyzer_for_language("xx", false);
        assert_eq!(analyzer.name(), "simple");
        assert_eq!(texts(analyzer.as_ref(), "The Running Ｆｏｏ"), vec!["the", "running", "foo"]);
    }

    #[test]
    fn test_keyword_analyzer() {
        let analyzer = KeywordAnalyzer::new();
        let tokens: Vec<Token> = analyzer.analyze("  CategoryA ").unwrap().collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "CategoryA");
        assert_eq!(tokens[0].start_offset, 2);
        assert!(texts(&analyzer, "   ").is_empty());
    }
}
