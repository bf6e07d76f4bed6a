use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};

/// Languages with a dedicated stemming analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    French,
    German,
    Spanish,
    Italian,
    Portuguese,
    Dutch,
    Swedish,
    Norwegian,
    Danish,
    Finnish,
    Russian,
}

impl Language {
    /// Resolve an ISO 639-1 code (`"en"`) or English name (`"english"`).
    ///
    /// Region suffixes such as `en-US` or `pt_BR` are ignored. Returns `None`
    /// for anything unrecognised, in which case callers fall back to the
    /// simple analyzer.
    pub fn from_code(code: &str) -> Option<Language> {
        let code = code.trim().to_lowercase();
        let base = code.split(['-', '_']).next().unwrap_or_default();
        let language = match base {
            "en" | "english" => Language::English,
            "fr" | "french" => Language::French,
            "de" | "german" => Language::German,
            "es" | "spanish" => Language::Spanish,
            "it" | "italian" => Language::Italian,
            "pt" | "portuguese" => Language::Portuguese,
            "nl" | "dutch" => Language::Dutch,
            "sv" | "swedish" => Language::Swedish,
            "no" | "nb" | "nn" | "norwegian" => Language::Norwegian,
            "da" | "danish" => Language::Danish,
            "fi" | "finnish" => Language::Finnish,
            "ru" | "russian" => Language::Russian,
            _ => return None,
        };
        Some(language)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::French => "fr",
            Language::German => "de",
            Language::Spanish => "es",
            Language::Italian => "it",
            Language::Portuguese => "pt",
            Language::Dutch => "nl",
            Language::Swedish => "sv",
            Language::Norwegian => "no",
            Language::Danish => "da",
            Language::Finnish => "fi",
            Language::Russian => "ru",
        }
    }

    pub(crate) fn stemming_algorithm(&self) -> Algorithm {
        match self {
            Language::English => Algorithm::English,
            Language::French => Algorithm::French,
            Language::German => Algorithm::German,
            Language::Spanish => Algorithm::Spanish,
            Language::Italian => Algorithm::Italian,
            Language::Portuguese => Algorithm::Portuguese,
            Language::Dutch => Algorithm::Dutch,
            Language::Swedish => Algorithm::Swedish,
            Language::Norwegian => Algorithm::Norwegian,
            Language::Danish => Algorithm::Danish,
            Language::Finnish => Algorithm::Finnish,
            Language::Russian => Algorithm::Russian,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(Language::from_code("en"), Some(Language::English));
        assert_eq!(Language::from_code("EN-us"), Some(Language::English));
        assert_eq!(Language::from_code("pt_BR"), Some(Language::Portuguese));
        assert_eq!(Language::from_code("german"), Some(Language::German));
        assert_eq!(Language::from_code("tlh"), None);
        assert_eq!(Language::from_code(""), None);
    }
}
