//! Text analysis module for Quarry.
//!
//! Analysis turns field text into the terms stored in the inverted index and
//! turns query text into the terms looked up at search time. The pipeline is:
//!
//! ```text
//! Text → word segmentation → NFKC + lowercase → stop words → stemming → Tokens
//! ```
//!
//! # Examples
//!
//! ```
//! use quarry::analysis::{Analyzer, StandardAnalyzer, Language};
//!
//! let analyzer = StandardAnalyzer::new(Language::English);
//! let tokens: Vec<_> = analyzer.analyze("The quick foxes").unwrap().map(|t| t.text).collect();
//! assert_eq!(tokens, vec!["quick", "fox"]);
//! ```

pub mod analyzer;
pub mod language;
pub mod stop_words;
pub mod token;

pub use analyzer::{
    Analyzer, KeywordAnalyzer, SimpleAnalyzer, StandardAnalyzer, analyzer_for_language,
};
pub use language::Language;
pub use token::{Token, TokenStream};
