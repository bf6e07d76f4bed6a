//! Query parsing, evaluation and scoring.
//!
//! Free-text queries and structured predicates both compile to a
//! [`Predicate`] tree, which the [`Evaluator`] interprets against one
//! snapshot.
//!
//! # Examples
//!
//! ```
//! use quarry::query::{parse_predicate, CompareOp, Predicate};
//!
//! let predicate = parse_predicate("category == 'news' AND rank > 3").unwrap();
//! assert_eq!(
//!     predicate,
//!     Predicate::eq("category", "news").and(Predicate::compare("rank", CompareOp::Gt, 3i64))
//! );
//! ```

pub mod evaluator;
pub mod parser;
pub mod predicate;
pub mod scoring;

pub use evaluator::{DocSet, Evaluator};
pub use parser::{QueryStringParser, format_predicate, parse_predicate};
pub use predicate::{CompareOp, Literal, Predicate, SortSpec, SortType};
pub use scoring::{TermWeight, bm25_score};
