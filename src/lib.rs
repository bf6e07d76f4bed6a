//! # Quarry
//!
//! An embeddable full-text search engine.
//!
//! ## Features
//!
//! - Language-aware analysis with stemming and stop words
//! - Immutable segments with snapshot-isolated readers
//! - BM25 scoring
//! - Free-text queries and structured predicates
//! - Background batch indexing with parallel analysis
//! - Crash-safe commits over pluggable storage
//!
//! ## Example
//!
//! ```
//! use quarry::{Document, SearchService, ServiceOptions};
//!
//! let service = SearchService::in_memory(ServiceOptions::default()).unwrap();
//! service
//!     .add_document(Document::new("1").add_title("hello").add_value("world"))
//!     .unwrap();
//! assert_eq!(service.search("world").unwrap().count(), 1);
//! ```

pub mod analysis;
pub mod config;
mod data;
mod error;
pub mod index;
pub mod query;
pub mod schema;
pub mod search;
pub mod service;
pub mod storage;
mod util;

pub use analysis::Analyzer;
pub use config::{DefaultOperator, IndexWriterConfig, SearchConfig, ServiceOptions};
pub use data::{DataValue, Document, ObjectType, format_timestamp, parse_timestamp};
pub use error::{QuarryError, Result};
pub use query::{CompareOp, Literal, Predicate, SortSpec, SortType};
pub use schema::{
    FIELD_IDENTIFIER, FIELD_OBJECT_TYPE, FIELD_TIMESTAMP, FIELD_TITLE, FIELD_VALUE, FieldType,
    Schema,
};
pub use search::{ResultSet, SearchResult};
pub use service::{IndexUpdateContext, IndexingTask, SearchService};
pub use storage::{FileStorage, MemoryStorage, Storage};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
