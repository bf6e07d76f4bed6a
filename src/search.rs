//! Result sets and ordering.

pub mod results;
pub(crate) mod sort;

pub use results::{ResultSet, SearchResult};
