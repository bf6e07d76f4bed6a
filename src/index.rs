//! The on-disk inverted index.
//!
//! An index is a set of immutable segments plus per-segment deletion
//! bitmaps, listed by a numbered manifest. The [`IndexWriter`] is the only
//! component that changes it; readers work from [`Snapshot`]s.

pub mod analyzed;
pub mod deletion;
pub mod manifest;
pub mod merge;
pub mod posting;
pub mod segment;
pub mod snapshot;
pub mod writer;

pub use analyzed::{AnalyzedDocument, BatchAnalyzer};
pub use deletion::DeletionBitmap;
pub use manifest::Manifest;
pub use segment::{DocValue, SegmentMeta, SegmentReader};
pub use snapshot::{DocAddress, SegmentView, Snapshot};
pub use writer::{IndexWriter, SnapshotHandle};
