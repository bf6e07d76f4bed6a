//! Point-in-time views of the committed index.

use std::sync::Arc;

use crate::data::Document;
use crate::error::Result;
use crate::index::deletion::DeletionBitmap;
use crate::index::segment::{DocValue, SegmentMeta, SegmentReader};
use crate::schema::{FIELD_IDENTIFIER, FieldType};

/// Address of a document inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocAddress {
    /// Index into [`Snapshot::segments`].
    pub segment: usize,
    pub doc: u32,
}

impl DocAddress {
    pub fn new(segment: usize, doc: u32) -> Self {
        DocAddress { segment, doc }
    }
}

/// One segment as seen by a snapshot.
#[derive(Debug, Clone)]
pub struct SegmentView {
    pub meta: SegmentMeta,
    pub reader: Arc<SegmentReader>,
    pub deletions: Option<Arc<DeletionBitmap>>,
}

impl SegmentView {
    pub fn is_live(&self, doc: u32) -> bool {
        doc < self.meta.doc_count
            && !self
                .deletions
                .as_ref()
                .is_some_and(|deletions| deletions.is_deleted(doc))
    }

    pub fn live_docs(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.meta.doc_count).filter(|&doc| self.is_live(doc))
    }
}

/// The segments and deletions of one committed generation.
///
/// Snapshots are immutable and shared behind an `Arc`. Later commits publish
/// a new snapshot and never change one that is in use.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    segments: Vec<SegmentView>,
}

impl Snapshot {
    pub fn new(generation: u64, segments: Vec<SegmentView>) -> Self {
        Snapshot {
            generation,
            segments,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn segments(&self) -> &[SegmentView] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&SegmentView> {
        self.segments.get(index)
    }

    pub fn is_live(&self, address: DocAddress) -> bool {
        self.segment(address.segment)
            .is_some_and(|view| view.is_live(address.doc))
    }

    /// Number of searchable documents.
    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.meta.live_count() as u64).sum()
    }

    /// Number of documents including deleted ones not yet merged away.
    pub fn max_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.meta.doc_count as u64).sum()
    }

    /// Every live document, in address order.
    pub fn all_live(&self) -> Vec<DocAddress> {
        self.segments
            .iter()
            .enumerate()
            .flat_map(|(i, view)| view.live_docs().map(move |doc| DocAddress::new(i, doc)))
            .collect()
    }

    /// Documents containing `term` in `field`, over all segments.
    pub fn doc_frequency(&self, field: &str, term: &str) -> Result<u64> {
        let mut total = 0u64;
        for view in &self.segments {
            total += view.reader.doc_frequency(field, term)? as u64;
        }
        Ok(total)
    }

    /// Mean token count of `field` per document.
    pub fn average_field_length(&self, field: &str) -> f64 {
        let docs = self.max_doc_count();
        if docs == 0 {
            return 0.0;
        }
        let sum: u64 = self
            .segments
            .iter()
            .map(|s| s.reader.field_length_sum(field))
            .sum();
        sum as f64 / docs as f64
    }

    pub fn document(&self, address: DocAddress) -> Result<Document> {
        match self.segment(address.segment) {
            Some(view) => view.reader.stored_document(address.doc),
            None => Err(crate::error::QuarryError::not_found(format!(
                "segment {} in snapshot {}",
                address.segment, self.generation
            ))),
        }
    }

    /// The type a field was indexed with, from the first segment that has it.
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.segments
            .iter()
            .find_map(|view| view.reader.field_type(field))
    }

    /// Every field indexed in some segment of this snapshot.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .flat_map(|view| view.reader.field_types().map(|(field, _)| field))
    }

    pub fn doc_value(&self, address: DocAddress, field: &str) -> Option<&DocValue> {
        self.segment(address.segment)?
            .reader
            .doc_value(field, address.doc)
    }

    pub fn identifier(&self, address: DocAddress) -> Option<&str> {
        self.doc_value(address, FIELD_IDENTIFIER)?.as_str()
    }

    /// Live documents whose identifier is `id`.
    pub fn find_identifier(&self, id: &str) -> Result<Vec<DocAddress>> {
        let mut found = Vec::new();
        for (i, view) in self.segments.iter().enumerate() {
            if let Some(postings) = view.reader.postings(FIELD_IDENTIFIER, id)? {
                found.extend(
                    postings
                        .iter()
                        .filter(|p| view.is_live(p.doc))
                        .map(|p| DocAddress::new(i, p.doc)),
                );
            }
        }
        Ok(found)
    }
}
