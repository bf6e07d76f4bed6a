//! Segment merging.
//!
//! Merging copies the live documents of several segments into one new
//! segment, renumbering them in segment order and dropping deleted ones.
//! Search results are unchanged by a merge.

use fst::Streamer;
use fst::map::OpBuilder;

use crate::error::Result;
use crate::index::posting::Posting;
use crate::index::segment::{SegmentBuilder, SegmentMeta};
use crate::index::snapshot::SegmentView;

/// Pick the segments to merge when there are more than `merge_factor`.
///
/// Returns the names of the `merge_factor` segments with the fewest live
/// documents, or nothing when no merge is needed.
pub fn select_merge(segments: &[SegmentMeta], merge_factor: usize) -> Vec<String> {
    if merge_factor < 2 || segments.len() <= merge_factor {
        return Vec::new();
    }
    let mut by_size: Vec<&SegmentMeta> = segments.iter().collect();
    by_size.sort_by_key(|meta| (meta.live_count(), meta.name.clone()));
    by_size
        .into_iter()
        .take(merge_factor)
        .map(|meta| meta.name.clone())
        .collect()
}

/// Build a segment holding the live documents of `sources`.
pub fn merge_segments(sources: &[SegmentView]) -> Result<SegmentBuilder> {
    let mut builder = SegmentBuilder::new();

    // old doc number -> new doc number, per source
    let mut doc_maps: Vec<Vec<Option<u32>>> = Vec::with_capacity(sources.len());
    for view in sources {
        for (field, field_type) in view.reader.field_types() {
            builder.declare_field(field, field_type);
        }
        let mut map = vec![None; view.meta.doc_count as usize];
        for doc in view.live_docs() {
            let new_doc = builder.push_document(
                view.reader.stored_bytes(doc)?.to_vec(),
                view.reader.doc_values_of(doc),
                view.reader.field_lengths_of(doc),
            )?;
            map[doc as usize] = Some(new_doc);
        }
        doc_maps.push(map);
    }

    let mut op = OpBuilder::new();
    for view in sources {
        op = op.add(view.reader.dictionary());
    }
    let mut union = op.union();
    while let Some((key, indexed)) = union.next() {
        let key = key.to_vec();
        let mut indexed = indexed.to_vec();
        // Sources were renumbered in order, so visiting them in order keeps
        // the merged doc numbers increasing.
        indexed.sort_by_key(|iv| iv.index);
        for iv in indexed {
            let postings = sources[iv.index].reader.postings_at(iv.value)?;
            for posting in postings.postings() {
                if let Some(new_doc) = doc_maps[iv.index]
                    .get(posting.doc as usize)
                    .copied()
                    .flatten()
                {
                    builder.push_posting(
                        key.clone(),
                        Posting::new(new_doc, posting.positions.clone()),
                    )?;
                }
            }
        }
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analysis::SimpleAnalyzer;
    use crate::data::Document;
    use crate::index::analyzed::AnalyzedDocument;
    use crate::index::deletion::DeletionBitmap;
    use crate::index::segment::SegmentReader;
    use crate::schema::Schema;
    use crate::storage::MemoryStorage;

    fn view(storage: &MemoryStorage, name: &str, docs: &[(&str, &str)]) -> SegmentView {
        let mut builder = SegmentBuilder::new();
        for (id, text) in docs {
            let doc = Document::new(*id).add_value(*text);
            let analyzed =
                AnalyzedDocument::analyze(doc, &Schema::new(), &SimpleAnalyzer::new()).unwrap();
            builder.add_document(&analyzed).unwrap();
        }
        let meta = builder.write(storage, name).unwrap();
        SegmentView {
            reader: Arc::new(SegmentReader::open(storage, &meta).unwrap()),
            meta,
            deletions: None,
        }
    }

    #[test]
    fn test_select_merge() {
        let meta = |name: &str, docs: u32| SegmentMeta {
            name: name.to_string(),
            doc_count: docs,
            deletion_generation: 0,
            deleted_count: 0,
        };
        let segments = vec![meta("a", 10), meta("b", 1), meta("c", 5)];
        assert!(select_merge(&segments, 3).is_empty());
        assert_eq!(select_merge(&segments, 2), vec!["b", "c"]);
    }

    #[test]
    fn test_merge_drops_deleted_docs() {
        let storage = MemoryStorage::new();
        let first = view(&storage, "seg_000001", &[("a", "red fish"), ("b", "blue fish")]);
        let mut second = view(&storage, "seg_000002", &[("c", "red car"), ("d", "old fish")]);

        let mut deletions = DeletionBitmap::new(2);
        deletions.delete(0).unwrap();
        second.meta.deleted_count = 1;
        second.meta.deletion_generation = 1;
        second.deletions = Some(Arc::new(deletions));

        let merged = merge_segments(&[first, second])
            .unwrap()
            .write(&storage, "seg_000003")
            .unwrap();
        assert_eq!(merged.doc_count, 3);

        let reader = SegmentReader::open(&storage, &merged).unwrap();
        let fish: Vec<u32> = reader
            .postings("v", "fish")
            .unwrap()
            .unwrap()
            .iter()
            .map(|p| p.doc)
            .collect();
        assert_eq!(fish, vec![0, 1, 2]);

        let red: Vec<u32> = reader
            .postings("v", "red")
            .unwrap()
            .unwrap()
            .iter()
            .map(|p| p.doc)
            .collect();
        assert_eq!(red, vec![0]);
        assert!(reader.postings("v", "car").unwrap().is_none());
        assert!(reader.postings("id", "c").unwrap().is_none());

        assert_eq!(reader.stored_document(2).unwrap().id, "d");
        assert_eq!(reader.field_length("v", 2), 2);
    }
}
