//! The single index writer.
//!
//! Added and removed documents are buffered and become visible together at
//! [`IndexWriter::commit`]. A commit writes new segment and deletion files,
//! then publishes a new manifest; only the manifest rename makes it visible.
//! If any step fails, the files of the failed attempt are removed, the
//! previous commit stays authoritative and the pending changes are kept so
//! the commit can be retried or rolled back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::config::IndexWriterConfig;
use crate::data::Document;
use crate::error::{QuarryError, Result};
use crate::index::analyzed::{AnalyzedDocument, BatchAnalyzer};
use crate::index::deletion::{DeletionBitmap, deletion_file_name};
use crate::index::manifest::{Manifest, StoredNumbers, WRITE_LOCK};
use crate::index::merge::{merge_segments, select_merge};
use crate::index::segment::{SegmentBuilder, SegmentMeta, SegmentReader, segment_name};
use crate::index::snapshot::{SegmentView, Snapshot};
use crate::schema::FIELD_IDENTIFIER;
use crate::storage::{LockGuard, Storage};

/// Shared handle to the most recently committed snapshot.
pub type SnapshotHandle = Arc<RwLock<Arc<Snapshot>>>;

/// A segment written by this writer but not yet committed.
#[derive(Debug)]
struct PendingSegment {
    meta: SegmentMeta,
    reader: Arc<SegmentReader>,
    deletions: DeletionBitmap,
}

/// Writes documents to an index. At most one writer exists per index; the
/// `write.lock` file enforces this across processes.
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    analyzer: Arc<BatchAnalyzer>,
    config: IndexWriterConfig,
    manifest: Manifest,
    readers: HashMap<String, Arc<SegmentReader>>,
    deletions: HashMap<String, Arc<DeletionBitmap>>,
    next_segment: u64,
    /// Highest generation used on disk; the next commit gets the one after.
    last_generation: u64,

    buffer: Vec<Option<AnalyzedDocument>>,
    buffer_index: HashMap<String, usize>,
    pending: Vec<PendingSegment>,
    pending_ids: HashMap<String, (usize, u32)>,
    removed_ids: HashSet<String>,

    snapshot: SnapshotHandle,
    lock: Option<LockGuard>,
    closed: bool,
}

impl std::fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("generation", &self.manifest.generation)
            .field("segments", &self.manifest.segments.len())
            .field("pending_docs", &self.pending_docs())
            .field("closed", &self.closed)
            .finish()
    }
}

impl IndexWriter {
    /// Open the writer for the index in `storage`, recovering the latest
    /// valid commit and removing files left behind by failed ones.
    pub fn open(
        storage: Arc<dyn Storage>,
        analyzer: Arc<BatchAnalyzer>,
        config: IndexWriterConfig,
    ) -> Result<Self> {
        let lock = storage.try_lock(WRITE_LOCK)?;
        let manifest = Manifest::load_latest(storage.as_ref())?;
        let stored = StoredNumbers::scan(storage.as_ref())?;
        if stored.newest_generation > manifest.generation {
            warn!(
                "commits after generation {} could not be read, keeping their files until the \
                 next commit",
                manifest.generation
            );
        }
        let removed = manifest.remove_unreferenced(storage.as_ref())?;
        if !removed.is_empty() {
            warn!("removed {} stale index files: {removed:?}", removed.len());
        }

        let mut readers = HashMap::with_capacity(manifest.segments.len());
        let mut deletions = HashMap::new();
        for meta in &manifest.segments {
            let reader = SegmentReader::open(storage.as_ref(), meta)?;
            readers.insert(meta.name.clone(), Arc::new(reader));
            if meta.deletion_generation > 0 {
                let name = deletion_file_name(&meta.name, meta.deletion_generation);
                let bitmap = DeletionBitmap::read(storage.as_ref(), &name)?;
                deletions.insert(meta.name.clone(), Arc::new(bitmap));
            }
        }

        info!(
            "opened index at generation {} with {} segments and {} documents",
            manifest.generation,
            manifest.segments.len(),
            manifest.live_doc_count()
        );

        let next_segment = manifest.next_segment.max(stored.next_segment);
        let last_generation = manifest.generation.max(stored.newest_generation);
        let mut writer = IndexWriter {
            storage,
            analyzer,
            config,
            manifest,
            readers,
            deletions,
            next_segment,
            last_generation,
            buffer: Vec::new(),
            buffer_index: HashMap::new(),
            pending: Vec::new(),
            pending_ids: HashMap::new(),
            removed_ids: HashSet::new(),
            snapshot: Arc::new(RwLock::new(Arc::new(Snapshot::empty()))),
            lock: Some(lock),
            closed: false,
        };
        writer.publish_snapshot();
        Ok(writer)
    }

    /// Handle through which searchers read the latest committed snapshot.
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    pub fn analyzer(&self) -> &Arc<BatchAnalyzer> {
        &self.analyzer
    }

    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    pub fn segment_count(&self) -> usize {
        self.manifest.segments.len()
    }

    /// Documents added since the last commit.
    pub fn pending_docs(&self) -> usize {
        self.buffer_index.len() + self.pending_ids.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.buffer_index.is_empty() || !self.pending.is_empty() || !self.removed_ids.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(QuarryError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        self.check_closed()?;
        let analyzed = self.analyzer.analyze(doc)?;
        self.add_analyzed(vec![analyzed])
    }

    /// Analyze a batch in parallel and buffer it. An invalid document
    /// rejects the whole batch.
    pub fn add_documents(&mut self, docs: Vec<Document>) -> Result<()> {
        self.check_closed()?;
        let analyzed = self.analyzer.analyze_batch(docs)?;
        self.add_analyzed(analyzed)
    }

    /// Buffer already analyzed documents. A document replaces any earlier
    /// version with the same identifier.
    pub fn add_analyzed(&mut self, docs: Vec<AnalyzedDocument>) -> Result<()> {
        self.check_closed()?;
        for doc in docs {
            self.discard_pending_version(&doc.id)?;
            match self.buffer_index.get(&doc.id) {
                Some(&slot) => self.buffer[slot] = Some(doc),
                None => {
                    self.buffer_index.insert(doc.id.clone(), self.buffer.len());
                    self.buffer.push(Some(doc));
                }
            }
            if self.buffer_index.len() >= self.config.max_buffered_docs {
                self.flush_buffer()?;
            }
        }
        Ok(())
    }

    /// Remove the document with this identifier, if any, at the next commit.
    pub fn remove_document(&mut self, id: &str) -> Result<()> {
        self.check_closed()?;
        if let Some(slot) = self.buffer_index.remove(id) {
            self.buffer[slot] = None;
        }
        self.discard_pending_version(id)?;
        self.removed_ids.insert(id.to_string());
        Ok(())
    }

    fn discard_pending_version(&mut self, id: &str) -> Result<()> {
        if let Some((index, doc)) = self.pending_ids.remove(id) {
            self.pending[index].deletions.delete(doc)?;
        }
        Ok(())
    }

    /// Write buffered documents to a new, not yet committed, segment.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer_index.is_empty() {
            self.buffer.clear();
            return Ok(());
        }

        let name = segment_name(self.next_segment);
        let mut builder = SegmentBuilder::new();
        let mut ids = Vec::with_capacity(self.buffer_index.len());
        for doc in self.buffer.iter().flatten() {
            let doc_num = builder.add_document(doc)?;
            ids.push((doc.id.clone(), doc_num));
        }

        let written = builder
            .write(self.storage.as_ref(), &name)
            .and_then(|meta| {
                let reader = SegmentReader::open(self.storage.as_ref(), &meta)?;
                Ok((meta, reader))
            });
        let (meta, reader) = match written {
            Ok(written) => written,
            Err(e) => {
                self.delete_segment_files(&name);
                return Err(e);
            }
        };

        debug!("flushed {} buffered documents to {name}", meta.doc_count);
        let index = self.pending.len();
        for (id, doc_num) in ids {
            self.pending_ids.insert(id, (index, doc_num));
        }
        self.pending.push(PendingSegment {
            deletions: DeletionBitmap::new(meta.doc_count),
            meta,
            reader: Arc::new(reader),
        });
        self.next_segment += 1;
        self.buffer.clear();
        self.buffer_index.clear();
        Ok(())
    }

    fn delete_segment_files(&self, name: &str) {
        for ext in crate::index::segment::SEGMENT_EXTENSIONS {
            let file = format!("{name}.{ext}");
            if self.storage.file_exists(&file) {
                if let Err(e) = self.storage.delete_file(&file) {
                    warn!("failed to remove {file}: {e}");
                }
            }
        }
    }

    /// Make all pending changes durable and visible.
    pub fn commit(&mut self) -> Result<()> {
        self.check_closed()?;
        if !self.has_pending_changes() {
            return Ok(());
        }
        self.flush_buffer()?;

        let mut written = Vec::new();
        let result = self.publish_pending(&mut written);
        if let Err(e) = result {
            for file in &written {
                let _ = self.storage.delete_file(file);
            }
            return Err(e);
        }

        self.pending.clear();
        self.pending_ids.clear();
        self.removed_ids.clear();
        self.publish_snapshot();
        self.remove_unreferenced();

        let to_merge = select_merge(&self.manifest.segments, self.config.merge_factor);
        if !to_merge.is_empty() {
            if let Err(e) = self.merge(&to_merge) {
                warn!("merge of {} segments failed: {e}", to_merge.len());
            }
        }
        Ok(())
    }

    fn publish_pending(&mut self, written: &mut Vec<String>) -> Result<()> {
        let generation = self.last_generation + 1;

        // Identifiers whose committed versions are superseded or removed.
        let doomed: Vec<&String> = self.pending_ids.keys().chain(self.removed_ids.iter()).collect();

        let mut segments = Vec::with_capacity(self.manifest.segments.len() + self.pending.len());
        let mut deletions = HashMap::new();

        for meta in &self.manifest.segments {
            let reader = self.reader(&meta.name)?;
            let current = self.deletions.get(&meta.name);
            let mut updated: Option<DeletionBitmap> = None;
            for id in &doomed {
                let Some(postings) = reader.postings(FIELD_IDENTIFIER, id)? else {
                    continue;
                };
                for posting in postings.iter() {
                    let bitmap = updated.get_or_insert_with(|| match current {
                        Some(bitmap) => (**bitmap).clone(),
                        None => DeletionBitmap::new(meta.doc_count),
                    });
                    bitmap.delete(posting.doc)?;
                }
            }

            match updated {
                Some(bitmap) if bitmap.deleted_count() != meta.deleted_count => {
                    let meta =
                        self.write_deletions(meta, bitmap, generation, written, &mut deletions)?;
                    if meta.live_count() > 0 {
                        segments.push(meta);
                    }
                }
                _ => {
                    if let Some(bitmap) = current {
                        deletions.insert(meta.name.clone(), bitmap.clone());
                    }
                    segments.push(meta.clone());
                }
            }
        }

        let mut readers = self.readers.clone();
        for pending in &self.pending {
            readers.insert(pending.meta.name.clone(), pending.reader.clone());
            let meta = if pending.deletions.deleted_count() > 0 {
                self.write_deletions(
                    &pending.meta,
                    pending.deletions.clone(),
                    generation,
                    written,
                    &mut deletions,
                )?
            } else {
                pending.meta.clone()
            };
            if meta.live_count() > 0 {
                segments.push(meta);
            }
        }

        let manifest = Manifest {
            generation,
            next_segment: self.next_segment,
            segments,
            ..Manifest::default()
        };
        manifest.publish(self.storage.as_ref())?;

        readers.retain(|name, _| manifest.segments.iter().any(|s| &s.name == name));
        debug!(
            "committed generation {generation}: {} segments, {} live documents",
            manifest.segments.len(),
            manifest.live_doc_count()
        );
        self.last_generation = generation;
        self.manifest = manifest;
        self.readers = readers;
        self.deletions = deletions;
        Ok(())
    }

    fn write_deletions(
        &self,
        meta: &SegmentMeta,
        bitmap: DeletionBitmap,
        generation: u64,
        written: &mut Vec<String>,
        deletions: &mut HashMap<String, Arc<DeletionBitmap>>,
    ) -> Result<SegmentMeta> {
        let name = deletion_file_name(&meta.name, generation);
        written.push(name.clone());
        bitmap.write(self.storage.as_ref(), &name)?;
        let meta = SegmentMeta {
            deletion_generation: generation,
            deleted_count: bitmap.deleted_count(),
            ..meta.clone()
        };
        deletions.insert(meta.name.clone(), Arc::new(bitmap));
        Ok(meta)
    }

    fn reader(&self, name: &str) -> Result<&Arc<SegmentReader>> {
        self.readers
            .get(name)
            .ok_or_else(|| QuarryError::index(format!("no reader for segment {name}")))
    }

    fn publish_snapshot(&mut self) {
        let segments = self
            .manifest
            .segments
            .iter()
            .filter_map(|meta| {
                Some(SegmentView {
                    meta: meta.clone(),
                    reader: self.readers.get(&meta.name)?.clone(),
                    deletions: self.deletions.get(&meta.name).cloned(),
                })
            })
            .collect();
        let snapshot = Snapshot::new(self.manifest.generation, segments);
        *self.snapshot.write() = Arc::new(snapshot);
    }

    fn remove_unreferenced(&self) {
        match self.manifest.remove_unreferenced(self.storage.as_ref()) {
            Ok(removed) if !removed.is_empty() => debug!("removed obsolete files {removed:?}"),
            Ok(_) => {}
            Err(e) => warn!("failed to list obsolete files: {e}"),
        }
    }

    /// Discard every change since the last commit.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_closed()?;
        for pending in self.pending.drain(..) {
            for ext in crate::index::segment::SEGMENT_EXTENSIONS {
                let _ = self.storage.delete_file(&format!("{}.{ext}", pending.meta.name));
            }
        }
        let discarded = self.buffer_index.len() + self.pending_ids.len();
        self.buffer.clear();
        self.buffer_index.clear();
        self.pending_ids.clear();
        self.removed_ids.clear();
        if discarded > 0 {
            debug!("rolled back {discarded} uncommitted documents");
        }
        Ok(())
    }

    /// Commit, then merge all segments into one and drop deleted documents.
    pub fn optimize(&mut self) -> Result<()> {
        self.commit()?;
        let segments = &self.manifest.segments;
        let needs_merge = segments.len() > 1 || segments.iter().any(|s| s.deleted_count > 0);
        if !needs_merge {
            return Ok(());
        }
        let names: Vec<String> = segments.iter().map(|s| s.name.clone()).collect();
        self.merge(&names)?;
        info!("optimized index to {} segment(s)", self.manifest.segments.len());
        Ok(())
    }

    /// Replace the named committed segments by one merged segment.
    fn merge(&mut self, names: &[String]) -> Result<()> {
        let sources: Vec<SegmentView> = self
            .manifest
            .segments
            .iter()
            .filter(|meta| names.contains(&meta.name))
            .map(|meta| {
                Ok(SegmentView {
                    meta: meta.clone(),
                    reader: self.reader(&meta.name)?.clone(),
                    deletions: self.deletions.get(&meta.name).cloned(),
                })
            })
            .collect::<Result<_>>()?;

        let builder = merge_segments(&sources)?;
        let name = segment_name(self.next_segment);
        let merged = if builder.is_empty() {
            None
        } else {
            let written = builder.write(self.storage.as_ref(), &name).and_then(|meta| {
                let reader = SegmentReader::open(self.storage.as_ref(), &meta)?;
                Ok((meta, reader))
            });
            match written {
                Ok(written) => Some(written),
                Err(e) => {
                    self.delete_segment_files(&name);
                    return Err(e);
                }
            }
        };

        let mut segments: Vec<SegmentMeta> = self
            .manifest
            .segments
            .iter()
            .filter(|meta| !names.contains(&meta.name))
            .cloned()
            .collect();
        if let Some((meta, _)) = &merged {
            segments.push(meta.clone());
        }
        let manifest = Manifest {
            generation: self.last_generation + 1,
            next_segment: self.next_segment + 1,
            segments,
            ..Manifest::default()
        };
        if let Err(e) = manifest.publish(self.storage.as_ref()) {
            self.delete_segment_files(&name);
            return Err(e);
        }

        debug!("merged {} segments into {name}", sources.len());
        self.last_generation = manifest.generation;
        self.next_segment += 1;
        self.readers.retain(|n, _| !names.contains(n));
        self.deletions.retain(|n, _| !names.contains(n));
        if let Some((meta, reader)) = merged {
            self.readers.insert(meta.name, Arc::new(reader));
        }
        self.manifest = manifest;
        self.publish_snapshot();
        self.remove_unreferenced();
        Ok(())
    }

    /// Drop uncommitted changes and release the write lock.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.rollback();
        self.closed = true;
        self.lock = None;
        result
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Language, StandardAnalyzer};
    use crate::schema::Schema;
    use crate::storage::MemoryStorage;

    fn writer_with(storage: &MemoryStorage, config: IndexWriterConfig) -> IndexWriter {
        let analyzer = BatchAnalyzer::new(
            Schema::new(),
            Arc::new(StandardAnalyzer::new(Language::English)),
            2,
        )
        .unwrap();
        IndexWriter::open(Arc::new(storage.clone()), Arc::new(analyzer), config).unwrap()
    }

    fn writer(storage: &MemoryStorage) -> IndexWriter {
        writer_with(storage, IndexWriterConfig::default())
    }

    fn ids_with(snapshot: &Snapshot, term: &str) -> Vec<String> {
        let mut ids = Vec::new();
        for view in snapshot.segments() {
            if let Some(list) = view.reader.postings("v", term).unwrap() {
                for p in list.iter().filter(|p| view.is_live(p.doc)) {
                    ids.push(view.reader.stored_document(p.doc).unwrap().id);
                }
            }
        }
        ids.sort();
        ids
    }

    #[test]
    fn test_changes_visible_only_after_commit() {
        let storage = MemoryStorage::new();
        let mut writer = writer(&storage);
        writer.add_document(Document::new("1").add_value("hello world")).unwrap();
        assert_eq!(writer.snapshot().live_doc_count(), 0);
        assert_eq!(writer.pending_docs(), 1);

        writer.commit().unwrap();
        let snapshot = writer.snapshot();
        assert_eq!(snapshot.live_doc_count(), 1);
        assert_eq!(writer.generation(), 1);
        assert!(storage.file_exists("segments_1.json"));
    }

    #[test]
    fn test_replace_by_identifier() {
        let storage = MemoryStorage::new();
        let mut writer = writer(&storage);
        writer.add_document(Document::new("1").add_value("unique banana")).unwrap();
        writer.commit().unwrap();
        let before = writer.snapshot();

        writer.add_document(Document::new("1").add_value("plain apple")).unwrap();
        writer.commit().unwrap();

        let after = writer.snapshot();
        assert_eq!(after.live_doc_count(), 1);
        assert!(ids_with(&after, "banana").is_empty());
        assert_eq!(ids_with(&after, "appl"), vec!["1"]);

        // The older snapshot is unaffected.
        assert_eq!(ids_with(&before, "banana"), vec!["1"]);
    }

    #[test]
    fn test_duplicates_within_buffer_and_flushed_segments() {
        let storage = MemoryStorage::new();
        let config = IndexWriterConfig {
            max_buffered_docs: 2,
            ..IndexWriterConfig::default()
        };
        let mut writer = writer_with(&storage, config);
        writer
            .add_documents(vec![
                Document::new("a").add_value("first"),
                Document::new("a").add_value("second"),
                Document::new("b").add_value("first"),
                Document::new("a").add_value("third"),
            ])
            .unwrap();
        writer.commit().unwrap();

        let snapshot = writer.snapshot();
        assert_eq!(snapshot.live_doc_count(), 2);
        assert_eq!(ids_with(&snapshot, "first"), vec!["b"]);
        assert_eq!(ids_with(&snapshot, "third"), vec!["a"]);
    }

    #[test]
    fn test_remove_document() {
        let storage = MemoryStorage::new();
        let mut writer = writer(&storage);
        writer
            .add_documents(vec![
                Document::new("1").add_value("red"),
                Document::new("2").add_value("red"),
            ])
            .unwrap();
        writer.commit().unwrap();

        writer.remove_document("1").unwrap();
        writer.remove_document("missing").unwrap();
        writer.commit().unwrap();
        assert_eq!(ids_with(&writer.snapshot(), "red"), vec!["2"]);

        writer.remove_document("2").unwrap();
        writer.commit().unwrap();
        assert_eq!(writer.snapshot().live_doc_count(), 0);
        assert_eq!(writer.segment_count(), 0);
    }

    #[test]
    fn test_failed_commit_leaves_previous_state() {
        let storage = MemoryStorage::new();
        let mut writer = writer(&storage);
        writer.add_document(Document::new("1").add_value("kept")).unwrap();
        writer.commit().unwrap();
        let files_before = {
            let mut files = storage.list_files().unwrap();
            files.sort();
            files
        };

        writer.add_document(Document::new("2").add_value("lost")).unwrap();
        storage.fail_next_writes(1, std::io::ErrorKind::Interrupted);
        assert!(writer.commit().is_err());
        assert_eq!(writer.snapshot().live_doc_count(), 1);
        assert_eq!(writer.pending_docs(), 1);

        writer.rollback().unwrap();
        assert_eq!(writer.pending_docs(), 0);
        let mut files_after = storage.list_files().unwrap();
        files_after.sort();
        assert_eq!(files_before, files_after);
    }

    #[test]
    fn test_retry_after_failed_manifest_write() {
        let storage = MemoryStorage::new();
        let mut writer = writer(&storage);
        writer.add_document(Document::new("1").add_value("retry")).unwrap();

        // Five segment files succeed, the manifest write fails.
        writer.flush_buffer().unwrap();
        storage.fail_next_writes(1, std::io::ErrorKind::TimedOut);
        let err = writer.commit().unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(writer.snapshot().live_doc_count(), 0);

        writer.commit().unwrap();
        assert_eq!(ids_with(&writer.snapshot(), "retri"), vec!["1"]);
    }

    #[test]
    fn test_reopen_and_lock() {
        let storage = MemoryStorage::new();
        {
            let mut writer = writer(&storage);
            writer.add_document(Document::new("1").add_value("persisted")).unwrap();
            writer.commit().unwrap();
            writer.add_document(Document::new("2").add_value("uncommitted")).unwrap();

            let analyzer = writer.analyzer().clone();
            let second = IndexWriter::open(
                Arc::new(storage.clone()),
                analyzer,
                IndexWriterConfig::default(),
            );
            assert!(second.is_err());
        }

        let writer = writer(&storage);
        assert_eq!(writer.snapshot().live_doc_count(), 1);
        assert_eq!(ids_with(&writer.snapshot(), "persist"), vec!["1"]);
    }

    #[test]
    fn test_auto_merge_and_optimize() {
        let storage = MemoryStorage::new();
        let config = IndexWriterConfig {
            merge_factor: 3,
            ..IndexWriterConfig::default()
        };
        let mut writer = writer_with(&storage, config);
        for i in 0..4 {
            writer
                .add_document(Document::new(i.to_string()).add_value("shared term"))
                .unwrap();
            writer.commit().unwrap();
        }
        assert!(writer.segment_count() <= 3);
        assert_eq!(writer.snapshot().live_doc_count(), 4);

        writer.remove_document("0").unwrap();
        writer.optimize().unwrap();
        assert_eq!(writer.segment_count(), 1);
        let snapshot = writer.snapshot();
        assert_eq!(snapshot.max_doc_count(), 3);
        assert_eq!(ids_with(&snapshot, "share"), vec!["1", "2", "3"]);

        let mut files = storage.list_files().unwrap();
        files.retain(|f| f.starts_with("seg"));
        files.sort();
        let expected: Vec<String> = snapshot
            .segments()
            .iter()
            .flat_map(|s| s.meta.files())
            .chain(std::iter::once(format!("segments_{}.json", writer.generation())))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        assert_eq!(files, expected);
    }

    #[test]
    fn test_closed_writer_rejects_operations() {
        let storage = MemoryStorage::new();
        let mut writer = writer(&storage);
        writer.close().unwrap();
        assert!(matches!(
            writer.add_document(Document::new("1")),
            Err(QuarryError::Closed)
        ));
        assert!(storage.try_lock(WRITE_LOCK).is_ok());
    }
}
