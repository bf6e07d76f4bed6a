//! The search service: one index, one writer, many concurrent searchers.
//!
//! Synchronous calls (`add_document`, `remove_document`, ...) return once
//! their change is committed. Batches passed to
//! [`SearchService::add_documents`] go to a background worker; the returned
//! [`IndexingTask`] completes exactly once, after the batch is committed or
//! has failed.
//!
//! # Examples
//!
//! ```
//! use quarry::{Document, SearchService, ServiceOptions};
//!
//! let service = SearchService::in_memory(ServiceOptions::default()).unwrap();
//! service
//!     .add_document(Document::new("1").add_title("Greeting").add_value("hello world"))
//!     .unwrap();
//! let results = service.search("hello").unwrap();
//! assert_eq!(results.identifiers(), vec!["1"]);
//! service.close().unwrap();
//! ```

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use futures::channel::oneshot;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::ServiceOptions;
use crate::data::Document;
use crate::error::{QuarryError, Result};
use crate::index::analyzed::{AnalyzedDocument, BatchAnalyzer};
use crate::index::snapshot::Snapshot;
use crate::index::writer::{IndexWriter, SnapshotHandle};
use crate::query::evaluator::Evaluator;
use crate::query::parser::{QueryStringParser, parse_predicate};
use crate::query::predicate::{Predicate, SortSpec};
use crate::schema::Schema;
use crate::search::ResultSet;
use crate::storage::{FileStorage, MemoryStorage, Storage};

enum Job {
    Index {
        docs: Vec<Document>,
        done: oneshot::Sender<Result<()>>,
    },
}

/// Completion of an asynchronous batch.
///
/// Await it, or call [`IndexingTask::wait`] from synchronous code. Dropping
/// the task does not cancel the batch.
#[derive(Debug)]
pub struct IndexingTask {
    receiver: oneshot::Receiver<Result<()>>,
}

impl IndexingTask {
    /// Block until the batch is committed or has failed.
    pub fn wait(self) -> Result<()> {
        futures::executor::block_on(self)
    }
}

impl Future for IndexingTask {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(QuarryError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Debug)]
enum Update {
    Add(Document),
    Remove(String),
}

enum Staged {
    Add(AnalyzedDocument),
    Remove(String),
}

/// Changes collected by [`SearchService::bulk_update`] and committed together.
#[derive(Debug, Default)]
pub struct IndexUpdateContext {
    updates: Vec<Update>,
}

impl IndexUpdateContext {
    pub fn add_document(&mut self, doc: Document) {
        self.updates.push(Update::Add(doc));
    }

    pub fn remove_document(&mut self, id: impl Into<String>) {
        self.updates.push(Update::Remove(id.into()));
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

struct Inner {
    options: ServiceOptions,
    schema: Schema,
    analyzer: Arc<BatchAnalyzer>,
    writer: Mutex<IndexWriter>,
    snapshot: SnapshotHandle,
    closed: AtomicBool,
}

impl Inner {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(QuarryError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run one write attempt under the writer lock, retrying transient I/O
    /// failures with a linear back-off. A failed attempt is rolled back so
    /// the next one starts clean.
    fn write<F>(&self, what: &str, mut attempt: F) -> Result<()>
    where
        F: FnMut(&mut IndexWriter) -> Result<()>,
    {
        let mut writer = self.writer.lock();
        let mut retries = 0;
        loop {
            let err = match attempt(&mut writer) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if let Err(rollback_err) = writer.rollback() {
                warn!("rollback after failed {what} failed: {rollback_err}");
            }
            if !err.is_retriable() || retries >= self.options.max_io_retries {
                warn!("{what} failed after {retries} retries: {err}");
                return Err(err);
            }
            retries += 1;
            warn!(
                "{what} failed ({err}), retry {retries} of {}",
                self.options.max_io_retries
            );
            std::thread::sleep(Duration::from_millis(
                self.options.retry_backoff_ms * retries as u64,
            ));
        }
    }

    fn run(
        &self,
        snapshot: Arc<Snapshot>,
        predicate: &Predicate,
        sort: Option<&SortSpec>,
    ) -> Result<ResultSet> {
        let evaluator = Evaluator::new(
            &snapshot,
            &self.schema,
            self.analyzer.analyzer().as_ref(),
            &self.options.search.default_fields,
        );
        let matches = evaluator.evaluate(predicate)?;
        debug!(
            "predicate matched {} documents at generation {}",
            matches.len(),
            snapshot.generation()
        );
        ResultSet::from_matches(snapshot, matches, sort)
    }

    fn index_batch(&self, docs: Vec<Document>) -> Result<()> {
        let count = docs.len();
        let analyzed = self.analyzer.analyze_batch(docs)?;
        self.write("batch indexing", |writer| {
            writer.add_analyzed(analyzed.clone())?;
            writer.commit()
        })?;
        debug!("committed batch of {count} documents");
        Ok(())
    }
}

fn run_worker(inner: Arc<Inner>, jobs: Receiver<Job>) {
    for job in jobs.iter() {
        match job {
            Job::Index { docs, done } => {
                let result = inner.index_batch(docs);
                let _ = done.send(result);
            }
        }
    }
    debug!("indexing worker stopped");
}

/// An embeddable full-text search index.
///
/// `SearchService` is `Send + Sync`; share it between threads with an `Arc`.
pub struct SearchService {
    inner: Arc<Inner>,
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("documents", &self.inner.snapshot.read().live_doc_count())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl SearchService {
    /// Open the index in `path`, creating the directory if needed.
    pub fn open_or_create(path: impl AsRef<Path>, options: ServiceOptions) -> Result<Self> {
        let storage = FileStorage::new(path.as_ref())?;
        info!("opening index in {}", path.as_ref().display());
        Self::with_storage(Arc::new(storage), options)
    }

    /// A service whose index lives only in memory.
    pub fn in_memory(options: ServiceOptions) -> Result<Self> {
        Self::with_storage(Arc::new(MemoryStorage::new()), options)
    }

    /// Open a service on any storage backend.
    pub fn with_storage(storage: Arc<dyn Storage>, options: ServiceOptions) -> Result<Self> {
        options.validate()?;
        let schema = options.schema();
        let analyzer = Arc::new(BatchAnalyzer::new(
            schema.clone(),
            options.analyzer(),
            options.writer.indexing_threads,
        )?);
        let writer = IndexWriter::open(storage, Arc::clone(&analyzer), options.writer.clone())?;
        let snapshot = writer.snapshot_handle();

        let inner = Arc::new(Inner {
            options,
            schema,
            analyzer,
            writer: Mutex::new(writer),
            snapshot,
            closed: AtomicBool::new(false),
        });

        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name("quarry-indexer".to_string())
            .spawn(move || run_worker(worker_inner, receiver))?;

        Ok(SearchService {
            inner,
            jobs: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.inner.options
    }

    /// Index one document and commit. A document with an existing
    /// identifier replaces the older version.
    pub fn add_document(&self, doc: Document) -> Result<()> {
        self.inner.check_open()?;
        let analyzed = self.inner.analyzer.analyze(doc)?;
        self.inner.write("indexing", |writer| {
            writer.add_analyzed(vec![analyzed.clone()])?;
            writer.commit()
        })
    }

    /// Queue a batch for background indexing. The batch is analyzed in
    /// parallel and committed as a whole; one invalid document fails it.
    pub fn add_documents(&self, docs: Vec<Document>) -> IndexingTask {
        let (done, receiver) = oneshot::channel();
        let task = IndexingTask { receiver };
        if let Err(e) = self.inner.check_open() {
            let _ = done.send(Err(e));
            return task;
        }

        let job = Job::Index { docs, done };
        let sent = match self.jobs.lock().as_ref() {
            Some(sender) => sender.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        };
        if let Err(Job::Index { done, .. }) = sent {
            let _ = done.send(Err(QuarryError::Closed));
        }
        task
    }

    pub fn add_documents_and_wait(&self, docs: Vec<Document>) -> Result<()> {
        self.add_documents(docs).wait()
    }

    pub fn remove_document(&self, id: &str) -> Result<()> {
        self.remove_documents(&[id])
    }

    /// Remove documents by identifier in one commit. Unknown identifiers
    /// are ignored.
    pub fn remove_documents<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        self.inner.check_open()?;
        self.inner.write("removal", |writer| {
            for id in ids {
                writer.remove_document(id.as_ref())?;
            }
            writer.commit()
        })
    }

    /// Remove every document matching `predicate`. Returns how many were
    /// removed.
    pub fn remove_matching(&self, predicate: &Predicate) -> Result<usize> {
        let results = self.search_predicate(predicate, None)?;
        let ids = results.identifiers();
        if ids.is_empty() {
            return Ok(0);
        }
        self.remove_documents(&ids)?;
        info!("removed {} documents matching a predicate", ids.len());
        Ok(ids.len())
    }

    /// Apply several adds and removes in a single commit, in the order the
    /// closure issued them.
    pub fn bulk_update<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut IndexUpdateContext) -> Result<()>,
    {
        self.inner.check_open()?;
        let mut context = IndexUpdateContext::default();
        update(&mut context)?;
        if context.is_empty() {
            return Ok(());
        }

        let mut docs = Vec::new();
        let mut removals = Vec::new();
        for (order, item) in context.updates.into_iter().enumerate() {
            match item {
                Update::Add(doc) => docs.push((order, doc)),
                Update::Remove(id) => removals.push((order, id)),
            }
        }
        let (orders, docs): (Vec<usize>, Vec<Document>) = docs.into_iter().unzip();
        let analyzed = self.inner.analyzer.analyze_batch(docs)?;

        let mut staged: Vec<(usize, Staged)> = orders
            .into_iter()
            .zip(analyzed)
            .map(|(order, doc)| (order, Staged::Add(doc)))
            .chain(removals.into_iter().map(|(order, id)| (order, Staged::Remove(id))))
            .collect();
        staged.sort_by_key(|(order, _)| *order);

        self.inner.write("bulk update", |writer| {
            for (_, item) in &staged {
                match item {
                    Staged::Add(doc) => writer.add_analyzed(vec![doc.clone()])?,
                    Staged::Remove(id) => writer.remove_document(id)?,
                }
            }
            writer.commit()
        })?;
        debug!("bulk update applied {} changes", staged.len());
        Ok(())
    }

    /// Merge all segments into one, dropping deleted documents.
    pub fn optimize(&self) -> Result<()> {
        self.inner.check_open()?;
        self.inner.write("optimize", |writer| writer.optimize())
    }

    /// Run a free-text query against the default fields.
    pub fn search(&self, query: &str) -> Result<ResultSet> {
        self.inner.check_open()?;
        let snapshot = self.inner.snapshot.read().clone();
        let parser = QueryStringParser::new(self.inner.options.search.default_operator)
            .with_known_fields(self.inner.schema.field_names().chain(snapshot.field_names()));
        let predicate = parser.parse(query)?;
        self.inner.run(snapshot, &predicate, None)
    }

    pub fn search_predicate(
        &self,
        predicate: &Predicate,
        sort: Option<SortSpec>,
    ) -> Result<ResultSet> {
        self.inner.check_open()?;
        let snapshot = self.inner.snapshot.read().clone();
        self.inner.run(snapshot, predicate, sort.as_ref())
    }

    /// Parse and run a structured predicate such as `category == 'news'`.
    pub fn search_predicate_str(
        &self,
        predicate: &str,
        sort: Option<SortSpec>,
    ) -> Result<ResultSet> {
        let predicate = parse_predicate(predicate)?;
        self.search_predicate(&predicate, sort)
    }

    /// Number of searchable documents in the latest commit.
    pub fn document_count(&self) -> u64 {
        self.inner.snapshot.read().live_doc_count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Finish queued batches, stop the worker and release the index lock.
    ///
    /// Later calls return [`QuarryError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Dropping the sender lets the worker drain the queue and exit.
        drop(self.jobs.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("indexing worker panicked");
            }
        }
        let result = self.inner.writer.lock().close();
        info!("closed search service");
        result
    }
}

impl Drop for SearchService {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error while closing search service: {e}");
        }
    }
}
