//! Storage abstraction for index files.
//!
//! An index lives in a flat namespace of named files. Files are written once
//! through a [`StorageOutput`] and read back whole as [`FileBytes`]; nothing is
//! modified in place. Commits rely on [`Storage::rename`] being atomic.

pub mod file;
pub mod memory;
pub mod structured;

use std::fmt;
use std::io::Write;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::Result;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Immutable, cheaply clonable contents of a stored file.
///
/// Backed by a memory map for [`FileStorage`], so readers keep working on a
/// file even after it has been unlinked by a merge.
#[derive(Clone)]
pub struct FileBytes(Arc<dyn AsRef<[u8]> + Send + Sync>);

impl FileBytes {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        FileBytes(Arc::new(bytes))
    }

    pub(crate) fn from_shared(inner: Arc<dyn AsRef<[u8]> + Send + Sync>) -> Self {
        FileBytes(inner)
    }
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        (*self.0).as_ref()
    }
}

impl fmt::Debug for FileBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBytes").field("len", &self.len()).finish()
    }
}

/// A file being written.
pub trait StorageOutput: Write + Send + fmt::Debug {
    /// Flush buffered bytes and make them durable.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Finish the file. The file is complete and durable once this returns.
    fn close(&mut self) -> Result<()>;
}

/// Held while a storage lock is owned; dropping it releases the lock.
pub struct LockGuard {
    _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
    pub(crate) fn new(inner: Box<dyn Send + Sync>) -> Self {
        LockGuard { _inner: inner }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LockGuard")
    }
}

/// A flat namespace of index files.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Read a whole file.
    fn open_input(&self, name: &str) -> Result<FileBytes>;

    fn file_exists(&self, name: &str) -> bool;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Names of all files, in no particular order.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Atomically replace `to` with `from`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Make directory-level changes (creates, renames, deletes) durable.
    fn sync(&self) -> Result<()>;

    /// Take an exclusive lock named `name`, failing if it is already held.
    fn try_lock(&self, name: &str) -> Result<LockGuard>;
}
