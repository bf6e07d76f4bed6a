//! In-memory storage, used for ephemeral indexes and tests.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{QuarryError, Result};
use crate::storage::{FileBytes, LockGuard, Storage, StorageOutput};

#[derive(Debug, Default)]
struct Shared {
    files: RwLock<HashMap<String, FileBytes>>,
    locks: Mutex<HashSet<String>>,
    injected_failures: Mutex<Option<(usize, std::io::ErrorKind)>>,
}

/// Storage keeping every file in memory.
///
/// Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    shared: Arc<Shared>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `create_output` fail with an I/O error
    /// of the given kind.
    pub fn fail_next_writes(&self, count: usize, kind: std::io::ErrorKind) {
        *self.shared.injected_failures.lock() = Some((count, kind));
    }

    fn take_injected_failure(&self) -> Option<std::io::Error> {
        let mut guard = self.shared.injected_failures.lock();
        match guard.as_mut() {
            Some((remaining, kind)) if *remaining > 0 => {
                *remaining -= 1;
                let err = std::io::Error::new(*kind, "injected write failure");
                if *remaining == 0 {
                    *guard = None;
                }
                Some(err)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    shared: Arc<Shared>,
    closed: bool,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("output already closed"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        if !self.closed {
            self.shared
                .files
                .write()
                .insert(self.name.clone(), FileBytes::from_vec(self.buffer.clone()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            let bytes = std::mem::take(&mut self.buffer);
            self.shared
                .files
                .write()
                .insert(self.name.clone(), FileBytes::from_vec(bytes));
            self.closed = true;
        }
        Ok(())
    }
}

struct MemoryLock {
    name: String,
    shared: Arc<Shared>,
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        self.shared.locks.lock().remove(&self.name);
    }
}

impl Storage for MemoryStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err.into());
        }
        self.shared
            .files
            .write()
            .insert(name.to_string(), FileBytes::from_vec(Vec::new()));
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            shared: self.shared.clone(),
            closed: false,
        }))
    }

    fn open_input(&self, name: &str) -> Result<FileBytes> {
        self.shared
            .files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QuarryError::not_found(format!("file {name}")))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.shared.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.shared.files.write().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.shared.files.read().keys().cloned().collect())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.shared.files.write();
        let bytes = files
            .remove(from)
            .ok_or_else(|| QuarryError::not_found(format!("file {from}")))?;
        files.insert(to.to_string(), bytes);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn try_lock(&self, name: &str) -> Result<LockGuard> {
        if !self.shared.locks.lock().insert(name.to_string()) {
            return Err(QuarryError::storage(format!("lock {name} is already held")));
        }
        Ok(LockGuard::new(Box::new(MemoryLock {
            name: name.to_string(),
            shared: self.shared.clone(),
        })))
    }
}
