//! File-system storage backed by a single directory.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{QuarryError, Result};
use crate::storage::{FileBytes, LockGuard, Storage, StorageOutput};

/// Storage rooted at a directory on the local file system.
///
/// Reads are memory-mapped. Outputs are fsynced on close, and renames are
/// followed by a directory sync when [`Storage::sync`] is called.
#[derive(Debug, Clone)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Open a directory, creating it (and its parents) if missing.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(FileStorage { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(QuarryError::storage(format!("invalid file name {name:?}")));
        }
        Ok(self.directory.join(name))
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: Option<BufWriter<File>>,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.writer.as_mut() {
            Some(w) => w.write(buf),
            None => Err(std::io::Error::other("output already closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        if let Some(w) = self.writer.as_mut() {
            w.flush()?;
            w.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()?;
        self.writer = None;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = File::create(self.path(name)?)?;
        Ok(Box::new(FileOutput {
            writer: Some(BufWriter::new(file)),
        }))
    }

    fn open_input(&self, name: &str) -> Result<FileBytes> {
        let path = self.path(name)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => QuarryError::not_found(format!("file {name}")),
            _ => QuarryError::Io(e),
        })?;
        if file.metadata()?.len() == 0 {
            return Ok(FileBytes::from_vec(Vec::new()));
        }
        // Index files are never modified after close, only replaced or removed.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FileBytes::from_shared(Arc::new(mmap)))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.path(from)?, self.path(to)?)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        #[cfg(unix)]
        {
            File::open(&self.directory)?.sync_all()?;
        }
        Ok(())
    }

    fn try_lock(&self, name: &str) -> Result<LockGuard> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path(name)?)?;
        match file.try_lock() {
            Ok(()) => Ok(LockGuard::new(Box::new(file))),
            Err(TryLockError::WouldBlock) => Err(QuarryError::storage(format!(
                "index at {} is locked by another writer",
                self.directory.display()
            ))),
            Err(TryLockError::Error(e)) => Err(e.into()),
        }
    }
}
