//! Per-segment deletion bitmaps.
//!
//! Segment files are immutable, so deletions live in a separate
//! `seg_XXXXXX_N.del` file whose generation `N` increases every time the
//! segment's deletions change.

use bit_vec::BitVec;

use crate::error::{QuarryError, Result};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

/// Name of the deletion file for `segment` at `generation`.
pub fn deletion_file_name(segment: &str, generation: u64) -> String {
    format!("{segment}_{generation}.del")
}

/// Deleted documents of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionBitmap {
    bits: BitVec,
    deleted: u32,
}

impl DeletionBitmap {
    /// An empty bitmap for a segment holding `doc_count` documents.
    pub fn new(doc_count: u32) -> Self {
        DeletionBitmap {
            bits: BitVec::from_elem(doc_count as usize, false),
            deleted: 0,
        }
    }

    /// Mark `doc` deleted. Returns false if it already was.
    pub fn delete(&mut self, doc: u32) -> Result<bool> {
        let index = doc as usize;
        if index >= self.bits.len() {
            return Err(QuarryError::index(format!(
                "doc {doc} out of range for segment of {} docs",
                self.bits.len()
            )));
        }
        if self.bits[index] {
            return Ok(false);
        }
        self.bits.set(index, true);
        self.deleted += 1;
        Ok(true)
    }

    pub fn is_deleted(&self, doc: u32) -> bool {
        self.bits.get(doc as usize).unwrap_or(false)
    }

    pub fn deleted_count(&self) -> u32 {
        self.deleted
    }

    pub fn doc_count(&self) -> u32 {
        self.bits.len() as u32
    }

    pub fn write(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut writer = StructWriter::new(storage.create_output(name)?);
        writer.write_u32(self.doc_count())?;
        writer.write_bytes(&self.bits.to_bytes())?;
        writer.close()
    }

    pub fn read(storage: &dyn Storage, name: &str) -> Result<Self> {
        let bytes = storage.open_input(name)?;
        let mut reader = StructReader::new(&bytes)?;
        let doc_count = reader.read_u32()? as usize;
        let mut bits = BitVec::from_bytes(reader.read_bytes()?);
        if bits.len() < doc_count {
            return Err(QuarryError::index(format!(
                "deletion file {name} holds {} bits for {doc_count} docs",
                bits.len()
            )));
        }
        bits.truncate(doc_count);
        let deleted = bits.iter().filter(|b| *b).count() as u32;
        Ok(DeletionBitmap { bits, deleted })
    }
}
