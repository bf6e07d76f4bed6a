//! Typed binary writer and reader for index files.
//!
//! Every file written by [`StructWriter`] ends with a 4-byte little-endian
//! CRC32 of everything before it. [`StructReader::new`] checks the footer
//! before any field is decoded.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{QuarryError, Result};
use crate::storage::StorageOutput;
use crate::util::varint;

const FOOTER_LEN: usize = 4;

/// Writes primitive values to a storage output and tracks their checksum.
pub struct StructWriter {
    output: Box<dyn StorageOutput>,
    hasher: Hasher,
    position: u64,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for StructWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("output", &self.output)
            .field("position", &self.position)
            .finish()
    }
}

impl StructWriter {
    pub fn new(output: Box<dyn StorageOutput>) -> Self {
        StructWriter {
            output,
            hasher: Hasher::new(),
            position: 0,
            scratch: Vec::with_capacity(16),
        }
    }

    /// Number of bytes written so far, excluding the footer.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes)?;
        self.hasher.update(bytes);
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        self.scratch.clear();
        varint::encode_u64(&mut self.scratch, value);
        let scratch = std::mem::take(&mut self.scratch);
        let result = self.put(&scratch);
        self.scratch = scratch;
        result
    }

    /// Length-prefixed (varint) byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varint(bytes.len() as u64)?;
        self.put(bytes)
    }

    /// Raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.put(bytes)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Append the checksum footer, sync and close the output.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.hasher.clone().finalize();
        self.output.write_u32::<LittleEndian>(checksum)?;
        self.output.close()
    }
}

/// Reads values written by [`StructWriter`] from an in-memory file body.
#[derive(Debug, Clone)]
pub struct StructReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> StructReader<'a> {
    /// Verify the checksum footer and position the reader at the start.
    pub fn new(file: &'a [u8]) -> Result<Self> {
        if file.len() < FOOTER_LEN {
            return Err(QuarryError::index("file too short for checksum footer"));
        }
        let (data, footer) = file.split_at(file.len() - FOOTER_LEN);
        let expected = LittleEndian::read_u32(footer);
        let actual = crc32fast::hash(data);
        if expected != actual {
            return Err(QuarryError::index(format!(
                "checksum mismatch: expected {expected:08x}, found {actual:08x}"
            )));
        }
        Ok(StructReader { data, position: 0 })
    }

    /// File body without the footer. Only valid after [`StructReader::new`]
    /// has verified it.
    pub fn body(&self) -> &'a [u8] {
        self.data
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(QuarryError::index(format!(
                "seek to {position} past end of {} byte file",
                self.data.len()
            )));
        }
        self.position = position;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(QuarryError::index(format!(
                "unexpected end of file reading {len} bytes at {}",
                self.position
            )));
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        varint::decode_u64(self.data, &mut self.position)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<&'a str> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|e| QuarryError::index(format!("invalid utf-8: {e}")))
    }
}
