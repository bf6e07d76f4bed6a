//! Posting lists and their on-disk encoding.
//!
//! A posting list is written as a varint document count followed by, per
//! document, the delta from the previous doc number, the term frequency and
//! the delta-encoded positions.

use crate::error::{QuarryError, Result};
use crate::util::varint;

/// Separator between the field name and the term in dictionary keys.
pub const FIELD_SEPARATOR: u8 = 0;

/// Dictionary key for `term` in `field`.
///
/// Field names are case-insensitive, so they are lowercased here.
pub fn term_key(field: &str, term: &str) -> Vec<u8> {
    let field = field.to_lowercase();
    let mut key = Vec::with_capacity(field.len() + 1 + term.len());
    key.extend_from_slice(field.as_bytes());
    key.push(FIELD_SEPARATOR);
    key.extend_from_slice(term.as_bytes());
    key
}

/// Split a dictionary key back into `(field, term)`.
pub fn split_term_key(key: &[u8]) -> Result<(&str, &str)> {
    let sep = key
        .iter()
        .position(|&b| b == FIELD_SEPARATOR)
        .ok_or_else(|| QuarryError::index("term key without field separator"))?;
    let field = std::str::from_utf8(&key[..sep])
        .map_err(|e| QuarryError::index(format!("invalid field name in term key: {e}")))?;
    let term = std::str::from_utf8(&key[sep + 1..])
        .map_err(|e| QuarryError::index(format!("invalid term in term key: {e}")))?;
    Ok((field, term))
}

/// Occurrences of one term in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    /// Segment-local document number.
    pub doc: u32,

    /// Positions of the term in the field, ascending.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc: u32, positions: Vec<u32>) -> Self {
        Posting { doc, positions }
    }

    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// All postings of a term, ordered by strictly increasing doc number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a posting. Doc numbers must be pushed in increasing order.
    pub fn push(&mut self, posting: Posting) -> Result<()> {
        if let Some(last) = self.postings.last() {
            if posting.doc <= last.doc {
                return Err(QuarryError::index(format!(
                    "posting for doc {} pushed after doc {}",
                    posting.doc, last.doc
                )));
            }
        }
        self.postings.push(posting);
        Ok(())
    }

    /// Number of documents containing the term.
    pub fn doc_frequency(&self) -> u32 {
        self.postings.len() as u32
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        varint::encode_u64(buf, self.postings.len() as u64);
        let mut prev_doc = 0u32;
        for posting in &self.postings {
            varint::encode_u64(buf, (posting.doc - prev_doc) as u64);
            prev_doc = posting.doc;
            varint::encode_u64(buf, posting.positions.len() as u64);
            let mut prev_pos = 0u32;
            for &pos in &posting.positions {
                varint::encode_u64(buf, (pos - prev_pos) as u64);
                prev_pos = pos;
            }
        }
    }

    /// Decode a posting list starting at `*pos`.
    pub fn decode(bytes: &[u8], pos: &mut usize) -> Result<Self> {
        let count = varint::decode_u32(bytes, pos)?;
        let mut postings = Vec::with_capacity(count as usize);
        let mut doc = 0u32;
        for _ in 0..count {
            doc = doc
                .checked_add(varint::decode_u32(bytes, pos)?)
                .ok_or_else(|| QuarryError::index("doc number overflow in postings"))?;
            let freq = varint::decode_u32(bytes, pos)?;
            let mut positions = Vec::with_capacity(freq as usize);
            let mut position = 0u32;
            for _ in 0..freq {
                position = position
                    .checked_add(varint::decode_u32(bytes, pos)?)
                    .ok_or_else(|| QuarryError::index("position overflow in postings"))?;
                positions.push(position);
            }
            postings.push(Posting { doc, positions });
        }
        Ok(PostingList { postings })
    }

    /// Read only the document frequency of the list starting at `pos`.
    pub fn decode_doc_frequency(bytes: &[u8], pos: usize) -> Result<u32> {
        let mut pos = pos;
        varint::decode_u32(bytes, &mut pos)
    }
}
