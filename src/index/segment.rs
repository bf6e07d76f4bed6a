//! Immutable index segments.
//!
//! A segment named `seg_XXXXXX` consists of five files:
//!
//! - `.post`: concatenated posting lists
//! - `.dict`: `fst` map from `field\0term` to the posting list offset
//! - `.docs`: stored documents (JSON) followed by an offsets table
//! - `.dv`: field types and per-field doc values used for sorting and
//!   comparisons
//! - `.len`: per-field token counts used for length normalization
//!
//! Every file ends with a CRC32 footer. Deletions are kept outside the
//! segment, see [`crate::index::deletion`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};

use crate::data::{DataValue, Document};
use crate::error::{QuarryError, Result};
use crate::index::analyzed::AnalyzedDocument;
use crate::index::posting::{Posting, PostingList, term_key};
use crate::schema::{FIELD_IDENTIFIER, FIELD_OBJECT_TYPE, FIELD_TIMESTAMP, FieldType};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{FileBytes, Storage};

/// Extensions of the files making up a segment.
pub const SEGMENT_EXTENSIONS: [&str; 5] = ["post", "dict", "docs", "dv", "len"];

/// Segment name for a segment number.
pub fn segment_name(number: u64) -> String {
    format!("seg_{number:06}")
}

/// A typed per-document value used for sorting and comparisons.
///
/// Dates are stored as milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocValue {
    Str(String),
    Int(i64),
    Float(f64),
    Date(i64),
}

impl DocValue {
    pub fn from_data(value: &DataValue) -> Option<DocValue> {
        match value {
            DataValue::Text(s) | DataValue::Keyword(s) => Some(DocValue::Str(s.clone())),
            DataValue::Integer(i) => Some(DocValue::Int(*i)),
            DataValue::Float(f) => Some(DocValue::Float(*f)),
            DataValue::Date(d) => Some(DocValue::Date(d.timestamp_millis())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DocValue::Int(i) => Some(*i as f64),
            DocValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds. Integers and floats compare
    /// numerically with each other; every other mix is incomparable.
    pub fn compare(&self, other: &DocValue) -> Option<Ordering> {
        match (self, other) {
            (DocValue::Str(a), DocValue::Str(b)) => Some(a.cmp(b)),
            (DocValue::Int(a), DocValue::Int(b)) => Some(a.cmp(b)),
            (DocValue::Date(a), DocValue::Date(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

/// Bookkeeping for one committed segment, persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: String,
    pub doc_count: u32,

    /// Generation of the current deletion file, 0 when nothing is deleted.
    #[serde(default)]
    pub deletion_generation: u64,

    #[serde(default)]
    pub deleted_count: u32,
}

impl SegmentMeta {
    pub fn live_count(&self) -> u32 {
        self.doc_count.saturating_sub(self.deleted_count)
    }

    /// Names of all files this segment currently references.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = SEGMENT_EXTENSIONS
            .iter()
            .map(|ext| format!("{}.{ext}", self.name))
            .collect();
        if self.deletion_generation > 0 {
            files.push(crate::index::deletion::deletion_file_name(
                &self.name,
                self.deletion_generation,
            ));
        }
        files
    }
}

fn reserved_field_types() -> HashMap<String, FieldType> {
    HashMap::from([
        (FIELD_IDENTIFIER.to_string(), FieldType::Keyword),
        (FIELD_OBJECT_TYPE.to_string(), FieldType::Integer),
        (FIELD_TIMESTAMP.to_string(), FieldType::Date),
    ])
}

/// Accumulates documents in memory and writes them out as one segment.
#[derive(Debug)]
pub struct SegmentBuilder {
    postings: BTreeMap<Vec<u8>, PostingList>,
    stored: Vec<Vec<u8>>,
    field_types: HashMap<String, FieldType>,
    doc_values: HashMap<String, Vec<Option<DocValue>>>,
    field_lengths: HashMap<String, Vec<u32>>,
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        SegmentBuilder {
            postings: BTreeMap::new(),
            stored: Vec::new(),
            field_types: reserved_field_types(),
            doc_values: HashMap::new(),
            field_lengths: HashMap::new(),
        }
    }
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the type a field was indexed with. The first type seen wins.
    pub(crate) fn declare_field(&mut self, field: &str, field_type: FieldType) {
        self.field_types
            .entry(field.to_string())
            .or_insert(field_type);
    }

    pub fn doc_count(&self) -> u32 {
        self.stored.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    /// Add an analyzed document, returning its segment-local doc number.
    pub fn add_document(&mut self, doc: &AnalyzedDocument) -> Result<u32> {
        let doc_num = self.push_document(
            doc.stored.clone(),
            doc.doc_values.iter().map(|(f, v)| (f.clone(), v.clone())),
            doc.field_lengths.iter().map(|(f, l)| (f.clone(), *l)),
        )?;
        for (field, field_type) in &doc.field_types {
            self.declare_field(field, *field_type);
        }

        for (field, terms) in &doc.field_terms {
            for (term, positions) in terms {
                self.push_posting(term_key(field, term), Posting::new(doc_num, positions.clone()))?;
            }
        }
        Ok(doc_num)
    }

    /// Append the stored form and columns of a document whose postings are
    /// added separately with [`SegmentBuilder::push_posting`].
    pub(crate) fn push_document(
        &mut self,
        stored: Vec<u8>,
        doc_values: impl IntoIterator<Item = (String, DocValue)>,
        field_lengths: impl IntoIterator<Item = (String, u32)>,
    ) -> Result<u32> {
        let doc_num = u32::try_from(self.stored.len())
            .map_err(|_| QuarryError::index("segment document count exceeds u32"))?;
        let len = doc_num as usize;

        for (field, value) in doc_values {
            let column = self.doc_values.entry(field).or_default();
            column.resize(len, None);
            column.push(Some(value));
        }
        for (field, length) in field_lengths {
            let column = self.field_lengths.entry(field).or_default();
            column.resize(len, 0);
            column.push(length);
        }
        self.stored.push(stored);
        Ok(doc_num)
    }

    pub(crate) fn push_posting(&mut self, key: Vec<u8>, posting: Posting) -> Result<()> {
        self.postings.entry(key).or_default().push(posting)
    }

    /// Write the segment files. The caller records `name` in the manifest.
    pub fn write(mut self, storage: &dyn Storage, name: &str) -> Result<SegmentMeta> {
        let doc_count = self.doc_count();
        for column in self.doc_values.values_mut() {
            column.resize(doc_count as usize, None);
        }
        for column in self.field_lengths.values_mut() {
            column.resize(doc_count as usize, 0);
        }

        self.write_postings(storage, name)?;
        self.write_stored(storage, name)?;
        self.write_doc_values(storage, name)?;
        self.write_field_lengths(storage, name)?;

        Ok(SegmentMeta {
            name: name.to_string(),
            doc_count,
            deletion_generation: 0,
            deleted_count: 0,
        })
    }

    fn write_postings(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut post_writer = StructWriter::new(storage.create_output(&format!("{name}.post"))?);
        let mut dict_builder = MapBuilder::memory();
        let mut buf = Vec::new();

        // BTreeMap iteration is in byte order, which the fst builder requires.
        for (key, list) in &self.postings {
            dict_builder
                .insert(key, post_writer.position())
                .map_err(|e| QuarryError::index(format!("failed to build term dictionary: {e}")))?;
            buf.clear();
            list.encode(&mut buf);
            post_writer.write_raw(&buf)?;
        }
        post_writer.close()?;

        let fst_bytes = dict_builder
            .into_inner()
            .map_err(|e| QuarryError::index(format!("failed to build term dictionary: {e}")))?;
        let mut dict_writer = StructWriter::new(storage.create_output(&format!("{name}.dict"))?);
        dict_writer.write_raw(&fst_bytes)?;
        dict_writer.close()
    }

    fn write_stored(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut writer = StructWriter::new(storage.create_output(&format!("{name}.docs"))?);
        let mut offsets = Vec::with_capacity(self.stored.len());
        for json in &self.stored {
            offsets.push(writer.position());
            writer.write_bytes(json)?;
        }
        let table = writer.position();
        writer.write_u32(self.doc_count())?;
        for offset in offsets {
            writer.write_u64(offset)?;
        }
        writer.write_u64(table)?;
        writer.close()
    }

    fn write_doc_values(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut writer = StructWriter::new(storage.create_output(&format!("{name}.dv"))?);
        writer.write_bytes(&serde_json::to_vec(&self.field_types)?)?;
        writer.write_bytes(&serde_json::to_vec(&self.doc_values)?)?;
        writer.close()
    }

    fn write_field_lengths(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut writer = StructWriter::new(storage.create_output(&format!("{name}.len"))?);
        writer.write_u32(self.doc_count())?;
        writer.write_varint(self.field_lengths.len() as u64)?;
        for (field, lengths) in &self.field_lengths {
            writer.write_string(field)?;
            for &length in lengths {
                writer.write_varint(length as u64)?;
            }
        }
        writer.close()
    }
}

/// The checksum-verified body of a file, usable as `fst` backing data.
#[derive(Clone, Debug)]
pub struct FileSlice {
    bytes: FileBytes,
    len: usize,
}

impl FileSlice {
    fn verified(bytes: FileBytes) -> Result<Self> {
        let len = StructReader::new(&bytes)?.body().len();
        Ok(FileSlice { bytes, len })
    }
}

impl AsRef<[u8]> for FileSlice {
    fn as_ref(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Read access to a committed segment.
pub struct SegmentReader {
    name: String,
    doc_count: u32,
    postings: FileSlice,
    dictionary: Map<FileSlice>,
    stored: FileSlice,
    stored_offsets: Vec<u64>,
    field_types: HashMap<String, FieldType>,
    doc_values: HashMap<String, Vec<Option<DocValue>>>,
    field_lengths: HashMap<String, Vec<u32>>,
    field_length_sums: HashMap<String, u64>,
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("name", &self.name)
            .field("doc_count", &self.doc_count)
            .field("terms", &self.dictionary.len())
            .finish()
    }
}

impl SegmentReader {
    pub fn open(storage: &dyn Storage, meta: &SegmentMeta) -> Result<Self> {
        let name = meta.name.as_str();
        let postings = FileSlice::verified(storage.open_input(&format!("{name}.post"))?)?;
        let dict_slice = FileSlice::verified(storage.open_input(&format!("{name}.dict"))?)?;
        let dictionary = Map::new(dict_slice)
            .map_err(|e| QuarryError::index(format!("corrupt term dictionary in {name}: {e}")))?;

        let stored = FileSlice::verified(storage.open_input(&format!("{name}.docs"))?)?;
        let stored_offsets = Self::read_stored_offsets(stored.as_ref(), meta.doc_count, name)?;

        let dv_bytes = storage.open_input(&format!("{name}.dv"))?;
        let mut reader = StructReader::new(&dv_bytes)?;
        let field_types: HashMap<String, FieldType> = serde_json::from_slice(reader.read_bytes()?)?;
        let doc_values: HashMap<String, Vec<Option<DocValue>>> =
            serde_json::from_slice(reader.read_bytes()?)?;

        let len_bytes = storage.open_input(&format!("{name}.len"))?;
        let mut reader = StructReader::new(&len_bytes)?;
        let count = reader.read_u32()?;
        if count != meta.doc_count {
            return Err(QuarryError::index(format!(
                "segment {name} length file holds {count} docs, expected {}",
                meta.doc_count
            )));
        }
        let fields = reader.read_varint()?;
        let mut field_lengths = HashMap::with_capacity(fields as usize);
        let mut field_length_sums = HashMap::with_capacity(fields as usize);
        for _ in 0..fields {
            let field = reader.read_string()?.to_string();
            let mut lengths = Vec::with_capacity(count as usize);
            let mut sum = 0u64;
            for _ in 0..count {
                let length = reader.read_varint()? as u32;
                sum += length as u64;
                lengths.push(length);
            }
            field_length_sums.insert(field.clone(), sum);
            field_lengths.insert(field, lengths);
        }

        Ok(SegmentReader {
            name: name.to_string(),
            doc_count: meta.doc_count,
            postings,
            dictionary,
            stored,
            stored_offsets,
            field_types,
            doc_values,
            field_lengths,
            field_length_sums,
        })
    }

    fn read_stored_offsets(body: &[u8], doc_count: u32, name: &str) -> Result<Vec<u64>> {
        if body.len() < 8 {
            return Err(QuarryError::index(format!("stored file of {name} is truncated")));
        }
        let mut pos = body.len() - 8;
        let table = u64::from_le_bytes(read_array(body, pos)?);
        pos = table as usize;
        let count = u32::from_le_bytes(read_array(body, pos)?);
        if count != doc_count {
            return Err(QuarryError::index(format!(
                "stored file of {name} holds {count} docs, expected {doc_count}"
            )));
        }
        pos += 4;
        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(u64::from_le_bytes(read_array(body, pos)?));
            pos += 8;
        }
        Ok(offsets)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// Number of distinct `field\0term` keys.
    pub fn term_count(&self) -> usize {
        self.dictionary.len()
    }

    pub fn dictionary(&self) -> &Map<FileSlice> {
        &self.dictionary
    }

    pub fn postings(&self, field: &str, term: &str) -> Result<Option<PostingList>> {
        match self.dictionary.get(term_key(field, term)) {
            Some(offset) => Ok(Some(self.postings_at(offset)?)),
            None => Ok(None),
        }
    }

    /// Decode the posting list stored at `offset` in the postings file.
    pub fn postings_at(&self, offset: u64) -> Result<PostingList> {
        let mut pos = offset as usize;
        PostingList::decode(self.postings.as_ref(), &mut pos)
    }

    pub fn doc_frequency(&self, field: &str, term: &str) -> Result<u32> {
        match self.dictionary.get(term_key(field, term)) {
            Some(offset) => {
                PostingList::decode_doc_frequency(self.postings.as_ref(), offset as usize)
            }
            None => Ok(0),
        }
    }

    /// Terms of `field` starting with `prefix`, in byte order, with their
    /// posting offsets. An empty prefix lists every term of the field.
    pub fn terms_with_prefix(&self, field: &str, prefix: &str) -> Result<Vec<(String, u64)>> {
        let start = term_key(field, prefix);
        let field_len = start.len() - prefix.len();
        let mut stream = self.dictionary.range().ge(&start).into_stream();
        let mut terms = Vec::new();
        while let Some((key, offset)) = stream.next() {
            if !key.starts_with(&start) {
                break;
            }
            let term = std::str::from_utf8(&key[field_len..])
                .map_err(|e| QuarryError::index(format!("invalid term in {}: {e}", self.name)))?;
            terms.push((term.to_string(), offset));
        }
        Ok(terms)
    }

    /// Raw JSON of a stored document.
    pub fn stored_bytes(&self, doc: u32) -> Result<&[u8]> {
        let offset = *self.stored_offsets.get(doc as usize).ok_or_else(|| {
            QuarryError::not_found(format!("doc {doc} in segment {}", self.name))
        })?;
        let body = self.stored.as_ref();
        let mut pos = offset as usize;
        let len = crate::util::varint::decode_u64(body, &mut pos)? as usize;
        body.get(pos..pos + len).ok_or_else(|| {
            QuarryError::index(format!("stored doc {doc} of {} is truncated", self.name))
        })
    }

    pub fn stored_document(&self, doc: u32) -> Result<Document> {
        Ok(serde_json::from_slice(self.stored_bytes(doc)?)?)
    }

    /// The type `field` was indexed with in this segment.
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.field_types.get(&field.to_lowercase()).copied()
    }

    pub(crate) fn field_types(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.field_types.iter().map(|(f, t)| (f.as_str(), *t))
    }

    pub fn doc_value(&self, field: &str, doc: u32) -> Option<&DocValue> {
        self.doc_values
            .get(&field.to_lowercase())?
            .get(doc as usize)?
            .as_ref()
    }

    /// Names of the fields with doc values in this segment.
    pub fn doc_value_fields(&self) -> impl Iterator<Item = &str> {
        self.doc_values.keys().map(String::as_str)
    }

    pub fn field_length(&self, field: &str, doc: u32) -> u32 {
        self.field_lengths
            .get(field)
            .and_then(|lengths| lengths.get(doc as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn field_length_sum(&self, field: &str) -> u64 {
        self.field_length_sums.get(field).copied().unwrap_or(0)
    }

    pub(crate) fn field_lengths_of(&self, doc: u32) -> Vec<(String, u32)> {
        self.field_lengths
            .iter()
            .filter_map(|(field, lengths)| {
                let length = *lengths.get(doc as usize)?;
                (length > 0).then(|| (field.clone(), length))
            })
            .collect()
    }

    pub(crate) fn doc_values_of(&self, doc: u32) -> Vec<(String, DocValue)> {
        self.doc_values
            .iter()
            .filter_map(|(field, column)| {
                let value = column.get(doc as usize)?.as_ref()?;
                Some((field.clone(), value.clone()))
            })
            .collect()
    }
}

fn read_array<const N: usize>(body: &[u8], pos: usize) -> Result<[u8; N]> {
    body.get(pos..pos + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| QuarryError::index("offsets table out of bounds"))
}
