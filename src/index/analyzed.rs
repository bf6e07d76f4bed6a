//! Documents after validation, coercion and analysis, ready to be indexed.

use std::sync::Arc;

use ahash::AHashMap;
use rayon::prelude::*;

use crate::analysis::Analyzer;
use crate::data::{DataValue, Document};
use crate::error::{QuarryError, Result};
use crate::index::segment::DocValue;
use crate::schema::{FIELD_IDENTIFIER, FIELD_OBJECT_TYPE, FIELD_TIMESTAMP, FieldType, Schema};

/// The indexable form of a [`Document`].
///
/// Field names are lowercased. Text fields map each term to its positions;
/// keyword fields hold a single term at position 0. Numeric and date fields
/// only produce doc values.
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    pub id: String,

    /// JSON of the coerced document, as returned to searchers.
    pub stored: Vec<u8>,

    pub field_terms: AHashMap<String, AHashMap<String, Vec<u32>>>,

    /// Number of token positions per text field, for length normalization.
    pub field_lengths: AHashMap<String, u32>,

    pub doc_values: AHashMap<String, DocValue>,

    pub field_types: AHashMap<String, FieldType>,
}

impl AnalyzedDocument {
    /// Validate, coerce against `schema` and tokenize `doc`.
    pub fn analyze(doc: Document, schema: &Schema, analyzer: &dyn Analyzer) -> Result<Self> {
        doc.validate()?;

        let mut coerced = Document::new(doc.id.clone())
            .with_object_type(doc.object_type)
            .with_timestamp(doc.timestamp);
        let mut field_terms: AHashMap<String, AHashMap<String, Vec<u32>>> = AHashMap::new();
        let mut field_lengths = AHashMap::new();
        let mut doc_values = AHashMap::new();
        let mut field_types = AHashMap::new();

        field_terms
            .entry(FIELD_IDENTIFIER.to_string())
            .or_default()
            .insert(doc.id.clone(), vec![0]);
        doc_values.insert(FIELD_IDENTIFIER.to_string(), DocValue::Str(doc.id.clone()));
        doc_values.insert(
            FIELD_OBJECT_TYPE.to_string(),
            DocValue::Int(doc.object_type as i64),
        );
        doc_values.insert(
            FIELD_TIMESTAMP.to_string(),
            DocValue::Date(doc.timestamp.timestamp_millis()),
        );

        for (name, value) in doc.fields {
            let (field_type, value) = schema.coerce(&name, &value)?;
            let key = name.to_lowercase();
            field_types.insert(key.clone(), field_type);

            match (&field_type, &value) {
                (FieldType::Text, DataValue::Text(text)) => {
                    let terms = field_terms.entry(key.clone()).or_default();
                    let mut positions_seen = 0u32;
                    let mut last_position = None;
                    for token in analyzer.analyze(text)? {
                        let positions = terms.entry(token.text).or_default();
                        if positions.last() != Some(&token.position) {
                            positions.push(token.position);
                        }
                        if last_position != Some(token.position) {
                            positions_seen += 1;
                            last_position = Some(token.position);
                        }
                    }
                    field_lengths.insert(key.clone(), positions_seen);
                    doc_values.insert(key, DocValue::Str(text.clone()));
                }
                (FieldType::Keyword, DataValue::Keyword(text)) => {
                    field_terms
                        .entry(key.clone())
                        .or_default()
                        .insert(text.clone(), vec![0]);
                    doc_values.insert(key, DocValue::Str(text.clone()));
                }
                _ => {
                    if let Some(dv) = DocValue::from_data(&value) {
                        doc_values.insert(key, dv);
                    }
                }
            }

            coerced.fields.insert(name, value);
        }

        let stored = serde_json::to_vec(&coerced)?;
        Ok(AnalyzedDocument {
            id: doc.id,
            stored,
            field_terms,
            field_lengths,
            doc_values,
            field_types,
        })
    }
}

/// Analyzes documents with a fixed schema and analyzer, in parallel for
/// batches.
pub struct BatchAnalyzer {
    schema: Schema,
    analyzer: Arc<dyn Analyzer>,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for BatchAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAnalyzer")
            .field("analyzer", &self.analyzer.name())
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl BatchAnalyzer {
    pub fn new(schema: Schema, analyzer: Arc<dyn Analyzer>, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("quarry-analyze-{i}"))
            .build()
            .map_err(|e| QuarryError::index(format!("failed to start analysis threads: {e}")))?;
        Ok(BatchAnalyzer {
            schema,
            analyzer,
            pool,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    pub fn analyze(&self, doc: Document) -> Result<AnalyzedDocument> {
        AnalyzedDocument::analyze(doc, &self.schema, self.analyzer.as_ref())
    }

    /// Analyze every document of a batch. Fails on the first invalid
    /// document, so a batch is accepted whole or not at all.
    pub fn analyze_batch(&self, docs: Vec<Document>) -> Result<Vec<AnalyzedDocument>> {
        if docs.len() < 2 {
            return docs.into_iter().map(|doc| self.analyze(doc)).collect();
        }
        self.pool
            .install(|| docs.into_par_iter().map(|doc| self.analyze(doc)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Language, StandardAnalyzer};
    use crate::schema::FIELD_VALUE;

    #[test]
    fn test_analyze_document() {
        let schema = Schema::new().add_field("category", FieldType::Keyword);
        let analyzer = StandardAnalyzer::new(Language::English);
        let doc = Document::new("1")
            .with_object_type(2)
            .add_value("hello world, hello")
            .add_field("Category", "News")
            .add_integer("rank", 7);

        let analyzed = AnalyzedDocument::analyze(doc, &schema, &analyzer).unwrap();

        let value_terms = &analyzed.field_terms[FIELD_VALUE];
        assert_eq!(value_terms["hello"], vec![0, 2]);
        assert_eq!(value_terms["world"], vec![1]);
        assert_eq!(analyzed.field_lengths[FIELD_VALUE], 3);

        assert_eq!(analyzed.field_terms["category"]["News"], vec![0]);
        assert_eq!(analyzed.field_terms["id"]["1"], vec![0]);
        assert_eq!(analyzed.doc_values["rank"], DocValue::Int(7));
        assert_eq!(analyzed.doc_values["s"], DocValue::Int(2));
        assert_eq!(analyzed.field_types["category"], FieldType::Keyword);
        assert_eq!(analyzed.field_types["rank"], FieldType::Integer);

        let stored: Document = serde_json::from_slice(&analyzed.stored).unwrap();
        assert_eq!(stored.get("category"), Some(&DataValue::Keyword("News".into())));
    }

    #[test]
    fn test_invalid_document_rejected() {
        let schema = Schema::new().add_field("rank", FieldType::Integer);
        let analyzer = StandardAnalyzer::new(Language::English);

        let doc = Document::new("1").add_field("rank", "abc");
        assert!(AnalyzedDocument::analyze(doc, &schema, &analyzer).is_err());

        let doc = Document::new("").add_value("x");
        assert!(AnalyzedDocument::analyze(doc, &schema, &analyzer).is_err());
    }

    #[test]
    fn test_batch_keeps_order_and_rejects_whole_batch() {
        let batch = BatchAnalyzer::new(
            Schema::new(),
            Arc::new(StandardAnalyzer::new(Language::English)),
            2,
        )
        .unwrap();

        let docs: Vec<Document> = (0..20)
            .map(|i| Document::new(i.to_string()).add_value(format!("document number {i}")))
            .collect();
        let analyzed = batch.analyze_batch(docs).unwrap();
        let ids: Vec<String> = analyzed.iter().map(|d| d.id.clone()).collect();
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);

        let docs = vec![
            Document::new("ok").add_value("fine"),
            Document::new("bad").add_value("x").add_text("id", "reserved"),
        ];
        assert!(batch.analyze_batch(docs).is_err());
    }
}
