//! Service configuration.
//!
//! [`ServiceOptions`] is plain data: it serializes to JSON, so an index's
//! settings can live in a file next to it and be loaded with
//! [`ServiceOptions::from_json_file`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, analyzer_for_language};
use crate::error::{QuarryError, Result};
use crate::schema::{FIELD_TITLE, FIELD_VALUE, FieldType, Schema};

/// How the words of a term search are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DefaultOperator {
    /// Every word must match.
    #[default]
    And,
    /// At least one word must match.
    Or,
}

/// Settings for the index writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWriterConfig {
    /// Buffered documents that force an intermediate segment to be written
    /// during a large batch. The batch still becomes visible in one commit.
    pub max_buffered_docs: usize,

    /// Live segments allowed before the smallest ones are merged.
    pub merge_factor: usize,

    /// Threads used to analyze batches in parallel.
    pub indexing_threads: usize,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            max_buffered_docs: 10_000,
            merge_factor: 10,
            indexing_threads: num_cpus::get(),
        }
    }
}

/// Settings for term searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fields searched by words without a `field:` prefix.
    pub default_fields: Vec<String>,

    pub default_operator: DefaultOperator,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            default_fields: vec![FIELD_TITLE.to_string(), FIELD_VALUE.to_string()],
            default_operator: DefaultOperator::And,
        }
    }
}

/// Configuration for a [`crate::service::SearchService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// ISO 639-1 code of the analysis language. Unknown codes use the simple
    /// analyzer.
    pub language: String,

    /// Index unstemmed forms next to stems so prefix queries match them.
    pub prefix_terms: bool,

    /// Declared field types. Undeclared fields take the type of their value.
    pub fields: HashMap<String, FieldType>,

    pub writer: IndexWriterConfig,

    pub search: SearchConfig,

    /// Retries of a failed commit after a transient I/O error.
    pub max_io_retries: u32,

    /// Delay before the first retry; later retries wait proportionally longer.
    pub retry_backoff_ms: u64,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        ServiceOptions {
            language: "en".to_string(),
            prefix_terms: false,
            fields: HashMap::new(),
            writer: IndexWriterConfig::default(),
            search: SearchConfig::default(),
            max_io_retries: 3,
            retry_backoff_ms: 10,
        }
    }
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ServiceOptionsBuilder {
        ServiceOptionsBuilder::default()
    }

    /// Load options from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let options: ServiceOptions = serde_json::from_slice(&bytes)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.writer.max_buffered_docs == 0 {
            return Err(QuarryError::validation("max_buffered_docs must be at least 1"));
        }
        if self.writer.merge_factor < 2 {
            return Err(QuarryError::validation("merge_factor must be at least 2"));
        }
        if self.search.default_fields.is_empty() {
            return Err(QuarryError::validation("at least one default field is required"));
        }
        Ok(())
    }

    /// The schema implied by the declared fields.
    pub fn schema(&self) -> Schema {
        self.fields
            .iter()
            .fold(Schema::new(), |schema, (name, field_type)| {
                schema.add_field(name, *field_type)
            })
    }

    pub fn analyzer(&self) -> Arc<dyn Analyzer> {
        analyzer_for_language(&self.language, self.prefix_terms)
    }
}

#[derive(Debug, Default)]
pub struct ServiceOptionsBuilder {
    options: ServiceOptions,
}

impl ServiceOptionsBuilder {
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.options.language = language.into();
        self
    }

    pub fn prefix_terms(mut self, prefix_terms: bool) -> Self {
        self.options.prefix_terms = prefix_terms;
        self
    }

    pub fn add_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.options.fields.insert(name.into(), field_type);
        self
    }

    pub fn default_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.search.default_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_operator(mut self, operator: DefaultOperator) -> Self {
        self.options.search.default_operator = operator;
        self
    }

    pub fn max_buffered_docs(mut self, max_buffered_docs: usize) -> Self {
        self.options.writer.max_buffered_docs = max_buffered_docs;
        self
    }

    pub fn merge_factor(mut self, merge_factor: usize) -> Self {
        self.options.writer.merge_factor = merge_factor;
        self
    }

    pub fn indexing_threads(mut self, threads: usize) -> Self {
        self.options.writer.indexing_threads = threads.max(1);
        self
    }

    pub fn max_io_retries(mut self, retries: u32) -> Self {
        self.options.max_io_retries = retries;
        self
    }

    pub fn retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.options.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn build(self) -> Result<ServiceOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder() {
        let options = ServiceOptions::builder()
            .language("fr")
            .add_field("rank", FieldType::Integer)
            .default_operator(DefaultOperator::Or)
            .merge_factor(4)
            .build()
            .unwrap();
        assert_eq!(options.language, "fr");
        assert_eq!(options.search.default_operator, DefaultOperator::Or);
        assert_eq!(options.schema().field_type("RANK"), Some(FieldType::Integer));
        assert_eq!(options.schema().field_type("t"), Some(FieldType::Text));

        assert!(ServiceOptions::builder().merge_factor(1).build().is_err());
        assert!(ServiceOptions::builder()
            .default_fields(Vec::<String>::new())
            .build()
            .is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"{
                "language": "de",
                "fields": {"published": "date"},
                "search": {"default_operator": "OR"},
                "max_io_retries": 5
            }"#,
        )
        .unwrap();

        let options = ServiceOptions::from_json_file(&path).unwrap();
        assert_eq!(options.language, "de");
        assert_eq!(options.max_io_retries, 5);
        assert_eq!(options.search.default_operator, DefaultOperator::Or);
        assert_eq!(options.search.default_fields, vec!["t", "v"]);
        assert_eq!(options.fields["published"], FieldType::Date);
        assert_eq!(options.writer.merge_factor, 10);
    }
}
