//! Search results bound to the snapshot they were computed from.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, OnceLock};

use chrono::DateTime;

use crate::data::Document;
use crate::error::{QuarryError, Result};
use crate::index::segment::DocValue;
use crate::index::snapshot::{DocAddress, Snapshot};
use crate::query::evaluator::DocSet;
use crate::query::predicate::SortSpec;
use crate::search::sort::{Hit, sort_hits};

/// One matching document. Stored fields are read on first access.
#[derive(Debug)]
pub struct SearchResult {
    /// Document identifier.
    pub id: String,
    pub score: f32,
    pub address: DocAddress,
    snapshot: Arc<Snapshot>,
    document: OnceLock<Document>,
}

impl SearchResult {
    /// The stored document, loaded from the snapshot on first call.
    pub fn document(&self) -> Result<&Document> {
        if let Some(document) = self.document.get() {
            return Ok(document);
        }
        let loaded = self.snapshot.document(self.address)?;
        let _ = self.document.set(loaded);
        self.document
            .get()
            .ok_or_else(|| QuarryError::not_found(format!("stored fields of {}", self.id)))
    }

    pub fn title(&self) -> Result<Option<String>> {
        Ok(self.document()?.title().map(str::to_string))
    }

    pub fn value(&self) -> Result<Option<String>> {
        Ok(self.document()?.value().map(str::to_string))
    }
}

/// The ordered hits of one search.
///
/// A result set keeps its snapshot alive, so iterating it again always
/// yields the same sequence regardless of later commits.
#[derive(Debug)]
pub struct ResultSet {
    snapshot: Arc<Snapshot>,
    results: Vec<SearchResult>,
}

impl ResultSet {
    pub(crate) fn from_matches(
        snapshot: Arc<Snapshot>,
        matches: DocSet,
        sort: Option<&SortSpec>,
    ) -> Result<Self> {
        let mut hits = Vec::with_capacity(matches.len());
        for (address, score) in matches {
            let id = snapshot.identifier(address).ok_or_else(|| {
                QuarryError::index(format!(
                    "document {} of segment {} has no identifier",
                    address.doc, address.segment
                ))
            })?;
            hits.push(Hit {
                address,
                score,
                id: id.to_string(),
            });
        }
        sort_hits(&snapshot, &mut hits, sort)?;

        let results = hits
            .into_iter()
            .map(|hit| SearchResult {
                id: hit.id,
                score: hit.score,
                address: hit.address,
                snapshot: Arc::clone(&snapshot),
                document: OnceLock::new(),
            })
            .collect();
        Ok(ResultSet { snapshot, results })
    }

    pub fn count(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn result(&self, at: usize) -> Result<&SearchResult> {
        self.results.get(at).ok_or_else(|| {
            QuarryError::not_found(format!("result {at} of {}", self.results.len()))
        })
    }

    /// Visit results in order until the callback breaks.
    ///
    /// Returns the number of results visited.
    pub fn iterate<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(usize, &SearchResult) -> ControlFlow<()>,
    {
        for (index, result) in self.results.iter().enumerate() {
            if callback(index, result).is_break() {
                return index + 1;
            }
        }
        self.results.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.results.iter()
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.id.as_str()).collect()
    }

    /// Partition the results by the value of `field`, keeping result order
    /// within each group.
    ///
    /// Dates are grouped by day (`yyyyMMdd`). Results without the field are
    /// grouped under the empty string.
    pub fn group_by_field(&self, field: &str) -> BTreeMap<String, Vec<&SearchResult>> {
        let mut groups: BTreeMap<String, Vec<&SearchResult>> = BTreeMap::new();
        for result in &self.results {
            let key = match self.snapshot.doc_value(result.address, field) {
                Some(DocValue::Str(s)) => s.clone(),
                Some(DocValue::Int(i)) => i.to_string(),
                Some(DocValue::Float(f)) => f.to_string(),
                Some(DocValue::Date(millis)) => DateTime::from_timestamp_millis(*millis)
                    .map(|dt| dt.format("%Y%m%d").to_string())
                    .unwrap_or_default(),
                None => String::new(),
            };
            groups.entry(key).or_default().push(result);
        }
        groups
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a SearchResult;
    type IntoIter = std::slice::Iter<'a, SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
