//! BM25 relevance scoring.

use crate::error::Result;
use crate::index::snapshot::Snapshot;

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

/// BM25 score of one term in one document.
///
/// * `tf` - occurrences of the term in the field
/// * `df` - documents containing the term
/// * `total_docs` - documents in the index
/// * `doc_len` - tokens in the document's field
/// * `avg_doc_len` - average tokens in the field
pub fn bm25_score(tf: f32, df: f32, total_docs: f32, doc_len: f32, avg_doc_len: f32) -> f32 {
    let idf = ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln();

    let norm = if avg_doc_len > 0.0 {
        1.0 - BM25_B + BM25_B * (doc_len / avg_doc_len)
    } else {
        1.0
    };

    idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * norm)
}

/// Snapshot-wide statistics of one `field:term`, computed once per query.
#[derive(Debug, Clone, Copy)]
pub struct TermWeight {
    df: f32,
    total_docs: f32,
    avg_doc_len: f32,
}

impl TermWeight {
    pub fn new(snapshot: &Snapshot, field: &str, term: &str) -> Result<Self> {
        Ok(TermWeight {
            df: snapshot.doc_frequency(field, term)? as f32,
            total_docs: snapshot.max_doc_count() as f32,
            avg_doc_len: snapshot.average_field_length(field) as f32,
        })
    }

    pub fn score(&self, tf: u32, doc_len: u32) -> f32 {
        bm25_score(
            tf as f32,
            self.df,
            self.total_docs,
            doc_len as f32,
            self.avg_doc_len,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rare_terms_score_higher() {
        let common = bm25_score(1.0, 90.0, 100.0, 10.0, 10.0);
        let rare = bm25_score(1.0, 2.0, 100.0, 10.0, 10.0);
        assert!(rare > common);
        assert!(common > 0.0);
    }

    #[test]
    fn test_frequency_and_length() {
        let once = bm25_score(1.0, 5.0, 100.0, 10.0, 10.0);
        let twice = bm25_score(2.0, 5.0, 100.0, 10.0, 10.0);
        assert!(twice > once);

        let short = bm25_score(1.0, 5.0, 100.0, 5.0, 10.0);
        let long = bm25_score(1.0, 5.0, 100.0, 40.0, 10.0);
        assert!(short > long);

        // Fields without recorded lengths are not normalized.
        assert!(bm25_score(1.0, 5.0, 100.0, 0.0, 0.0).is_finite());
    }
}
