//! Ordering of search hits.

use std::cmp::Ordering;

use crate::error::{QuarryError, Result};
use crate::index::segment::DocValue;
use crate::index::snapshot::{DocAddress, Snapshot};
use crate::query::predicate::{SortSpec, SortType};

/// A matched document before its stored fields are loaded.
#[derive(Debug, Clone)]
pub(crate) struct Hit {
    pub address: DocAddress,
    pub score: f32,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortKey {
    Str(String),
    Num(f64),
    Date(i64),
}

fn sort_key(field: &str, sort_type: SortType, value: &DocValue) -> Result<SortKey> {
    let key = match (sort_type, value) {
        (SortType::String, DocValue::Str(s)) => SortKey::Str(s.clone()),
        (SortType::Integer, DocValue::Int(i)) => SortKey::Num(*i as f64),
        (SortType::Float, DocValue::Int(i)) => SortKey::Num(*i as f64),
        (SortType::Float, DocValue::Float(f)) => SortKey::Num(*f),
        (SortType::Date, DocValue::Date(millis)) => SortKey::Date(*millis),
        (sort_type, value) => {
            return Err(QuarryError::query(format!(
                "cannot sort field {field} as {sort_type:?}: it holds {value:?}"
            )));
        }
    };
    Ok(key)
}

/// Order hits by relevance (score descending), or by `sort` when given.
///
/// Relevance ties are broken by identifier ascending. A field order treats a
/// missing value as greater than any present one and breaks ties by
/// identifier; descending is the exact reverse of ascending.
pub(crate) fn sort_hits(
    snapshot: &Snapshot,
    hits: &mut Vec<Hit>,
    sort: Option<&SortSpec>,
) -> Result<()> {
    let Some(sort) = sort else {
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        return Ok(());
    };

    let field = sort.field.to_lowercase();
    let mut keyed = Vec::with_capacity(hits.len());
    for hit in hits.drain(..) {
        let key = match snapshot.doc_value(hit.address, &field) {
            Some(value) => Some(sort_key(&field, sort.sort_type, value)?),
            None => None,
        };
        keyed.push((key, hit));
    }

    keyed.sort_by(|(ka, a), (kb, b)| {
        let ascending = match (ka, kb) {
            (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.id.cmp(&b.id));
        if sort.ascending {
            ascending
        } else {
            ascending.reverse()
        }
    });
    hits.extend(keyed.into_iter().map(|(_, hit)| hit));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: u32, score: f32, id: &str) -> Hit {
        Hit {
            address: DocAddress::new(0, doc),
            score,
            id: id.to_string(),
        }
    }

    #[test]
    fn test_relevance_order_with_identifier_ties() {
        let snapshot = Snapshot::empty();
        let mut hits = vec![hit(0, 1.0, "b"), hit(1, 2.0, "c"), hit(2, 1.0, "a")];
        sort_hits(&snapshot, &mut hits, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_sort_key_type_checks() {
        assert_eq!(
            sort_key("rank", SortType::Float, &DocValue::Int(3)).unwrap(),
            SortKey::Num(3.0)
        );
        assert!(matches!(
            sort_key("t", SortType::Integer, &DocValue::Str("x".into())),
            Err(QuarryError::Query(_))
        ));
        assert!(sort_key("m", SortType::Date, &DocValue::Int(1)).is_err());
    }

    #[test]
    fn test_missing_values_sort_after_present_ones() {
        // An empty snapshot has no doc values, so every hit is missing the
        // field and the identifier decides.
        let snapshot = Snapshot::empty();
        let mut hits = vec![hit(0, 0.0, "y"), hit(1, 0.0, "z"), hit(2, 0.0, "x")];
        let order = SortSpec::ascending("rank", SortType::Integer);
        sort_hits(&snapshot, &mut hits, Some(&order)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);

        let order = SortSpec::descending("rank", SortType::Integer);
        sort_hits(&snapshot, &mut hits, Some(&order)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "y", "x"]);
    }
}
