//! Recursive evaluation of a [`Predicate`] against a [`Snapshot`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ahash::AHashMap;
use chrono::DateTime;

use crate::analysis::Analyzer;
use crate::data::{format_timestamp, parse_timestamp};
use crate::error::{QuarryError, Result};
use crate::index::segment::DocValue;
use crate::index::snapshot::{DocAddress, Snapshot};
use crate::query::predicate::{CompareOp, Literal, Predicate, has_wildcard, wildcard_regex};
use crate::query::scoring::TermWeight;
use crate::schema::{FieldType, Schema};

/// Matching documents with their scores, in address order.
pub type DocSet = BTreeMap<DocAddress, f32>;

/// Right-hand side of a doc-value comparison, converted once per query.
#[derive(Debug)]
enum Operand {
    Text(String),
    Number(f64),
    Date(i64),
    Pattern(regex::Regex),
}

/// Interprets predicates over one snapshot.
///
/// Sub-expressions evaluate to `None` when they carry no constraint, for
/// example a word made only of stop words. `None` is skipped by `AND` and
/// `OR`; a whole query that is `None` matches nothing.
pub struct Evaluator<'a> {
    snapshot: &'a Snapshot,
    schema: &'a Schema,
    analyzer: &'a dyn Analyzer,
    default_fields: Vec<String>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        snapshot: &'a Snapshot,
        schema: &'a Schema,
        analyzer: &'a dyn Analyzer,
        default_fields: &[String],
    ) -> Self {
        Evaluator {
            snapshot,
            schema,
            analyzer,
            default_fields: default_fields.iter().map(|f| f.to_lowercase()).collect(),
        }
    }

    pub fn evaluate(&self, predicate: &Predicate) -> Result<DocSet> {
        Ok(self.eval(predicate)?.unwrap_or_default())
    }

    fn eval(&self, predicate: &Predicate) -> Result<Option<DocSet>> {
        match predicate {
            Predicate::True => Ok(Some(self.all_live())),
            Predicate::Term { field, text } => self.term(&self.fields(field), text),
            Predicate::Phrase { field, text } => self.phrase(&self.fields(field), text),
            Predicate::Prefix { field, prefix } => {
                self.prefix(&self.fields(field), prefix).map(Some)
            }
            Predicate::Compare {
                field,
                op,
                value,
                case_insensitive,
            } => self.compare(&field.to_lowercase(), *op, value, *case_insensitive),
            Predicate::Between { field, low, high } => {
                let field = field.to_lowercase();
                let low = self.compare(&field, CompareOp::Ge, low, false)?;
                let high = self.compare(&field, CompareOp::Le, high, false)?;
                Ok(intersect_all([low, high]))
            }
            Predicate::In {
                field,
                values,
                case_insensitive,
            } => {
                let field = field.to_lowercase();
                let mut matched = DocSet::new();
                for value in values {
                    if let Some(docs) =
                        self.compare(&field, CompareOp::Eq, value, *case_insensitive)?
                    {
                        union_into(&mut matched, docs);
                    }
                }
                Ok(Some(matched))
            }
            Predicate::And(children) => {
                let mut sets = Vec::with_capacity(children.len());
                for child in children {
                    sets.push(self.eval(child)?);
                }
                Ok(intersect_all(sets))
            }
            Predicate::Or(children) => {
                if children.is_empty() {
                    return Ok(Some(DocSet::new()));
                }
                let mut matched: Option<DocSet> = None;
                for child in children {
                    if let Some(docs) = self.eval(child)? {
                        union_into(matched.get_or_insert_with(DocSet::new), docs);
                    }
                }
                Ok(matched)
            }
            Predicate::Not(child) => {
                Ok(self.eval(child)?.map(|excluded| self.complement(&excluded)))
            }
        }
    }

    fn fields(&self, field: &Option<String>) -> Vec<String> {
        match field {
            Some(field) => vec![field.to_lowercase()],
            None => self.default_fields.clone(),
        }
    }

    fn field_type(&self, field: &str) -> Option<FieldType> {
        self.schema
            .field_type(field)
            .or_else(|| self.snapshot.field_type(field))
    }

    fn all_live(&self) -> DocSet {
        self.snapshot
            .all_live()
            .into_iter()
            .map(|addr| (addr, 0.0))
            .collect()
    }

    fn complement(&self, excluded: &DocSet) -> DocSet {
        self.snapshot
            .all_live()
            .into_iter()
            .filter(|addr| !excluded.contains_key(addr))
            .map(|addr| (addr, 0.0))
            .collect()
    }

    /// Tokens of `text` grouped by position. Tokens sharing a position are
    /// alternatives, such as a stem and its surface form.
    fn analyze_groups(&self, text: &str) -> Result<Vec<(u32, Vec<String>)>> {
        let mut groups: Vec<(u32, Vec<String>)> = Vec::new();
        for token in self.analyzer.analyze(text)? {
            match groups.last_mut() {
                Some((position, variants)) if *position == token.position => {
                    if !variants.contains(&token.text) {
                        variants.push(token.text);
                    }
                }
                _ => groups.push((token.position, vec![token.text])),
            }
        }
        Ok(groups)
    }

    /// Live documents containing `field:term`, scored with BM25.
    fn term_docs(&self, field: &str, term: &str) -> Result<DocSet> {
        let weight = TermWeight::new(self.snapshot, field, term)?;
        let mut docs = DocSet::new();
        for (segment, view) in self.snapshot.segments().iter().enumerate() {
            let Some(list) = view.reader.postings(field, term)? else {
                continue;
            };
            for posting in list.iter().filter(|p| view.is_live(p.doc)) {
                let length = view.reader.field_length(field, posting.doc);
                docs.insert(
                    DocAddress::new(segment, posting.doc),
                    weight.score(posting.frequency(), length),
                );
            }
        }
        Ok(docs)
    }

    fn term(&self, fields: &[String], text: &str) -> Result<Option<DocSet>> {
        let (text_fields, other_fields): (Vec<&String>, Vec<&String>) = fields
            .iter()
            .partition(|f| matches!(self.field_type(f), Some(FieldType::Text) | None));

        let mut matched = None;
        if !text_fields.is_empty() {
            let mut per_position = Vec::new();
            for (_, variants) in self.analyze_groups(text)? {
                let mut any_field = DocSet::new();
                for field in &text_fields {
                    let mut any_variant = DocSet::new();
                    for variant in &variants {
                        union_max(&mut any_variant, self.term_docs(field, variant)?);
                    }
                    union_into(&mut any_field, any_variant);
                }
                per_position.push(Some(any_field));
            }
            matched = intersect_all(per_position);
        }

        for field in other_fields {
            let docs = match self.field_type(field) {
                Some(FieldType::Keyword) => self.term_docs(field, text.trim())?,
                _ => {
                    let value = parse_literal(text);
                    match self.compare(field, CompareOp::Eq, &value, false) {
                        Ok(docs) => docs.unwrap_or_default(),
                        Err(QuarryError::Query(_)) => DocSet::new(),
                        Err(e) => return Err(e),
                    }
                }
            };
            union_into(matched.get_or_insert_with(DocSet::new), docs);
        }
        Ok(matched)
    }

    fn phrase(&self, fields: &[String], text: &str) -> Result<Option<DocSet>> {
        let groups = self.analyze_groups(text)?;
        if groups.len() < 2 {
            return self.term(fields, text);
        }
        let mut matched = DocSet::new();
        for field in fields {
            match self.field_type(field) {
                Some(FieldType::Text) | None => {
                    union_into(&mut matched, self.phrase_in_field(field, &groups)?)
                }
                _ => {
                    if let Some(docs) = self.term(std::slice::from_ref(field), text)? {
                        union_into(&mut matched, docs);
                    }
                }
            }
        }
        Ok(Some(matched))
    }

    fn phrase_in_field(&self, field: &str, groups: &[(u32, Vec<String>)]) -> Result<DocSet> {
        let base = groups[0].0;
        let weights = groups
            .iter()
            .map(|(_, variants)| TermWeight::new(self.snapshot, field, &variants[0]))
            .collect::<Result<Vec<_>>>()?;

        let mut matched = DocSet::new();
        'segments: for (segment, view) in self.snapshot.segments().iter().enumerate() {
            let mut per_group: Vec<AHashMap<u32, Vec<u32>>> = Vec::with_capacity(groups.len());
            for (_, variants) in groups {
                let mut positions: AHashMap<u32, Vec<u32>> = AHashMap::new();
                for term in variants {
                    if let Some(list) = view.reader.postings(field, term)? {
                        for posting in list.iter().filter(|p| view.is_live(p.doc)) {
                            positions
                                .entry(posting.doc)
                                .or_default()
                                .extend_from_slice(&posting.positions);
                        }
                    }
                }
                if positions.is_empty() {
                    continue 'segments;
                }
                for list in positions.values_mut() {
                    list.sort_unstable();
                    list.dedup();
                }
                per_group.push(positions);
            }

            let Some((first, rest)) = per_group.split_first() else {
                continue;
            };
            for (&doc, starts) in first {
                let occurrences = starts
                    .iter()
                    .filter(|&&start| {
                        rest.iter().zip(&groups[1..]).all(|(group, (position, _))| {
                            let wanted = start + (position - base);
                            group
                                .get(&doc)
                                .is_some_and(|list| list.binary_search(&wanted).is_ok())
                        })
                    })
                    .count() as u32;
                if occurrences == 0 {
                    continue;
                }
                let length = view.reader.field_length(field, doc);
                let score: f32 = weights.iter().map(|w| w.score(occurrences, length)).sum();
                matched.insert(DocAddress::new(segment, doc), score);
            }
        }
        Ok(matched)
    }

    fn prefix(&self, fields: &[String], prefix: &str) -> Result<DocSet> {
        let mut matched = DocSet::new();
        for field in fields {
            let prefix = match self.field_type(field) {
                Some(FieldType::Keyword) => prefix.to_string(),
                Some(FieldType::Text) | None => prefix.to_lowercase(),
                Some(_) => continue,
            };
            for (segment, view) in self.snapshot.segments().iter().enumerate() {
                for (_, offset) in view.reader.terms_with_prefix(field, &prefix)? {
                    let list = view.reader.postings_at(offset)?;
                    for posting in list.iter().filter(|p| view.is_live(p.doc)) {
                        matched.insert(DocAddress::new(segment, posting.doc), 1.0);
                    }
                }
            }
        }
        Ok(matched)
    }

    /// Documents whose terms in `field` match a `LIKE` wildcard pattern.
    fn wildcard_docs(&self, field: &str, pattern: &str) -> Result<DocSet> {
        let pattern = pattern.to_lowercase();
        let literal: String = pattern
            .chars()
            .take_while(|c| !matches!(c, '*' | '?' | '\\'))
            .collect();
        let regex = wildcard_regex(&pattern, true)?;

        let mut matched = DocSet::new();
        for (segment, view) in self.snapshot.segments().iter().enumerate() {
            for (term, offset) in view.reader.terms_with_prefix(field, &literal)? {
                if !regex.is_match(&term) {
                    continue;
                }
                let list = view.reader.postings_at(offset)?;
                for posting in list.iter().filter(|p| view.is_live(p.doc)) {
                    matched.insert(DocAddress::new(segment, posting.doc), 1.0);
                }
            }
        }
        Ok(matched)
    }

    fn compare(
        &self,
        field: &str,
        op: CompareOp,
        value: &Literal,
        case_insensitive: bool,
    ) -> Result<Option<DocSet>> {
        if op == CompareOp::Ne {
            let equal = self.compare(field, CompareOp::Eq, value, case_insensitive)?;
            return Ok(Some(self.complement(&equal.unwrap_or_default())));
        }

        let Some(field_type) = self.field_type(field) else {
            return Ok(Some(DocSet::new()));
        };
        let fields = [field.to_string()];

        if field_type == FieldType::Text {
            match op {
                CompareOp::Eq | CompareOp::Contains => return self.term(&fields, &value.to_text()),
                CompareOp::Like => {
                    let pattern = value.to_text();
                    let mut pieces = Vec::new();
                    for piece in pattern.split_whitespace() {
                        if has_wildcard(piece) {
                            pieces.push(Some(self.wildcard_docs(field, piece)?));
                        } else {
                            pieces.push(self.term(&fields, piece)?);
                        }
                    }
                    return Ok(intersect_all(pieces));
                }
                _ => {}
            }
        } else if field_type == FieldType::Keyword && op == CompareOp::Eq && !case_insensitive {
            let mut docs = self.term_docs(field, &value.to_text())?;
            docs.values_mut().for_each(|score| *score = 0.0);
            return Ok(Some(docs));
        }

        let operand = resolve_operand(field, field_type, op, value, case_insensitive)?;
        let mut matched = DocSet::new();
        for (segment, view) in self.snapshot.segments().iter().enumerate() {
            for doc in view.live_docs() {
                if let Some(found) = view.reader.doc_value(field, doc) {
                    if value_matches(found, op, &operand, case_insensitive) {
                        matched.insert(DocAddress::new(segment, doc), 0.0);
                    }
                }
            }
        }
        Ok(Some(matched))
    }
}

fn union_into(target: &mut DocSet, docs: DocSet) {
    for (addr, score) in docs {
        *target.entry(addr).or_insert(0.0) += score;
    }
}

fn union_max(target: &mut DocSet, docs: DocSet) {
    for (addr, score) in docs {
        let entry = target.entry(addr).or_insert(score);
        *entry = entry.max(score);
    }
}

/// Intersect the constraining sets, summing scores. `None` entries are
/// skipped; if every entry is `None` the result is `None`.
fn intersect_all(sets: impl IntoIterator<Item = Option<DocSet>>) -> Option<DocSet> {
    let mut sets: Vec<DocSet> = sets.into_iter().flatten().collect();
    sets.sort_by_key(|s| s.len());
    let mut iter = sets.into_iter();
    let mut result = iter.next()?;
    for other in iter {
        result.retain(|addr, score| match other.get(addr) {
            Some(extra) => {
                *score += extra;
                true
            }
            None => false,
        });
    }
    Some(result)
}

fn parse_literal(text: &str) -> Literal {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        Literal::Int(i)
    } else if let Ok(f) = text.parse::<f64>() {
        Literal::Float(f)
    } else {
        Literal::Str(text.to_string())
    }
}

fn fold(text: String, case_insensitive: bool) -> String {
    if case_insensitive {
        text.to_lowercase()
    } else {
        text
    }
}

fn render(value: &DocValue) -> String {
    match value {
        DocValue::Str(s) => s.clone(),
        DocValue::Int(i) => i.to_string(),
        DocValue::Float(f) => f.to_string(),
        DocValue::Date(millis) => DateTime::from_timestamp_millis(*millis)
            .map(|dt| format_timestamp(&dt))
            .unwrap_or_default(),
    }
}

fn resolve_operand(
    field: &str,
    field_type: FieldType,
    op: CompareOp,
    value: &Literal,
    case_insensitive: bool,
) -> Result<Operand> {
    let operand = match op {
        CompareOp::Like => Operand::Pattern(wildcard_regex(&value.to_text(), case_insensitive)?),
        CompareOp::Contains | CompareOp::BeginsWith | CompareOp::EndsWith => {
            Operand::Text(fold(value.to_text(), case_insensitive))
        }
        _ => match field_type {
            FieldType::Integer | FieldType::Float => Operand::Number(literal_number(field, value)?),
            FieldType::Date => Operand::Date(literal_millis(field, value)?),
            FieldType::Text | FieldType::Keyword => {
                Operand::Text(fold(value.to_text(), case_insensitive))
            }
        },
    };
    Ok(operand)
}

fn literal_number(field: &str, value: &Literal) -> Result<f64> {
    match value {
        Literal::Int(i) => Ok(*i as f64),
        Literal::Float(f) => Ok(*f),
        Literal::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            QuarryError::query(format!("field {field} is numeric, {s:?} is not a number"))
        }),
    }
}

/// Dates accept `yyyyMMdd[HHmmss]` or RFC 3339 strings, integers of 8 or 14
/// digits in the same compact form, and otherwise Unix seconds.
fn literal_millis(field: &str, value: &Literal) -> Result<i64> {
    let millis = match value {
        Literal::Str(s) => parse_timestamp(s).map(|dt| dt.timestamp_millis()),
        Literal::Int(i) => {
            let digits = i.to_string();
            if *i > 0 && (digits.len() == 8 || digits.len() == 14) {
                parse_timestamp(&digits).map(|dt| dt.timestamp_millis())
            } else {
                Some(i.saturating_mul(1000))
            }
        }
        Literal::Float(f) => Some((f * 1000.0) as i64),
    };
    millis.ok_or_else(|| QuarryError::query(format!("field {field} is a date, {value:?} is not")))
}

fn ordering_matches(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

fn value_matches(
    value: &DocValue,
    op: CompareOp,
    operand: &Operand,
    case_insensitive: bool,
) -> bool {
    match operand {
        Operand::Pattern(regex) => regex.is_match(&render(value)),
        Operand::Text(needle) => {
            let haystack = fold(render(value), case_insensitive);
            match op {
                CompareOp::Contains => haystack.contains(needle.as_str()),
                CompareOp::BeginsWith => haystack.starts_with(needle.as_str()),
                CompareOp::EndsWith => haystack.ends_with(needle.as_str()),
                _ => ordering_matches(op, haystack.as_str().cmp(needle.as_str())),
            }
        }
        Operand::Number(number) => value
            .as_f64()
            .and_then(|v| v.partial_cmp(number))
            .is_some_and(|ordering| ordering_matches(op, ordering)),
        Operand::Date(millis) => match value {
            DocValue::Date(v) => ordering_matches(op, v.cmp(millis)),
            _ => false,
        },
    }
}
