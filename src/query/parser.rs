//! Parsers for structured predicates and free-text queries.

use std::collections::HashSet;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::config::DefaultOperator;
use crate::error::{QuarryError, Result};
use crate::query::predicate::{CompareOp, Literal, Predicate};

#[derive(Parser)]
#[grammar = "query/grammar.pest"]
struct QueryGrammar;

/// Parse a structured predicate such as
/// `category LIKE 'CategoryA' AND v LIKE 'banana'`.
///
/// # Supported Syntax
///
/// - comparisons: `==`, `=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`, `LIKE`,
///   `CONTAINS`, `BEGINSWITH`, `ENDSWITH`, optionally followed by `[c]`
/// - `field BETWEEN {low, high}` and `field IN {a, b, c}`
/// - `AND`/`&&`, `OR`/`||`, `NOT`/`!` and parentheses
/// - `TRUEPREDICATE` and `FALSEPREDICATE`
/// - single or double quoted strings, integers and decimals
pub fn parse_predicate(input: &str) -> Result<Predicate> {
    let mut pairs = QueryGrammar::parse(Rule::predicate_input, input)
        .map_err(|e| QuarryError::query(format!("malformed predicate: {e}")))?;
    let root = pairs
        .next()
        .and_then(|p| p.into_inner().next())
        .ok_or_else(|| QuarryError::query("empty predicate"))?;
    build_or(root)
}

fn build_or(pair: Pair<Rule>) -> Result<Predicate> {
    let mut children = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::and_expr)
        .map(build_and)
        .collect::<Result<Vec<_>>>()?;
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Predicate::Or(children))
    }
}

fn build_and(pair: Pair<Rule>) -> Result<Predicate> {
    let mut children = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::not_expr)
        .map(build_not)
        .collect::<Result<Vec<_>>>()?;
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Predicate::And(children))
    }
}

fn build_not(pair: Pair<Rule>) -> Result<Predicate> {
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| QuarryError::query("empty expression"))?;
    match first.as_rule() {
        Rule::not_op => {
            let operand = inner
                .next()
                .ok_or_else(|| QuarryError::query("NOT without operand"))?;
            Ok(Predicate::Not(Box::new(build_not(operand)?)))
        }
        Rule::or_expr => build_or(first),
        Rule::true_predicate => Ok(Predicate::True),
        Rule::false_predicate => Ok(Predicate::Not(Box::new(Predicate::True))),
        Rule::comparison => build_comparison(first),
        rule => Err(QuarryError::query(format!("unexpected {rule:?} in predicate"))),
    }
}

fn build_comparison(pair: Pair<Rule>) -> Result<Predicate> {
    let mut inner = pair.into_inner();
    let field = inner
        .next()
        .ok_or_else(|| QuarryError::query("comparison without field"))?
        .as_str()
        .to_string();
    let clause = inner
        .next()
        .ok_or_else(|| QuarryError::query(format!("comparison on {field} without operator")))?;
    let rule = clause.as_rule();
    let mut parts = clause.into_inner();

    match rule {
        Rule::compare_clause => {
            let op = parts
                .next()
                .map(|p| comparator(p.as_str()))
                .ok_or_else(|| QuarryError::query("missing comparator"))??;
            let mut case_insensitive = false;
            let mut value = None;
            for part in parts {
                match part.as_rule() {
                    Rule::modifier => case_insensitive = modifier(part.as_str())?,
                    _ => value = Some(literal(part)?),
                }
            }
            let value = value.ok_or_else(|| QuarryError::query("comparison without value"))?;
            Ok(Predicate::Compare {
                field,
                op,
                value,
                case_insensitive,
            })
        }
        Rule::between_clause => {
            let values = parts
                .filter(|p| matches!(p.as_rule(), Rule::string | Rule::number))
                .map(literal)
                .collect::<Result<Vec<_>>>()?;
            match <[Literal; 2]>::try_from(values) {
                Ok([low, high]) => Ok(Predicate::Between { field, low, high }),
                Err(_) => Err(QuarryError::query("BETWEEN needs exactly two values")),
            }
        }
        Rule::in_clause => {
            let mut case_insensitive = false;
            let mut values = Vec::new();
            for part in parts {
                match part.as_rule() {
                    Rule::modifier => case_insensitive = modifier(part.as_str())?,
                    Rule::string | Rule::number => values.push(literal(part)?),
                    _ => {}
                }
            }
            Ok(Predicate::In {
                field,
                values,
                case_insensitive,
            })
        }
        rule => Err(QuarryError::query(format!("unexpected {rule:?} in comparison"))),
    }
}

fn comparator(op: &str) -> Result<CompareOp> {
    let op = match op.to_ascii_uppercase().as_str() {
        "==" | "=" => CompareOp::Eq,
        "!=" | "<>" => CompareOp::Ne,
        "<" => CompareOp::Lt,
        "<=" | "=<" => CompareOp::Le,
        ">" => CompareOp::Gt,
        ">=" | "=>" => CompareOp::Ge,
        "LIKE" => CompareOp::Like,
        "CONTAINS" => CompareOp::Contains,
        "BEGINSWITH" => CompareOp::BeginsWith,
        "ENDSWITH" => CompareOp::EndsWith,
        other => return Err(QuarryError::query(format!("unknown operator {other}"))),
    };
    Ok(op)
}

/// `[c]` makes a comparison case-insensitive; `[d]` is accepted and ignored
/// since indexed text is already normalized.
fn modifier(text: &str) -> Result<bool> {
    let flags = text.trim_start_matches('[').trim_end_matches(']');
    let mut case_insensitive = false;
    for flag in flags.chars() {
        match flag.to_ascii_lowercase() {
            'c' => case_insensitive = true,
            'd' | 'n' => {}
            other => {
                return Err(QuarryError::query(format!("unknown comparison modifier [{other}]")));
            }
        }
    }
    Ok(case_insensitive)
}

fn literal(pair: Pair<Rule>) -> Result<Literal> {
    match pair.as_rule() {
        Rule::string => {
            let text = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Literal::Str(unescape(text)))
        }
        Rule::number => {
            let text = pair.as_str();
            if !text.contains(['.', 'e', 'E']) {
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(Literal::Int(i));
                }
            }
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|e| QuarryError::query(format!("invalid number {text}: {e}")))
        }
        rule => Err(QuarryError::query(format!("expected a value, found {rule:?}"))),
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Substitute arguments into a predicate format string.
///
/// `%K` takes a field name, `%@` a string (quoted and escaped), `%d`/`%i`
/// and `%f` a number, and `%%` is a literal percent sign.
pub fn format_predicate(format: &str, args: &[&str]) -> Result<String> {
    let mut out = String::with_capacity(format.len() + 16);
    let mut args = args.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let specifier = chars
            .next()
            .ok_or_else(|| QuarryError::query("dangling % at end of predicate format"))?;
        if specifier == '%' {
            out.push('%');
            continue;
        }
        let arg = args
            .next()
            .ok_or_else(|| QuarryError::query(format!("missing argument for %{specifier}")))?;
        match specifier {
            'K' => {
                let valid = arg
                    .chars()
                    .enumerate()
                    .all(|(i, c)| c.is_alphanumeric() || c == '_' || (i > 0 && c == '.'));
                if arg.is_empty() || !valid {
                    return Err(QuarryError::query(format!("invalid field name {arg:?}")));
                }
                out.push_str(arg);
            }
            '@' => {
                out.push('\'');
                for ch in arg.chars() {
                    if ch == '\'' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('\'');
            }
            'd' | 'i' | 'f' => {
                if arg.trim().parse::<f64>().is_err() {
                    return Err(QuarryError::query(format!(
                        "%{specifier} expects a number, got {arg:?}"
                    )));
                }
                out.push_str(arg.trim());
            }
            other => {
                return Err(QuarryError::query(format!("unsupported format specifier %{other}")));
            }
        }
    }
    if args.next().is_some() {
        return Err(QuarryError::query("too many arguments for predicate format"));
    }
    Ok(out)
}

/// Parses free-text queries.
///
/// # Supported Syntax
///
/// - `hello world` - every word must match (or any word, with
///   [`DefaultOperator::Or`])
/// - `"exact phrase"` - words at consecutive positions
/// - `title:rust` - restrict a word or phrase to one field
/// - `run*` - prefix match
/// - `-spam` - exclude documents matching the word
/// - `*` - every document
///
/// A quote without a closing partner is ignored. When known fields are
/// set, `name:` only restricts the field if `name` is one of them;
/// otherwise `http://example.com` stays one ordinary word.
#[derive(Debug, Clone, Default)]
pub struct QueryStringParser {
    default_operator: DefaultOperator,
    known_fields: Option<HashSet<String>>,
}

impl QueryStringParser {
    pub fn new(default_operator: DefaultOperator) -> Self {
        QueryStringParser {
            default_operator,
            known_fields: None,
        }
    }

    /// Accept `name:` prefixes only for these fields (case-insensitive).
    pub fn with_known_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_fields = Some(
            fields
                .into_iter()
                .map(|f| f.as_ref().to_lowercase())
                .collect(),
        );
        self
    }

    fn is_field(&self, name: &str) -> bool {
        match &self.known_fields {
            Some(fields) => fields.contains(&name.to_lowercase()),
            None => true,
        }
    }

    pub fn parse(&self, input: &str) -> Result<Predicate> {
        let pairs = QueryGrammar::parse(Rule::query_input, input)
            .map_err(|e| QuarryError::query(format!("malformed query: {e}")))?;

        let mut required = Vec::new();
        let mut excluded = Vec::new();
        for clause in pairs.flat_map(|p| p.into_inner()) {
            if clause.as_rule() != Rule::clause {
                continue;
            }
            let mut negate = false;
            let mut field = None;
            // Text of a `name:` prefix that is not a field, put back in front.
            let mut lead = "";
            let mut node = None;
            for part in clause.into_inner() {
                match part.as_rule() {
                    Rule::exclude => negate = true,
                    Rule::field_prefix => {
                        let prefix = part.as_str();
                        let name = prefix.trim_end_matches(':');
                        if self.is_field(name) {
                            field = Some(name.to_string());
                        } else {
                            lead = prefix;
                        }
                    }
                    Rule::phrase => {
                        let text = part.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                        node = Some(Predicate::Phrase {
                            field: field.clone(),
                            text: format!("{lead}{text}"),
                        });
                    }
                    Rule::word => {
                        let word = format!("{lead}{}", part.as_str());
                        node = Some(word_predicate(field.clone(), &word));
                    }
                    _ => {}
                }
            }
            if let Some(node) = node {
                if negate {
                    excluded.push(node);
                } else {
                    required.push(node);
                }
            }
        }

        if required.is_empty() && excluded.is_empty() {
            return Ok(Predicate::Or(Vec::new()));
        }

        let mut clauses = match self.default_operator {
            DefaultOperator::And => required,
            DefaultOperator::Or if required.len() > 1 => vec![Predicate::Or(required)],
            DefaultOperator::Or => required,
        };
        if clauses.is_empty() {
            clauses.push(Predicate::True);
        }
        clauses.extend(excluded.into_iter().map(|p| Predicate::Not(Box::new(p))));

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Predicate::And(clauses))
        }
    }
}

fn word_predicate(field: Option<String>, word: &str) -> Predicate {
    if word == "*" && field.is_none() {
        return Predicate::True;
    }
    match word.strip_suffix('*') {
        Some(prefix) if !prefix.is_empty() && !prefix.ends_with('*') => Predicate::Prefix {
            field,
            prefix: prefix.to_string(),
        },
        _ => Predicate::Term {
            field,
            text: word.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_predicate() {
        let p = parse_predicate("category LIKE 'CategoryA' AND v LIKE \"banana\"").unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::like("category", "CategoryA"),
                Predicate::like("v", "banana"),
            ])
        );
    }

    #[test]
    fn test_precedence_and_negation() {
        let p = parse_predicate("a == 1 || b = 2 && !(c != 'x')").unwrap();
        let expected = Predicate::Or(vec![
            Predicate::eq("a", 1i64),
            Predicate::And(vec![
                Predicate::eq("b", 2i64),
                Predicate::Not(Box::new(Predicate::compare("c", CompareOp::Ne, "x"))),
            ]),
        ]);
        assert_eq!(p, expected);

        let p = parse_predicate("NOT notes CONTAINS 'x' or TRUEPREDICATE").unwrap();
        assert_eq!(
            p,
            Predicate::Or(vec![
                Predicate::Not(Box::new(Predicate::compare("notes", CompareOp::Contains, "x"))),
                Predicate::True,
            ])
        );
    }

    #[test]
    fn test_between_in_and_modifiers() {
        let p = parse_predicate("rank BETWEEN {1, 2.5} AND name IN[c] {'a', \"b\"}").unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::between("rank", 1i64, 2.5),
                Predicate::In {
                    field: "name".into(),
                    values: vec!["a".into(), "b".into()],
                    case_insensitive: true,
                },
            ])
        );

        let p = parse_predicate("name BEGINSWITH[cd] 'It\\'s'").unwrap();
        assert_eq!(
            p,
            Predicate::Compare {
                field: "name".into(),
                op: CompareOp::BeginsWith,
                value: Literal::Str("It's".into()),
                case_insensitive: true,
            }
        );
    }

    #[test]
    fn test_malformed_predicates() {
        for input in ["", "a ==", "a LIKE", "(a == 1", "a BETWEEN {1}", "== 3", "a ==[x] 1"] {
            assert!(
                matches!(parse_predicate(input), Err(QuarryError::Query(_))),
                "{input:?} should fail"
            );
        }
    }

    #[test]
    fn test_format_predicate() {
        let s =
            format_predicate("category LIKE 'CategoryA' AND %K LIKE %@", &["v", "it's"]).unwrap();
        assert_eq!(s, "category LIKE 'CategoryA' AND v LIKE 'it\\'s'");
        let p = parse_predicate(&s).unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::like("category", "CategoryA"),
                Predicate::like("v", "it's"),
            ])
        );

        assert!(format_predicate("%K == 1", &["bad name"]).is_err());
        assert!(format_predicate("%K == %@", &["a"]).is_err());
        assert!(format_predicate("a == %d", &["1", "2"]).is_err());
        assert_eq!(format_predicate("a == %d%%", &["3"]).unwrap(), "a == 3%");
    }

    #[test]
    fn test_query_string() {
        let parser = QueryStringParser::default();
        assert_eq!(
            parser.parse("hello").unwrap(),
            Predicate::Term {
                field: None,
                text: "hello".into()
            }
        );

        let p = parser.parse("hello \"big world\" t:rust run* -spam").unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::Term {
                    field: None,
                    text: "hello".into()
                },
                Predicate::Phrase {
                    field: None,
                    text: "big world".into()
                },
                Predicate::term("t", "rust"),
                Predicate::Prefix {
                    field: None,
                    prefix: "run".into()
                },
                Predicate::Not(Box::new(Predicate::Term {
                    field: None,
                    text: "spam".into()
                })),
            ])
        );

        assert_eq!(parser.parse("   ").unwrap(), Predicate::Or(Vec::new()));
        assert_eq!(parser.parse("*").unwrap(), Predicate::True);
        assert_eq!(
            parser.parse("-spam").unwrap(),
            Predicate::And(vec![
                Predicate::True,
                Predicate::Not(Box::new(Predicate::Term {
                    field: None,
                    text: "spam".into()
                })),
            ])
        );
    }

    #[test]
    fn test_query_string_stray_quote_is_ignored() {
        let parser = QueryStringParser::default();
        let term = |text: &str| Predicate::Term {
            field: None,
            text: text.into(),
        };
        assert_eq!(
            parser.parse("5\" screen").unwrap(),
            Predicate::And(vec![term("5"), term("screen")])
        );
        assert_eq!(
            parser.parse("\"open ended").unwrap(),
            Predicate::And(vec![term("open"), term("ended")])
        );
        assert_eq!(parser.parse("\"").unwrap(), Predicate::Or(Vec::new()));
    }

    #[test]
    fn test_query_string_unknown_field_prefix_is_text() {
        let parser = QueryStringParser::default().with_known_fields(["t", "v", "Category"]);
        assert_eq!(
            parser.parse("http://example.com").unwrap(),
            Predicate::Term {
                field: None,
                text: "http://example.com".into()
            }
        );
        assert_eq!(
            parser.parse("category:news").unwrap(),
            Predicate::term("category", "news")
        );
        assert_eq!(
            parser.parse("note:\"two words\"").unwrap(),
            Predicate::Phrase {
                field: None,
                text: "note:two words".into()
            }
        );
    }

    #[test]
    fn test_query_string_or_operator() {
        let parser = QueryStringParser::new(DefaultOperator::Or);
        let p = parser.parse("a b").unwrap();
        assert_eq!(
            p,
            Predicate::Or(vec![
                Predicate::Term {
                    field: None,
                    text: "a".into()
                },
                Predicate::Term {
                    field: None,
                    text: "b".into()
                },
            ])
        );
    }
}
