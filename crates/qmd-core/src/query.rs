//! Query Compiler: structured query parsing and FTS5 lexical compilation.
//!
//! Two sub-languages are handled here: the newline-separated *structured
//! query document* (`lex:`/`vec:`/`hyde:`/`expand:` lines), and the
//! tokenizer/sanitizer that turns one `lex:` line's body into an FTS5
//! `MATCH` expression.

use crate::error::{QmdError, Result};

/// The channel a structured sub-query runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubQueryKind {
    Lex,
    Vec,
    Hyde,
}

impl SubQueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubQueryKind::Lex => "lex",
            SubQueryKind::Vec => "vec",
            SubQueryKind::Hyde => "hyde",
        }
    }
}

/// One typed line of a structured query document.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    pub kind: SubQueryKind,
    pub text: String,
    pub line: usize,
}

/// The result of parsing a raw query string.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledQuery {
    /// One or more typed lines, in input order.
    Structured(Vec<SubQuery>),
    /// "Expand this query": delegate to `Gateway::expand_query`. Carries
    /// the raw text to expand (possibly empty).
    Expand(String),
}

enum LinePrefix {
    Lex,
    Vec,
    Hyde,
    Expand,
}

fn detect_prefix(line: &str) -> Option<(LinePrefix, &str)> {
    for (prefix, kind) in [
        ("lex:", LinePrefix::Lex),
        ("vec:", LinePrefix::Vec),
        ("hyde:", LinePrefix::Hyde),
        ("expand:", LinePrefix::Expand),
    ] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some((kind, rest));
        }
    }
    None
}

/// Parse a raw (possibly multi-line) query string into either a
/// structured sub-query list or an expansion request.
pub fn parse_structured(input: &str) -> Result<CompiledQuery> {
    let non_blank: Vec<(usize, &str)> = input
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();

    if non_blank.is_empty() {
        return Ok(CompiledQuery::Expand(String::new()));
    }

    if non_blank.len() == 1 {
        let (line_no, raw) = non_blank[0];
        let trimmed = raw.trim();
        return match detect_prefix(trimmed) {
            Some((LinePrefix::Expand, rest)) => Ok(CompiledQuery::Expand(rest.trim().to_string())),
            Some((kind, rest)) => {
                let body = rest.trim();
                if body.is_empty() {
                    return Err(QmdError::InvalidQuery {
                        line: line_no,
                        message: "typed query line has an empty body".to_string(),
                    });
                }
                Ok(CompiledQuery::Structured(vec![SubQuery {
                    kind: to_subquery_kind(kind),
                    text: body.to_string(),
                    line: line_no,
                }]))
            }
            None => Ok(CompiledQuery::Expand(trimmed.to_string())),
        };
    }

    // Multiple non-blank lines: every one must carry a recognized prefix.
    let mut parsed = Vec::with_capacity(non_blank.len());
    let mut saw_expand = false;
    let mut saw_typed = false;
    for (line_no, raw) in &non_blank {
        let trimmed = raw.trim();
        match detect_prefix(trimmed) {
            Some((LinePrefix::Expand, rest)) => {
                saw_expand = true;
                parsed.push((*line_no, None::<SubQueryKind>, rest.trim().to_string()));
            }
            Some((kind, rest)) => {
                saw_typed = true;
                parsed.push((*line_no, Some(to_subquery_kind(kind)), rest.trim().to_string()));
            }
            None => {
                return Err(QmdError::InvalidQuery {
                    line: *line_no,
                    message: "line is missing a lex:/vec:/hyde:/expand: prefix".to_string(),
                });
            }
        }
    }

    if saw_expand && saw_typed {
        return Err(QmdError::InvalidQuery {
            line: 0,
            message: "cannot mix expand: lines with typed lex:/vec:/hyde: lines".to_string(),
        });
    }
    if saw_expand {
        return Err(QmdError::InvalidQuery {
            line: 0,
            message: "only a single expand: line is permitted".to_string(),
        });
    }

    let mut sub_queries = Vec::with_capacity(parsed.len());
    for (line_no, kind, body) in parsed {
        if body.is_empty() {
            return Err(QmdError::InvalidQuery {
                line: line_no,
                message: "typed query line has an empty body".to_string(),
            });
        }
        sub_queries.push(SubQuery {
            kind: kind.expect("typed line always carries a kind here"),
            text: body,
            line: line_no,
        });
    }
    Ok(CompiledQuery::Structured(sub_queries))
}

fn to_subquery_kind(prefix: LinePrefix) -> SubQueryKind {
    match prefix {
        LinePrefix::Lex => SubQueryKind::Lex,
        LinePrefix::Vec => SubQueryKind::Vec,
        LinePrefix::Hyde => SubQueryKind::Hyde,
        LinePrefix::Expand => unreachable!("expand is handled separately"),
    }
}

/// Drop non-alphanumeric/apostrophe characters and lowercase.
fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '\'')
        .collect::<String>()
        .to_lowercase()
}

/// Compile a `lex:` line's body into an FTS5 `MATCH` expression.
///
/// `line` is the 1-based line number used in any [`QmdError::InvalidQuery`]
/// this produces; pass `0` when compiling a standalone string outside a
/// structured query document.
///
/// Returns `Ok(None)` when the body has no positive terms (an all-negative
/// or empty query); callers should skip the lexical channel in that case.
pub fn compile_lex_query(body: &str, line: usize) -> Result<Option<String>> {
    let chars: Vec<char> = body.chars().collect();
    let n = chars.len();
    let mut i = 0;
    let mut positives = Vec::new();
    let mut negatives = Vec::new();

    while i < n {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let mut negate = false;
        if chars[i] == '-' {
            negate = true;
            i += 1;
        }
        if i < n && chars[i] == '"' {
            i += 1;
            let start = i;
            while i < n && chars[i] != '"' {
                i += 1;
            }
            if i >= n {
                return Err(QmdError::InvalidQuery {
                    line,
                    message: "unmatched quote in lexical query".to_string(),
                });
            }
            let raw_phrase: String = chars[start..i].iter().collect();
            i += 1; // consume closing quote
            let terms: Vec<String> = raw_phrase
                .split_whitespace()
                .map(sanitize_token)
                .filter(|t| !t.is_empty())
                .collect();
            if terms.is_empty() {
                continue;
            }
            let phrase = format!("\"{}\"", terms.join(" "));
            if negate {
                negatives.push(phrase);
            } else {
                positives.push(phrase);
            }
        } else {
            let start = i;
            while i < n && !chars[i].is_whitespace() {
                i += 1;
            }
            let raw: String = chars[start..i].iter().collect();
            let term = sanitize_token(&raw);
            if term.is_empty() {
                continue;
            }
            let expr = format!("\"{}\"*", term);
            if negate {
                negatives.push(expr);
            } else {
                positives.push(expr);
            }
        }
    }

    if positives.is_empty() {
        return Ok(None);
    }

    let mut out = positives.join(" AND ");
    for neg in negatives {
        out.push_str(" NOT ");
        out.push_str(&neg);
    }
    Ok(Some(out))
}

/// Validate that a `vec:`/`hyde:` body contains no FTS-style negation
/// (`-term`, `-"phrase"`), which the semantic channel cannot express.
pub fn validate_semantic_query(body: &str, line: usize) -> Result<()> {
    for token in body.split_whitespace() {
        if token.starts_with('-') {
            return Err(QmdError::InvalidQuery {
                line,
                message: format!(
                    "semantic queries cannot use FTS negation syntax (found {token:?})"
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_a_lex_compilation() {
        let out = compile_lex_query(
            r#""machine learning" optimization -sports -athlete"#,
            0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            out,
            r#""machine learning" AND "optimization"* NOT "sports"* NOT "athlete"*"#
        );
    }

    #[test]
    fn scenario_b_structured_parse() {
        let parsed = parse_structured("lex: keywords\nvec: question\nhyde: a passage").unwrap();
        match parsed {
            CompiledQuery::Structured(subs) => {
                assert_eq!(subs.len(), 3);
                assert_eq!(subs[0].kind, SubQueryKind::Lex);
                assert_eq!(subs[0].text, "keywords");
                assert_eq!(subs[0].line, 1);
                assert_eq!(subs[1].kind, SubQueryKind::Vec);
                assert_eq!(subs[1].text, "question");
                assert_eq!(subs[2].kind, SubQueryKind::Hyde);
                assert_eq!(subs[2].text, "a passage");
            }
            _ => panic!("expected structured result"),
        }

        let err = parse_structured("plain keywords\nvec: q").unwrap_err();
        match err {
            QmdError::InvalidQuery { message, .. } => {
                assert!(message.contains("missing a lex:/vec:/hyde:"));
            }
            _ => panic!("expected InvalidQuery"),
        }
    }

    #[test]
    fn single_unprefixed_line_delegates_to_expand() {
        let parsed = parse_structured("just a plain query").unwrap();
        assert_eq!(
            parsed,
            CompiledQuery::Expand("just a plain query".to_string())
        );
    }

    #[test]
    fn empty_input_delegates_to_expand() {
        assert_eq!(parse_structured("").unwrap(), CompiledQuery::Expand(String::new()));
        assert_eq!(
            parse_structured("   \n  \n").unwrap(),
            CompiledQuery::Expand(String::new())
        );
    }

    #[test]
    fn single_expand_line_delegates() {
        let parsed = parse_structured("expand: find me stuff").unwrap();
        assert_eq!(
            parsed,
            CompiledQuery::Expand("find me stuff".to_string())
        );
    }

    #[test]
    fn mixing_expand_with_typed_lines_is_invalid() {
        let err = parse_structured("expand: q\nlex: other").unwrap_err();
        assert!(matches!(err, QmdError::InvalidQuery { .. }));
    }

    #[test]
    fn empty_typed_body_is_invalid_with_line_number() {
        let err = parse_structured("lex: one\nvec: \nhyde: three").unwrap_err();
        match err {
            QmdError::InvalidQuery { line, .. } => assert_eq!(line, 2),
            _ => panic!("expected InvalidQuery"),
        }
    }

    #[test]
    fn round_trip_preserves_order_and_count() {
        let input = "lex: a\nvec: b\nhyde: c\nlex: d";
        let parsed = parse_structured(input).unwrap();
        match parsed {
            CompiledQuery::Structured(subs) => {
                assert_eq!(subs.len(), 4);
                let order: Vec<_> = subs.iter().map(|s| s.kind.as_str()).collect();
                assert_eq!(order, vec!["lex", "vec", "hyde", "lex"]);
            }
            _ => panic!("expected structured"),
        }
    }

    #[test]
    fn unmatched_quote_is_invalid() {
        let err = compile_lex_query(r#"foo "bar"#, 5).unwrap_err();
        match err {
            QmdError::InvalidQuery { line, .. } => assert_eq!(line, 5),
            _ => panic!("expected InvalidQuery"),
        }
    }

    #[test]
    fn all_negative_query_has_no_lexical_channel() {
        assert_eq!(compile_lex_query("-sports -athlete", 0).unwrap(), None);
    }

    #[test]
    fn semantic_validation_rejects_negation() {
        assert!(validate_semantic_query("cats -dogs", 0).is_err());
        assert!(validate_semantic_query("cats and dogs", 0).is_ok());
    }
}
