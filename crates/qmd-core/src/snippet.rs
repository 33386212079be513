//! Snippet extraction (§4.6.5).
//!
//! Given a document body, query, and optional intent text, picks the
//! highest-scoring "section" (split on heading lines and blank-line
//! boundaries) and returns up to `max_len` characters starting at that
//! section's first matched query term.

use crate::intent::{extract_intent_terms, extract_query_terms, score_snippet};

/// Default snippet length, in characters.
pub const DEFAULT_SNIPPET_MAX_LEN: usize = 500;

/// An extracted snippet: the text and the 1-based source line it anchors
/// to.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub line: usize,
}

struct Section {
    start_char: usize,
    start_line: usize,
    text: String,
}

/// Split `body` into candidate sections on heading lines (`#...`) and
/// blank-line boundaries.
fn split_sections(body: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut current_start_char = 0usize;
    let mut current_start_line = 1usize;
    let mut char_pos = 0usize;
    let mut line_no = 1usize;
    let mut prev_blank = true;

    for line in body.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let is_heading = content.trim_start().starts_with('#');
        let is_blank = content.trim().is_empty();
        let starts_new_section = (is_heading || (prev_blank && !is_blank)) && !current.is_empty();

        if starts_new_section {
            sections.push(Section {
                start_char: current_start_char,
                start_line: current_start_line,
                text: std::mem::take(&mut current),
            });
            current_start_char = char_pos;
            current_start_line = line_no;
        } else if current.is_empty() {
            current_start_char = char_pos;
            current_start_line = line_no;
        }

        current.push_str(line);
        prev_blank = is_blank;
        char_pos += line.chars().count();
        line_no += 1;
    }
    if !current.is_empty() {
        sections.push(Section {
            start_char: current_start_char,
            start_line: current_start_line,
            text: current,
        });
    }
    sections
}

fn first_term_char_offset(haystack_lower: &str, terms: &[String]) -> Option<usize> {
    terms
        .iter()
        .filter_map(|t| {
            haystack_lower
                .find(t.as_str())
                .map(|byte_idx| haystack_lower[..byte_idx].chars().count())
        })
        .min()
}

fn take_chars(body_chars: &[char], start: usize, max_len: usize) -> String {
    let start = start.min(body_chars.len());
    let end = (start + max_len).min(body_chars.len());
    body_chars[start..end].iter().collect()
}

/// Extract the best snippet for `query` (and optional `intent`) from
/// `body`, up to `max_len` characters.
///
/// An empty query, or a query/intent pair matching no section at all,
/// falls back to the first `max_len` characters of the body (§4.6.5).
pub fn extract_snippet(body: &str, query: &str, intent: Option<&str>, max_len: usize) -> Snippet {
    let body_chars: Vec<char> = body.chars().collect();

    if query.trim().is_empty() || body_chars.is_empty() {
        return Snippet {
            text: take_chars(&body_chars, 0, max_len),
            line: 1,
        };
    }

    let query_terms = extract_query_terms(query);
    let intent_terms = intent.map(extract_intent_terms).unwrap_or_default();
    let sections = split_sections(body);
    if sections.is_empty() {
        return Snippet {
            text: take_chars(&body_chars, 0, max_len),
            line: 1,
        };
    }

    let mut best_idx = 0usize;
    let mut best_score = f64::MIN;
    for (i, section) in sections.iter().enumerate() {
        let score = score_snippet(&section.text, &query_terms, &intent_terms);
        if score > best_score {
            best_score = score;
            best_idx = i;
        }
    }

    if best_score <= 0.0 {
        return Snippet {
            text: take_chars(&body_chars, 0, max_len),
            line: 1,
        };
    }

    let section = &sections[best_idx];
    let section_lower = section.text.to_lowercase();
    let anchor_in_section = first_term_char_offset(&section_lower, &query_terms).unwrap_or(0);
    let newlines_before_anchor = section
        .text
        .chars()
        .take(anchor_in_section)
        .filter(|&c| c == '\n')
        .count();

    let absolute_start = section.start_char + anchor_in_section;
    let line = section.start_line + newlines_before_anchor;

    Snippet {
        text: take_chars(&body_chars, absolute_start, max_len),
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_returns_prefix() {
        let snippet = extract_snippet("Hello world. More text.", "", None, 5);
        assert_eq!(snippet.text, "Hello");
        assert_eq!(snippet.line, 1);
    }

    #[test]
    fn no_match_returns_prefix() {
        let snippet = extract_snippet("Alpha beta gamma.", "zzzznomatch", None, 5);
        assert_eq!(snippet.text, "Alpha");
    }

    #[test]
    fn anchors_to_first_matched_term_in_best_section() {
        let body = "# Intro\nNothing relevant here.\n\n# Details\nHere we discuss rust ownership deeply.\n";
        let snippet = extract_snippet(body, "ownership", None, 50);
        assert!(snippet.text.to_lowercase().contains("ownership"));
        assert!(snippet.line > 1);
    }

    #[test]
    fn scenario_f_intent_biases_snippet_selection() {
        let body = "\
# Web Performance Section
This section talks about page load times and Core Web Vitals for the web team.

# Team Performance Section
This section talks about team velocity and sprint performance metrics.

# Health Performance Section
This section talks about patient health performance indicators and latency of response.
";
        let snippet = extract_snippet(
            body,
            "performance",
            Some("page load times and latency"),
            200,
        );
        let lower = snippet.text.to_lowercase();
        assert!(
            lower.contains("latency") || lower.contains("page load") || lower.contains("core web vitals"),
            "unexpected snippet: {}",
            snippet.text
        );
    }

    #[test]
    fn respects_max_len() {
        let body = "word ".repeat(500);
        let snippet = extract_snippet(&body, "word", None, 100);
        assert!(snippet.text.chars().count() <= 100);
    }
}
