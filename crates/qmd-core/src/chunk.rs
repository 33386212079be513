//! Deterministic, body-only chunker.
//!
//! Splits a document body into overlapping [`ChunkSpan`]s targeting
//! [`CHUNK_TARGET_CHARS`] characters with [`CHUNK_OVERLAP_CHARS`] of
//! overlap between consecutive chunks. Splits prefer paragraph boundaries,
//! falling back to sentence then word boundaries, and never land inside a
//! fenced code block (``` or ~~~).
//!
//! Chunk indices (`seq`) are 0-based and dense; `pos` is the chunk's
//! starting character offset in the body, used to anchor chunk-selection
//! and snippet results back onto the source text.

/// Target chunk size, in characters.
pub const CHUNK_TARGET_CHARS: usize = 1024;

/// Overlap between consecutive chunks, in characters.
pub const CHUNK_OVERLAP_CHARS: usize = 128;

/// Default cap on per-file bytes considered for embedding (5 MiB).
pub const DEFAULT_MAX_EMBED_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// One chunk of a document body.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    pub seq: i64,
    pub pos: i64,
    pub text: String,
}

#[derive(Clone, Copy)]
struct CodeRange {
    start: usize,
    end: usize,
}

fn in_code_range(b: usize, ranges: &[CodeRange]) -> bool {
    ranges.iter().any(|r| b > r.start && b < r.end)
}

/// Find fenced code block ranges (in char-index units) within `chars`.
///
/// A fence is a line whose trimmed content starts with three or more
/// identical fence characters (`` ` `` or `~`). The range spans from the
/// start of the opening fence line to the end of the closing fence line,
/// or to the end of the document if unterminated.
fn code_block_ranges(chars: &[char]) -> Vec<CodeRange> {
    let mut ranges = Vec::new();
    let n = chars.len();
    let mut i = 0;
    let mut line_start = 0;
    let mut open: Option<usize> = None;

    let is_fence_line = |line: &[char]| -> bool {
        let trimmed_start = line.iter().position(|c| !c.is_whitespace());
        match trimmed_start {
            None => false,
            Some(s) => {
                let c = line[s];
                (c == '`' || c == '~') && line[s..].iter().take_while(|&&x| x == c).count() >= 3
            }
        }
    };

    while i <= n {
        if i == n || chars[i] == '\n' {
            let line = &chars[line_start..i];
            if is_fence_line(line) {
                match open {
                    None => open = Some(line_start),
                    Some(start) => {
                        ranges.push(CodeRange { start, end: i });
                        open = None;
                    }
                }
            }
            line_start = i + 1;
        }
        i += 1;
    }
    if let Some(start) = open {
        ranges.push(CodeRange { start, end: n });
    }
    ranges
}

struct Boundaries {
    paragraph: Vec<usize>,
    sentence: Vec<usize>,
    word: Vec<usize>,
}

fn collect_boundaries(chars: &[char]) -> Boundaries {
    let n = chars.len();
    let mut paragraph = Vec::new();
    let mut sentence = Vec::new();
    let mut word = Vec::new();

    let mut i = 0;
    while i < n {
        if chars[i].is_whitespace() {
            let ws_start = i;
            let mut newlines = 0;
            while i < n && chars[i].is_whitespace() {
                if chars[i] == '\n' {
                    newlines += 1;
                }
                i += 1;
            }
            // `i` now points at the first non-whitespace char after the run
            // (or `n`). That's a word boundary unconditionally.
            word.push(i);
            if newlines >= 2 {
                paragraph.push(i);
            }
            // A sentence boundary is a whitespace run immediately preceded
            // by sentence-ending punctuation.
            if ws_start > 0 && matches!(chars[ws_start - 1], '.' | '!' | '?') {
                sentence.push(i);
            }
        } else {
            i += 1;
        }
    }

    Boundaries {
        paragraph,
        sentence,
        word,
    }
}

/// Pick the rightmost boundary in `[floor, ceil]` that doesn't land inside
/// a fenced code block.
fn pick_break(boundaries: &[usize], floor: usize, ceil: usize, code: &[CodeRange]) -> Option<usize> {
    boundaries
        .iter()
        .rev()
        .find(|&&b| b >= floor && b <= ceil && !in_code_range(b, code))
        .copied()
}

/// Nudge a hard-cut point out of a fenced code block, to its end.
fn escape_code_block(b: usize, code: &[CodeRange], n: usize) -> usize {
    for r in code {
        if b > r.start && b < r.end {
            return r.end.min(n);
        }
    }
    b
}

/// Split `body` into overlapping chunks per the policy above.
///
/// An empty body produces zero chunks: there is no content to embed, so
/// coverage is trivially complete.
pub fn chunk_body(body: &str) -> Vec<ChunkSpan> {
    if body.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = body.chars().collect();
    let n = chars.len();
    let code = code_block_ranges(&chars);
    let boundaries = collect_boundaries(&chars);

    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut seq = 0i64;

    while start < n {
        let ideal_end = (start + CHUNK_TARGET_CHARS).min(n);
        let break_point = if ideal_end == n {
            n
        } else {
            let floor = start + CHUNK_TARGET_CHARS / 2;
            let bp = pick_break(&boundaries.paragraph, floor, ideal_end, &code)
                .or_else(|| pick_break(&boundaries.sentence, floor, ideal_end, &code))
                .or_else(|| pick_break(&boundaries.word, floor, ideal_end, &code))
                .unwrap_or(ideal_end);
            escape_code_block(bp, &code, n).max(start + 1)
        };

        let text: String = chars[start..break_point].iter().collect();
        let trimmed = text.trim_end_matches(['\n', ' ', '\t']);
        if !trimmed.is_empty() {
            spans.push(ChunkSpan {
                seq,
                pos: start as i64,
                text: trimmed.to_string(),
            });
            seq += 1;
        }

        if break_point >= n {
            break;
        }
        let next_start = break_point.saturating_sub(CHUNK_OVERLAP_CHARS);
        start = if next_start > start { next_start } else { break_point };
    }

    spans
}

/// Parse `QMD_MAX_EMBED_FILE_BYTES`, flooring fractional values and
/// falling back to [`DEFAULT_MAX_EMBED_FILE_BYTES`] for anything that
/// isn't a finite positive number.
pub fn max_embed_file_bytes_from_env() -> u64 {
    max_embed_file_bytes_from(std::env::var("QMD_MAX_EMBED_FILE_BYTES").ok())
}

fn max_embed_file_bytes_from(raw: Option<String>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_MAX_EMBED_FILE_BYTES;
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.floor() as u64,
        _ => DEFAULT_MAX_EMBED_FILE_BYTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_has_no_chunks() {
        assert!(chunk_body("").is_empty());
    }

    #[test]
    fn short_body_is_one_chunk() {
        let chunks = chunk_body("Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].seq, 0);
        assert_eq!(chunks[0].pos, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn seqs_are_dense_and_contiguous() {
        let body = (0..80)
            .map(|i| format!("Paragraph number {i} with some extra words to pad it out nicely."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_body(&body);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.seq, i as i64);
        }
    }

    #[test]
    fn is_deterministic() {
        let body = "Alpha beta.\n\nGamma delta epsilon zeta.\n\n".repeat(50);
        let a = chunk_body(&body);
        let b = chunk_body(&body);
        assert_eq!(a, b);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let body = "word ".repeat(2000);
        let chunks = chunk_body(&body);
        assert!(chunks.len() >= 2);
        for w in chunks.windows(2) {
            let prev_end = w[0].pos as usize + w[0].text.chars().count();
            // the next chunk should start at or before the previous chunk's
            // end, i.e. some overlap or contiguous continuation.
            assert!((w[1].pos as usize) <= prev_end);
        }
    }

    #[test]
    fn does_not_split_inside_fenced_code_block() {
        let code = "x = 1\n".repeat(400);
        let body = format!("intro text\n\n```\n{code}```\n\nmore text after");
        let chunks = chunk_body(&body);
        for c in &chunks {
            // no chunk boundary should leave an odd number of fences split
            // mid-block: verify by counting fence lines inside each chunk
            // text never shows an unterminated opening fence followed by
            // content from a different chunk's closing fence.
            let fences = c.text.matches("```").count();
            assert_ne!(fences, 1, "chunk split inside a fenced code block: {:?}", c.text);
        }
    }

    #[test]
    fn multibyte_utf8_is_handled() {
        let body = "héllo wörld ".repeat(200) + "日本語のテキストです。".repeat(50).as_str();
        let chunks = chunk_body(&body);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().count() > 0);
        }
    }

    #[test]
    fn max_embed_file_bytes_defaults_without_env() {
        assert_eq!(max_embed_file_bytes_from(None), DEFAULT_MAX_EMBED_FILE_BYTES);
    }

    #[test]
    fn max_embed_file_bytes_floors_fractional() {
        assert_eq!(max_embed_file_bytes_from(Some("1024.9".into())), 1024);
    }

    #[test]
    fn max_embed_file_bytes_rejects_non_positive_and_non_finite() {
        for bad in ["0", "-5", "NaN", "Infinity", "not-a-number", ""] {
            assert_eq!(
                max_embed_file_bytes_from(Some(bad.into())),
                DEFAULT_MAX_EMBED_FILE_BYTES,
                "input {bad:?} should fall back to default"
            );
        }
    }
}
