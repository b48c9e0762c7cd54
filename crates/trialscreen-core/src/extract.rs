//! Locating a JSON object inside free-form model text.
//!
//! Models wrap their answer in prose, markdown fences, or both. Extraction
//! runs an ordered list of strategies and takes the first candidate found:
//!
//! 1. The first non-empty fenced block (```` ``` ````) that is untagged or
//!    tagged `json`; the trimmed inner content is the candidate. Blocks with
//!    any other tag (```` ```text ````) are skipped.
//! 2. A brace-depth scan from the first `{` to the brace that returns the
//!    depth to zero.
//!
//! The brace scan counts every `{` and `}`, including ones inside JSON string
//! literals. An unbalanced brace inside a string therefore shifts the end of
//! the candidate; the parse step reports that as a parse failure.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Triple-backtick block, opening fence through the next closing fence.
    /// Matches don't overlap, so each block is paired with its own close.
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```(.*?)```").unwrap();
}

/// A single extraction strategy.
pub type ExtractionStrategy = fn(&str) -> Option<&str>;

/// Strategies in priority order, with a name for tracing.
pub const STRATEGIES: &[(&str, ExtractionStrategy)] = &[
    ("fenced_block", fenced_block),
    ("brace_scan", brace_scan),
];

/// Find the candidate JSON text in `text`.
///
/// Returns `None` for empty input or when no strategy matches.
pub fn extract_json_candidate(text: &str) -> Option<&str> {
    if text.trim().is_empty() {
        return None;
    }

    STRATEGIES.iter().find_map(|(name, strategy)| {
        let candidate = strategy(text)?;
        tracing::trace!(strategy = name, len = candidate.len(), "JSON candidate found");
        Some(candidate)
    })
}

/// Inner content of the first untagged or `json` fenced block, trimmed.
/// Empty blocks don't count.
pub fn fenced_block(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|block| json_block_body(block.as_str()))
}

/// Body of one fenced block if its tag allows JSON.
fn json_block_body(block: &str) -> Option<&str> {
    let body = match block.split_once('\n') {
        Some((tag, rest)) => {
            let tag = tag.trim();
            if !(tag.is_empty() || tag.eq_ignore_ascii_case("json")) {
                return None;
            }
            rest
        }
        // Single-line block: ```json {...}```
        None => match block.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("json") => &block[4..],
            _ => block,
        },
    };
    let body = body.trim();
    (!body.is_empty()).then_some(body)
}

/// Substring from the first `{` to the matching close by depth count.
pub fn brace_scan(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: usize = 0;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}
