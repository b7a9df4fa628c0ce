//! Recovery of a JSON object from free-form model output.
//!
//! Three tiers, tried in order:
//! 1. the trimmed reply parsed as-is;
//! 2. every top-level balanced `{...}` block, found by a scan that tracks
//!    brace depth and string/escape state, parsed in turn;
//! 3. a greedy first-`{`-to-last-`}` match.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid greedy object regex"));

/// Which recovery tier produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    Direct,
    BalancedScan,
    Greedy,
}

/// Recover the first JSON object from `text`.
pub fn recover_object(text: &str) -> Option<Map<String, Value>> {
    recover_object_with_tier(text).map(|(object, _)| object)
}

/// Like [`recover_object`], also reporting the tier that succeeded.
pub fn recover_object_with_tier(text: &str) -> Option<(Map<String, Value>, RecoveryTier)> {
    if let Some(object) = parse_object(text.trim()) {
        return Some((object, RecoveryTier::Direct));
    }

    let blocks = balanced_blocks(text);
    for (index, block) in blocks.iter().enumerate() {
        if let Some(object) = parse_object(block) {
            debug!(block = index, of = blocks.len(), "recovered object from balanced block");
            return Some((object, RecoveryTier::BalancedScan));
        }
    }

    let object = GREEDY_OBJECT
        .find(text)
        .and_then(|m| parse_object(m.as_str()))?;
    debug!("recovered object from greedy match");
    Some((object, RecoveryTier::Greedy))
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Every top-level balanced `{...}` block, in order of appearance.
///
/// Braces inside JSON strings do not count. Quotes outside any block are
/// prose and are ignored. When a block is still open at the end of the text,
/// the scan restarts just after its opening brace so that a stray `{` in
/// prose cannot hide a well-formed object that follows it.
pub fn balanced_blocks(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut from = 0;

    while from < bytes.len() {
        let mut depth = 0_usize;
        let mut start: Option<usize> = None;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &byte) in bytes[from..].iter().enumerate() {
            let i = from + offset;
            if depth == 0 {
                if byte == b'{' {
                    depth = 1;
                    start = Some(i);
                }
                continue;
            }

            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            blocks.push(&text[s..=i]);
                        }
                    }
                }
                _ => {}
            }
        }

        match start {
            Some(unclosed) => from = unclosed + 1,
            None => break,
        }
    }

    blocks
}
