//! Text-only value extraction with ordered phrase patterns.

use async_trait::async_trait;
use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::LazyLock;
use tracing::debug;

use super::{ExtractionError, ValueExtractor};
use crate::domain::models::field::{is_per_group_field, is_total_field};
use crate::domain::models::{ExtractedFields, ExtractionMethod, FieldClass, Task};

/// Share of the document, from the end, searched before the whole text.
const TAIL_FRACTION: f64 = 0.4;

/// Counts outside this range are never accepted.
const PLAUSIBLE_COUNT: RangeInclusive<f64> = 5.0..=100_000.0;

/// A candidate inside `(expected * LOW, expected * HIGH)` for a per-group
/// field is probably a total, and the inverse for a total field.
const UNIT_RATIO_LOW: f64 = 1.8;
const UNIT_RATIO_HIGH: f64 = 6.0;

/// Fallback band around the expected value.
const FALLBACK_BAND: (f64, f64) = (0.3, 3.0);

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("valid extraction pattern"))
        .collect()
}

static MARKUP_COMMAND_WITH_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+\{[^}]*\}").expect("valid markup regex"));
static MARKUP_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+").expect("valid markup regex"));
static MARKUP_SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[{}*`#$]").expect("valid markup regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static ANY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid number regex"));

/// Count phrases, most specific first. Group 1 is the number.
static COUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?:you(?:'ll)? need|we need|required?|recruit|enroll|plan for)\s+(?:at least\s+)?(?:about\s+)?(?:approximately\s+)?(\d[\d,]*(?:\.\d+)?)\s*(?:per group|per arm|per cluster|per treatment|participants?|patients?|subjects?|samples?|events?|each group|in each|total)",
        r"sample size[^.]{0,30}?(\d[\d,]*(?:\.\d+)?)\s*(?:per group|per arm|per cluster|per treatment|participants?|patients?|total|events?)",
        r"\bn\s*(?:per (?:group|arm|cluster))?\s*[=≈≥]\s*(\d[\d,]*(?:\.\d+)?)",
        r"(?:round(?:ing)?\s*up|ceiling)[^.]{0,20}?(\d[\d,]*(?:\.\d+)?)",
        r"(\d[\d,]*(?:\.\d+)?)\s*(?:per group|per arm|per cluster|per treatment|in each group|in each arm)",
        r"(\d[\d,]*(?:\.\d+)?)\s*(?:participants?|patients?|subjects?)\s*(?:per|in each|total)",
        r"total(?:\s+sample)?\s+(?:size|of)\s*(?:[=:≈]|of|is|was|would be|will be)?\s*(?:approximately\s+|about\s+)?(\d[\d,]*(?:\.\d+)?)",
        r"(?:minimum|at least)\s*(?:of\s+)?(\d[\d,]*(?:\.\d+)?)",
    ])
});

static EVENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d[\d,]*)\s*(?:total\s+)?events?\s*(?:are\s+)?(?:needed|required|necessary)",
        r"(?:need|require)s?\s*(?:a total of\s+)?(?:about\s+|approximately\s+)?(\d[\d,]*)\s*(?:total\s+)?events?",
        r"events?\s*(?:needed|required|=|:)\s*(\d[\d,]*)",
    ])
});

/// Power phrases. Group 1 is the number, group 2 an optional percent sign.
static POWER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"power\s*(?:is|=|:|-|≈|of|would be|comes? (?:out|to))\s*(?:approximately\s*)?(?:about\s*)?(?:roughly\s*)?(\d+(?:\.\d+)?)\s*(%)?",
        r"(?:achieve|obtain|attain|reach|yield|get|have)s?\s+(?:a\s+)?power\s+(?:of\s+)?(\d+(?:\.\d+)?)\s*(%)?",
        r"(\d+(?:\.\d+)?)\s*(%)?\s*(?:statistical\s+)?power",
    ])
});

static EFFECT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"detectable[^.]*?(?:\bd|effect(?:\s+size)?)\s*(?:=|:|-|≈|is|of)\s*(\d*\.\d+|\d+)",
        r"\bd\s*(?:=|:|≈)\s*(\d*\.\d+|\d+)",
    ])
});

/// Extracts values from raw text using ordered phrase patterns.
///
/// Count fields fall back to the number closest to the expected value when
/// no phrase matches. That fallback sees the ground truth, so results that
/// used it are tagged [`ExtractionMethod::NearestFallback`].
#[derive(Debug, Clone, Copy)]
pub struct PatternExtractor {
    allow_nearest_fallback: bool,
}

impl PatternExtractor {
    pub const fn new(allow_nearest_fallback: bool) -> Self {
        Self {
            allow_nearest_fallback,
        }
    }

    /// Extract every gating field of `task` from `raw_text`.
    pub fn extract_fields(&self, task: &Task, raw_text: &str) -> ExtractedFields {
        let clean = strip_markup(raw_text);
        let mut fields = ExtractedFields::new(task.id.clone(), ExtractionMethod::Pattern);
        let mut used_fallback = false;

        for (name, expected) in task.gating_fields() {
            let class = FieldClass::of(name);
            let mut value = match class {
                FieldClass::SampleSize => find_count(&clean, &COUNT_PATTERNS, name, expected),
                FieldClass::Events => find_count(&clean, &EVENT_PATTERNS, name, expected)
                    .or_else(|| find_count(&clean, &COUNT_PATTERNS, name, expected)),
                FieldClass::Power => find_power(&clean),
                FieldClass::Effect => find_effect(&clean),
                FieldClass::Other if expected >= *PLAUSIBLE_COUNT.start() => {
                    find_count(&clean, &COUNT_PATTERNS, name, expected)
                }
                FieldClass::Other | FieldClass::Informational => None,
            };

            let fallback_applies =
                class.is_count() || (class == FieldClass::Other && expected >= 5.0);
            if value.is_none() && self.allow_nearest_fallback && fallback_applies {
                value = nearest_to_expected(&clean, expected);
                if value.is_some() {
                    debug!(task_id = %task.id, field = name, "nearest-number fallback used");
                    used_fallback = true;
                }
            }

            fields.values.insert(name.to_string(), value);
        }

        if used_fallback {
            fields.method = ExtractionMethod::NearestFallback;
        }
        fields
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ValueExtractor for PatternExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Pattern
    }

    async fn extract(&self, task: &Task, raw_text: &str) -> Result<ExtractedFields, ExtractionError> {
        Ok(self.extract_fields(task, raw_text))
    }
}

/// Remove math markup and emphasis characters, then collapse whitespace.
pub fn strip_markup(text: &str) -> String {
    let text = MARKUP_COMMAND_WITH_ARG.replace_all(text, " ");
    let text = MARKUP_COMMAND.replace_all(&text, " ");
    let text = MARKUP_SYMBOLS.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// The last `fraction` of `text`, starting at a word boundary.
fn tail(text: &str, fraction: f64) -> &str {
    let is_word = |c: char| c.is_alphanumeric() || c == '.' || c == ',';
    let chars = text.chars().count();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let keep = (chars as f64 * fraction).floor() as usize;
    let skip = chars - keep.min(chars);
    let Some((idx, _)) = text.char_indices().nth(skip) else {
        return "";
    };
    let rest = &text[idx..];
    if text[..idx].chars().next_back().is_some_and(is_word) {
        let cut = rest.find(|c: char| !is_word(c)).unwrap_or(rest.len());
        &rest[cut..]
    } else {
        rest
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim_end_matches(',').replace(',', "").parse().ok()
}

/// Whole, plausible count from a captured number.
fn parse_count(raw: &str) -> Option<f64> {
    parse_number(raw).filter(|n| n.fract() == 0.0 && PLAUSIBLE_COUNT.contains(n))
}

/// Whether `candidate` looks like the other unit (total vs per-group).
fn looks_like_wrong_unit(field: &str, candidate: f64, expected: f64) -> bool {
    if expected <= 0.0 {
        return false;
    }
    if is_per_group_field(field) {
        candidate > expected * UNIT_RATIO_LOW && candidate < expected * UNIT_RATIO_HIGH
    } else if is_total_field(field) {
        candidate < expected / UNIT_RATIO_LOW && candidate > expected / UNIT_RATIO_HIGH
    } else {
        false
    }
}

fn find_count(clean: &str, patterns: &[Regex], field: &str, expected: f64) -> Option<f64> {
    for region in [tail(clean, TAIL_FRACTION), clean] {
        for pattern in patterns {
            for caps in pattern.captures_iter(region) {
                let Some(n) = caps.get(1).and_then(|m| parse_count(m.as_str())) else {
                    continue;
                };
                if looks_like_wrong_unit(field, n, expected) {
                    continue;
                }
                return Some(n);
            }
        }
    }
    None
}

fn find_power(clean: &str) -> Option<f64> {
    for region in [tail(clean, TAIL_FRACTION), clean] {
        for pattern in POWER_PATTERNS.iter() {
            for caps in pattern.captures_iter(region) {
                let Some(raw) = caps.get(1).and_then(|m| parse_number(m.as_str())) else {
                    continue;
                };
                let value = if caps.get(2).is_some() || raw > 1.0 {
                    raw / 100.0
                } else {
                    raw
                };
                if value > 0.0 && value <= 1.0 {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn find_effect(clean: &str) -> Option<f64> {
    for region in [tail(clean, TAIL_FRACTION), clean] {
        for pattern in EFFECT_PATTERNS.iter() {
            for caps in pattern.captures_iter(region) {
                if let Some(value) = caps.get(1).and_then(|m| parse_number(m.as_str())) {
                    if value > 0.0 && value < 5.0 {
                        return Some(value);
                    }
                }
            }
        }
    }
    None
}

/// The whole number closest to `expected` inside the fallback band.
fn nearest_to_expected(clean: &str, expected: f64) -> Option<f64> {
    if expected <= 0.0 {
        return None;
    }
    let low = (expected * FALLBACK_BAND.0).max(*PLAUSIBLE_COUNT.start());
    let high = expected * FALLBACK_BAND.1;
    ANY_NUMBER
        .find_iter(clean)
        .filter_map(|m| parse_number(m.as_str()))
        .filter(|n| n.fract() == 0.0 && *n >= low && *n <= high)
        .min_by(|a, b| (a - expected).abs().total_cmp(&(b - expected).abs()))
}
