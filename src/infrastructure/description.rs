//! Description normalizer
//!
//! Turns the markup-bearing `description` field of a catalog item into
//! plain, single-spaced NFKC text capped at a character budget.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Upper bound on cleanup passes for nested entities such as `&amp;lt;b&amp;gt;`
const MAX_PASSES: usize = 8;

/// Normalize a raw description.
///
/// Markup is stripped (text nodes joined by a space), the text is NFKC
/// normalized, whitespace runs collapse to one space, and the result is cut
/// to `max_chars` characters. Absent or empty input gives an empty string.
///
/// Decoded entities and fullwidth brackets can surface new markup, so the
/// cleanup repeats until the text no longer changes.
pub fn normalize_description(raw: Option<&str>, max_chars: usize) -> String {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return String::new();
    };

    let mut text = raw.to_string();
    for _ in 0..MAX_PASSES {
        let next = truncate_chars(&clean_pass(&text), max_chars);
        if next == text {
            break;
        }
        text = next;
    }
    text
}

fn clean_pass(text: &str) -> String {
    let canonical: String = text.nfkc().collect();
    let stripped: String = strip_markup(&canonical).nfkc().collect();
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

fn strip_markup(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    fragment.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Cut to `max_chars` characters, never splitting a code point
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
