//! Boolean flag extraction (auto-recharge, VIP) from free-form agent replies.
//!
//! Absence of evidence resolves to `false`. An unprotected reading can only
//! raise the risk level, never lower it.

use std::sync::OnceLock;

use regex::Regex;

use super::keyword_regex;

pub const SNIPPET_CHARS: usize = 40;
pub const LEAD_CHARS: usize = 16;
pub const WIDE_WINDOW_CHARS: usize = 80;

const POSITIVE_PATTERN: &str = r"(?i)(?:\b(?:enabled|active|activated|yes|true|configured|set up|in place|confirmed)\b|(?::\s*|\bis\s+|\bturned\s+|\bswitched\s+)on\b|[✓✔✅])";
const NEGATIVE_PATTERN: &str = r"(?i)(?:\b(?:no|not|none|false|disabled|inactive|deactivated|off|without|never|n/a)\b|n['’]t\b|[✗✘❌])";
const NEGATOR_PATTERN: &str = r"(?i)(?:\b(?:no|not|never|without)\b|n['’]t\b)";
const AFFIRMATIVE_LEAD_PATTERN: &str = r"(?i)\b(?:is|as|has|with)\s+(?:an?\s+)?$";
const NEGATED_LEAD_PATTERN: &str = r"(?i)(?:\b(?:not|never|no|without)|n['’]t)\s+(?:an?\s+)?$";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Evidence {
    Positive,
    Negative,
    Absent,
}

/// Reads a protective flag associated with `pattern`.
pub fn extract_bool(text: &str, pattern: &str) -> bool {
    let Some(keyword) = keyword_regex(pattern) else {
        return false;
    };

    match snippet_evidence(text, &keyword) {
        Evidence::Positive => true,
        Evidence::Negative => false,
        Evidence::Absent => wide_scan(text, &keyword),
    }
}

/// Evidence in the clause around the first keyword mention.
pub fn snippet_evidence(text: &str, keyword: &Regex) -> Evidence {
    let Some(found) = keyword.find(text) else {
        return Evidence::Absent;
    };

    let trailing = clause(take_chars(&text[found.end()..], SNIPPET_CHARS));
    if has_unnegated_positive(trailing) {
        return Evidence::Positive;
    }
    if negative_regex().is_some_and(|negative| negative.is_match(trailing)) {
        return Evidence::Negative;
    }

    let lead = leading_chars(&text[..found.start()], LEAD_CHARS);
    if affirmative_lead_regex().is_some_and(|affirmative| affirmative.is_match(lead)) {
        return Evidence::Positive;
    }
    if negated_lead_regex().is_some_and(|negated| negated.is_match(lead)) {
        return Evidence::Negative;
    }

    Evidence::Absent
}

/// Any keyword mention followed within the wide window by positive wording.
pub fn wide_scan(text: &str, keyword: &Regex) -> bool {
    keyword
        .find_iter(text)
        .any(|found| has_unnegated_positive(take_chars(&text[found.end()..], WIDE_WINDOW_CHARS)))
}

fn has_unnegated_positive(window: &str) -> bool {
    let (Some(positive), Some(negator)) = (positive_regex(), negator_regex()) else {
        return false;
    };

    positive.find_iter(window).any(|found| !negator.is_match(&window[..found.start()]))
}

/// Cuts the snippet at the end of the current clause.
fn clause(snippet: &str) -> &str {
    match snippet.find(['.', ';', ',', '\n']) {
        Some(end) => &snippet[..end],
        None => snippet,
    }
}

fn take_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Up to `count` characters immediately before the keyword, same line only.
fn leading_chars(text: &str, count: usize) -> &str {
    let line_start = text.rfind('\n').map(|index| index + 1).unwrap_or(0);
    let line = &text[line_start..];
    let skip = line.chars().count().saturating_sub(count);
    match line.char_indices().nth(skip) {
        Some((start, _)) => &line[start..],
        None => line,
    }
}

fn positive_regex() -> Option<&'static Regex> {
    static POSITIVE: OnceLock<Option<Regex>> = OnceLock::new();
    POSITIVE.get_or_init(|| Regex::new(POSITIVE_PATTERN).ok()).as_ref()
}

fn negative_regex() -> Option<&'static Regex> {
    static NEGATIVE: OnceLock<Option<Regex>> = OnceLock::new();
    NEGATIVE.get_or_init(|| Regex::new(NEGATIVE_PATTERN).ok()).as_ref()
}

fn negator_regex() -> Option<&'static Regex> {
    static NEGATOR: OnceLock<Option<Regex>> = OnceLock::new();
    NEGATOR.get_or_init(|| Regex::new(NEGATOR_PATTERN).ok()).as_ref()
}

fn affirmative_lead_regex() -> Option<&'static Regex> {
    static AFFIRMATIVE: OnceLock<Option<Regex>> = OnceLock::new();
    AFFIRMATIVE.get_or_init(|| Regex::new(AFFIRMATIVE_LEAD_PATTERN).ok()).as_ref()
}

fn negated_lead_regex() -> Option<&'static Regex> {
    static NEGATED: OnceLock<Option<Regex>> = OnceLock::new();
    NEGATED.get_or_init(|| Regex::new(NEGATED_LEAD_PATTERN).ok()).as_ref()
}
