//! Numeric field extraction from free-form agent replies.
//!
//! Each strategy is a plain function so it can be exercised on its own. The
//! pipeline in [`extract_number_traced`] tries them in [`NumberStrategy::ORDER`]
//! and stops at the first value.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use rust_decimal::Decimal;

use super::keyword_regex;

/// Maximum distance (in characters) between a keyword and the amount that
/// follows it once the reply has been flattened to a single line.
pub const FLATTENED_WINDOW_CHARS: usize = 30;

const AMOUNT_PATTERN: &str =
    r"(?P<lead>[-\x{2212}])?(?P<symbol>[$€£])?(?P<inner>[-\x{2212}])?(?P<digits>\d{1,3}(?:,\d{3})+|\d+)(?P<frac>\.\d+)?";

const NEGATIVE_CURRENCY_PATTERN: &str =
    r"(?:[-\x{2212}]\s?[$€£]|[$€£]\s?[-\x{2212}])\s?(?P<digits>\d{1,3}(?:,\d{3})+|\d+)(?P<frac>\.\d+)?";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberStrategy {
    /// First numeric token on the first line that mentions the keyword.
    KeywordLine,
    /// Keyword followed closely by an amount anywhere in the flattened text.
    FlattenedWindow,
    /// First negative currency amount in the reply. Balance keywords only.
    NegativeCurrency,
}

impl NumberStrategy {
    pub const ORDER: [NumberStrategy; 3] =
        [Self::KeywordLine, Self::FlattenedWindow, Self::NegativeCurrency];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeywordLine => "keyword_line",
            Self::FlattenedWindow => "flattened_window",
            Self::NegativeCurrency => "negative_currency",
        }
    }

    fn applies_to(self, pattern: &str) -> bool {
        match self {
            Self::KeywordLine | Self::FlattenedWindow => true,
            Self::NegativeCurrency => pattern.to_ascii_lowercase().contains("balance"),
        }
    }

    fn apply(self, text: &str, keyword: &Regex) -> Option<Decimal> {
        match self {
            Self::KeywordLine => keyword_line(text, keyword),
            Self::FlattenedWindow => flattened_window(text, keyword),
            Self::NegativeCurrency => negative_currency(text),
        }
    }
}

/// Locates the amount associated with `pattern` in `text`.
///
/// `None` means every strategy failed. Callers treat that as a missing
/// signal, never as zero.
pub fn extract_number(text: &str, pattern: &str) -> Option<Decimal> {
    extract_number_traced(text, pattern).map(|(value, _)| value)
}

/// Same as [`extract_number`] but also reports which strategy produced the value.
pub fn extract_number_traced(text: &str, pattern: &str) -> Option<(Decimal, NumberStrategy)> {
    if text.trim().is_empty() {
        return None;
    }
    let keyword = keyword_regex(pattern)?;

    NumberStrategy::ORDER
        .into_iter()
        .filter(|strategy| strategy.applies_to(pattern))
        .find_map(|strategy| strategy.apply(text, &keyword).map(|value| (value, strategy)))
}

pub fn keyword_line(text: &str, keyword: &Regex) -> Option<Decimal> {
    let line = text.lines().find(|line| keyword.is_match(line))?;
    let found = keyword.find(line)?;

    first_amount(&line[found.end()..])
        .or_else(|| first_amount(line))
        .map(|(value, _)| value)
}

pub fn flattened_window(text: &str, keyword: &Regex) -> Option<Decimal> {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");

    keyword.find_iter(&flattened).find_map(|found| {
        let rest = &flattened[found.end()..];
        let (value, offset) = first_amount(rest)?;
        let distance = rest[..offset].chars().count();
        (distance <= FLATTENED_WINDOW_CHARS).then_some(value)
    })
}

pub fn negative_currency(text: &str) -> Option<Decimal> {
    let captures = negative_currency_regex()?.captures(text)?;
    parse_amount(&captures).map(|value| -value.abs())
}

/// First standalone amount in `segment` with its byte offset.
fn first_amount(segment: &str) -> Option<(Decimal, usize)> {
    amount_regex()?.captures_iter(segment).find_map(|captures| {
        let whole = captures.get(0)?;
        if !is_standalone(segment, whole.start(), whole.end()) {
            return None;
        }

        let magnitude = parse_amount(&captures)?;
        let negative = captures.name("lead").is_some() || captures.name("inner").is_some();
        let value = if negative { -magnitude } else { magnitude };
        Some((value, whole.start()))
    })
}

fn parse_amount(captures: &Captures<'_>) -> Option<Decimal> {
    let digits = captures.name("digits")?.as_str().replace(',', "");
    let fraction = captures.name("frac").map(|frac| frac.as_str()).unwrap_or("");
    Decimal::from_str(&format!("{digits}{fraction}")).ok()
}

/// Rejects tokens glued to words (`Q3`, `v2`), percentages, and date
/// fragments such as `2026-10-19` or `10/19`.
fn is_standalone(segment: &str, start: usize, end: usize) -> bool {
    let before = segment[..start].chars().next_back();
    if before.is_some_and(|ch| ch.is_alphanumeric() || ch == '.' || ch == ',' || ch == '_') {
        return false;
    }

    let mut after = segment[end..].chars();
    match (after.next(), after.next()) {
        (Some('%'), _) => false,
        (Some('-' | '/'), Some(next)) if next.is_ascii_digit() => false,
        (Some(ch), _) if ch.is_alphabetic() => false,
        _ => true,
    }
}

fn amount_regex() -> Option<&'static Regex> {
    static AMOUNT: OnceLock<Option<Regex>> = OnceLock::new();
    AMOUNT.get_or_init(|| Regex::new(AMOUNT_PATTERN).ok()).as_ref()
}

fn negative_currency_regex() -> Option<&'static Regex> {
    static NEGATIVE: OnceLock<Option<Regex>> = OnceLock::new();
    NEGATIVE.get_or_init(|| Regex::new(NEGATIVE_CURRENCY_PATTERN).ok()).as_ref()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{extract_number, extract_number_traced, NumberStrategy};

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal literal")
    }

    #[test]
    fn plain_balance_line() {
        assert_eq!(extract_number("Balance: -$46,891.29", "balance"), Some(dec("-46891.29")));
    }

    #[test]
    fn markdown_balance_line_with_currency_suffix() {
        assert_eq!(
            extract_number("**Balance:** -$46,891.29 USD", "balance"),
            Some(dec("-46891.29"))
        );
    }

    #[test]
    fn extraction_table() {
        let cases: &[(&str, &str, Option<&str>)] = &[
            ("Current balance: $1,250.00", "balance", Some("1250.00")),
            ("Balance: $-512.40", "balance", Some("-512.40")),
            ("Balance: −$75", "balance", Some("-75")),
            ("Credit limit: 10,000 USD", r"credit.?limit", Some("10000")),
            ("Next month MRC: €2,400.50", r"\bmrc\b", Some("2400.50")),
            ("Daily run rate: $123.45/day", r"run.?rate", Some("123.45")),
            ("| MRC | 300 |", r"\bmrc\b", Some("300")),
            ("Q3 balance was -$400 at close", "balance", Some("-400")),
            ("Balance as of 2026-10-19: -$9,500.00", "balance", Some("-9500.00")),
            ("Usage is up 12% to $3,000 this month", "usage", Some("3000")),
            ("$820.10 is the current balance", "balance", Some("820.10")),
            ("No figures were available.", r"\bmrc\b", None),
            ("", "balance", None),
        ];

        for (text, pattern, expected) in cases {
            assert_eq!(
                extract_number(text, pattern),
                expected.map(dec),
                "text={text:?} pattern={pattern:?}"
            );
        }
    }

    #[test]
    fn keyword_is_case_insensitive() {
        assert_eq!(
            extract_number("MONTHLY RECURRING: 99.99", "monthly recurring"),
            Some(dec("99.99"))
        );
    }

    #[test]
    fn value_on_following_line_uses_flattened_window() {
        let text = "Here is the account summary.\nCurrent balance\n  -$9,500.00\nThanks!";
        let (value, strategy) =
            extract_number_traced(text, "balance").expect("balance should be found");

        assert_eq!(value, dec("-9500.00"));
        assert_eq!(strategy, NumberStrategy::FlattenedWindow);
    }

    #[test]
    fn flattened_window_is_bounded() {
        let text = "Balance\nwe could not retrieve the figure from the ledger today\n$5";
        assert_eq!(extract_number(text, r"\bmrc\b|balance"), None);
    }

    #[test]
    fn balance_falls_back_to_first_negative_currency_amount() {
        let text = "The account owes -$2,000.00 against a limit of $10,000.";
        let (value, strategy) =
            extract_number_traced(text, "balance").expect("fallback should apply");

        assert_eq!(value, dec("-2000.00"));
        assert_eq!(strategy, NumberStrategy::NegativeCurrency);
    }

    #[test]
    fn negative_currency_fallback_is_balance_only() {
        let text = "The account owes -$2,000.00 against a limit of $10,000.";
        assert_eq!(extract_number(text, "usage"), None);
    }

    #[test]
    fn invalid_pattern_is_matched_literally() {
        assert_eq!(extract_number("rate(: 42", "rate("), Some(dec("42")));
    }

    #[test]
    fn empty_pattern_yields_nothing() {
        assert_eq!(extract_number("Balance: 5", "   "), None);
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "Balance: -$46,891.29\nMRC: $1,200";
        let first = extract_number(text, "balance");
        let second = extract_number(text, "balance");
        assert_eq!(first, second);
    }
}
