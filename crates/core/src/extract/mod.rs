//! Signal extraction from free-form billing agent replies.
//!
//! This is the only place agent text is interpreted. Everything here is a
//! pure function over strings: no I/O, no clock, no hidden state.
//!
//! - `number` - amounts near a keyword, via ordered fallback strategies
//! - `flag` - protective booleans near a keyword, defaulting to `false`

pub mod flag;
pub mod number;

use std::fmt;

use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use flag::extract_bool;
pub use number::{extract_number, extract_number_traced, NumberStrategy};

pub const BALANCE_PATTERN: &str = r"balance";
pub const CREDIT_LIMIT_PATTERN: &str = r"credit.?limit";
pub const USAGE_PATTERN: &str =
    r"current.?month.?usage|usage this month|month.to.date|\bmtd\b|\busage\b";
pub const MRC_PATTERN: &str = r"\bmrc\b|monthly recurring|recurring charge";
pub const DAILY_RATE_PATTERN: &str = r"daily.?run.?rate|run.?rate|burn.?rate|daily (?:usage|spend|rate)|per day";
pub const AUTORECHARGE_PATTERN: &str = r"auto.?recharge|auto.?top.?up";
pub const VIP_PATTERN: &str = r"vip\b|priority (?:status|customer|account)";

const MAX_PATTERN_CHARS: usize = 256;

/// Signals recovered for one customer. Numeric fields are `None` when no
/// strategy found them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSignals {
    pub current_balance: Option<Decimal>,
    pub current_month_usage: Option<Decimal>,
    pub next_month_mrc: Option<Decimal>,
    pub daily_run_rate: Option<Decimal>,
    pub reported_credit_limit: Option<Decimal>,
    pub has_autorecharge: bool,
    pub is_vip: bool,
}

impl ExtractedSignals {
    /// Fields the projection cannot do without. MRC is not listed because a
    /// missing MRC defaults to zero.
    pub fn missing_required(&self) -> Vec<SignalField> {
        let mut missing = Vec::new();
        if self.current_balance.is_none() {
            missing.push(SignalField::CurrentBalance);
        }
        if self.daily_run_rate.is_none() {
            missing.push(SignalField::DailyRunRate);
        }
        missing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalField {
    CurrentBalance,
    CurrentMonthUsage,
    NextMonthMrc,
    DailyRunRate,
}

impl SignalField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CurrentBalance => "current_balance",
            Self::CurrentMonthUsage => "current_month_usage",
            Self::NextMonthMrc => "next_month_mrc",
            Self::DailyRunRate => "daily_run_rate",
        }
    }
}

impl fmt::Display for SignalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw reply text of the three per-customer queries, kept for audit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReplies {
    pub balance: String,
    pub usage: String,
    pub flags: String,
}

impl RawReplies {
    pub fn is_blank(&self) -> bool {
        [&self.balance, &self.usage, &self.flags].iter().all(|reply| reply.trim().is_empty())
    }
}

pub fn extract_signals(replies: &RawReplies) -> ExtractedSignals {
    ExtractedSignals {
        current_balance: extract_number(&replies.balance, BALANCE_PATTERN),
        current_month_usage: extract_number(&replies.usage, USAGE_PATTERN),
        next_month_mrc: extract_number(&replies.usage, MRC_PATTERN),
        daily_run_rate: extract_number(&replies.usage, DAILY_RATE_PATTERN),
        reported_credit_limit: extract_number(&replies.balance, CREDIT_LIMIT_PATTERN),
        has_autorecharge: extract_bool(&replies.flags, AUTORECHARGE_PATTERN),
        is_vip: extract_bool(&replies.flags, VIP_PATTERN),
    }
}

/// Case-insensitive keyword matcher. Patterns that are not valid regular
/// expressions are matched literally; blank patterns match nothing.
pub(crate) fn keyword_regex(pattern: &str) -> Option<Regex> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_PATTERN_CHARS {
        return None;
    }

    RegexBuilder::new(trimmed)
        .case_insensitive(true)
        .build()
        .or_else(|_| RegexBuilder::new(&regex::escape(trimmed)).case_insensitive(true).build())
        .ok()
}
