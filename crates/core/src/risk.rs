use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Ok,
    LowProtected,
    Medium,
    High,
}

impl RiskLevel {
    /// Classifies a projection. Total over every input combination; the
    /// protective flags only matter once `remaining` is negative.
    pub fn classify(remaining: Decimal, is_vip: bool, has_autorecharge: bool) -> Self {
        if remaining >= Decimal::ZERO {
            return Self::Ok;
        }

        match (is_vip, has_autorecharge) {
            (true, true) => Self::LowProtected,
            (true, false) | (false, true) => Self::Medium,
            (false, false) => Self::High,
        }
    }

    pub fn requires_escalation(self) -> bool {
        matches!(self, Self::High)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::LowProtected => "LOW_PROTECTED",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
