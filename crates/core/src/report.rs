//! Per-run check report handed to downstream collaborators (Slack delivery,
//! audit file output, process exit code).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::CustomerSpec;
use crate::errors::{CheckError, ExtractionError};
use crate::extract::{ExtractedSignals, RawReplies, SignalField};
use crate::projection::Projection;
use crate::risk::RiskLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    ParseError,
    Error,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ParseError => "parse_error",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Assessment {
    #[serde(flatten)]
    pub signals: ExtractedSignals,
    #[serde(flatten)]
    pub projection: Projection,
    pub risk_level: RiskLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Ok(Assessment),
    ParseError { message: String, missing: Vec<SignalField>, raw_replies: RawReplies },
    Error { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    #[serde(flatten)]
    pub customer: CustomerSpec,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn ok(customer: CustomerSpec, assessment: Assessment) -> Self {
        Self { customer, outcome: CheckOutcome::Ok(assessment) }
    }

    /// Maps a failed check to its terminal state. Extraction failures keep
    /// the raw replies for audit.
    pub fn failed(customer: CustomerSpec, error: &CheckError, raw_replies: RawReplies) -> Self {
        let outcome = match error {
            CheckError::Extraction(extraction) => {
                let missing = match extraction {
                    ExtractionError::MissingSignals { missing } => missing.clone(),
                    ExtractionError::Overflow(_) => Vec::new(),
                };
                CheckOutcome::ParseError { message: error.to_string(), missing, raw_replies }
            }
            _ => CheckOutcome::Error { message: error.to_string() },
        };
        Self { customer, outcome }
    }

    pub fn status(&self) -> CheckStatus {
        match self.outcome {
            CheckOutcome::Ok(_) => CheckStatus::Ok,
            CheckOutcome::ParseError { .. } => CheckStatus::ParseError,
            CheckOutcome::Error { .. } => CheckStatus::Error,
        }
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        match &self.outcome {
            CheckOutcome::Ok(assessment) => Some(assessment),
            _ => None,
        }
    }

    pub fn is_alert(&self) -> bool {
        self.assessment().is_some_and(|assessment| assessment.projection.alert)
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.assessment().map(|assessment| assessment.risk_level)
    }

    pub fn requires_escalation(&self) -> bool {
        self.risk_level().is_some_and(RiskLevel::requires_escalation)
    }

    /// Alerting customers and every customer whose check did not finish.
    pub fn needs_attention(&self) -> bool {
        self.is_alert() || self.status() != CheckStatus::Ok
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub ok: usize,
    pub alerts: usize,
    pub escalations: usize,
    pub parse_errors: usize,
    pub errors: usize,
    pub needs_attention: usize,
}

impl ReportSummary {
    pub fn record(&mut self, result: &CheckResult) {
        self.total += 1;
        match result.status() {
            CheckStatus::Ok => self.ok += 1,
            CheckStatus::ParseError => self.parse_errors += 1,
            CheckStatus::Error => self.errors += 1,
        }
        if result.is_alert() {
            self.alerts += 1;
        }
        if result.requires_escalation() {
            self.escalations += 1;
        }
        if result.needs_attention() {
            self.needs_attention += 1;
        }
    }

    pub fn from_results(results: &[CheckResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.record(result);
        }
        summary
    }

    pub fn failed(&self) -> usize {
        self.parse_errors + self.errors
    }

    pub fn line(&self) -> String {
        format!(
            "checked {} customer(s): {} alert(s), {} escalation(s), {} parse error(s), {} error(s); {} need attention",
            self.total,
            self.alerts,
            self.escalations,
            self.parse_errors,
            self.errors,
            self.needs_attention
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportChannels {
    pub alert_channel: Option<String>,
    pub escalation_channel: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub threshold: Decimal,
    #[serde(flatten)]
    pub channels: ReportChannels,
    pub results: Vec<CheckResult>,
    pub summary: ReportSummary,
}

impl Report {
    pub fn new(
        generated_at: DateTime<Utc>,
        threshold: Decimal,
        channels: ReportChannels,
        results: Vec<CheckResult>,
    ) -> Self {
        let summary = ReportSummary::from_results(&results);
        Self { generated_at, threshold, channels, results, summary }
    }

    pub fn flagged(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|result| result.needs_attention())
    }

    pub fn escalations(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|result| result.requires_escalation())
    }

    pub fn needs_attention(&self) -> bool {
        self.summary.needs_attention > 0
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::fixtures::{customer, ok_result};
    use super::{CheckResult, CheckStatus, Report, ReportChannels, ReportSummary};
    use crate::errors::{CheckError, ExtractionError};
    use crate::extract::{RawReplies, SignalField};

    fn transport_failure() -> CheckError {
        CheckError::Transport {
            query: "balance".to_owned(),
            attempts: 3,
            message: "connection refused".to_owned(),
        }
    }

    #[test]
    fn failed_results_are_never_treated_as_ok() {
        let result =
            CheckResult::failed(customer("down"), &transport_failure(), RawReplies::default());

        assert_eq!(result.status(), CheckStatus::Error);
        assert!(!result.is_alert());
        assert!(result.risk_level().is_none());
        assert!(result.needs_attention());
    }

    #[test]
    fn parse_error_keeps_raw_replies() {
        let replies = RawReplies { balance: "no idea".to_owned(), ..RawReplies::default() };
        let error = CheckError::from(ExtractionError::MissingSignals {
            missing: vec![SignalField::CurrentBalance],
        });
        let result = CheckResult::failed(customer("garbled"), &error, replies);

        let json = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(json["status"], "parse_error");
        assert_eq!(json["raw_replies"]["balance"], "no idea");
        assert_eq!(json["missing"][0], "current_balance");
        assert!(json.get("remaining").is_none());
    }

    #[test]
    fn summary_counts_errors_separately_from_alerts() {
        let results = vec![
            ok_result("fine", 500, false, false),
            ok_result("risky", -100, false, false),
            ok_result("protected", -100, true, true),
            CheckResult::failed(customer("down"), &transport_failure(), RawReplies::default()),
        ];
        let summary = ReportSummary::from_results(&results);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.ok, 3);
        assert_eq!(summary.alerts, 2);
        assert_eq!(summary.escalations, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.parse_errors, 0);
        assert_eq!(summary.needs_attention, 3);
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn ok_result_serializes_every_field_the_alert_needs() {
        let json = serde_json::to_value(ok_result("risky", -100, false, true)).expect("serialize");

        for key in [
            "name",
            "org_id",
            "currency",
            "credit_limit",
            "current_balance",
            "current_month_usage",
            "next_month_mrc",
            "daily_run_rate",
            "remaining",
            "risk_level",
            "suggested_credit_limit",
            "has_autorecharge",
            "is_vip",
        ] {
            assert!(json.get(key).is_some(), "missing `{key}` in {json}");
        }
        assert_eq!(json["status"], "ok");
        assert_eq!(json["risk_level"], "MEDIUM");
    }

    #[test]
    fn report_preserves_order_and_filters_escalations() {
        let report = Report::new(
            Utc::now(),
            Decimal::ZERO,
            ReportChannels::default(),
            vec![
                ok_result("a", -5, false, false),
                ok_result("b", 10, false, false),
                ok_result("c", -5, true, false),
            ],
        );

        let names = report.results.iter().map(|r| r.customer.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
        let escalated = report.escalations().map(|r| r.customer.name.as_str()).collect::<Vec<_>>();
        assert_eq!(escalated, vec!["a"]);
        assert_eq!(report.flagged().count(), 2);
        assert!(report.needs_attention());
    }
}
