use std::future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use creditwatch_core::config::CheckSettings;
use creditwatch_core::domain::CustomerSpec;
use creditwatch_core::errors::CheckError;
use creditwatch_core::extract::{extract_signals, RawReplies};
use creditwatch_core::projection::{project, ProjectionInput, ProjectionSettings};
use creditwatch_core::report::{Assessment, CheckResult, Report, ReportChannels, ReportSummary};
use creditwatch_core::risk::RiskLevel;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::{AgentClient, AgentQuery, AgentReply};
use crate::prompts::QueryKind;

/// Runs the per-customer check pipeline over a configured customer list.
#[derive(Clone)]
pub struct CheckRunner {
    client: AgentClient,
    settings: CheckSettings,
    channels: ReportChannels,
    customer_deadline: Duration,
}

impl CheckRunner {
    pub fn new(client: AgentClient, settings: CheckSettings, channels: ReportChannels) -> Self {
        let queries = QueryKind::ALL.len() as u32;
        let customer_deadline = client.policy().deadline_for(queries);
        Self { client, settings, channels, customer_deadline }
    }

    pub fn with_customer_deadline(mut self, deadline: Duration) -> Self {
        self.customer_deadline = deadline;
        self
    }

    /// Checks every customer and returns one result per customer in input
    /// order. Once `shutdown` flips to `true` no new customer is started;
    /// the ones left over are reported as cancelled.
    pub async fn run(
        &self,
        customers: Vec<CustomerSpec>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Report {
        let run_id = Uuid::new_v4().to_string();
        let total = customers.len();
        let max_concurrency = self.settings.max_concurrency.max(1);

        info!(
            event_name = "check.run.started",
            correlation_id = %run_id,
            customers = total,
            max_concurrency,
            "credit check run started"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut slots: Vec<Option<CheckResult>> = vec![None; total];
        let mut started = vec![false; total];
        let mut tasks = JoinSet::new();

        for (index, customer) in customers.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                warn!(
                    event_name = "check.run.cancelled",
                    correlation_id = %run_id,
                    remaining = total - index,
                    "run cancelled; remaining customers will not be checked"
                );
                break;
            };

            started[index] = true;
            let runner = self.clone();
            let customer = customer.clone();
            let run_id = run_id.clone();
            tasks.spawn(async move {
                let result = runner.check_with_deadline(customer, &run_id).await;
                drop(permit);
                (index, result)
            });
        }

        let mut summary = ReportSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    summary.record(&result);
                    info!(
                        event_name = "check.customer.finished",
                        correlation_id = %run_id,
                        org_id = %result.customer.org_id,
                        status = result.status().as_str(),
                        needs_attention = summary.needs_attention,
                        "customer check finished"
                    );
                    slots[index] = Some(result);
                }
                Err(error) => {
                    warn!(
                        event_name = "check.customer.aborted",
                        correlation_id = %run_id,
                        error = %error,
                        "customer check task did not complete"
                    );
                }
            }
        }

        let results = slots
            .into_iter()
            .zip(customers)
            .zip(started)
            .map(|((slot, customer), was_started)| match slot {
                Some(result) => result,
                None if was_started => CheckResult::failed(
                    customer,
                    &CheckError::Aborted("task ended without a result".to_string()),
                    RawReplies::default(),
                ),
                None => {
                    CheckResult::failed(customer, &CheckError::Cancelled, RawReplies::default())
                }
            })
            .collect::<Vec<_>>();

        let report =
            Report::new(Utc::now(), self.settings.threshold, self.channels.clone(), results);
        info!(
            event_name = "check.run.completed",
            correlation_id = %run_id,
            total = report.summary.total,
            alerts = report.summary.alerts,
            escalations = report.summary.escalations,
            errors = report.summary.failed(),
            needs_attention = report.summary.needs_attention,
            "credit check run completed"
        );
        report
    }

    async fn check_with_deadline(&self, customer: CustomerSpec, run_id: &str) -> CheckResult {
        let deadline = self.customer_deadline;
        let check = self.check_customer(customer.clone(), run_id);
        match tokio::time::timeout(deadline, check).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    event_name = "check.customer.timed_out",
                    correlation_id = %run_id,
                    org_id = %customer.org_id,
                    deadline_ms = deadline.as_millis() as u64,
                    "customer check exceeded its deadline"
                );
                let error = CheckError::TimedOut { after_secs: deadline.as_secs() };
                CheckResult::failed(customer, &error, RawReplies::default())
            }
        }
    }

    /// Sends the three queries in order. The first query that fails after
    /// retries ends the check for this customer.
    async fn check_customer(&self, customer: CustomerSpec, run_id: &str) -> CheckResult {
        let mut replies = RawReplies::default();

        for kind in QueryKind::ALL {
            let query = AgentQuery::for_customer(kind, &customer);
            info!(
                event_name = "check.query.sent",
                correlation_id = %run_id,
                org_id = %customer.org_id,
                query_id = %query.id,
                "querying billing agent"
            );

            match self.client.send(&query).await {
                AgentReply::Text(text) => kind.record(&mut replies, text),
                AgentReply::Empty => {}
                AgentReply::Failed { attempts, last_error } => {
                    let error = CheckError::Transport {
                        query: kind.as_str().to_string(),
                        attempts,
                        message: last_error.to_string(),
                    };
                    return CheckResult::failed(customer, &error, replies);
                }
            }
        }

        if replies.is_blank() {
            warn!(
                event_name = "check.customer.no_response",
                correlation_id = %run_id,
                org_id = %customer.org_id,
                "billing agent returned no text for any query"
            );
            return CheckResult::failed(customer, &CheckError::NoResponse, replies);
        }

        assess(customer, replies, &self.settings.projection())
    }
}

/// Turns the raw replies for one customer into its final result.
pub fn assess(
    customer: CustomerSpec,
    replies: RawReplies,
    settings: &ProjectionSettings,
) -> CheckResult {
    let signals = extract_signals(&replies);

    if let Some(reported) = signals.reported_credit_limit {
        if reported.abs() != customer.credit_limit {
            warn!(
                event_name = "check.credit_limit.mismatch",
                org_id = %customer.org_id,
                configured = %customer.credit_limit,
                reported = %reported,
                "agent reports a different credit limit; using the configured value"
            );
        }
    }

    let input = match ProjectionInput::from_signals(&signals) {
        Ok(input) => input,
        Err(error) => return CheckResult::failed(customer, &error.into(), replies),
    };

    let projection = match project(customer.credit_limit, &input, settings) {
        Ok(projection) => projection,
        Err(error) => return CheckResult::failed(customer, &error.into(), replies),
    };
    let risk_level =
        RiskLevel::classify(projection.remaining, signals.is_vip, signals.has_autorecharge);

    CheckResult::ok(customer, Assessment { signals, projection, risk_level })
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone without signalling; never cancel.
            future::pending::<()>().await;
        }
    }
}
