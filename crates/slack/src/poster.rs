use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use creditwatch_core::report::Report;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::alerts::{customer_detail_message, escalation_message, summary_message};
use crate::blocks::MessageTemplate;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack `{method}` returned error `{error}`")]
    Api { method: String, error: String },
    #[error("slack rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("slack configuration error: {0}")]
    Config(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[async_trait]
pub trait SlackPoster: Send + Sync {
    async fn post(
        &self,
        channel: &str,
        message: &MessageTemplate,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage, SlackError>;
}

/// Posts through the Web API `chat.postMessage` method with a bot token.
pub struct WebApiPoster {
    client: reqwest::Client,
    api_base_url: String,
    bot_token: SecretString,
}

impl WebApiPoster {
    pub fn new(api_base_url: &str, bot_token: SecretString) -> Result<Self, SlackError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, api_base_url: api_base_url.trim_end_matches('/').to_owned(), bot_token })
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl SlackPoster for WebApiPoster {
    async fn post(
        &self,
        channel: &str,
        message: &MessageTemplate,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage, SlackError> {
        let mut body = json!({
            "channel": channel,
            "text": message.fallback_text,
            "blocks": message.blocks,
            "unfurl_links": false,
        });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(60);
            return Err(SlackError::RateLimited { retry_after_secs });
        }

        let payload = response.error_for_status()?.json::<PostMessageResponse>().await?;
        if !payload.ok {
            return Err(SlackError::Api {
                method: "chat.postMessage".to_owned(),
                error: payload.error.unwrap_or_else(|| "unknown_error".to_owned()),
            });
        }

        Ok(PostedMessage {
            channel: payload.channel.unwrap_or_else(|| channel.to_owned()),
            ts: payload.ts.unwrap_or_default(),
        })
    }
}

/// Records messages instead of sending them.
#[derive(Default)]
pub struct DryRunPoster {
    posted: Mutex<Vec<DryRunMessage>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DryRunMessage {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub message: MessageTemplate,
}

impl DryRunPoster {
    pub fn posted(&self) -> Vec<DryRunMessage> {
        self.posted.lock().map(|posted| posted.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SlackPoster for DryRunPoster {
    async fn post(
        &self,
        channel: &str,
        message: &MessageTemplate,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage, SlackError> {
        let mut posted = self
            .posted
            .lock()
            .map_err(|_| SlackError::Config("dry-run recorder lock poisoned".to_owned()))?;
        let ts = format!("dry-run.{:06}", posted.len() + 1);

        info!(
            event_name = "delivery.slack.dry_run",
            channel,
            thread_ts = thread_ts.unwrap_or("none"),
            blocks = message.blocks.len(),
            text = %message.fallback_text,
            "dry run: slack message not sent"
        );
        posted.push(DryRunMessage {
            channel: channel.to_owned(),
            thread_ts: thread_ts.map(str::to_owned),
            message: message.clone(),
        });

        Ok(PostedMessage { channel: channel.to_owned(), ts })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub summary: Option<PostedMessage>,
    pub thread_replies: usize,
    pub escalation: Option<PostedMessage>,
}

/// Posts the summary, one threaded detail reply per HIGH customer, then the
/// escalation. The escalation goes to the alert channel when no escalation
/// channel is configured. Posts nothing when no customer needs attention.
pub async fn deliver_report(
    poster: &dyn SlackPoster,
    report: &Report,
) -> Result<DeliveryReceipt, SlackError> {
    let Some(summary) = summary_message(report) else {
        info!(
            event_name = "delivery.slack.skipped",
            "no customer needs attention; nothing to post"
        );
        return Ok(DeliveryReceipt::default());
    };

    let alert_channel = report
        .channels
        .alert_channel
        .as_deref()
        .ok_or_else(|| SlackError::Config("no alert channel configured".to_owned()))?;

    let posted = poster.post(alert_channel, &summary, None).await?;
    info!(
        event_name = "delivery.slack.summary_posted",
        channel = %posted.channel,
        ts = %posted.ts,
        flagged = report.summary.needs_attention,
        "posted credit check summary"
    );

    let mut thread_replies = 0;
    for result in report.escalations() {
        let Some(detail) = customer_detail_message(result) else {
            continue;
        };
        let thread_ts = (!posted.ts.is_empty()).then_some(posted.ts.as_str());
        if thread_ts.is_none() {
            warn!(
                event_name = "delivery.slack.thread_missing",
                org_id = %result.customer.org_id,
                "summary has no timestamp; posting detail at top level"
            );
        }
        poster.post(alert_channel, &detail, thread_ts).await?;
        thread_replies += 1;
    }

    let escalation = match escalation_message(report) {
        Some(message) => {
            let channel = report.channels.escalation_channel.as_deref().unwrap_or(alert_channel);
            let escalated = poster.post(channel, &message, None).await?;
            info!(
                event_name = "delivery.slack.escalation_posted",
                channel = %escalated.channel,
                escalations = report.summary.escalations,
                "posted credit escalation"
            );
            Some(escalated)
        }
        None => None,
    };

    Ok(DeliveryReceipt { summary: Some(posted), thread_replies, escalation })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{deliver_report, DryRunPoster, PostedMessage, SlackError, SlackPoster};
    use crate::alerts::fixtures::{assessed, failed, report};
    use crate::blocks::MessageTemplate;

    #[tokio::test]
    async fn delivers_summary_threaded_details_and_escalation() {
        let poster = DryRunPoster::default();
        let report = report(vec![
            assessed("fine", 500, false, false),
            assessed("risky", -100, false, false),
            assessed("medium", -100, false, true),
            assessed("critical", -900, false, false),
            failed("down"),
        ]);

        let receipt = deliver_report(&poster, &report).await.expect("delivery succeeds");
        let posted = poster.posted();

        assert_eq!(posted.len(), 4);
        assert_eq!(posted[0].channel, "#credit-alerts");
        assert_eq!(posted[0].thread_ts, None);
        let summary_ts = receipt.summary.as_ref().map(|summary| summary.ts.clone());
        assert_eq!(posted[1].thread_ts, summary_ts);
        assert_eq!(posted[2].thread_ts, summary_ts);
        assert_eq!(posted[3].channel, "#credit-escalations");
        assert_eq!(receipt.thread_replies, 2);
        assert!(receipt.escalation.is_some());
    }

    #[tokio::test]
    async fn posts_nothing_when_all_customers_are_fine() {
        let poster = DryRunPoster::default();
        let report = report(vec![assessed("fine", 500, false, false)]);

        let receipt = deliver_report(&poster, &report).await.expect("delivery succeeds");

        assert!(poster.posted().is_empty());
        assert_eq!(receipt.summary, None);
    }

    #[tokio::test]
    async fn errors_only_produce_a_summary() {
        let poster = DryRunPoster::default();
        let report = report(vec![failed("down")]);

        let receipt = deliver_report(&poster, &report).await.expect("delivery succeeds");

        assert_eq!(poster.posted().len(), 1);
        assert_eq!(receipt.thread_replies, 0);
        assert!(receipt.escalation.is_none());
    }

    #[tokio::test]
    async fn escalation_falls_back_to_alert_channel() {
        let poster = DryRunPoster::default();
        let mut report = report(vec![assessed("risky", -100, false, false)]);
        report.channels.escalation_channel = None;

        deliver_report(&poster, &report).await.expect("delivery succeeds");

        let posted = poster.posted();
        assert_eq!(posted.last().map(|message| message.channel.as_str()), Some("#credit-alerts"));
    }

    struct FailingPoster {
        results: Mutex<VecDeque<Result<PostedMessage, SlackError>>>,
    }

    #[async_trait]
    impl SlackPoster for FailingPoster {
        async fn post(
            &self,
            channel: &str,
            _message: &MessageTemplate,
            _thread_ts: Option<&str>,
        ) -> Result<PostedMessage, SlackError> {
            self.results.lock().await.pop_front().unwrap_or_else(|| {
                Ok(PostedMessage { channel: channel.to_owned(), ts: "1.0".to_owned() })
            })
        }
    }

    #[tokio::test]
    async fn api_error_stops_delivery() {
        let poster = FailingPoster {
            results: Mutex::new(VecDeque::from([Err(SlackError::Api {
                method: "chat.postMessage".to_owned(),
                error: "channel_not_found".to_owned(),
            })])),
        };
        let report = report(vec![assessed("risky", -100, false, false)]);

        let error = deliver_report(&poster, &report).await.expect_err("delivery should fail");

        assert!(error.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn missing_alert_channel_is_a_config_error() {
        let poster = DryRunPoster::default();
        let mut report = report(vec![failed("down")]);
        report.channels.alert_channel = None;

        let error = deliver_report(&poster, &report).await.expect_err("no channel");

        assert!(matches!(error, SlackError::Config(_)));
        assert!(poster.posted().is_empty());
    }
}
