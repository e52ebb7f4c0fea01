use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use creditwatch_agent::{AgentClient, CheckRunner, HttpAgentTransport, RetryPolicy};
use creditwatch_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use creditwatch_core::report::{Report, ReportChannels};
use creditwatch_slack::alerts::summary_line;
use creditwatch_slack::{deliver_report, DeliveryReceipt, DryRunPoster, SlackPoster, WebApiPoster};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_NEEDS_ATTENTION, EXIT_OK, EXIT_RUNTIME};
use crate::logging::init_logging;

const COMMAND: &str = "check";
const DRY_RUN_CHANNEL: &str = "#creditwatch-dry-run";

#[derive(Clone, Debug, Default)]
pub struct CheckOptions {
    pub config_path: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub threshold: Option<Decimal>,
    pub customers: Vec<String>,
    pub dry_run: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
}

pub fn run(options: CheckOptions) -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("could not start async runtime: {error}"),
                EXIT_RUNTIME,
            )
        }
    };

    runtime.block_on(run_async(options))
}

pub async fn run_async(options: CheckOptions) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: options.config_path.clone(),
        require_file: true,
        overrides: ConfigOverrides {
            agent_base_url: options.endpoint.clone(),
            threshold: options.threshold,
            ..ConfigOverrides::default()
        },
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            )
        }
    };
    init_logging(&config);

    let customers = config.select_customers(&options.customers);
    if customers.is_empty() {
        return CommandResult::failure(
            COMMAND,
            "config_validation",
            format!("no configured customer matches {}", options.customers.join(", ")),
            EXIT_CONFIG,
        );
    }

    let poster: Box<dyn SlackPoster> = if options.dry_run {
        Box::new(DryRunPoster::default())
    } else {
        let (token, _) = match config.slack.require_delivery_settings() {
            Ok(settings) => settings,
            Err(error) => {
                return CommandResult::failure(
                    COMMAND,
                    "config_validation",
                    error.to_string(),
                    EXIT_CONFIG,
                )
            }
        };
        match WebApiPoster::new(&config.slack.api_base_url, token.clone()) {
            Ok(poster) => Box::new(poster),
            Err(error) => {
                return CommandResult::failure(COMMAND, "runtime", error.to_string(), EXIT_RUNTIME)
            }
        }
    };

    let transport = match HttpAgentTransport::new(&config.agent) {
        Ok(transport) => transport,
        Err(error) => {
            return CommandResult::failure(COMMAND, "runtime", error.to_string(), EXIT_RUNTIME)
        }
    };
    let client = AgentClient::new(Arc::new(transport), RetryPolicy::from_config(&config.agent));
    let channels = ReportChannels {
        alert_channel: config.slack.alert_channel.clone(),
        escalation_channel: config.slack.escalation_channel.clone(),
    };
    let runner = CheckRunner::new(client, config.check.clone(), channels);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(
                event_name = "check.run.interrupt",
                "ctrl-c received; finishing in-flight checks"
            );
            let _ = shutdown_tx.send(true);
        }
    });
    let mut report = runner.run(customers, shutdown_rx).await;
    ctrl_c.abort();

    if let Some(path) = &options.output {
        if let Err(message) = write_report(path, &report) {
            return CommandResult::failure(COMMAND, "output_write", message, EXIT_RUNTIME);
        }
        info!(event_name = "check.report.written", path = %path.display(), "report written");
    }

    if options.dry_run && report.channels.alert_channel.is_none() {
        report.channels.alert_channel = Some(DRY_RUN_CHANNEL.to_string());
    }
    let receipt = match deliver_report(poster.as_ref(), &report).await {
        Ok(receipt) => receipt,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "slack_delivery",
                format!("{error} ({})", report.summary.line()),
                EXIT_RUNTIME,
            )
        }
    };

    let exit_code = if report.needs_attention() { EXIT_NEEDS_ATTENTION } else { EXIT_OK };
    if options.json {
        let details = json!({
            "report": report,
            "delivery": delivery_details(&receipt, options.dry_run),
        });
        return CommandResult::completed(COMMAND, exit_code, report.summary.line(), Some(details));
    }

    CommandResult::text(exit_code, render_text(&report, &receipt, options.dry_run))
}

fn write_report(path: &Path, report: &Report) -> Result<(), String> {
    let body = serde_json::to_string_pretty(report)
        .map_err(|error| format!("could not serialize report: {error}"))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| format!("could not create `{}`: {error}", parent.display()))?;
    }
    fs::write(path, body).map_err(|error| format!("could not write `{}`: {error}", path.display()))
}

fn delivery_details(receipt: &DeliveryReceipt, dry_run: bool) -> serde_json::Value {
    json!({
        "dry_run": dry_run,
        "summary_posted": receipt.summary.is_some(),
        "thread_replies": receipt.thread_replies,
        "escalation_posted": receipt.escalation.is_some(),
    })
}

fn render_text(report: &Report, receipt: &DeliveryReceipt, dry_run: bool) -> String {
    let mut lines = vec![report.summary.line()];
    lines.extend(report.flagged().map(|result| summary_line(result).replace('*', "")));

    let verb = if dry_run { "would post" } else { "posted" };
    let delivery = match &receipt.summary {
        Some(summary) => format!(
            "slack: {verb} summary to {} with {} thread repl(ies){}",
            summary.channel,
            receipt.thread_replies,
            if receipt.escalation.is_some() { " and an escalation" } else { "" }
        ),
        None => "slack: nothing to post".to_string(),
    };
    lines.push(delivery);
    lines.join("\n")
}
