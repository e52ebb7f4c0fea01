//! Slack messages built from a check report.

use creditwatch_core::report::{CheckOutcome, CheckResult, Report};
use rust_decimal::Decimal;

use crate::blocks::{chunk_lines, MessageBuilder, MessageTemplate, SECTION_TEXT_LIMIT};

/// Summary for the alert channel listing every customer that needs attention.
/// `None` when nobody does.
pub fn summary_message(report: &Report) -> Option<MessageTemplate> {
    if !report.needs_attention() {
        return None;
    }

    let flagged = report.flagged().collect::<Vec<_>>();
    let lines = flagged.iter().map(|result| summary_line(result)).collect::<Vec<_>>();
    let title = format!("Credit limit check: {} customer(s) need attention", flagged.len());

    let mut builder = MessageBuilder::new(title.clone())
        .header("credit.summary.header.v1", format!(":rotating_light: {title}"));
    for (index, chunk) in chunk_lines(&lines, SECTION_TEXT_LIMIT).into_iter().enumerate() {
        builder = builder.section(format!("credit.summary.list.{}.v1", index + 1), |section| {
            section.mrkdwn(chunk);
        });
    }

    Some(
        builder
            .context("credit.summary.context.v1", |context| {
                context.plain(format!(
                    "{} · threshold {} · generated {}",
                    report.summary.line(),
                    report.threshold,
                    report.generated_at.format("%Y-%m-%d %H:%M UTC")
                ));
            })
            .build(),
    )
}

/// Thread reply with the full numbers for one HIGH-risk customer.
pub fn customer_detail_message(result: &CheckResult) -> Option<MessageTemplate> {
    let CheckOutcome::Ok(assessment) = &result.outcome else {
        return None;
    };
    let customer = &result.customer;
    let currency = customer.currency.as_str();
    let signals = &assessment.signals;
    let projection = &assessment.projection;

    let figures = [
        ("Credit limit", Some(customer.credit_limit)),
        ("Current balance", signals.current_balance),
        ("Current month usage", signals.current_month_usage),
        ("Next month MRC", signals.next_month_mrc),
        ("Daily run rate", signals.daily_run_rate),
        ("Projected remaining", Some(projection.remaining)),
        ("Suggested credit limit", projection.suggested_credit_limit),
    ]
    .into_iter()
    .map(|(label, value)| format!("*{label}:* {}", format_amount(value, currency)))
    .collect::<Vec<_>>()
    .join("\n");

    Some(
        MessageBuilder::new(format!(
            "{} ({}) is {} risk: projected remaining {}",
            customer.name,
            customer.org_id,
            assessment.risk_level,
            format_amount(Some(projection.remaining), currency)
        ))
        .section("credit.detail.header.v1", |section| {
            section.mrkdwn(format!(
                ":red_circle: *{}* (`{}`) · risk *{}*",
                customer.name, customer.org_id, assessment.risk_level
            ));
        })
        .section("credit.detail.figures.v1", |section| {
            section.mrkdwn(figures);
        })
        .context("credit.detail.flags.v1", |context| {
            context.plain(format!(
                "Auto-recharge: {} · VIP: {}",
                yes_no(signals.has_autorecharge),
                yes_no(signals.is_vip)
            ));
        })
        .build(),
    )
}

/// Escalation listing only HIGH-risk customers. `None` when there are none.
pub fn escalation_message(report: &Report) -> Option<MessageTemplate> {
    let escalations = report.escalations().collect::<Vec<_>>();
    if escalations.is_empty() {
        return None;
    }

    let lines = escalations.iter().map(|result| summary_line(result)).collect::<Vec<_>>();
    let title = format!(
        "Escalation: {} customer(s) projected to exhaust credit with no protection",
        escalations.len()
    );

    let mut builder = MessageBuilder::new(title.clone())
        .header("credit.escalation.header.v1", format!(":fire: {title}"));
    for (index, chunk) in chunk_lines(&lines, SECTION_TEXT_LIMIT).into_iter().enumerate() {
        builder = builder.section(format!("credit.escalation.list.{}.v1", index + 1), |section| {
            section.mrkdwn(chunk);
        });
    }

    Some(
        builder
            .context("credit.escalation.context.v1", |context| {
                context.plain("No auto-recharge and no VIP status. Review the suggested limits.");
            })
            .build(),
    )
}

pub fn summary_line(result: &CheckResult) -> String {
    let customer = &result.customer;
    let label = format!("*{}* (`{}`)", customer.name, customer.org_id);

    match &result.outcome {
        CheckOutcome::Ok(assessment) => {
            let currency = customer.currency.as_str();
            let mut line = format!(
                "• {label} · *{}* · remaining {}",
                assessment.risk_level,
                format_amount(Some(assessment.projection.remaining), currency)
            );
            if let Some(suggested) = assessment.projection.suggested_credit_limit {
                line.push_str(&format!(
                    " · suggested limit {}",
                    format_amount(Some(suggested), currency)
                ));
            }
            line
        }
        CheckOutcome::ParseError { message, .. } => {
            format!("• {label} · :warning: could not read agent replies: {message}")
        }
        CheckOutcome::Error { message } => format!("• {label} · :x: check failed: {message}"),
    }
}

fn format_amount(value: Option<Decimal>, currency: &str) -> String {
    match value {
        Some(value) => format!("{value} {currency}"),
        None => "n/a".to_owned(),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
