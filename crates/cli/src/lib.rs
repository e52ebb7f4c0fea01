pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use commands::check::CheckOptions;

#[derive(Debug, Parser)]
#[command(
    name = "creditwatch",
    about = "Credit limit exhaustion checks with graded Slack alerts",
    long_about = "Ask the billing agent about every configured customer, project the credit left \
                  before the next invoice, and alert on accounts that will run out.",
    after_help = "Exit codes:\n  0  nothing needs attention\n  1  at least one customer needs attention\n  2  configuration error\n  3  runtime error (Slack delivery, report output)\n\nExamples:\n  creditwatch check --dry-run\n  creditwatch check --customer acme --json --output reports/latest.json\n  creditwatch config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the credit check for configured customers and deliver alerts")]
    Check(CheckArgs),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config {
        #[arg(long, help = "Path to the TOML config file")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(long, help = "Path to the TOML config file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Billing agent endpoint, overrides agent.base_url")]
    endpoint: Option<String>,
    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Alert when projected remaining credit falls below this amount"
    )]
    threshold: Option<Decimal>,
    #[arg(
        long = "customer",
        value_name = "NAME",
        help = "Only check this customer (name or org id); repeatable"
    )]
    customers: Vec<String>,
    #[arg(long, help = "Log Slack messages instead of posting them")]
    dry_run: bool,
    #[arg(long, help = "Emit machine-readable JSON output")]
    json: bool,
    #[arg(long, value_name = "PATH", help = "Write the full report as JSON to this file")]
    output: Option<PathBuf>,
}

impl From<CheckArgs> for CheckOptions {
    fn from(args: CheckArgs) -> Self {
        Self {
            config_path: args.config,
            endpoint: args.endpoint,
            threshold: args.threshold,
            customers: args.customers,
            dry_run: args.dry_run,
            json: args.json,
            output: args.output,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Check(args) => commands::check::run(args.into()),
        Command::Config { config } => commands::config::run(config),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn check_accepts_repeated_customers_and_negative_threshold() {
        let cli = Cli::try_parse_from([
            "creditwatch",
            "check",
            "--customer",
            "acme",
            "--customer",
            "org-globex",
            "--threshold",
            "-250.50",
            "--dry-run",
        ])
        .expect("arguments should parse");

        let Command::Check(args) = cli.command else {
            panic!("expected check command");
        };
        assert_eq!(args.customers, vec!["acme", "org-globex"]);
        assert_eq!(args.threshold.map(|value| value.to_string()).as_deref(), Some("-250.50"));
        assert!(args.dry_run);
        assert!(!args.json);
    }

    #[test]
    fn config_subcommand_takes_optional_path() {
        let cli = Cli::try_parse_from(["creditwatch", "config", "--config", "ops/cw.toml"])
            .expect("arguments should parse");

        assert!(matches!(cli.command, Command::Config { config: Some(_) }));
    }
}
