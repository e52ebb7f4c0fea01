use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CustomerSpec;
use crate::projection::ProjectionSettings;

pub const DEFAULT_CONFIG_FILE: &str = "creditwatch.toml";
pub const NESTED_CONFIG_FILE: &str = "config/creditwatch.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub check: CheckSettings,
    pub slack: SlackConfig,
    pub logging: LoggingConfig,
    pub customers: Vec<CustomerSpec>,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
    pub jitter: bool,
}

/// Run-wide settings passed explicitly to the check runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckSettings {
    pub threshold: Decimal,
    pub buffer_days: u32,
    pub increase_pct: Decimal,
    pub max_concurrency: usize,
}

impl CheckSettings {
    pub fn projection(&self) -> ProjectionSettings {
        ProjectionSettings {
            threshold: self.threshold,
            buffer_days: self.buffer_days,
            increase_pct: self.increase_pct,
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        let projection = ProjectionSettings::default();
        Self {
            threshold: projection.threshold,
            buffer_days: projection.buffer_days,
            increase_pct: projection.increase_pct,
            max_concurrency: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: Option<SecretString>,
    pub api_base_url: String,
    pub alert_channel: Option<String>,
    pub escalation_channel: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub agent_base_url: Option<String>,
    pub threshold: Option<Decimal>,
    pub log_level: Option<String>,
    pub slack_bot_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                base_url: "http://localhost:8000/".to_string(),
                connect_timeout_secs: 10,
                timeout_secs: 30,
                max_attempts: 3,
                base_delay_ms: 2_000,
                backoff_multiplier: 2,
                jitter: true,
            },
            check: CheckSettings::default(),
            slack: SlackConfig {
                bot_token: None,
                api_base_url: "https://slack.com/api".to_string(),
                alert_channel: None,
                escalation_channel: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            customers: Vec::new(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Customers whose name or org id is listed in `filter`, in configured order.
    /// An empty filter keeps everyone.
    pub fn select_customers(&self, filter: &[String]) -> Vec<CustomerSpec> {
        if filter.is_empty() {
            return self.customers.clone();
        }

        self.customers
            .iter()
            .filter(|customer| {
                filter.iter().any(|wanted| {
                    customer.name.eq_ignore_ascii_case(wanted) || customer.org_id.0 == *wanted
                })
            })
            .cloned()
            .collect()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(agent) = patch.agent {
            if let Some(base_url) = agent.base_url {
                self.agent.base_url = base_url;
            }
            if let Some(connect_timeout_secs) = agent.connect_timeout_secs {
                self.agent.connect_timeout_secs = connect_timeout_secs;
            }
            if let Some(timeout_secs) = agent.timeout_secs {
                self.agent.timeout_secs = timeout_secs;
            }
            if let Some(max_attempts) = agent.max_attempts {
                self.agent.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = agent.base_delay_ms {
                self.agent.base_delay_ms = base_delay_ms;
            }
            if let Some(backoff_multiplier) = agent.backoff_multiplier {
                self.agent.backoff_multiplier = backoff_multiplier;
            }
            if let Some(jitter) = agent.jitter {
                self.agent.jitter = jitter;
            }
        }

        if let Some(check) = patch.check {
            if let Some(threshold) = check.threshold {
                self.check.threshold = threshold;
            }
            if let Some(buffer_days) = check.buffer_days {
                self.check.buffer_days = buffer_days;
            }
            if let Some(increase_pct) = check.increase_pct {
                self.check.increase_pct = increase_pct;
            }
            if let Some(max_concurrency) = check.max_concurrency {
                self.check.max_concurrency = max_concurrency;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(bot_token_value) = slack.bot_token {
                self.slack.bot_token = Some(secret_value(bot_token_value));
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(alert_channel) = slack.alert_channel {
                self.slack.alert_channel = Some(alert_channel);
            }
            if let Some(escalation_channel) = slack.escalation_channel {
                self.slack.escalation_channel = Some(escalation_channel);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(customers) = patch.customers {
            self.customers = customers
                .into_iter()
                .enumerate()
                .map(|(index, customer)| customer.into_spec(index))
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CREDITWATCH_AGENT_BASE_URL") {
            self.agent.base_url = value;
        }
        if let Some(value) = read_env("CREDITWATCH_AGENT_TIMEOUT_SECS") {
            self.agent.timeout_secs = parse_u64("CREDITWATCH_AGENT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CREDITWATCH_AGENT_MAX_ATTEMPTS") {
            self.agent.max_attempts = parse_u32("CREDITWATCH_AGENT_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("CREDITWATCH_THRESHOLD") {
            self.check.threshold = parse_decimal("CREDITWATCH_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CREDITWATCH_BUFFER_DAYS") {
            self.check.buffer_days = parse_u32("CREDITWATCH_BUFFER_DAYS", &value)?;
        }
        if let Some(value) = read_env("CREDITWATCH_INCREASE_PCT") {
            self.check.increase_pct = parse_decimal("CREDITWATCH_INCREASE_PCT", &value)?;
        }
        if let Some(value) = read_env("CREDITWATCH_MAX_CONCURRENCY") {
            self.check.max_concurrency = parse_usize("CREDITWATCH_MAX_CONCURRENCY", &value)?;
        }

        if let Some(value) = read_env("CREDITWATCH_SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CREDITWATCH_SLACK_ALERT_CHANNEL") {
            self.slack.alert_channel = Some(value);
        }
        if let Some(value) = read_env("CREDITWATCH_SLACK_ESCALATION_CHANNEL") {
            self.slack.escalation_channel = Some(value);
        }

        let log_level =
            read_env("CREDITWATCH_LOGGING_LEVEL").or_else(|| read_env("CREDITWATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CREDITWATCH_LOGGING_FORMAT").or_else(|| read_env("CREDITWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(agent_base_url) = overrides.agent_base_url {
            self.agent.base_url = agent_base_url;
        }
        if let Some(threshold) = overrides.threshold {
            self.check.threshold = threshold;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = Some(secret_value(slack_bot_token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent(&self.agent)?;
        validate_check(&self.check)?;
        validate_slack(&self.slack)?;
        validate_logging(&self.logging)?;
        validate_customers(&self.customers)?;
        Ok(())
    }
}

impl SlackConfig {
    /// Delivery needs a bot token and an alert channel; dry runs do not.
    pub fn require_delivery_settings(&self) -> Result<(&SecretString, &str), ConfigError> {
        let token = self.bot_token.as_ref().ok_or_else(|| {
            ConfigError::Validation(
                "slack.bot_token is required to post alerts (use --dry-run to skip Slack)"
                    .to_string(),
            )
        })?;
        let channel = self.alert_channel.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "slack.alert_channel is required to post alerts (use --dry-run to skip Slack)"
                    .to_string(),
            )
        })?;
        Ok((token, channel))
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    let base_url = agent.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "agent.base_url must start with http:// or https://".to_string(),
        ));
    }

    if agent.connect_timeout_secs == 0 || agent.connect_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.connect_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if agent.timeout_secs == 0 || agent.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if agent.max_attempts == 0 || agent.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "agent.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if agent.backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "agent.backoff_multiplier must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_check(check: &CheckSettings) -> Result<(), ConfigError> {
    if check.buffer_days > 90 {
        return Err(ConfigError::Validation("check.buffer_days must be at most 90".to_string()));
    }

    if check.increase_pct.is_sign_negative() {
        return Err(ConfigError::Validation(
            "check.increase_pct must not be negative".to_string(),
        ));
    }

    if check.max_concurrency == 0 || check.max_concurrency > 32 {
        return Err(ConfigError::Validation(
            "check.max_concurrency must be in range 1..=32".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if let Some(bot_token) = &slack.bot_token {
        let bot_token = bot_token.expose_secret();
        if !bot_token.starts_with("xoxb-") {
            let hint = if bot_token.starts_with("xapp-") {
                " (hint: you may have used the app token instead of the bot token)"
            } else {
                ""
            };
            return Err(ConfigError::Validation(format!(
                "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions"
            )));
        }
    }

    let channels = [
        ("slack.alert_channel", &slack.alert_channel),
        ("slack.escalation_channel", &slack.escalation_channel),
    ];
    for (key, channel) in channels {
        if channel.as_deref().is_some_and(|value| value.trim().is_empty()) {
            return Err(ConfigError::Validation(format!("{key} must not be empty when set")));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_customers(customers: &[CustomerSpec]) -> Result<(), ConfigError> {
    if customers.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[customers]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for customer in customers {
        if !seen.insert(customer.org_id.0.as_str()) {
            return Err(ConfigError::Validation(format!(
                "customer org_id `{}` is configured more than once",
                customer.org_id
            )));
        }
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    agent: Option<AgentPatch>,
    check: Option<CheckPatch>,
    slack: Option<SlackPatch>,
    logging: Option<LoggingPatch>,
    customers: Option<Vec<CustomerPatch>>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    base_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_multiplier: Option<u32>,
    jitter: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckPatch {
    threshold: Option<Decimal>,
    buffer_days: Option<u32>,
    increase_pct: Option<Decimal>,
    max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    alert_channel: Option<String>,
    escalation_channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomerPatch {
    name: Option<String>,
    org_id: Option<String>,
    credit_limit: Option<Decimal>,
    currency: Option<String>,
}

impl CustomerPatch {
    fn into_spec(self, index: usize) -> Result<CustomerSpec, ConfigError> {
        let label = self
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| format!("customers[{index}] (`{name}`)"))
            .unwrap_or_else(|| format!("customers[{index}]"));
        let missing = |field: &str| {
            ConfigError::Validation(format!("{label} is missing required field `{field}`"))
        };

        let name =
            self.name.filter(|value| !value.trim().is_empty()).ok_or_else(|| missing("name"))?;
        let org_id =
            self.org_id.filter(|value| !value.trim().is_empty()).ok_or_else(|| missing("org_id"))?;
        let credit_limit = self.credit_limit.ok_or_else(|| missing("credit_limit"))?;
        let currency = self
            .currency
            .map(|value| value.trim().to_ascii_uppercase())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| missing("currency"))?;

        if credit_limit <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "{label} credit_limit must be greater than zero"
            )));
        }
        if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(ConfigError::Validation(format!(
                "{label} currency must be a 3-letter ISO code, got `{currency}`"
            )));
        }

        Ok(CustomerSpec::new(name.trim(), org_id.trim(), credit_limit, currency))
    }
}
