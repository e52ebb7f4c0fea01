pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod projection;
pub mod report;
pub mod risk;

pub use config::{AppConfig, CheckSettings, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::{CustomerSpec, OrgId};
pub use errors::{CheckError, ExtractionError};
pub use extract::{
    extract_bool, extract_number, extract_signals, ExtractedSignals, RawReplies, SignalField,
};
pub use projection::{project, suggested_limit, Projection, ProjectionInput, ProjectionSettings};
pub use report::{
    Assessment, CheckOutcome, CheckResult, CheckStatus, Report, ReportChannels, ReportSummary,
};
pub use risk::RiskLevel;
