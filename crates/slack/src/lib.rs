//! Slack delivery for credit check reports.
//!
//! - **Block Kit** (`blocks`) - typed message builder
//! - **Alerts** (`alerts`) - summary, per-customer detail and escalation messages
//! - **Poster** (`poster`) - `chat.postMessage` client, dry-run recorder and the
//!   delivery plan that ties them to a `Report`
//!
//! # Delivery plan
//!
//! ```text
//! Report → summary (alert channel)
//!            └─ thread: one detail reply per HIGH customer
//!        → escalation (escalation channel, HIGH only)
//! ```

pub mod alerts;
pub mod blocks;
pub mod poster;

pub use blocks::{MessageBuilder, MessageTemplate};
pub use poster::{
    deliver_report, DeliveryReceipt, DryRunPoster, PostedMessage, SlackError, SlackPoster,
    WebApiPoster,
};
