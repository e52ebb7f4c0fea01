//! Billing agent access and the per-customer check pipeline.
//!
//! - `client`: JSON-RPC transport to the remote billing agent plus the
//!   retrying `AgentClient`
//! - `retry`: backoff policy shared by every query
//! - `prompts`: the three questions asked per customer
//! - `runner`: `CheckRunner`, which turns a customer list into a `Report`
//!
//! The agent only supplies text. Every number and decision in the report is
//! derived deterministically in `creditwatch-core`.

pub mod client;
pub mod prompts;
pub mod retry;
pub mod runner;

pub use client::{
    AgentClient, AgentQuery, AgentReply, AgentTransport, HttpAgentTransport, TransportError,
};
pub use prompts::QueryKind;
pub use retry::RetryPolicy;
pub use runner::CheckRunner;
