//! Alerting
//!
//! - [`AlertEngine`] - threshold evaluation, dedup and resolution
//! - [`Notifier`] - dispatch of critical alerts

pub mod engine;
pub mod notifier;

pub use engine::{AlertEngine, AlertPolicy, Breach, Evaluation, SYSTEM_ACTOR};
pub use notifier::{InMemoryNotifier, LoggingNotifier, Notifier, WebhookNotifier};
