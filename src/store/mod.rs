//! Persistence
//!
//! - [`ConfigStore`] - validated, cached configuration access
//! - [`InMemoryStore`] - process-local implementation of every repository port

pub mod config;
pub mod memory;

pub use config::ConfigStore;
pub use memory::InMemoryStore;
