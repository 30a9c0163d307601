//! Chatterbox core: client-side synchronization and validation for a
//! realtime chat backend.
//!
//! The crate keeps a local view of channels and messages in step with a
//! shared server. An initial snapshot seeds the view, a persistent event
//! stream keeps it current, and every user action passes through validation
//! and content filtering before it leaves the client.

pub mod config;
pub mod core_chat;
pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogLevel};
