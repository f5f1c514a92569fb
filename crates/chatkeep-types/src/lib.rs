//! Shared domain types for Chatkeep.
//!
//! Users, chat messages, migration bookkeeping, configuration, and the error
//! taxonomy shared by the repository ports and their SQLite adapters.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod migration;
pub mod user;
