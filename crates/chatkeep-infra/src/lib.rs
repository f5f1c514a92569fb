//! Infrastructure layer for Chatkeep.
//!
//! Contains implementations of the repository traits defined in `chatkeep-core`:
//! SQLite storage behind a split reader/writer connection manager, the schema
//! migration runner, and configuration file loading.

pub mod config;
pub mod sqlite;
