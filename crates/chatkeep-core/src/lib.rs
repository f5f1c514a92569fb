//! Core layer for Chatkeep.
//!
//! Repository traits (ports) for users and chat messages, and the
//! conversation service built on them. No storage technology appears here.

pub mod repository;
pub mod service;
