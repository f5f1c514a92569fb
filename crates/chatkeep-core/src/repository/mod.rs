//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (chatkeep-infra) implements. Use-case code talks only to these traits and
//! never issues raw statements against the store.

pub mod message;
pub mod user;

pub use message::MessageRepository;
pub use user::UserRepository;
