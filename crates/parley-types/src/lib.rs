//! Shared domain types for Parley.
//!
//! This crate contains the types every other Parley crate agrees on:
//! identifiers, messages, conversations, push channel events, client
//! configuration, and the REST/push error enums.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod id;
pub mod message;
