//! Conversation synchronization logic and port traits for Parley.
//!
//! This crate defines the ports that the infrastructure layer implements
//! (`MessageApi`, `CredentialSource`, `PushTransport`) and the components
//! built on them. It depends only on `parley-types`, never on
//! `parley-infra` or any network crate.

pub mod api;
pub mod connection;
pub mod controller;
pub mod credential;
pub mod resolver;
pub mod store;
pub mod typing;

#[cfg(test)]
pub(crate) mod testing;
