//! Infrastructure layer for Parley.
//!
//! Implements the ports defined in `parley-core`: the REST persistence client
//! (`MessageApi`), the websocket push transport (`PushTransport`), credential
//! sources, and config file loading.

pub mod config;
pub mod credential;
pub mod http;
pub mod push;
