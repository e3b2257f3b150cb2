//! Upstream code host client
//!
//! Implements [`fanout_core::RepositorySource`] over HTTP: one call is one
//! `GET {backend}/repository`, decoded from a single-record envelope.

pub mod client;
pub mod config;
pub mod types;

pub use client::CodeHostClient;
pub use config::UpstreamConfig;
pub use types::RepositoryEnvelope;
