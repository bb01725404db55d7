//! # Session Agent Library
//!
//! Client-side session layer for a REST backend: attaches the stored access
//! token to outgoing requests, refreshes it exactly once when the backend
//! answers 401, and replays every request that was blocked by the expiry.
//!
//! Modules:
//! - `config`: service configuration, defaults and validation
//! - `store`: durable key-value media and the credential store on top
//! - `auth`: authorization header decision and token inspection
//! - `refresh`: refresh endpoint and the single-flight coordinator
//! - `pipeline`: transport, request pipeline and session operations

pub mod auth;
pub mod config;
pub mod observability;
pub mod pipeline;
pub mod refresh;
pub mod store;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::config::settings::ServiceConfig;
pub use crate::pipeline::pipeline::{PipelineError, RequestPipeline};
pub use crate::pipeline::request::{ApiRequest, ApiResponse};
pub use crate::store::credential_store::{CredentialStore, Session};
