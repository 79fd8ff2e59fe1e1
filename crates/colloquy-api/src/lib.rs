//! Colloquy API - HTTP transport for the assistant backend
//!
//! Implements the core's [`ApiClient`](colloquy_core::ApiClient) over
//! `reqwest`:
//! - `POST {base_url}/chat` with `{message, service_type, session_id, metadata}`
//! - `GET {base_url}/health`
//!
//! Backend error text is sanitized before it leaves this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod security;
/// Request, response and configuration types.
pub mod types;


pub use client::HttpApiClient;
pub use types::{ApiConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
