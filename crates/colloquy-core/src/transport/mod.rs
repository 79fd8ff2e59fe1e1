//! Transport collaborator contract
//!
//! The core does not implement networking. It talks to the assistant backend
//! through [`ApiClient`]; `colloquy-api` provides the HTTP implementation and
//! [`MockApiClient`] a scripted one for tests and offline runs.

/// Transport failures.
pub mod error;
/// Scripted transport.
pub mod mock;
/// Request and response types.
pub mod types;

pub use error::TransportError;
pub use mock::MockApiClient;
pub use types::{ApiHealth, ApiResponse};

use crate::pipeline::SendOptions;

/// Backend capability invoked by the message pipeline.
#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    /// Name used in logs and health reports
    fn name(&self) -> &str;

    /// Send one user message and wait for the answer.
    async fn send_message(
        &self,
        text: &str,
        options: &SendOptions,
    ) -> Result<ApiResponse, TransportError>;

    /// Probe backend availability.
    async fn health_check(&self) -> Result<ApiHealth, TransportError>;
}
