//! Cloud gateway trait

use async_trait::async_trait;
use reaper_util::MachineId;
use thiserror::Error;

use crate::{Machine, TagSet};

/// Errors from gateway operations
///
/// The retirement engine does not distinguish between these; every one of
/// them ends the current pass.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Provider gateway - implemented by the CloudAPI client and the mock
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// List every machine in the account, in provider order
    async fn list_machines(&self) -> GatewayResult<Vec<Machine>>;

    /// Fetch one machine (used to poll state transitions)
    async fn get_machine(&self, id: &MachineId) -> GatewayResult<Machine>;

    /// Fetch the tags of one machine
    async fn list_machine_tags(&self, id: &MachineId) -> GatewayResult<TagSet>;

    /// Ask the provider to stop a running machine
    async fn stop_machine(&self, id: &MachineId) -> GatewayResult<()>;

    /// Delete a stopped machine
    async fn delete_machine(&self, id: &MachineId) -> GatewayResult<()>;

    /// Ask a human to delete machines that the API cannot delete safely
    async fn request_deletion(&self, batch: &[Machine], notify_address: &str)
    -> GatewayResult<()>;
}

