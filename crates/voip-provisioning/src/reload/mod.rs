//! Making written configuration live on the telephony server.

mod coordinator;

pub use coordinator::{ReloadCoordinator, RetryPolicy, DEFAULT_HEALTH_TTL};

use ami_client::{AmiClient, AmiError};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a control channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel could not be reached; worth retrying.
    #[error("control channel unavailable: {0}")]
    Unavailable(String),

    /// The server answered and refused the reload.
    #[error("reload rejected: {0}")]
    Rejected(String),
}

impl From<AmiError> for ChannelError {
    fn from(e: AmiError) -> Self {
        if e.is_transient() {
            ChannelError::Unavailable(e.to_string())
        } else {
            ChannelError::Rejected(e.to_string())
        }
    }
}

/// Management interface of the telephony server.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Reload a single module without dropping calls or registrations.
    async fn reload(&self, module: &str) -> Result<(), ChannelError>;

    /// Whether the channel currently answers.
    async fn ping(&self) -> bool;
}

#[async_trait]
impl ControlChannel for AmiClient {
    async fn reload(&self, module: &str) -> Result<(), ChannelError> {
        AmiClient::reload(self, module).await.map_err(ChannelError::from)
    }

    async fn ping(&self) -> bool {
        self.health_check().await
    }
}
