//! Speech recognition permission.

use async_trait::async_trait;
use voicehue_core::Authorization;

/// Asks the platform whether speech recognition may be used. Implementations
/// may complete on any thread.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request_authorization(&self) -> Authorization;
}

/// Answers every request with a fixed status.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub Authorization);

#[async_trait]
impl PermissionProvider for StaticPermission {
    async fn request_authorization(&self) -> Authorization {
        self.0
    }
}
