//! Microphone-backed recognition permission.

use async_trait::async_trait;
use tracing::{debug, warn};
use voicehue_core::Authorization;
use voicehue_recognize::PermissionProvider;

/// Grants recognition when an input device is present. Without one the
/// session could never record, so the answer is Restricted.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalPermission;

#[async_trait]
impl PermissionProvider for CpalPermission {
    async fn request_authorization(&self) -> Authorization {
        // Device enumeration can block on some hosts.
        match tokio::task::spawn_blocking(voicehue_audio::has_input_device).await {
            Ok(true) => Authorization::Authorized,
            Ok(false) => {
                warn!("no audio input device found");
                Authorization::Restricted
            }
            Err(e) => {
                debug!("input device lookup failed: {:?}", e);
                Authorization::Undetermined
            }
        }
    }
}
