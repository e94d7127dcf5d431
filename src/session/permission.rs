//! Camera permission
//!
//! Head tracking needs the camera, so starting a session first asks for
//! permission. The request is asynchronous; the session loop receives the
//! answer as a separate input.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::PermissionPolicy;
use crate::error::PermissionError;

/// Source of camera permission decisions
pub trait PermissionProvider: Send + Sync {
    fn request_camera(&self) -> BoxFuture<'static, Result<(), PermissionError>>;
}

/// Answers permission requests from configuration
#[derive(Debug, Clone, Copy)]
pub struct PolicyPermission {
    policy: PermissionPolicy,
}

impl PolicyPermission {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self { policy }
    }
}

impl PermissionProvider for PolicyPermission {
    fn request_camera(&self) -> BoxFuture<'static, Result<(), PermissionError>> {
        match self.policy {
            PermissionPolicy::Grant => async { Ok(()) }.boxed(),
            PermissionPolicy::Deny => {
                async { Err(PermissionError::Denied("denied by configuration".into())) }.boxed()
            }
            PermissionPolicy::Device => async {
                if camera_present().await {
                    Ok(())
                } else {
                    Err(PermissionError::NoDevice)
                }
            }
            .boxed(),
        }
    }
}

/// Whether a video capture device is visible to this process
#[cfg(target_os = "linux")]
pub async fn camera_present() -> bool {
    let Ok(mut entries) = tokio::fs::read_dir("/dev").await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with("video") {
            return true;
        }
    }
    false
}

/// Whether a video capture device is visible to this process
#[cfg(not(target_os = "linux"))]
pub async fn camera_present() -> bool {
    // No portable check; the platform prompts when the tracker opens it
    true
}
