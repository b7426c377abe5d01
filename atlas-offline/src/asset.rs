//! The asset file source: bundled read-only files under `asset://` URLs.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::resource::Resource;
use crate::response::{ErrorReason, Response};
use crate::source::{deliver, new_slot, FileSource, RequestHandle, ResponseCallback};

/// URL scheme routed to the asset source instead of the network.
pub const ASSET_PROTOCOL: &str = "asset://";

/// Serves `asset://` URLs from a root directory.
pub struct AssetFileSource {
    root: PathBuf,
    runtime: Handle,
}

impl AssetFileSource {
    /// Must be created on a tokio runtime; reads are spawned onto it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            runtime: Handle::current(),
        }
    }
}

impl FileSource for AssetFileSource {
    fn request(&self, resource: Resource, callback: ResponseCallback) -> RequestHandle {
        let slot = new_slot(callback);
        let delivery = Arc::clone(&slot);
        let path = self
            .root
            .join(resource.url.trim_start_matches(ASSET_PROTOCOL));
        let task = self.runtime.spawn(async move {
            let response = match tokio::fs::read(&path).await {
                Ok(data) => Response::from_data(data),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Response::not_found(),
                Err(err) => Response::from_error(ErrorReason::Other, err.to_string()),
            };
            deliver(&delivery, response);
        });
        RequestHandle::new(slot, Some(task.abort_handle()))
    }
}
