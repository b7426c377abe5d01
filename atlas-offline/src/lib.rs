//! Atlas Offline - Resource store and region downloader
//!
//! This crate provides the offline subsystem of the atlas map client: a
//! persistent cache of network resources backed by an embedded SQL
//! database, a registry of named geographic regions whose full resource
//! set should be pre-fetched, and the coordinator that downloads those
//! regions while streaming progress to observers.
//!
//! # Key pieces
//!
//! - [`FileService`] - the entry point: offline-first resource requests,
//!   `asset://` dispatch, and the region API
//! - [`OfflineDatabase`] - the SQLite-backed store owned by the worker
//!   thread
//! - [`Resource`] / [`Response`] - the cache's keys and values
//! - [`RegionObserver`] - download progress delivery
//!
//! # Example
//!
//! ```no_run
//! use atlas_offline::{FileService, Resource};
//!
//! # async fn example() -> Result<(), atlas_offline::OfflineError> {
//! let service = FileService::new("offline.db", "assets")?;
//! let _handle = service.request(
//!     Resource::style("https://example.com/style.json"),
//!     |response| {
//!         println!("{} bytes", response.data.map(|d| d.len()).unwrap_or(0));
//!     },
//! );
//! # Ok(())
//! # }
//! ```

// Modules
mod asset;
mod database;
mod download;
mod error;
mod http;
mod region;
mod resource;
mod response;
mod service;
mod source;
pub mod stub;
mod style;
mod worker;

// Public exports
pub use asset::{AssetFileSource, ASSET_PROTOCOL};
pub use database::{OfflineDatabase, MEMORY_PATH};
pub use error::OfflineError;
pub use http::{HttpFileSource, RetryConfig};
pub use region::{
    DownloadState, Region, RegionDefinition, RegionMetadata, RegionObserver, RegionStatus,
};
pub use resource::{Resource, ResourceKind, TileData};
pub use response::{ErrorReason, Response, ResponseError};
pub use service::FileService;
pub use source::{FileSource, RequestHandle, ResponseCallback};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use super::{
        DownloadState, ErrorReason, FileService, FileSource, OfflineDatabase, OfflineError, Region,
        RegionDefinition, RegionMetadata, RegionObserver, RegionStatus, RequestHandle, Resource,
        ResourceKind, Response, ResponseError, MEMORY_PATH,
    };
}
