//! The top-level file service.
//!
//! Routes `asset://` URLs to the bundled asset source and everything else
//! through an offline-first lookup: the cached response is delivered if
//! present, and unless the service was forced offline a revalidating
//! online request follows, whose answer both reaches the caller and is
//! written back to the store. Region operations are forwarded to the
//! database worker.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::asset::{AssetFileSource, ASSET_PROTOCOL};
use crate::error::OfflineError;
use crate::http::HttpFileSource;
use crate::region::{
    DownloadState, Region, RegionDefinition, RegionMetadata, RegionObserver, RegionStatus,
};
use crate::resource::Resource;
use crate::response::Response;
use crate::source::{deliver, new_slot, FileSource, RequestHandle, ResponseCallback};
use crate::worker::{Command, StorageWorker};

/// Entry point of the offline subsystem.
///
/// Owns the database worker thread for the store at `cache_path` (use
/// [`MEMORY_PATH`](crate::MEMORY_PATH) for an ephemeral store) and the
/// file sources serving requests. Must be created on a tokio runtime;
/// request plumbing is spawned onto it.
pub struct FileService {
    commands: UnboundedSender<Command>,
    online: Arc<dyn FileSource>,
    assets: AssetFileSource,
    offline: Arc<AtomicBool>,
    access_token: Arc<RwLock<String>>,
    runtime: Handle,
}

impl FileService {
    /// Creates a service backed by the HTTP online source.
    pub fn new(cache_path: &str, asset_root: impl Into<PathBuf>) -> Result<Self, OfflineError> {
        let access_token = Arc::new(RwLock::new(String::new()));
        let online: Arc<dyn FileSource> =
            Arc::new(HttpFileSource::new(Arc::clone(&access_token))?);
        Self::build(cache_path, asset_root.into(), online, access_token)
    }

    /// Creates a service with an injected online source; used by tests and
    /// embedders with their own transport.
    pub fn with_online_source(
        cache_path: &str,
        asset_root: impl Into<PathBuf>,
        online: Arc<dyn FileSource>,
    ) -> Result<Self, OfflineError> {
        Self::build(
            cache_path,
            asset_root.into(),
            online,
            Arc::new(RwLock::new(String::new())),
        )
    }

    fn build(
        cache_path: &str,
        asset_root: PathBuf,
        online: Arc<dyn FileSource>,
        access_token: Arc<RwLock<String>>,
    ) -> Result<Self, OfflineError> {
        let commands = StorageWorker::spawn(cache_path, Arc::clone(&online))?;
        Ok(Self {
            commands,
            online,
            assets: AssetFileSource::new(asset_root),
            offline: Arc::new(AtomicBool::new(false)),
            access_token,
            runtime: Handle::current(),
        })
    }

    /// Requests a resource, offline-first.
    ///
    /// The callback may fire twice: once with the cached response and once
    /// with the revalidated online response. Dropping the returned handle
    /// cancels both the pending store lookup and the online request; a
    /// cancelled request never invokes the callback.
    pub fn request(
        &self,
        resource: Resource,
        callback: impl FnMut(Response) + Send + 'static,
    ) -> RequestHandle {
        self.request_boxed(resource, Box::new(callback))
    }

    fn request_boxed(&self, resource: Resource, callback: ResponseCallback) -> RequestHandle {
        if resource.url.starts_with(ASSET_PROTOCOL) {
            return self.assets.request(resource, callback);
        }

        let slot = new_slot(callback);
        let mut handle = RequestHandle::new(Arc::clone(&slot), None);
        let chained = handle.chained();

        let (reply, lookup) = oneshot::channel();
        let _ = self.commands.send(Command::Get {
            resource: resource.clone(),
            reply,
        });

        let online = Arc::clone(&self.online);
        let offline = Arc::clone(&self.offline);
        let commands = self.commands.clone();
        let task = self.runtime.spawn(async move {
            let cached = lookup.await.ok().flatten();

            let mut revalidation = resource;
            if let Some(cached) = &cached {
                revalidation = revalidation.with_revalidation_hints(cached);
            }

            if !offline.load(Ordering::Acquire) {
                let stored = revalidation.clone();
                let online_delivery = Arc::clone(&slot);
                let online_handle = online.request(
                    revalidation,
                    Box::new(move |response| {
                        let _ = commands.send(Command::Put {
                            resource: stored.clone(),
                            response: response.clone(),
                        });
                        deliver(&online_delivery, response);
                    }),
                );
                // Park the online handle where the outer handle's drop
                // reaches it. If the caller already cancelled, the parked
                // slot is orphaned and the handle drops when this task ends.
                *chained.lock().unwrap() = Some(online_handle);
            }

            // Deliver the cached hit last: the callback may drop the
            // request handle, which must not tear down the online request
            // scheduling above.
            if let Some(cached) = cached {
                deliver(&slot, cached);
            }
        });
        handle.set_abort(task.abort_handle());
        handle
    }

    /// Stores a response directly, bypassing any network interaction.
    pub fn put(&self, resource: Resource, response: Response) {
        let _ = self.commands.send(Command::Put { resource, response });
    }

    /// Forces all subsequent requests to be answered from the store alone.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::Release);
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().unwrap() = token.into();
    }

    pub fn access_token(&self) -> String {
        self.access_token.read().unwrap().clone()
    }

    /// Registers a new region with the given definition and metadata.
    pub async fn create_region(
        &self,
        definition: RegionDefinition,
        metadata: RegionMetadata,
    ) -> Result<Region, OfflineError> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::CreateRegion {
            definition,
            metadata,
            reply,
        })?;
        answer.await.map_err(worker_gone)?
    }

    /// Lists every registered region.
    pub async fn list_regions(&self) -> Result<Vec<Region>, OfflineError> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::ListRegions { reply })?;
        answer.await.map_err(worker_gone)?
    }

    /// Deletes a region, consuming its handle. The region's coordinator is
    /// torn down first, cancelling any in-flight requests. Cached resources
    /// are retained for plain cache lookups.
    pub async fn delete_region(&self, region: Region) -> Result<(), OfflineError> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::DeleteRegion { region, reply })?;
        answer.await.map_err(worker_gone)?
    }

    /// Sets the observer receiving a region's download progress. The
    /// observer is invoked on the worker thread and must trampoline.
    pub fn set_region_observer(&self, region: &Region, observer: Box<dyn RegionObserver>) {
        let _ = self.commands.send(Command::SetRegionObserver {
            region_id: region.id(),
            observer,
        });
    }

    /// Starts or stops a region's download.
    pub fn set_region_download_state(&self, region: &Region, state: DownloadState) {
        let _ = self.commands.send(Command::SetRegionDownloadState {
            region_id: region.id(),
            state,
        });
    }

    /// The region's current download status.
    pub async fn region_status(&self, region: &Region) -> Result<RegionStatus, OfflineError> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::GetRegionStatus {
            region_id: region.id(),
            reply,
        })?;
        answer.await.map_err(worker_gone)?
    }

    fn send(&self, command: Command) -> Result<(), OfflineError> {
        self.commands
            .send(command)
            .map_err(|_| OfflineError::worker("database worker is gone"))
    }
}

impl Drop for FileService {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn worker_gone<E>(_: E) -> OfflineError {
    OfflineError::worker("database worker dropped the reply")
}
