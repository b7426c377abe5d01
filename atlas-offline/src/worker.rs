//! The database worker thread.
//!
//! A single dedicated thread owns the offline database and every download
//! coordinator; the embedded SQL engine is only ever used from here. All
//! public operations arrive as commands over an unbounded channel, which
//! preserves posting order per sender. Commands that answer do so over a
//! oneshot channel; dropping the receiving end simply discards the answer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::database::OfflineDatabase;
use crate::download::RegionDownload;
use crate::error::OfflineError;
use crate::region::{
    DownloadState, Region, RegionDefinition, RegionMetadata, RegionObserver, RegionStatus,
};
use crate::resource::Resource;
use crate::response::Response;
use crate::source::FileSource;

pub(crate) enum Command {
    Get {
        resource: Resource,
        reply: oneshot::Sender<Option<Response>>,
    },
    Put {
        resource: Resource,
        response: Response,
    },
    CreateRegion {
        definition: RegionDefinition,
        metadata: RegionMetadata,
        reply: oneshot::Sender<Result<Region, OfflineError>>,
    },
    ListRegions {
        reply: oneshot::Sender<Result<Vec<Region>, OfflineError>>,
    },
    DeleteRegion {
        region: Region,
        reply: oneshot::Sender<Result<(), OfflineError>>,
    },
    SetRegionObserver {
        region_id: i64,
        observer: Box<dyn RegionObserver>,
    },
    SetRegionDownloadState {
        region_id: i64,
        state: DownloadState,
    },
    GetRegionStatus {
        region_id: i64,
        reply: oneshot::Sender<Result<RegionStatus, OfflineError>>,
    },
    /// Posted by an online request callback when its fetch finished.
    FetchComplete {
        region_id: i64,
        request_id: u64,
        resource: Resource,
        response: Response,
    },
    Shutdown,
}

pub(crate) struct StorageWorker {
    db: OfflineDatabase,
    downloads: HashMap<i64, RegionDownload>,
    online: Arc<dyn FileSource>,
    commands: UnboundedSender<Command>,
}

impl StorageWorker {
    /// Opens the database and spawns the worker thread, returning the
    /// command channel feeding it.
    pub(crate) fn spawn(
        cache_path: &str,
        online: Arc<dyn FileSource>,
    ) -> Result<UnboundedSender<Command>, OfflineError> {
        let db = OfflineDatabase::open(cache_path)?;
        let (sender, mut receiver) = unbounded_channel();

        let mut worker = StorageWorker {
            db,
            downloads: HashMap::new(),
            online,
            commands: sender.clone(),
        };
        std::thread::Builder::new()
            .name("offline-db".to_string())
            .spawn(move || {
                while let Some(command) = receiver.blocking_recv() {
                    if !worker.handle(command) {
                        break;
                    }
                }
                debug!("Offline database worker stopped");
            })
            .map_err(|err| OfflineError::worker(err.to_string()))?;

        Ok(sender)
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Get { resource, reply } => {
                let _ = reply.send(self.db.get(&resource));
            }
            Command::Put { resource, response } => {
                self.db.put(&resource, &response);
            }
            Command::CreateRegion {
                definition,
                metadata,
                reply,
            } => {
                let _ = reply.send(self.db.create_region(&definition, &metadata));
            }
            Command::ListRegions { reply } => {
                let _ = reply.send(self.db.list_regions());
            }
            Command::DeleteRegion { region, reply } => {
                // Dropping the coordinator first cancels its in-flight
                // requests before the rows disappear.
                self.downloads.remove(&region.id());
                let _ = reply.send(self.db.delete_region(region));
            }
            Command::SetRegionObserver {
                region_id,
                observer,
            } => match self.ensure_download(region_id) {
                Ok(()) => {
                    if let Some(download) = self.downloads.get_mut(&region_id) {
                        download.set_observer(observer);
                    }
                }
                Err(err) => warn!("Cannot observe region {}: {}", region_id, err),
            },
            Command::SetRegionDownloadState { region_id, state } => {
                match self.ensure_download(region_id) {
                    Ok(()) => {
                        let Self { db, downloads, .. } = self;
                        if let Some(download) = downloads.get_mut(&region_id) {
                            download.set_state(db, state);
                        }
                    }
                    Err(err) => warn!("Cannot change state of region {}: {}", region_id, err),
                }
            }
            Command::GetRegionStatus { region_id, reply } => {
                let result = self.ensure_download(region_id).map(|()| {
                    self.downloads
                        .get(&region_id)
                        .map(RegionDownload::status)
                        .unwrap_or_default()
                });
                let _ = reply.send(result);
            }
            Command::FetchComplete {
                region_id,
                request_id,
                resource,
                response,
            } => {
                // The coordinator may be gone already; the completion is
                // then stale and dropped.
                let Self { db, downloads, .. } = self;
                if let Some(download) = downloads.get_mut(&region_id) {
                    download.fetch_complete(db, request_id, resource, response);
                }
            }
            Command::Shutdown => return false,
        }
        true
    }

    /// Lazily constructs the coordinator for a region from its stored
    /// definition.
    fn ensure_download(&mut self, region_id: i64) -> Result<(), OfflineError> {
        if self.downloads.contains_key(&region_id) {
            return Ok(());
        }
        let definition = self.db.region_definition(region_id)?;
        self.downloads.insert(
            region_id,
            RegionDownload::new(
                region_id,
                definition,
                Arc::clone(&self.online),
                self.commands.clone(),
            ),
        );
        Ok(())
    }
}
