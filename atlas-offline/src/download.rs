//! The region download coordinator.
//!
//! One coordinator drives one region: it fetches the style, walks it to
//! enumerate sprites, glyph ranges, sources, and tiles, and ensures each
//! required resource is present in the store, fetching it through the
//! online source when it is not. Progress counters stream to the region
//! observer after every change.
//!
//! Coordinators live on the database worker thread. Online completions are
//! posted back to the worker as commands, so every mutation of coordinator
//! state happens on that one thread.

use std::collections::HashMap;
use std::sync::Arc;

use atlas_geo::{tile_cover_with_source, SourceType, TileSetInfo};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::database::OfflineDatabase;
use crate::error::OfflineError;
use crate::region::{DownloadState, RegionDefinition, RegionObserver, RegionStatus};
use crate::resource::Resource;
use crate::response::Response;
use crate::source::{FileSource, RequestHandle};
use crate::style::{parse_style, parse_tile_json, Style};
use crate::worker::Command;

/// What to do with a resource's payload once it is available, beyond
/// storing and counting it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FollowUp {
    None,
    /// The resource is the region's style: walk it to enumerate the rest.
    ParseStyle,
    /// The resource is a TileJSON document: enumerate the tiles it serves.
    ParseTileJson {
        source_type: SourceType,
        tile_size: u16,
    },
}

pub(crate) struct RegionDownload {
    id: i64,
    definition: RegionDefinition,
    status: RegionStatus,
    observer: Option<Box<dyn RegionObserver>>,
    online: Arc<dyn FileSource>,
    commands: UnboundedSender<Command>,
    next_request_id: u64,
    /// Handles of in-flight online requests plus their follow-up actions.
    /// Clearing this cancels every underlying request.
    pending: HashMap<u64, (RequestHandle, FollowUp)>,
}

impl RegionDownload {
    pub(crate) fn new(
        id: i64,
        definition: RegionDefinition,
        online: Arc<dyn FileSource>,
        commands: UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            definition,
            status: RegionStatus::default(),
            observer: None,
            online,
            commands,
            next_request_id: 0,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn set_observer(&mut self, observer: Box<dyn RegionObserver>) {
        self.observer = Some(observer);
    }

    pub(crate) fn status(&self) -> RegionStatus {
        self.status
    }

    pub(crate) fn set_state(&mut self, db: &mut OfflineDatabase, state: DownloadState) {
        if self.status.download_state == state {
            return;
        }
        self.status.download_state = state;
        match state {
            DownloadState::Active => self.activate(db),
            DownloadState::Inactive => self.deactivate(),
        }
    }

    fn activate(&mut self, db: &mut OfflineDatabase) {
        debug!("Activating download for region {}", self.id);
        let style = Resource::style(self.definition.style_url.clone());
        self.ensure(db, style, FollowUp::ParseStyle);
    }

    fn deactivate(&mut self) {
        debug!(
            "Deactivating download for region {}, dropping {} in-flight requests",
            self.id,
            self.pending.len()
        );
        self.pending.clear();
    }

    /// Ensures one resource is stored, fetching it when missing.
    ///
    /// The required counter is bumped before the store lookup, so observers
    /// may briefly see `required > completed` even for fully cached
    /// regions.
    fn ensure(&mut self, db: &mut OfflineDatabase, resource: Resource, follow_up: FollowUp) {
        self.status.required_resource_count += 1;
        self.notify();

        if let Some(response) = db.get_region_resource(self.id, &resource) {
            self.finish(db, follow_up, &response);
            return;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let commands = self.commands.clone();
        let region_id = self.id;
        let fetched = resource.clone();
        let handle = self.online.request(
            resource,
            Box::new(move |response| {
                let _ = commands.send(Command::FetchComplete {
                    region_id,
                    request_id,
                    resource: fetched.clone(),
                    response,
                });
            }),
        );
        self.pending.insert(request_id, (handle, follow_up));
    }

    /// Handles an online completion posted back by the request callback.
    pub(crate) fn fetch_complete(
        &mut self,
        db: &mut OfflineDatabase,
        request_id: u64,
        resource: Resource,
        response: Response,
    ) {
        // A completion that raced deactivation has no pending entry and is
        // discarded; the resource stays outstanding for the next activation.
        let Some((_handle, follow_up)) = self.pending.remove(&request_id) else {
            return;
        };

        if response.error.is_some() {
            // Dropped without counting: the online source owns retry for
            // transient failures, and a later activation cycle picks the
            // resource up again.
            return;
        }

        db.put_region_resource(self.id, &resource, &response);
        self.finish(db, follow_up, &response);
    }

    fn finish(&mut self, db: &mut OfflineDatabase, follow_up: FollowUp, response: &Response) {
        self.run_follow_up(db, follow_up, response);
        self.status.completed_resource_count += 1;
        if let Some(data) = &response.data {
            self.status.completed_resource_size += data.len() as u64;
        }
        self.notify();
    }

    fn run_follow_up(&mut self, db: &mut OfflineDatabase, follow_up: FollowUp, response: &Response) {
        match follow_up {
            FollowUp::None => {}
            FollowUp::ParseStyle => {
                let Some(data) = &response.data else {
                    self.notify_error(OfflineError::style_parse("style response has no body"));
                    return;
                };
                match parse_style(data) {
                    Ok(style) => self.walk_style(db, style),
                    Err(error) => self.notify_error(error),
                }
            }
            FollowUp::ParseTileJson {
                source_type,
                tile_size,
            } => {
                let Some(data) = &response.data else {
                    self.notify_error(OfflineError::tile_json_parse(
                        "TileJSON response has no body",
                    ));
                    return;
                };
                match parse_tile_json(data) {
                    Ok(info) => self.ensure_tiles(db, source_type, tile_size, &info),
                    Err(error) => self.notify_error(error),
                }
            }
        }
    }

    /// Enumerates everything the style requires: sprite sheets, one glyph
    /// range per font stack and 256-glyph block, and every source.
    fn walk_style(&mut self, db: &mut OfflineDatabase, style: Style) {
        if let Some(sprite_url) = &style.sprite_url {
            let pixel_ratio = self.definition.pixel_ratio;
            self.ensure(
                db,
                Resource::sprite_image(sprite_url, pixel_ratio),
                FollowUp::None,
            );
            self.ensure(
                db,
                Resource::sprite_json(sprite_url, pixel_ratio),
                FollowUp::None,
            );
        }

        if let Some(glyph_url) = &style.glyph_url {
            for font_stack in &style.font_stacks {
                for block in 0u32..256 {
                    self.ensure(
                        db,
                        Resource::glyphs(glyph_url, font_stack, block * 256),
                        FollowUp::None,
                    );
                }
            }
        }

        for source in style.sources {
            match source.source_type {
                SourceType::Vector | SourceType::Raster => {
                    if let Some(info) = source.tile_set {
                        self.ensure_tiles(db, source.source_type, source.tile_size, &info);
                    } else if let Some(url) = source.url {
                        self.ensure(
                            db,
                            Resource::source(url),
                            FollowUp::ParseTileJson {
                                source_type: source.source_type,
                                tile_size: source.tile_size,
                            },
                        );
                    }
                }
                SourceType::GeoJson => {
                    if let Some(url) = source.url {
                        self.ensure(db, Resource::source(url), FollowUp::None);
                    }
                }
                SourceType::Video | SourceType::Annotations => {}
            }
        }
    }

    fn ensure_tiles(
        &mut self,
        db: &mut OfflineDatabase,
        source_type: SourceType,
        tile_size: u16,
        info: &TileSetInfo,
    ) {
        let Some(template) = info.tiles.first().cloned() else {
            return;
        };
        let pixel_ratio = self.definition.pixel_ratio;
        for tile in tile_cover_with_source(
            &self.definition.bounds,
            self.definition.min_zoom,
            self.definition.max_zoom,
            source_type,
            tile_size,
            info,
        ) {
            self.ensure(
                db,
                Resource::tile(&template, pixel_ratio, tile.z, tile.x, tile.y),
                FollowUp::None,
            );
        }
    }

    fn notify(&mut self) {
        if let Some(observer) = &mut self.observer {
            observer.status_changed(self.status);
        }
    }

    fn notify_error(&mut self, error: OfflineError) {
        warn!("Region {} download error: {}", self.id, error);
        if let Some(observer) = &mut self.observer {
            observer.error(error);
        }
    }
}
