//! Offline regions: definitions, metadata, status, and observers.

use atlas_geo::{LatLng, LatLngBounds};
use serde::{Deserialize, Serialize};

use crate::error::OfflineError;

/// Describes the resource set of an offline region: a style plus a tile
/// pyramid over a bounding box.
///
/// `min_zoom` must be ≥ 0 and `max_zoom` ≥ `min_zoom`. `max_zoom` may be
/// positive infinity, meaning "up to whatever each source offers".
/// `pixel_ratio` must be ≥ 0 and is typically 1.0 or 2.0.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDefinition {
    pub style_url: String,
    pub bounds: LatLngBounds,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub pixel_ratio: f32,
}

impl RegionDefinition {
    pub fn new(
        style_url: impl Into<String>,
        bounds: LatLngBounds,
        min_zoom: f64,
        max_zoom: f64,
        pixel_ratio: f32,
    ) -> Self {
        Self {
            style_url: style_url.into(),
            bounds,
            min_zoom,
            max_zoom,
            pixel_ratio,
        }
    }
}

/// Opaque region metadata. The store performs no interpretation; keeping the
/// format out of the core preserves on-disk portability.
pub type RegionMetadata = Vec<u8>;

// The blob layout is private to the store. An unbounded max zoom is encoded
// as null because JSON has no infinity literal.
#[derive(Serialize, Deserialize)]
struct DefinitionBlob {
    style_url: String,
    south: f64,
    west: f64,
    north: f64,
    east: f64,
    min_zoom: f64,
    max_zoom: Option<f64>,
    pixel_ratio: f32,
}

pub(crate) fn encode_definition(definition: &RegionDefinition) -> Result<Vec<u8>, OfflineError> {
    let blob = DefinitionBlob {
        style_url: definition.style_url.clone(),
        south: definition.bounds.south(),
        west: definition.bounds.west(),
        north: definition.bounds.north(),
        east: definition.bounds.east(),
        min_zoom: definition.min_zoom,
        max_zoom: definition.max_zoom.is_finite().then_some(definition.max_zoom),
        pixel_ratio: definition.pixel_ratio,
    };
    serde_json::to_vec(&blob).map_err(|err| OfflineError::database(err.to_string()))
}

pub(crate) fn decode_definition(data: &[u8]) -> Result<RegionDefinition, OfflineError> {
    let blob: DefinitionBlob =
        serde_json::from_slice(data).map_err(|err| OfflineError::database(err.to_string()))?;
    Ok(RegionDefinition {
        style_url: blob.style_url,
        bounds: LatLngBounds::hull(
            LatLng::new(blob.south, blob.west),
            LatLng::new(blob.north, blob.east),
        ),
        min_zoom: blob.min_zoom,
        max_zoom: blob.max_zoom.unwrap_or(f64::INFINITY),
        pixel_ratio: blob.pixel_ratio,
    })
}

/// A region handle: the registry row id plus the decoded definition and
/// metadata.
///
/// Deliberately not `Clone`: deleting a region consumes the handle, so stale
/// handles to a removed row cannot linger.
#[derive(Debug)]
pub struct Region {
    id: i64,
    definition: RegionDefinition,
    metadata: RegionMetadata,
}

impl Region {
    pub(crate) fn new(id: i64, definition: RegionDefinition, metadata: RegionMetadata) -> Self {
        Self {
            id,
            definition,
            metadata,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn definition(&self) -> &RegionDefinition {
        &self.definition
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }
}

/// Whether a region is downloading.
///
/// Independent of whether the complete resource set is already available;
/// check [`RegionStatus::complete`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadState {
    #[default]
    Inactive,
    Active,
}

/// Progress counters for one region download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionStatus {
    pub download_state: DownloadState,
    /// Resources fully downloaded and ready for offline use.
    pub completed_resource_count: u64,
    /// Cumulative size in bytes of the completed resources.
    pub completed_resource_size: u64,
    /// Resources known to be required. A lower bound while the style is
    /// still being walked: the style must be fetched before the full set
    /// can be enumerated.
    pub required_resource_count: u64,
}

impl RegionStatus {
    pub fn complete(&self) -> bool {
        self.completed_resource_count == self.required_resource_count
    }
}

/// Receives region download progress.
///
/// Both methods run on the database worker thread; implementations must
/// forward to their own thread before doing real work.
pub trait RegionObserver: Send {
    /// Called after every change to the status counters.
    fn status_changed(&mut self, _status: RegionStatus) {}

    /// Called when a style or TileJSON document cannot be parsed. The
    /// download stays active; a later activation cycle retries the
    /// outstanding resources.
    fn error(&mut self, _error: OfflineError) {}
}
