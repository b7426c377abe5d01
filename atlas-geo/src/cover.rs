//! Tile cover computation.
//!
//! Turns a geographic bounding box and a zoom range into the set of tiles
//! required to fully cover it, either for a generic map view or for a
//! specific tile source whose tile size and zoom limits constrain the
//! effective zoom range.

use std::f64::consts::PI;

use crate::geo::{LatLngBounds, LATITUDE_MAX};
use crate::tile::{TileId, MAX_ZOOM};

/// The reference tile size; sources serving smaller tiles render one zoom
/// level deeper than the map's nominal zoom.
const REFERENCE_TILE_SIZE: f64 = 512.0;

/// The kind of data a style source provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Vector,
    Raster,
    GeoJson,
    Video,
    Annotations,
}

/// The subset of a tile source description the downloader reads: tile URL
/// templates and the zoom range the source actually serves.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSetInfo {
    /// Tile URL templates with `{z}`, `{x}`, `{y}` placeholders.
    pub tiles: Vec<String>,
    /// Lowest zoom level the source serves.
    pub min_zoom: f64,
    /// Highest zoom level the source serves.
    pub max_zoom: f64,
    /// Tile size in pixels the source is rendered at.
    pub tile_size: u16,
}

impl Default for TileSetInfo {
    fn default() -> Self {
        Self {
            tiles: Vec::new(),
            min_zoom: 0.0,
            max_zoom: 22.0,
            tile_size: REFERENCE_TILE_SIZE as u16,
        }
    }
}

/// Projects a longitude to the normalized [0, 1] x axis. Deliberately not
/// clamped so longitudes in a wrapped copy of the world project past 1.
#[inline]
fn longitude_x(longitude: f64) -> f64 {
    (longitude + 180.0) / 360.0
}

/// Projects a latitude to the normalized [0, 1] y axis (0 at the north
/// edge). The caller is responsible for clamping to the Web Mercator band.
#[inline]
fn latitude_y(latitude: f64) -> f64 {
    let lat_rad = latitude * PI / 180.0;
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0
}

/// Returns the tiles covering `bounds` at every integer zoom in
/// `[min_z, max_z]`.
///
/// Bounds that are empty or lie entirely outside the Web Mercator latitude
/// band produce no tiles. Columns beyond the antimeridian are wrapped into
/// the canonical world with their wrap count recorded.
pub fn tile_cover(bounds: &LatLngBounds, min_z: u8, max_z: u8) -> Vec<TileId> {
    let mut tiles = Vec::new();
    for z in min_z..=max_z.min(MAX_ZOOM) {
        cover_zoom_level(bounds, z, &mut tiles);
    }
    tiles
}

/// Returns the tiles a specific source needs to cover `bounds` over the
/// caller's zoom range.
///
/// The effective zoom range accounts for the source type (raster zooms are
/// rounded to the nearest level, vector zooms truncated), the tile size
/// (256 px sources render one level deeper than the nominal zoom), and the
/// zoom range the source itself serves. An empty intersection yields no
/// tiles.
pub fn tile_cover_with_source(
    bounds: &LatLngBounds,
    min_z: f64,
    max_z: f64,
    source_type: SourceType,
    tile_size: u16,
    info: &TileSetInfo,
) -> Vec<TileId> {
    let min_z = covering_zoom_level(min_z, source_type, tile_size).max(info.min_zoom);
    let max_z = covering_zoom_level(max_z, source_type, tile_size).min(info.max_zoom);
    if max_z < min_z {
        return Vec::new();
    }
    tile_cover(
        bounds,
        min_z.max(0.0) as u8,
        max_z.min(MAX_ZOOM as f64) as u8,
    )
}

/// The integer zoom level a source renders at for a nominal map zoom.
fn covering_zoom_level(zoom: f64, source_type: SourceType, tile_size: u16) -> f64 {
    let zoom = zoom + (REFERENCE_TILE_SIZE / tile_size as f64).log2();
    match source_type {
        SourceType::Raster => zoom.round(),
        _ => zoom.floor(),
    }
}

fn cover_zoom_level(bounds: &LatLngBounds, z: u8, tiles: &mut Vec<TileId>) {
    if bounds.is_empty() || bounds.south() > LATITUDE_MAX || bounds.north() < -LATITUDE_MAX {
        return;
    }

    let north = bounds.north().min(LATITUDE_MAX);
    let south = bounds.south().max(-LATITUDE_MAX);
    let scale = (1u64 << z) as f64;
    let rows = 1i64 << z;

    // Project the corners and take the covering integer ranges. A box
    // narrower than one tile still covers the tile it falls into.
    let x0 = (longitude_x(bounds.west()) * scale).floor() as i64;
    let x1 = ((longitude_x(bounds.east()) * scale).ceil() as i64).max(x0 + 1);
    let y0 = ((latitude_y(north) * scale).floor() as i64).max(0);
    let y1 = (((latitude_y(south) * scale).ceil() as i64).max(y0 + 1)).min(rows);

    for y in y0..y1 {
        for x in x0..x1 {
            tiles.push(TileId::new(z, x, y as u32));
        }
    }
}
