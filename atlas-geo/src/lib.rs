//! Atlas Geo - Geographic primitives and tile cover computation
//!
//! This crate provides the coordinate types shared across the atlas
//! workspace and the tile cover algorithm that turns a geographic bounding
//! box and zoom range into the exact set of Web Mercator tiles needed to
//! cover it.
//!
//! # Example
//!
//! ```rust
//! use atlas_geo::{tile_cover, LatLngBounds};
//!
//! // The whole world at zoom 1 is covered by four tiles.
//! let tiles = tile_cover(&LatLngBounds::world(), 1, 1);
//! assert_eq!(tiles.len(), 4);
//! ```

mod cover;
mod geo;
mod tile;

pub use cover::{tile_cover, tile_cover_with_source, SourceType, TileSetInfo};
pub use geo::{LatLng, LatLngBounds, LATITUDE_MAX};
pub use tile::{TileId, MAX_ZOOM};
