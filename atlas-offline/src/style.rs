//! Minimal style and TileJSON readers.
//!
//! The downloader only needs to enumerate sub-resources: the sprite base
//! URL, the glyph URL template, the font stacks referenced by symbol
//! layers, and each source's tile templates or document URL. Everything
//! else in a style document is ignored.

use std::collections::HashMap;

use atlas_geo::{SourceType, TileSetInfo};
use serde::Deserialize;

use crate::error::OfflineError;

/// Font stack used when a symbol layer does not name one.
pub(crate) const DEFAULT_FONT_STACK: &str = "Open Sans Regular,Arial Unicode MS Regular";

const DEFAULT_SOURCE_MAX_ZOOM: f64 = 22.0;
const DEFAULT_TILE_SIZE: u16 = 512;

/// The sub-resource view of a parsed style document.
#[derive(Debug, Default)]
pub(crate) struct Style {
    pub sprite_url: Option<String>,
    pub glyph_url: Option<String>,
    /// Distinct font stacks referenced by symbol layers, comma-joined.
    pub font_stacks: Vec<String>,
    pub sources: Vec<StyleSource>,
}

/// One source entry of a style document.
#[derive(Debug)]
pub(crate) struct StyleSource {
    pub source_type: SourceType,
    /// TileJSON URL for tiled sources, document URL for GeoJSON sources.
    pub url: Option<String>,
    /// Inline tile set, when the style embeds the templates directly.
    pub tile_set: Option<TileSetInfo>,
    pub tile_size: u16,
}

#[derive(Deserialize)]
struct RawStyle {
    #[serde(default)]
    sprite: Option<String>,
    #[serde(default)]
    glyphs: Option<String>,
    #[serde(default)]
    sources: HashMap<String, RawSource>,
    #[serde(default)]
    layers: Vec<RawLayer>,
}

#[derive(Deserialize)]
struct RawSource {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    tiles: Option<Vec<String>>,
    #[serde(default)]
    minzoom: Option<f64>,
    #[serde(default)]
    maxzoom: Option<f64>,
    #[serde(default, rename = "tileSize")]
    tile_size: Option<u16>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawLayer {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    layout: Option<RawLayout>,
}

#[derive(Deserialize)]
struct RawLayout {
    #[serde(default, rename = "text-font")]
    text_font: Option<Vec<String>>,
}

pub(crate) fn parse_style(data: &[u8]) -> Result<Style, OfflineError> {
    let raw: RawStyle =
        serde_json::from_slice(data).map_err(|err| OfflineError::style_parse(err.to_string()))?;

    let mut font_stacks: Vec<String> = Vec::new();
    for layer in &raw.layers {
        if layer.kind != "symbol" {
            continue;
        }
        let stack = layer
            .layout
            .as_ref()
            .and_then(|layout| layout.text_font.as_ref())
            .map(|fonts| fonts.join(","))
            .unwrap_or_else(|| DEFAULT_FONT_STACK.to_string());
        if !font_stacks.contains(&stack) {
            font_stacks.push(stack);
        }
    }

    let mut sources = Vec::new();
    for raw_source in raw.sources.into_values() {
        let source_type = match raw_source.kind.as_str() {
            "vector" => SourceType::Vector,
            "raster" => SourceType::Raster,
            "geojson" => SourceType::GeoJson,
            "video" => SourceType::Video,
            _ => SourceType::Annotations,
        };
        let tile_size = raw_source.tile_size.unwrap_or(DEFAULT_TILE_SIZE);
        let tile_set = raw_source.tiles.map(|tiles| TileSetInfo {
            tiles,
            min_zoom: raw_source.minzoom.unwrap_or(0.0),
            max_zoom: raw_source.maxzoom.unwrap_or(DEFAULT_SOURCE_MAX_ZOOM),
            tile_size,
        });
        // GeoJSON sources name their document in `data`; only a string is a
        // URL, inline feature collections need no fetching.
        let url = match source_type {
            SourceType::GeoJson => raw_source
                .data
                .as_ref()
                .and_then(|data| data.as_str())
                .map(str::to_string),
            _ => raw_source.url,
        };
        sources.push(StyleSource {
            source_type,
            url,
            tile_set,
            tile_size,
        });
    }

    Ok(Style {
        sprite_url: raw.sprite,
        glyph_url: raw.glyphs,
        font_stacks,
        sources,
    })
}

#[derive(Deserialize)]
struct RawTileJson {
    tiles: Vec<String>,
    #[serde(default)]
    minzoom: Option<f64>,
    #[serde(default)]
    maxzoom: Option<f64>,
}

pub(crate) fn parse_tile_json(data: &[u8]) -> Result<TileSetInfo, OfflineError> {
    let raw: RawTileJson = serde_json::from_slice(data)
        .map_err(|err| OfflineError::tile_json_parse(err.to_string()))?;
    Ok(TileSetInfo {
        tiles: raw.tiles,
        min_zoom: raw.minzoom.unwrap_or(0.0),
        max_zoom: raw.maxzoom.unwrap_or(DEFAULT_SOURCE_MAX_ZOOM),
        tile_size: DEFAULT_TILE_SIZE,
    })
}
