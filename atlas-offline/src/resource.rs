//! Resource identities for cacheable items.
//!
//! A [`Resource`] names one cacheable item: a style document, a sprite
//! sheet, a glyph range, a source description, or a single tile. Resources
//! are the keys of the offline store; tiles are keyed by their template and
//! coordinates, everything else by kind and URL.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::response::Response;

/// What a cached item is, as far as the store and downloader care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Unknown,
    Style,
    Source,
    Tile,
    Glyphs,
    SpriteImage,
    SpriteJson,
}

impl ResourceKind {
    /// Stable integer used in the database schema.
    pub(crate) fn code(self) -> i64 {
        match self {
            ResourceKind::Unknown => 0,
            ResourceKind::Style => 1,
            ResourceKind::Source => 2,
            ResourceKind::Tile => 3,
            ResourceKind::Glyphs => 4,
            ResourceKind::SpriteImage => 5,
            ResourceKind::SpriteJson => 6,
        }
    }

    pub(crate) fn from_code(code: i64) -> Self {
        match code {
            1 => ResourceKind::Style,
            2 => ResourceKind::Source,
            3 => ResourceKind::Tile,
            4 => ResourceKind::Glyphs,
            5 => ResourceKind::SpriteImage,
            6 => ResourceKind::SpriteJson,
            _ => ResourceKind::Unknown,
        }
    }
}

/// The coordinates identifying a tile resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileData {
    /// Tile URL template with `{z}`, `{x}`, `{y}` placeholders.
    pub url_template: String,
    /// Device pixel ratio the tile was requested for.
    pub pixel_ratio: u8,
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

/// Identifies one cacheable item, optionally carrying revalidation hints for
/// the next outgoing request.
///
/// The hints (`prior_*`) are write-only inputs to the online source; they
/// never participate in resource identity.
#[derive(Debug, Clone)]
pub struct Resource {
    pub kind: ResourceKind,
    /// Canonical request URL. For tiles this is the expanded template.
    pub url: String,
    /// Present iff `kind` is [`ResourceKind::Tile`].
    pub tile_data: Option<TileData>,
    pub prior_modified: Option<DateTime<Utc>>,
    pub prior_expires: Option<DateTime<Utc>>,
    pub prior_etag: Option<String>,
}

impl Resource {
    fn plain(kind: ResourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            tile_data: None,
            prior_modified: None,
            prior_expires: None,
            prior_etag: None,
        }
    }

    pub fn unknown(url: impl Into<String>) -> Self {
        Self::plain(ResourceKind::Unknown, url)
    }

    pub fn style(url: impl Into<String>) -> Self {
        Self::plain(ResourceKind::Style, url)
    }

    pub fn source(url: impl Into<String>) -> Self {
        Self::plain(ResourceKind::Source, url)
    }

    /// Sprite sheet image for the given base URL; high-density displays get
    /// the `@2x` variant.
    pub fn sprite_image(base_url: &str, pixel_ratio: f32) -> Self {
        Self::plain(
            ResourceKind::SpriteImage,
            format!("{}{}.png", base_url, density_suffix(pixel_ratio)),
        )
    }

    /// Sprite index JSON for the given base URL.
    pub fn sprite_json(base_url: &str, pixel_ratio: f32) -> Self {
        Self::plain(
            ResourceKind::SpriteJson,
            format!("{}{}.json", base_url, density_suffix(pixel_ratio)),
        )
    }

    /// One 256-glyph block of a font stack. `start` is the first glyph of
    /// the block and must be a multiple of 256.
    pub fn glyphs(url_template: &str, font_stack: &str, start: u32) -> Self {
        let range = format!("{}-{}", start, start + 255);
        let url = url_template
            .replace("{fontstack}", font_stack)
            .replace("{range}", &range);
        Self::plain(ResourceKind::Glyphs, url)
    }

    /// A single tile of a tiled source.
    pub fn tile(url_template: &str, pixel_ratio: f32, z: u8, x: u32, y: u32) -> Self {
        let url = url_template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());
        Self {
            kind: ResourceKind::Tile,
            url,
            tile_data: Some(TileData {
                url_template: url_template.to_string(),
                pixel_ratio: if pixel_ratio > 1.0 { 2 } else { 1 },
                x,
                y,
                z,
            }),
            prior_modified: None,
            prior_expires: None,
            prior_etag: None,
        }
    }

    /// Copies freshness metadata of a cached response into the revalidation
    /// hints so the origin can answer with a short not-modified response.
    pub fn with_revalidation_hints(mut self, cached: &Response) -> Self {
        self.prior_modified = cached.modified;
        self.prior_expires = cached.expires;
        self.prior_etag = cached.etag.clone();
        self
    }
}

// Identity deliberately excludes the revalidation hints: tiles compare by
// template and coordinates, everything else by kind and URL.
impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        match (&self.tile_data, &other.tile_data) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.kind == other.kind && self.url == other.url,
            _ => false,
        }
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.tile_data {
            Some(tile) => tile.hash(state),
            None => {
                self.kind.hash(state);
                self.url.hash(state);
            }
        }
    }
}

fn density_suffix(pixel_ratio: f32) -> &'static str {
    if pixel_ratio > 1.0 {
        "@2x"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprite_urls() {
        let image = Resource::sprite_image("http://example.com/sprite", 1.0);
        assert_eq!(image.url, "http://example.com/sprite.png");
        let image = Resource::sprite_image("http://example.com/sprite", 2.0);
        assert_eq!(image.url, "http://example.com/sprite@2x.png");
        let json = Resource::sprite_json("http://example.com/sprite", 2.0);
        assert_eq!(json.url, "http://example.com/sprite@2x.json");
    }

    #[test]
    fn test_glyph_url_expansion() {
        let resource = Resource::glyphs(
            "http://example.com/fonts/{fontstack}/{range}.pbf",
            "Open Sans Regular",
            256,
        );
        assert_eq!(
            resource.url,
            "http://example.com/fonts/Open Sans Regular/256-511.pbf"
        );
    }

    #[test]
    fn test_tile_url_expansion() {
        let resource = Resource::tile("http://example.com/{z}-{x}-{y}.pbf", 1.0, 2, 1, 3);
        assert_eq!(resource.url, "http://example.com/2-1-3.pbf");
        let tile = resource.tile_data.as_ref().unwrap();
        assert_eq!((tile.z, tile.x, tile.y, tile.pixel_ratio), (2, 1, 3, 1));
    }

    #[test]
    fn test_tile_identity_ignores_hints() {
        let a = Resource::tile("http://example.com/{z}-{x}-{y}.pbf", 1.0, 0, 0, 0);
        let b = a.clone().with_revalidation_hints(&Response {
            etag: Some("xyz".into()),
            ..Response::default()
        });
        assert_eq!(a, b);
    }

    #[test]
    fn test_plain_identity_is_kind_and_url() {
        let a = Resource::style("http://example.com/style.json");
        let b = Resource::source("http://example.com/style.json");
        assert_ne!(a, b);
        assert_eq!(a, Resource::style("http://example.com/style.json"));
    }
}
