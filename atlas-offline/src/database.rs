//! The embedded offline database: resource cache plus region registry.
//!
//! One SQLite file holds every cached response and the region bookkeeping.
//! The whole database is owned by the worker thread, so no statement ever
//! runs concurrently. Statements are prepared lazily and cached on the
//! connection for the lifetime of the store.
//!
//! Read failures degrade to cache misses and write failures are dropped,
//! both with an error log: a caller cannot recover from a failed cache
//! write by retrying, and one broken row must not take down a region
//! download.

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, error, warn};

use crate::error::OfflineError;
use crate::region::{decode_definition, encode_definition, Region, RegionDefinition};
use crate::resource::{Resource, ResourceKind, TileData};
use crate::response::{ErrorReason, Response, ResponseError};

/// Bumped whenever the schema changes; mismatching files are recreated.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = include_str!("schema.sql");

/// Path of an ephemeral in-memory store.
pub const MEMORY_PATH: &str = ":memory:";

pub struct OfflineDatabase {
    conn: Connection,
}

impl OfflineDatabase {
    /// Opens the database at `path`, or an ephemeral one for
    /// [`MEMORY_PATH`].
    ///
    /// A file that is missing is created. A file that is not a SQLite
    /// database or carries a different schema version is deleted and
    /// recreated; previously cached data is lost, which is acceptable for
    /// a cache.
    pub fn open(path: &str) -> Result<Self, OfflineError> {
        if path == MEMORY_PATH {
            return Self::initialize(Connection::open_in_memory()?);
        }

        if Path::new(path).exists() {
            match Self::open_compatible(path) {
                Ok(Some(db)) => return Ok(db),
                Ok(None) | Err(_) => {
                    warn!("Removing existing incompatible offline database");
                    let _ = std::fs::remove_file(path);
                }
            }
        }

        Self::initialize(Connection::open(path)?)
    }

    /// Opens an existing file and checks its schema version. `Ok(None)`
    /// means the file is a valid database of the wrong version; `Err`
    /// covers files SQLite cannot read at all.
    fn open_compatible(path: &str) -> Result<Option<Self>, rusqlite::Error> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != SCHEMA_VERSION {
            return Ok(None);
        }
        Ok(Some(Self { conn }))
    }

    fn initialize(conn: Connection) -> Result<Self, OfflineError> {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self { conn })
    }

    /// Looks up a cached response. A stored NotFound negative entry is a
    /// hit. Read failures are logged and reported as a miss.
    pub fn get(&mut self, resource: &Resource) -> Option<Response> {
        let result = match &resource.tile_data {
            Some(tile) => self.get_tile(tile),
            None => self.get_resource(resource),
        };
        match result {
            Ok(response) => response,
            Err(err) => {
                error!("Offline database read failed for {}: {}", resource.url, err);
                None
            }
        }
    }

    /// Persists a response.
    ///
    /// Responses carrying a transient error (connection, server) are
    /// silently dropped: caching them would poison future lookups. Other
    /// error responses are only stored as NotFound negative entries.
    /// A body-less, error-less response refreshes the freshness columns of
    /// an existing entry without replacing its body. Write failures are
    /// logged and dropped.
    pub fn put(&mut self, resource: &Resource, response: &Response) {
        if let Some(error) = &response.error {
            if error.reason != ErrorReason::NotFound {
                debug!("Not caching failed response for {}: {}", resource.url, error.message);
                return;
            }
        }
        let result = match &resource.tile_data {
            Some(tile) => self.put_tile(tile, response),
            None => self.put_resource(resource, response),
        };
        if let Err(err) = result {
            error!("Offline database write failed for {}: {}", resource.url, err);
        }
    }

    /// Like [`get`](Self::get), additionally marking the resource as
    /// required by the region on a hit.
    pub fn get_region_resource(&mut self, region_id: i64, resource: &Resource) -> Option<Response> {
        let response = self.get(resource);
        if response.is_some() {
            self.mark_region_resource(region_id, resource);
        }
        response
    }

    /// Like [`put`](Self::put), additionally marking the resource as
    /// required by the region.
    pub fn put_region_resource(&mut self, region_id: i64, resource: &Resource, response: &Response) {
        self.put(resource, response);
        self.mark_region_resource(region_id, resource);
    }

    pub fn create_region(
        &mut self,
        definition: &RegionDefinition,
        metadata: &[u8],
    ) -> Result<Region, OfflineError> {
        let blob = encode_definition(definition)?;
        self.conn
            .prepare_cached("INSERT INTO regions (definition, metadata) VALUES (?1, ?2)")?
            .execute((&blob, metadata))?;
        Ok(Region::new(
            self.conn.last_insert_rowid(),
            definition.clone(),
            metadata.to_vec(),
        ))
    }

    pub fn list_regions(&mut self) -> Result<Vec<Region>, OfflineError> {
        let mut statement = self
            .conn
            .prepare_cached("SELECT id, definition, metadata FROM regions")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;
        let mut regions = Vec::new();
        for row in rows {
            let (id, definition, metadata) = row?;
            regions.push(Region::new(id, decode_definition(&definition)?, metadata));
        }
        Ok(regions)
    }

    /// Removes the region row and its association rows. Cached resources
    /// the region referenced are retained; they keep serving plain cache
    /// lookups and are reclaimed only when the file is deleted.
    pub fn delete_region(&mut self, region: Region) -> Result<(), OfflineError> {
        self.conn
            .prepare_cached("DELETE FROM region_resources WHERE region_id = ?1")?
            .execute([region.id()])?;
        self.conn
            .prepare_cached("DELETE FROM region_tiles WHERE region_id = ?1")?
            .execute([region.id()])?;
        self.conn
            .prepare_cached("DELETE FROM regions WHERE id = ?1")?
            .execute([region.id()])?;
        Ok(())
    }

    pub fn region_definition(&mut self, region_id: i64) -> Result<RegionDefinition, OfflineError> {
        let blob: Option<Vec<u8>> = self
            .conn
            .prepare_cached("SELECT definition FROM regions WHERE id = ?1")?
            .query_row([region_id], |row| row.get(0))
            .optional()?;
        match blob {
            Some(blob) => decode_definition(&blob),
            None => Err(OfflineError::RegionNotFound(region_id)),
        }
    }

    fn get_resource(&mut self, resource: &Resource) -> rusqlite::Result<Option<Response>> {
        self.conn
            .prepare_cached(
                "SELECT data, not_found, modified, expires, etag FROM resources
                 WHERE url = ?1 AND kind = ?2",
            )?
            .query_row((&resource.url, resource.kind.code()), response_from_row)
            .optional()
    }

    fn get_tile(&mut self, tile: &TileData) -> rusqlite::Result<Option<Response>> {
        self.conn
            .prepare_cached(
                "SELECT data, not_found, modified, expires, etag FROM tiles
                 WHERE url_template = ?1 AND pixel_ratio = ?2 AND z = ?3 AND x = ?4 AND y = ?5",
            )?
            .query_row(
                (&tile.url_template, tile.pixel_ratio, tile.z, tile.x, tile.y),
                response_from_row,
            )
            .optional()
    }

    fn put_resource(&mut self, resource: &Resource, response: &Response) -> rusqlite::Result<()> {
        if response.is_refresh() {
            self.conn
                .prepare_cached(
                    "UPDATE resources SET modified = ?3, expires = ?4, etag = ?5
                     WHERE url = ?1 AND kind = ?2",
                )?
                .execute((
                    &resource.url,
                    resource.kind.code(),
                    response.modified.map(|dt| dt.timestamp()),
                    response.expires.map(|dt| dt.timestamp()),
                    &response.etag,
                ))?;
            return Ok(());
        }
        self.conn
            .prepare_cached(
                "INSERT INTO resources (url, kind, data, not_found, modified, expires, etag)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (url, kind) DO UPDATE SET
                     data = excluded.data,
                     not_found = excluded.not_found,
                     modified = excluded.modified,
                     expires = excluded.expires,
                     etag = excluded.etag",
            )?
            .execute((
                &resource.url,
                resource.kind.code(),
                response.data.as_deref(),
                response.error.is_some(),
                response.modified.map(|dt| dt.timestamp()),
                response.expires.map(|dt| dt.timestamp()),
                &response.etag,
            ))?;
        Ok(())
    }

    fn put_tile(&mut self, tile: &TileData, response: &Response) -> rusqlite::Result<()> {
        if response.is_refresh() {
            self.conn
                .prepare_cached(
                    "UPDATE tiles SET modified = ?6, expires = ?7, etag = ?8
                     WHERE url_template = ?1 AND pixel_ratio = ?2 AND z = ?3 AND x = ?4 AND y = ?5",
                )?
                .execute((
                    &tile.url_template,
                    tile.pixel_ratio,
                    tile.z,
                    tile.x,
                    tile.y,
                    response.modified.map(|dt| dt.timestamp()),
                    response.expires.map(|dt| dt.timestamp()),
                    &response.etag,
                ))?;
            return Ok(());
        }
        self.conn
            .prepare_cached(
                "INSERT INTO tiles (url_template, pixel_ratio, z, x, y, data, not_found,
                                    modified, expires, etag)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (url_template, pixel_ratio, z, x, y) DO UPDATE SET
                     data = excluded.data,
                     not_found = excluded.not_found,
                     modified = excluded.modified,
                     expires = excluded.expires,
                     etag = excluded.etag",
            )?
            .execute((
                &tile.url_template,
                tile.pixel_ratio,
                tile.z,
                tile.x,
                tile.y,
                response.data.as_deref(),
                response.error.is_some(),
                response.modified.map(|dt| dt.timestamp()),
                response.expires.map(|dt| dt.timestamp()),
                &response.etag,
            ))?;
        Ok(())
    }

    fn mark_region_resource(&mut self, region_id: i64, resource: &Resource) {
        let result = match &resource.tile_data {
            Some(tile) => self
                .conn
                .prepare_cached(
                    "INSERT OR IGNORE INTO region_tiles (region_id, tile_id)
                     SELECT ?1, id FROM tiles
                     WHERE url_template = ?2 AND pixel_ratio = ?3 AND z = ?4 AND x = ?5 AND y = ?6",
                )
                .and_then(|mut statement| {
                    statement.execute((
                        region_id,
                        &tile.url_template,
                        tile.pixel_ratio,
                        tile.z,
                        tile.x,
                        tile.y,
                    ))
                }),
            None => self
                .conn
                .prepare_cached(
                    "INSERT OR IGNORE INTO region_resources (region_id, resource_id)
                     SELECT ?1, id FROM resources WHERE url = ?2 AND kind = ?3",
                )
                .and_then(|mut statement| {
                    statement.execute((region_id, &resource.url, resource.kind.code()))
                }),
        };
        if let Err(err) = result {
            error!(
                "Failed to associate {} with region {}: {}",
                resource.url, region_id, err
            );
        }
    }
}

fn response_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Response> {
    let data: Option<Vec<u8>> = row.get(0)?;
    let not_found: bool = row.get(1)?;
    let modified: Option<i64> = row.get(2)?;
    let expires: Option<i64> = row.get(3)?;
    let etag: Option<String> = row.get(4)?;
    Ok(Response {
        data: data.map(Bytes::from),
        modified: modified.and_then(timestamp),
        expires: expires.and_then(timestamp),
        etag,
        error: not_found.then(|| ResponseError::not_found("cached not-found entry")),
    })
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}
