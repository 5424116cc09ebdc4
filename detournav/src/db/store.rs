//! SQLite-backed tile store.

use std::path::Path;

use rusqlite::{named_params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::compression::{compress, decompress};
use super::error::{DbError, DbResult};
use super::types::{ShapeId, Tile, TileData, TileId, TileVersion};
use crate::coord::{TilePosition, TilesPositionsRange};
use crate::geometry::ShapeType;

/// Path that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = r#"
    BEGIN TRANSACTION;

    CREATE TABLE IF NOT EXISTS tiles (
        tile_id INTEGER PRIMARY KEY,
        revision INTEGER NOT NULL DEFAULT 1,
        worldspace TEXT NOT NULL,
        tile_position_x INTEGER NOT NULL,
        tile_position_y INTEGER NOT NULL,
        version INTEGER NOT NULL,
        input BLOB,
        data BLOB
    );

    CREATE UNIQUE INDEX IF NOT EXISTS index_unique_tiles_by_worldspace_and_tile_position_and_input
        ON tiles (worldspace, tile_position_x, tile_position_y, input);

    CREATE INDEX IF NOT EXISTS index_tiles_by_worldspace_and_tile_position
        ON tiles (worldspace, tile_position_x, tile_position_y);

    CREATE TABLE IF NOT EXISTS shapes (
        shape_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        type INTEGER NOT NULL,
        hash BLOB NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS index_unique_shapes_by_name_and_type_and_hash
        ON shapes (name, type, hash);

    COMMIT;
"#;

const GET_MAX_TILE_ID: &str = "SELECT max(tile_id) FROM tiles";

const FIND_TILE: &str = r#"
    SELECT tile_id, version
      FROM tiles
     WHERE worldspace = :worldspace
       AND tile_position_x = :tile_position_x
       AND tile_position_y = :tile_position_y
       AND input = :input
"#;

const GET_TILE_DATA: &str = r#"
    SELECT tile_id, version, data
      FROM tiles
     WHERE worldspace = :worldspace
       AND tile_position_x = :tile_position_x
       AND tile_position_y = :tile_position_y
       AND input = :input
"#;

const INSERT_TILE: &str = r#"
    INSERT INTO tiles ( tile_id,  worldspace,  version,  tile_position_x,  tile_position_y,  input,  data)
           VALUES     (:tile_id, :worldspace, :version, :tile_position_x, :tile_position_y, :input, :data)
"#;

const UPDATE_TILE: &str = r#"
    UPDATE tiles
       SET version = :version,
           data = :data,
           revision = revision + 1
     WHERE tile_id = :tile_id
"#;

const DELETE_TILES_AT: &str = r#"
    DELETE FROM tiles
     WHERE worldspace = :worldspace
       AND tile_position_x = :tile_position_x
       AND tile_position_y = :tile_position_y
"#;

const DELETE_TILES_AT_EXCEPT: &str = r#"
    DELETE FROM tiles
     WHERE worldspace = :worldspace
       AND tile_position_x = :tile_position_x
       AND tile_position_y = :tile_position_y
       AND tile_id != :exclude_tile_id
"#;

const DELETE_TILES_OUTSIDE_RANGE: &str = r#"
    DELETE FROM tiles
     WHERE worldspace = :worldspace
       AND (   tile_position_x < :begin_tile_position_x
            OR tile_position_y < :begin_tile_position_y
            OR tile_position_x >= :end_tile_position_x
            OR tile_position_y >= :end_tile_position_y
           )
"#;

const GET_TILES_COUNT: &str = "SELECT count(*) FROM tiles";

const GET_MAX_SHAPE_ID: &str = "SELECT max(shape_id) FROM shapes";

const FIND_SHAPE_ID: &str = r#"
    SELECT shape_id
      FROM shapes
     WHERE name = :name
       AND type = :type
       AND hash = :hash
"#;

const INSERT_SHAPE: &str = r#"
    INSERT INTO shapes ( shape_id,  name,  type,  hash)
           VALUES      (:shape_id, :name, :type, :hash)
"#;

/// Size-bounded persistent store of built tiles.
///
/// Rows are keyed by `(worldspace, tile position, input)` where `input` is
/// the serialized description of everything the tile was built from. Both
/// input and data are stored zlib-compressed.
///
/// The file size limit is enforced by SQLite's `max_page_count`: a write
/// that would grow the file past it fails with
/// [`DbError::StorageExhausted`] and leaves earlier rows intact.
pub struct NavMeshDb {
    conn: Connection,
}

impl NavMeshDb {
    /// Opens or creates a database at `path`, limited to `max_file_size`
    /// bytes. [`IN_MEMORY`] opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>, max_file_size: u64) -> DbResult<Self> {
        let path = path.as_ref();
        let open_error = |source| DbError::Open {
            path: path.to_path_buf(),
            source,
        };

        let conn = if path == Path::new(IN_MEMORY) {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(open_error)?;
        conn.execute_batch(SCHEMA).map_err(open_error)?;

        let page_size: i64 = conn
            .pragma_query_value(None, "page_size", |row| row.get(0))
            .map_err(open_error)?;
        if page_size <= 0 {
            return Err(DbError::InvalidPageSize(page_size));
        }
        let page_size = page_size as u64;
        let max_page_count = max_file_size.div_ceil(page_size);
        let max_page_count = i64::try_from(max_page_count).unwrap_or(i64::MAX);
        let applied: i64 = conn
            .pragma_update_and_check(None, "max_page_count", max_page_count, |row| row.get(0))
            .map_err(open_error)?;

        info!(
            path = %path.display(),
            page_size,
            max_page_count = applied,
            "Opened navmesh database"
        );

        Ok(Self { conn })
    }

    /// Runs `f` inside one transaction, rolled back if `f` fails.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> DbResult<T>) -> DbResult<T> {
        let transaction = self.conn.unchecked_transaction()?;
        let result = f(self)?;
        transaction.commit()?;
        Ok(result)
    }

    /// Highest tile id in use, `0` for an empty table.
    pub fn get_max_tile_id(&self) -> DbResult<TileId> {
        let value: Option<i64> = self
            .conn
            .prepare_cached(GET_MAX_TILE_ID)?
            .query_row([], |row| row.get(0))?;
        Ok(TileId(value.unwrap_or(0)))
    }

    pub fn find_tile(
        &self,
        worldspace: &str,
        tile_position: TilePosition,
        input: &[u8],
    ) -> DbResult<Option<Tile>> {
        let input = compress(input)?;
        let tile = self
            .conn
            .prepare_cached(FIND_TILE)?
            .query_row(
                named_params! {
                    ":worldspace": worldspace,
                    ":tile_position_x": tile_position.x,
                    ":tile_position_y": tile_position.y,
                    ":input": input,
                },
                |row| {
                    Ok(Tile {
                        tile_id: TileId(row.get(0)?),
                        version: TileVersion(row.get(1)?),
                    })
                },
            )
            .optional()?;
        Ok(tile)
    }

    pub fn get_tile_data(
        &self,
        worldspace: &str,
        tile_position: TilePosition,
        input: &[u8],
    ) -> DbResult<Option<TileData>> {
        let input = compress(input)?;
        let row = self
            .conn
            .prepare_cached(GET_TILE_DATA)?
            .query_row(
                named_params! {
                    ":worldspace": worldspace,
                    ":tile_position_x": tile_position.x,
                    ":tile_position_y": tile_position.y,
                    ":input": input,
                },
                |row| {
                    Ok((
                        TileId(row.get(0)?),
                        TileVersion(row.get(1)?),
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(tile_id, version, data)| {
            Ok(TileData {
                tile_id,
                version,
                data: decompress(&data)?,
            })
        })
        .transpose()
    }

    /// Inserts a new row. Fails with [`DbError::DuplicateTile`] when a row
    /// with the same worldspace, position and input exists and with
    /// [`DbError::DuplicateTileId`] when the id is taken.
    pub fn insert_tile(
        &self,
        tile_id: TileId,
        worldspace: &str,
        tile_position: TilePosition,
        version: TileVersion,
        input: &[u8],
        data: &[u8],
    ) -> DbResult<usize> {
        let input = compress(input)?;
        let data = compress(data)?;
        let inserted = self.conn.prepare_cached(INSERT_TILE)?.execute(named_params! {
            ":tile_id": tile_id.0,
            ":worldspace": worldspace,
            ":version": version.0,
            ":tile_position_x": tile_position.x,
            ":tile_position_y": tile_position.y,
            ":input": input,
            ":data": data,
        })?;
        debug!(tile_id = tile_id.0, worldspace, tile = %tile_position, "Inserted navmesh tile");
        Ok(inserted)
    }

    /// Replaces version and data of an existing row and bumps its revision.
    pub fn update_tile(&self, tile_id: TileId, version: TileVersion, data: &[u8]) -> DbResult<usize> {
        let data = compress(data)?;
        let updated = self.conn.prepare_cached(UPDATE_TILE)?.execute(named_params! {
            ":tile_id": tile_id.0,
            ":version": version.0,
            ":data": data,
        })?;
        Ok(updated)
    }

    /// Deletes every row at a position.
    pub fn delete_tiles_at(&self, worldspace: &str, tile_position: TilePosition) -> DbResult<usize> {
        let deleted = self.conn.prepare_cached(DELETE_TILES_AT)?.execute(named_params! {
            ":worldspace": worldspace,
            ":tile_position_x": tile_position.x,
            ":tile_position_y": tile_position.y,
        })?;
        Ok(deleted)
    }

    /// Deletes every row at a position except `exclude_tile_id`.
    pub fn delete_tiles_at_except(
        &self,
        worldspace: &str,
        tile_position: TilePosition,
        exclude_tile_id: TileId,
    ) -> DbResult<usize> {
        let deleted = self
            .conn
            .prepare_cached(DELETE_TILES_AT_EXCEPT)?
            .execute(named_params! {
                ":worldspace": worldspace,
                ":tile_position_x": tile_position.x,
                ":tile_position_y": tile_position.y,
                ":exclude_tile_id": exclude_tile_id.0,
            })?;
        Ok(deleted)
    }

    /// Deletes every row of the worldspace outside `range`.
    pub fn delete_tiles_outside_range(
        &self,
        worldspace: &str,
        range: &TilesPositionsRange,
    ) -> DbResult<usize> {
        let deleted = self
            .conn
            .prepare_cached(DELETE_TILES_OUTSIDE_RANGE)?
            .execute(named_params! {
                ":worldspace": worldspace,
                ":begin_tile_position_x": range.begin.x,
                ":begin_tile_position_y": range.begin.y,
                ":end_tile_position_x": range.end.x,
                ":end_tile_position_y": range.end.y,
            })?;
        Ok(deleted)
    }

    pub fn get_tiles_count(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .prepare_cached(GET_TILES_COUNT)?
            .query_row([], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Highest shape id in use, `0` for an empty table.
    pub fn get_max_shape_id(&self) -> DbResult<ShapeId> {
        let value: Option<i64> = self
            .conn
            .prepare_cached(GET_MAX_SHAPE_ID)?
            .query_row([], |row| row.get(0))?;
        Ok(ShapeId(value.unwrap_or(0)))
    }

    pub fn find_shape_id(
        &self,
        name: &str,
        shape_type: ShapeType,
        hash: &[u8],
    ) -> DbResult<Option<ShapeId>> {
        let shape_id = self
            .conn
            .prepare_cached(FIND_SHAPE_ID)?
            .query_row(
                named_params! {
                    ":name": name,
                    ":type": shape_type as i64,
                    ":hash": hash,
                },
                |row| row.get(0).map(ShapeId),
            )
            .optional()?;
        Ok(shape_id)
    }

    pub fn insert_shape(
        &self,
        shape_id: ShapeId,
        name: &str,
        shape_type: ShapeType,
        hash: &[u8],
    ) -> DbResult<usize> {
        let inserted = self.conn.prepare_cached(INSERT_SHAPE)?.execute(named_params! {
            ":shape_id": shape_id.0,
            ":name": name,
            ":type": shape_type as i64,
            ":hash": hash,
        })?;
        Ok(inserted)
    }

    /// Rebuilds the file, reclaiming pages freed by deletions.
    pub fn vacuum(&self) -> DbResult<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}
