//! Persistent navmesh tile database.
//!
//! Built tiles are stored in SQLite so that later sessions, or other
//! processes sharing the file, can load them instead of rebuilding. Lookups
//! key on the serialized tile input, so a row is only reused for exactly
//! the geometry and settings it was built from.

mod compression;
mod error;
mod store;
mod types;

pub use compression::{compress, decompress};
pub use error::{DbError, DbResult};
pub use store::{NavMeshDb, IN_MEMORY};
pub use types::{ShapeId, Tile, TileData, TileId, TileVersion};
