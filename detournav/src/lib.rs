//! DetourNav - tile-based navigation mesh pipeline
//!
//! This library builds walkable navigation meshes tile by tile from world
//! geometry, keeps built tiles in a bounded memory cache and a persistent
//! SQLite store, rebuilds changed tiles on a background worker pool and
//! answers path queries against the tiles committed so far.
//!
//! The entry point is [`Navigator`].

pub mod agent;
pub mod build;
pub mod cache;
pub mod coord;
pub mod db;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod manager;
pub mod navigator;
pub mod navmesh;
pub mod recast;
pub mod settings;
pub mod stats;
pub mod updater;

pub use agent::{AgentBounds, CollisionShapeType};
pub use build::{BuildError, GridTileBuilder, PreparedNavMeshData, TileBuilder};
pub use cache::{CachedNavMeshData, NavMeshTilesCache, NavMeshTilesCacheStats};
pub use coord::{TilePosition, TilesPositionsRange};
pub use db::{DbError, DbResult, NavMeshDb};
pub use error::{NavigatorError, NavigatorResult};
pub use geometry::{AreaType, CollisionShape, HeightfieldShape, HeightfieldSurface, ObjectTransform};
pub use manager::{ChangeType, ObjectId, TileCachedRecastMeshManager};
pub use navigator::Navigator;
pub use navmesh::query::{Flags, PathResult, Status};
pub use navmesh::{NavMeshCacheItem, SharedNavMeshCacheItem, UpdateNavMeshStatus};
pub use recast::{RecastMesh, Version};
pub use settings::Settings;
pub use stats::NavigatorStats;
pub use updater::{AsyncNavMeshUpdater, Listener, NoopListener, WaitConditionType};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
