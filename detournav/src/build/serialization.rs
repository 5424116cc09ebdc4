//! Binary encodings of tile inputs and built tile data.
//!
//! The input encoding is the database lookup key of a tile: it describes
//! everything the tile is built from, with objects referenced by persisted
//! shape id instead of by raw triangles. Both encodings start with a magic
//! and a format version so stale rows are detected and rebuilt.

use serde::{Deserialize, Serialize};

use super::{BuildError, PreparedNavMeshData};
use crate::agent::AgentBounds;
use crate::db::{ShapeId, TileVersion};
use crate::geometry::{AreaType, ObjectTransform};
use crate::recast::{CellWater, FlatHeightfield, Heightfield, RecastMesh};
use crate::settings::RecastSettings;

/// Format version of [`serialize_data`] output.
pub const NAVMESH_FORMAT_VERSION: TileVersion = TileVersion(1);

const INPUT_MAGIC: [u8; 4] = *b"dnvi";
const INPUT_VERSION: u32 = 1;
const DATA_MAGIC: [u8; 4] = *b"dnvd";

/// Object of a tile input, referenced by persisted shape.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DbRefGeometryObject {
    pub shape_id: i64,
    pub transform: ObjectTransform,
    pub area_type: AreaType,
}

impl DbRefGeometryObject {
    pub fn new(shape_id: ShapeId, transform: ObjectTransform, area_type: AreaType) -> Self {
        Self {
            shape_id: shape_id.0,
            transform,
            area_type,
        }
    }
}

#[derive(Serialize)]
struct TileInput<'a> {
    magic: [u8; 4],
    version: u32,
    settings: &'a RecastSettings,
    agent: &'a AgentBounds,
    water: &'a [CellWater],
    heightfields: &'a [Heightfield],
    flat_heightfields: &'a [FlatHeightfield],
    objects: &'a [DbRefGeometryObject],
}

#[derive(Serialize, Deserialize)]
struct TileDataRecord {
    magic: [u8; 4],
    version: i64,
    data: PreparedNavMeshData,
}

/// Encodes the database key of a tile.
///
/// Triangles are not part of the key; `objects` identifies them.
pub fn serialize_input(
    settings: &RecastSettings,
    agent: &AgentBounds,
    recast_mesh: &RecastMesh,
    objects: &[DbRefGeometryObject],
) -> Result<Vec<u8>, BuildError> {
    let input = TileInput {
        magic: INPUT_MAGIC,
        version: INPUT_VERSION,
        settings,
        agent,
        water: recast_mesh.water(),
        heightfields: recast_mesh.heightfields(),
        flat_heightfields: recast_mesh.flat_heightfields(),
        objects,
    };
    Ok(bincode::serialize(&input)?)
}

pub fn serialize_data(data: &PreparedNavMeshData) -> Result<Vec<u8>, BuildError> {
    let record = TileDataRecord {
        magic: DATA_MAGIC,
        version: NAVMESH_FORMAT_VERSION.0,
        data: data.clone(),
    };
    Ok(bincode::serialize(&record)?)
}

/// Decodes tile data, rejecting foreign or outdated encodings.
pub fn deserialize_data(bytes: &[u8]) -> Result<PreparedNavMeshData, BuildError> {
    let record: TileDataRecord = bincode::deserialize(bytes)?;
    if record.magic != DATA_MAGIC {
        return Err(BuildError::InvalidData("bad magic".to_string()));
    }
    if record.version != NAVMESH_FORMAT_VERSION.0 {
        return Err(BuildError::InvalidData(format!(
            "unsupported version {}",
            record.version
        )));
    }
    let data = record.data;
    if data.heights.len() != data.size * data.size || data.areas.len() != data.heights.len() {
        return Err(BuildError::InvalidData(format!(
            "{} heights and {} areas for size {}",
            data.heights.len(),
            data.areas.len(),
            data.size
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CollisionShapeType;
    use crate::coord::TilePosition;
    use crate::recast::{Mesh, Version};
    use glam::{IVec2, Vec2, Vec3};

    fn mesh(height: f32) -> RecastMesh {
        RecastMesh::new(
            Version::new(1, 2),
            Mesh::default(),
            Vec::new(),
            Vec::new(),
            vec![FlatHeightfield {
                cell_position: IVec2::ZERO,
                cell_size: 8192,
                height,
            }],
            Vec::new(),
        )
    }

    fn agent() -> AgentBounds {
        AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(29.0, 29.0, 66.0))
    }

    fn data() -> PreparedNavMeshData {
        PreparedNavMeshData {
            user_id: 3,
            tile: TilePosition::new(1, -1),
            cell_size: 2.0,
            size: 2,
            origin: Vec2::new(4.0, 4.0),
            heights: vec![1.0, 2.0, 3.0, 4.0],
            areas: vec![AreaType::Ground; 4],
        }
    }

    #[test]
    fn test_input_ignores_mesh_version() {
        let settings = RecastSettings::default();
        let a = serialize_input(&settings, &agent(), &mesh(0.0), &[]).unwrap();
        let b = serialize_input(&settings, &agent(), &mesh(0.0), &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_input_depends_on_everything_else() {
        let settings = RecastSettings::default();
        let base = serialize_input(&settings, &agent(), &mesh(0.0), &[]).unwrap();

        assert_ne!(base, serialize_input(&settings, &agent(), &mesh(1.0), &[]).unwrap());
        let other_settings = settings.clone().with_tile_size(32);
        assert_ne!(base, serialize_input(&other_settings, &agent(), &mesh(0.0), &[]).unwrap());
        let other_agent = AgentBounds::new(CollisionShapeType::Cylinder, Vec3::new(29.0, 29.0, 66.0));
        assert_ne!(base, serialize_input(&settings, &other_agent, &mesh(0.0), &[]).unwrap());
        let object = DbRefGeometryObject::new(ShapeId(1), ObjectTransform::default(), AreaType::Ground);
        assert_ne!(base, serialize_input(&settings, &agent(), &mesh(0.0), &[object]).unwrap());
    }

    #[test]
    fn test_data_keeps_user_id() {
        let decoded = deserialize_data(&serialize_data(&data()).unwrap()).unwrap();
        assert_eq!(decoded, data());
    }

    #[test]
    fn test_data_rejects_foreign_bytes() {
        assert!(deserialize_data(b"junk").is_err());

        let mut bytes = serialize_data(&data()).unwrap();
        bytes[0] = b'x';
        assert!(matches!(deserialize_data(&bytes), Err(BuildError::InvalidData(_))));
    }
}
