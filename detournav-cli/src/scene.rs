//! JSON scene files.
//!
//! A scene lists the agents to build navmeshes for and the geometry of each
//! worldspace:
//!
//! ```text
//! {
//!   "agents": [{ "shape_type": "Aabb", "half_extents": [29.0, 29.0, 66.0] }],
//!   "worldspaces": [{
//!     "name": "sys::default",
//!     "heightfields": [{ "cell": [0, 0], "size": 8192, "plane": 0.0 }],
//!     "water": [{ "cell": [0, 0], "size": 8192, "level": -200.0 }],
//!     "objects": [{ "shape": { "box": [64.0, 64.0, 32.0] }, "position": [100.0, 100.0, 0.0] }]
//!   }]
//! }
//! ```
//!
//! Heightfields carry either a constant `plane` height or a square grid of
//! `heights` sampled across the cell. Omitting `size` on a plane or water
//! entry makes it cover the whole worldspace.

use std::path::Path;
use std::sync::Arc;

use glam::{IVec2, Quat, Vec3};
use serde::Deserialize;

use detournav::geometry::{ShapeType, INFINITE_CELL_SIZE};
use detournav::{
    AgentBounds, AreaType, CollisionShape, HeightfieldShape, HeightfieldSurface, ObjectTransform,
    TileCachedRecastMeshManager,
};

use crate::error::CliError;

#[derive(Debug, Deserialize)]
pub struct Scene {
    pub agents: Vec<AgentBounds>,
    #[serde(default)]
    pub worldspaces: Vec<WorldspaceScene>,
}

#[derive(Debug, Deserialize)]
pub struct WorldspaceScene {
    pub name: String,
    #[serde(default)]
    pub heightfields: Vec<HeightfieldEntry>,
    #[serde(default)]
    pub water: Vec<WaterEntry>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
pub struct HeightfieldEntry {
    pub cell: IVec2,
    #[serde(default = "infinite_cell_size")]
    pub size: i32,
    #[serde(default)]
    pub plane: Option<f32>,
    #[serde(default)]
    pub heights: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct WaterEntry {
    pub cell: IVec2,
    #[serde(default = "infinite_cell_size")]
    pub size: i32,
    pub level: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeEntry {
    /// Half extents of an axis aligned box.
    Box(Vec3),
    Mesh { vertices: Vec<Vec3>, indices: Vec<u32> },
}

#[derive(Debug, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub hash: Vec<u8>,
    #[serde(default)]
    pub avoid: bool,
}

#[derive(Debug, Deserialize)]
pub struct ObjectEntry {
    pub shape: ShapeEntry,
    #[serde(default)]
    pub source: Option<SourceEntry>,
    pub position: Vec3,
    #[serde(default = "identity")]
    pub rotation: Quat,
    #[serde(default = "unit_scale")]
    pub scale: f32,
    #[serde(default)]
    pub area: AreaType,
}

fn infinite_cell_size() -> i32 {
    INFINITE_CELL_SIZE
}

fn identity() -> Quat {
    Quat::IDENTITY
}

fn unit_scale() -> f32 {
    1.0
}

/// Geometry counts added for one worldspace.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppliedGeometry {
    pub heightfields: usize,
    pub water: usize,
    pub objects: usize,
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|message| CliError::Scene {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, String> {
        let scene: Scene = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if let Some(agent) = scene.agents.iter().find(|a| !a.is_valid()) {
            return Err(format!("invalid agent {}", agent));
        }
        Ok(scene)
    }
}

impl HeightfieldEntry {
    fn shape(&self) -> Result<HeightfieldShape, String> {
        match (&self.plane, &self.heights) {
            (Some(height), None) => Ok(HeightfieldShape::Plane { height: *height }),
            (None, Some(heights)) => {
                let samples = (heights.len() as f64).sqrt() as usize;
                HeightfieldSurface::new(heights.clone(), samples)
                    .map(HeightfieldShape::Surface)
                    .ok_or_else(|| {
                        format!(
                            "heightfield at {} needs a square grid of at least 2x2 heights",
                            self.cell
                        )
                    })
            }
            _ => Err(format!(
                "heightfield at {} must set exactly one of plane and heights",
                self.cell
            )),
        }
    }
}

impl ObjectEntry {
    fn collision_shape(&self) -> CollisionShape {
        let shape = match &self.shape {
            ShapeEntry::Box(half_extents) => CollisionShape::new_box(*half_extents),
            ShapeEntry::Mesh { vertices, indices } => {
                CollisionShape::new_triangle_mesh(vertices.clone(), indices.clone())
            }
        };
        match &self.source {
            Some(source) => {
                let shape_type = if source.avoid {
                    ShapeType::Avoid
                } else {
                    ShapeType::Collision
                };
                shape
                    .with_source(source.name.clone(), source.hash.clone())
                    .with_shape_type(shape_type)
            }
            None => shape,
        }
    }

    fn transform(&self) -> ObjectTransform {
        ObjectTransform::from_position(self.position)
            .with_rotation(self.rotation)
            .with_scale(self.scale)
    }
}

impl WorldspaceScene {
    /// Adds the worldspace geometry to `manager`.
    ///
    /// The manager must already be switched to this worldspace.
    pub fn apply(&self, manager: &TileCachedRecastMeshManager) -> Result<AppliedGeometry, String> {
        let mut applied = AppliedGeometry::default();

        for heightfield in &self.heightfields {
            let shape = heightfield.shape()?;
            if manager.add_heightfield(heightfield.cell, heightfield.size, shape, |_, _| {}) {
                applied.heightfields += 1;
            }
        }

        for water in &self.water {
            if manager.add_water(water.cell, water.size, water.level, |_, _| {}) {
                applied.water += 1;
            }
        }

        for (index, object) in self.objects.iter().enumerate() {
            let shape = object.collision_shape();
            let transform = object.transform();
            if !shape.is_valid() || !transform.is_valid() {
                return Err(format!("object {} has invalid geometry", index));
            }
            let id = manager.create_object_id();
            if manager.add_object(id, Arc::new(shape), transform, object.area, |_, _| {}) {
                applied.objects += 1;
            }
        }

        Ok(applied)
    }
}
