//! Axis-aligned bounding boxes.

use glam::{Vec2, Vec3};

/// World-space axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing all points, `None` for no points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |aabb, point| Self {
            min: aabb.min.min(point),
            max: aabb.max.max(point),
        }))
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Whether `other` lies fully inside this box.
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    pub fn horizontal_min(&self) -> Vec2 {
        self.min.truncate()
    }

    pub fn horizontal_max(&self) -> Vec2 {
        self.max.truncate()
    }
}

/// Bounding box accumulated over the moves of one object.
///
/// Moves that stay inside the area already covered since the last navmesh
/// change cannot alter the built tiles, so they are not reported. The
/// accumulation restarts whenever the navmesh reports a new change revision.
#[derive(Clone, Copy, Debug)]
pub struct CumulativeAabb {
    last_revision: u64,
    aabb: Aabb,
}

impl CumulativeAabb {
    pub fn new(revision: u64, aabb: Aabb) -> Self {
        Self {
            last_revision: revision,
            aabb,
        }
    }

    /// Records a new box. Returns `true` when it extends the covered area
    /// or the revision changed.
    pub fn update(&mut self, revision: u64, aabb: Aabb) -> bool {
        if self.last_revision != revision {
            self.last_revision = revision;
            self.aabb = aabb;
            return true;
        }
        if self.aabb.contains(&aabb) {
            return false;
        }
        self.aabb = self.aabb.merge(&aabb);
        true
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_at(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn test_from_points() {
        let aabb = Aabb::from_points([Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 2.0, 0.0)]).unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_cumulative_ignores_moves_inside_covered_area() {
        let mut aabb = CumulativeAabb::new(1, unit_at(0.0));
        assert!(aabb.update(1, unit_at(2.0)));
        assert!(!aabb.update(1, unit_at(1.0)));
        assert!(!aabb.update(1, unit_at(0.0)));
    }

    #[test]
    fn test_cumulative_resets_on_new_revision() {
        let mut aabb = CumulativeAabb::new(1, unit_at(0.0));
        assert!(aabb.update(1, unit_at(2.0)));
        assert!(aabb.update(2, unit_at(0.0)));
        assert_eq!(*aabb.aabb(), unit_at(0.0));
        assert!(aabb.update(2, unit_at(1.0)));
    }
}
