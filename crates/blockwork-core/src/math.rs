//! Math utilities and helpers.
//!
//! Ray and box intersection use the slab method with a small skin so that rays
//! grazing a face still register. The `t` reported back is recomputed without
//! the skin.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Tolerance added to slab entry/exit bounds.
pub const SKIN: f32 = 1e-4;

/// Entries this far behind the origin still count as hits.
pub const ENTRY_TOLERANCE: f32 = -1e-3;

/// One of the six faces of a block.
///
/// Z is up: `Bottom` faces -Z and `Top` faces +Z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockSide {
    /// -X
    West = 0,
    /// +X
    East = 1,
    /// -Y
    South = 2,
    /// +Y
    North = 3,
    /// -Z
    Bottom = 4,
    /// +Z
    Top = 5,
}

impl BlockSide {
    /// All sides in bit order.
    pub const ALL: [Self; 6] = [
        Self::West,
        Self::East,
        Self::South,
        Self::North,
        Self::Bottom,
        Self::Top,
    ];

    /// Bit of this side in an occlusion mask.
    #[inline]
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// The side facing the other way.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Self::West => Self::East,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::North => Self::South,
            Self::Bottom => Self::Top,
            Self::Top => Self::Bottom,
        }
    }

    /// Axis index (0 = x, 1 = y, 2 = z).
    #[inline]
    pub const fn axis(self) -> usize {
        self as usize / 2
    }

    /// True for the +X, +Y and +Z faces.
    #[inline]
    pub const fn is_positive(self) -> bool {
        self as usize % 2 == 1
    }

    /// Unit offset pointing out of this face.
    #[inline]
    pub const fn normal(self) -> IVec3 {
        match self {
            Self::West => IVec3::NEG_X,
            Self::East => IVec3::X,
            Self::South => IVec3::NEG_Y,
            Self::North => IVec3::Y,
            Self::Bottom => IVec3::NEG_Z,
            Self::Top => IVec3::Z,
        }
    }

    /// Face crossed when travelling along `axis`; moving in the positive
    /// direction enters a box through its negative face.
    #[inline]
    pub const fn entered_from(axis: usize, positive: bool) -> Self {
        match (axis, positive) {
            (0, true) => Self::West,
            (0, false) => Self::East,
            (1, true) => Self::South,
            (1, false) => Self::North,
            (_, true) => Self::Bottom,
            (_, false) => Self::Top,
        }
    }
}

/// Ray for raycasting operations.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Get a point along the ray at distance t
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Where a ray or swept box first touches an [`Aabb`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayIntersection {
    /// Distance along the direction, in multiples of its length
    pub t: f32,
    /// Face of the box that was entered
    pub side: BlockSide,
}

/// Axis-Aligned Bounding Box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Unit cube at the origin, the default block hitbox.
    pub const UNIT: Self = Self::new(Vec3::ZERO, Vec3::ONE);

    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from a corner offset and a size
    #[inline]
    pub fn from_offset_size(offset: Vec3, size: Vec3) -> Self {
        Self {
            min: offset,
            max: offset + size,
        }
    }

    /// Get the size of the AABB
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// The same box moved by `offset`.
    #[inline]
    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Check if a point is inside the AABB
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Check if the interiors of two boxes overlap
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.cmplt(other.max).all() && self.max.cmpgt(other.min).all()
    }

    /// Slab test of a ray against this box.
    ///
    /// A zero direction component turns that axis into an infinite slab when
    /// the origin lies strictly inside it, shrunk by the contact skin, and a
    /// miss otherwise. A ray grazing a face it rests on does not hit. A hit needs
    /// `max(entries) > -1e-3`, `min(exits) > 0` and `max(entries) < min(exits)`,
    /// and must lie within `max_distance`.
    pub fn intersects_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<RayIntersection> {
        let mut max_entry = f32::NEG_INFINITY;
        let mut min_exit = f32::INFINITY;
        let mut entry: Option<(usize, f32)> = None;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if d == 0.0 {
                if o > lo + SKIN && o < hi - SKIN {
                    continue;
                }
                return None;
            }

            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            let (near, far) = if d > 0.0 { (t1, t2) } else { (t2, t1) };

            // Strict comparison keeps the earlier axis on ties.
            if near - SKIN > max_entry {
                max_entry = near - SKIN;
                entry = Some((axis, near));
            }
            min_exit = min_exit.min(far + SKIN);
        }

        let (axis, near) = entry?;
        if !(max_entry > ENTRY_TOLERANCE && min_exit > 0.0 && max_entry < min_exit) {
            return None;
        }

        let t = near.max(0.0);
        if t > max_distance {
            return None;
        }

        Some(RayIntersection {
            t,
            side: BlockSide::entered_from(axis, direction[axis] > 0.0),
        })
    }

    /// Sweep `moving` along `direction` and report where it first touches this box.
    ///
    /// Minkowski sum: the box is grown by the moving box's size and the moving
    /// box's minimum corner is ray-tested against it.
    pub fn intersects_box(
        &self,
        moving: &Self,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<RayIntersection> {
        let expanded = Self::new(self.min - moving.size(), self.max);
        expanded.intersects_ray(moving.min, direction, max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(1.0), Vec3::X);
        assert_eq!(ray.at(5.0), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn side_bits_are_distinct() {
        let mut mask = 0u8;
        for side in BlockSide::ALL {
            assert_eq!(mask & side.bit(), 0);
            mask |= side.bit();
            assert_eq!(side.opposite().opposite(), side);
            assert_eq!(side.normal(), -side.opposite().normal());
        }
        assert_eq!(mask, 0b11_1111);
    }

    #[test]
    fn aabb_contains_point() {
        let aabb = Aabb::UNIT;
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(aabb.contains_point(Vec3::ZERO));
        assert!(aabb.contains_point(Vec3::ONE));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn ray_hits_west_face() {
        let hit = Aabb::UNIT
            .intersects_ray(Vec3::new(-1.0, 0.5, 0.5), Vec3::X, 10.0)
            .unwrap();
        assert_eq!(hit.side, BlockSide::West);
        assert_relative_eq!(hit.t, 1.0);
    }

    #[test]
    fn ray_pointing_away_misses() {
        let hit = Aabb::UNIT.intersects_ray(Vec3::new(0.5, 0.5, 5.0), Vec3::Z, 10.0);
        assert!(hit.is_none());
    }

    #[test]
    fn ray_beside_box_misses() {
        let hit = Aabb::UNIT.intersects_ray(Vec3::new(-1.0, 2.0, 0.5), Vec3::X, 10.0);
        assert!(hit.is_none());
    }

    #[test]
    fn ray_beyond_max_distance_misses() {
        let hit = Aabb::UNIT.intersects_ray(Vec3::new(-3.0, 0.5, 0.5), Vec3::X, 2.0);
        assert!(hit.is_none());
    }

    #[test]
    fn ray_from_above_hits_top() {
        let hit = Aabb::UNIT
            .intersects_ray(Vec3::new(0.5, 0.5, 3.0), Vec3::NEG_Z, 10.0)
            .unwrap();
        assert_eq!(hit.side, BlockSide::Top);
        assert_relative_eq!(hit.t, 2.0);
    }

    #[test]
    fn diagonal_tie_prefers_x() {
        let dir = Vec3::new(1.0, 1.0, 0.0).normalize();
        let hit = Aabb::UNIT
            .intersects_ray(Vec3::new(-1.0, -1.0, 0.5), dir, 10.0)
            .unwrap();
        assert_eq!(hit.side, BlockSide::West);
    }

    #[test]
    fn origin_on_face_with_parallel_ray_misses() {
        // Sliding along the top face must not register the face as a hit.
        let hit = Aabb::UNIT.intersects_ray(Vec3::new(-1.0, 0.5, 1.0), Vec3::X, 10.0);
        assert!(hit.is_none());
    }

    #[test]
    fn origin_deep_inside_is_not_a_hit() {
        let hit = Aabb::UNIT.intersects_ray(Vec3::splat(0.5), Vec3::X, 10.0);
        assert!(hit.is_none());
    }

    #[test]
    fn origin_just_past_entry_reports_zero() {
        let hit = Aabb::UNIT
            .intersects_ray(Vec3::new(0.0005, 0.5, 0.5), Vec3::X, 10.0)
            .unwrap();
        assert_eq!(hit.side, BlockSide::West);
        assert_relative_eq!(hit.t, 0.0);
    }

    #[test]
    fn swept_box_hits_floor() {
        let floor = Aabb::UNIT;
        let player = Aabb::from_offset_size(Vec3::new(0.2, 0.2, 3.0), Vec3::new(0.6, 0.6, 1.8));
        let hit = floor.intersects_box(&player, Vec3::NEG_Z, 5.0).unwrap();
        assert_eq!(hit.side, BlockSide::Top);
        assert_relative_eq!(hit.t, 2.0);
    }

    #[test]
    fn swept_box_catches_edge_overlap() {
        // Only the corner of the moving box passes over the block.
        let block = Aabb::UNIT;
        let moving = Aabb::from_offset_size(Vec3::new(-0.4, 0.9, -3.0), Vec3::splat(0.5));
        let hit = block.intersects_box(&moving, Vec3::Z, 10.0).unwrap();
        assert_eq!(hit.side, BlockSide::Bottom);
        assert_relative_eq!(hit.t, 2.5);
    }

    #[test]
    fn overlaps_excludes_touching_faces() {
        let a = Aabb::UNIT;
        let b = a.translated(Vec3::X);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&a.translated(Vec3::splat(0.5))));
    }
}
