//! Grid ray traversal (Amanatides & Woo).
//!
//! Walks every unit cell a ray passes through, in order, without knowing what
//! the cells contain.

use glam::{IVec3, Vec3};

use crate::math::BlockSide;

#[inline]
fn inv_or_max(v: f32) -> f32 {
    if v == 0.0 {
        f32::INFINITY
    } else {
        1.0 / v.abs()
    }
}

/// Visit the cells a ray passes through until `visit` returns `true`.
///
/// `visit(cell, t, side)` receives the cell, the distance at which the ray
/// entered it and the face it came in through. It is always called at least
/// once, for the cell containing `origin`, with `side == None`.
///
/// Returns the distance at which `visit` returned `true`, or `None` once the
/// next cell boundary lies beyond `max_distance`. Distances are in multiples of
/// `direction`'s length.
pub fn cast_ray<F>(origin: Vec3, direction: Vec3, max_distance: f32, mut visit: F) -> Option<f32>
where
    F: FnMut(IVec3, f32, Option<BlockSide>) -> bool,
{
    let mut cell = origin.floor().as_ivec3();
    let step = IVec3::new(
        direction.x.signum() as i32 * i32::from(direction.x != 0.0),
        direction.y.signum() as i32 * i32::from(direction.y != 0.0),
        direction.z.signum() as i32 * i32::from(direction.z != 0.0),
    );
    let t_delta = Vec3::new(
        inv_or_max(direction.x),
        inv_or_max(direction.y),
        inv_or_max(direction.z),
    );

    // Distance to the first boundary on each axis.
    let mut t_max = Vec3::ZERO;
    for axis in 0..3 {
        t_max[axis] = if step[axis] > 0 {
            (cell[axis] as f32 + 1.0 - origin[axis]) * t_delta[axis]
        } else if step[axis] < 0 {
            (origin[axis] - cell[axis] as f32) * t_delta[axis]
        } else {
            f32::INFINITY
        };
    }

    let mut t = 0.0;
    let mut side = None;
    loop {
        if visit(cell, t, side) {
            return Some(t);
        }

        // Ties resolve X, then Y, then Z.
        let axis = if t_max.x <= t_max.y && t_max.x <= t_max.z {
            0
        } else if t_max.y <= t_max.z {
            1
        } else {
            2
        };

        if t_max[axis] > max_distance {
            return None;
        }

        t = t_max[axis];
        t_max[axis] += t_delta[axis];
        cell[axis] += step[axis];
        side = Some(BlockSide::entered_from(axis, step[axis] > 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn collect(origin: Vec3, direction: Vec3, max: f32) -> Vec<(IVec3, f32, Option<BlockSide>)> {
        let mut cells = Vec::new();
        cast_ray(origin, direction, max, |cell, t, side| {
            cells.push((cell, t, side));
            false
        });
        cells
    }

    #[test]
    fn origin_cell_is_visited_first() {
        let cells = collect(Vec3::new(0.5, 0.5, 0.5), Vec3::X, 0.1);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].0, IVec3::ZERO);
        assert_eq!(cells[0].2, None);
    }

    #[test]
    fn zero_direction_visits_origin_once() {
        let cells = collect(Vec3::new(-0.5, 3.2, 7.9), Vec3::ZERO, 100.0);
        assert_eq!(cells, vec![(IVec3::new(-1, 3, 7), 0.0, None)]);
    }

    #[test]
    fn walks_along_x() {
        let cells = collect(Vec3::new(0.5, 0.5, 0.5), Vec3::X, 3.0);
        let visited: Vec<_> = cells.iter().map(|c| c.0.x).collect();
        assert_eq!(visited, vec![0, 1, 2, 3]);
        assert_relative_eq!(cells[1].1, 0.5);
        assert_relative_eq!(cells[3].1, 2.5);
        assert!(cells[1..].iter().all(|c| c.2 == Some(BlockSide::West)));
    }

    #[test]
    fn walks_down_through_top_faces() {
        let cells = collect(Vec3::new(0.5, 0.5, 2.5), Vec3::NEG_Z, 2.0);
        let visited: Vec<_> = cells.iter().map(|c| c.0.z).collect();
        assert_eq!(visited, vec![2, 1, 0]);
        assert_eq!(cells[1].2, Some(BlockSide::Top));
    }

    #[test]
    fn diagonal_visits_connected_cells() {
        let cells = collect(Vec3::new(0.1, 0.2, 0.5), Vec3::new(1.0, 1.0, 0.0).normalize(), 5.0);
        for pair in cells.windows(2) {
            let delta = pair[1].0 - pair[0].0;
            assert_eq!(delta.abs().element_sum(), 1, "cells must share a face");
            assert!(pair[1].1 >= pair[0].1);
        }
    }

    #[test]
    fn stops_when_visit_returns_true() {
        let hit = cast_ray(Vec3::new(0.5, 0.5, 0.5), Vec3::X, 10.0, |cell, _, _| cell.x == 4);
        assert_relative_eq!(hit.unwrap(), 3.5);
    }

    #[test]
    fn negative_direction_crosses_zero() {
        let cells = collect(Vec3::new(0.5, 0.5, 0.5), Vec3::NEG_X, 2.0);
        let visited: Vec<_> = cells.iter().map(|c| c.0.x).collect();
        assert_eq!(visited, vec![0, -1, -2]);
        assert_eq!(cells[1].2, Some(BlockSide::East));
    }
}
