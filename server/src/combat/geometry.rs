//! Melee hit geometry: an oriented swing box against axis-aligned bodies.

use arena_shared::Vec2;

/// Axis-aligned box, used for entity bodies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center: Vec2,
    pub half_extent: Vec2,
}

impl Aabb {
    /// Square box of `half` around `center`
    pub fn around(center: Vec2, half: f64) -> Self {
        Self { center, half_extent: Vec2::new(half, half) }
    }
}

/// Oriented box, used for a swing's reach
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    pub center: Vec2,
    /// Unit axes: along the swing and across it
    pub axes: [Vec2; 2],
    pub half_extents: [f64; 2],
}

impl Obb {
    /// The area swept by a melee swing from `origin` along `dir`: `reach`
    /// long and `width` wide, starting at the attacker's center
    pub fn melee(origin: Vec2, dir: Vec2, reach: f64, width: f64) -> Self {
        let forward = dir.normalized();
        Self {
            center: origin + forward * (reach * 0.5),
            axes: [forward, forward.perp()],
            half_extents: [reach * 0.5, width * 0.5],
        }
    }

    /// Half the length of this box's shadow on `axis`
    fn projected_radius(&self, axis: Vec2) -> f64 {
        self.half_extents[0] * self.axes[0].dot(axis).abs()
            + self.half_extents[1] * self.axes[1].dot(axis).abs()
    }
}

/// Separating axis test between a swing box and a body box. Touching
/// counts as overlapping.
pub fn obb_overlaps_aabb(obb: &Obb, aabb: &Aabb) -> bool {
    let offset = obb.center - aabb.center;
    let candidate_axes = [Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0), obb.axes[0], obb.axes[1]];

    candidate_axes.iter().all(|&axis| {
        if axis.length_squared() < 1e-12 {
            return true;
        }
        let aabb_radius = aabb.half_extent.x * axis.x.abs() + aabb.half_extent.y * axis.y.abs();
        offset.dot(axis).abs() <= obb.projected_radius(axis) + aabb_radius
    })
}

/// Whether an attacker at `from` facing `facing` is turned toward `to`.
/// Coincident positions always pass.
pub fn facing_ok(facing: Vec2, from: Vec2, to: Vec2, threshold: f64) -> bool {
    let toward = to - from;
    if toward.length_squared() < 1e-12 {
        return true;
    }
    facing.normalized().dot(toward.normalized()) > threshold
}
