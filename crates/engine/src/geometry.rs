use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

/// Projects a world position onto the horizontal (x, z) plane.
pub fn horizontal(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

pub fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    horizontal(a).distance(horizontal(b))
}

/// Yaw convention: 0 faces +z, positive turns toward +x.
pub fn yaw_from_direction(direction: Vec2) -> f32 {
    direction.x.atan2(direction.y)
}

pub fn forward_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Steps `current` toward `target` along the shorter arc by at most `max_delta` radians.
pub fn move_angle_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    let delta = wrap_angle(target - current);
    if delta.abs() <= max_delta.max(0.0) {
        return wrap_angle(target);
    }
    wrap_angle(current + delta.signum() * max_delta.max(0.0))
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Axis-aligned rectangle on the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub min: Vec2,
    pub max: Vec2,
}

impl Footprint {
    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn expanded(&self, margin: f32) -> Self {
        let margin = Vec2::splat(margin.max(0.0));
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    pub fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }
}
