use std::collections::BTreeMap;

use glam::{Vec2, Vec3};
use tracing::debug;

use crate::geometry::{horizontal, Footprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformHandle(pub u32);

/// Static axis-aligned box that actors may not walk into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderVolume {
    pub min: Vec3,
    pub max: Vec3,
}

impl ColliderVolume {
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn footprint(&self) -> Footprint {
        Footprint {
            min: horizontal(self.min),
            max: horizontal(self.max),
        }
    }

    /// Vertical-capsule approximation: the actor's circle overlaps the footprint and
    /// its body span overlaps the box height.
    pub fn touches_actor(&self, position: Vec3, radius: f32, body_height: f32) -> bool {
        let feet = position.y;
        let head = position.y + body_height.max(0.0);
        if head < self.min.y || feet > self.max.y {
            return false;
        }
        self.footprint().overlaps_circle(horizontal(position), radius)
    }
}

/// Flat walkable surface. `center.y` is the top of the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandingPlatform {
    pub center: Vec3,
    pub half_extents: Vec2,
}

impl StandingPlatform {
    pub fn top(&self) -> f32 {
        self.center.y
    }

    pub fn position(&self) -> Vec3 {
        self.center
    }

    pub fn footprint(&self) -> Footprint {
        Footprint::from_center(horizontal(self.center), self.half_extents)
    }
}

/// Registry of colliders and standing platforms, queried by actors every physics tick.
#[derive(Debug, Clone, Default)]
pub struct CollisionWorld {
    next_collider: u32,
    next_platform: u32,
    colliders: BTreeMap<ColliderHandle, ColliderVolume>,
    platforms: BTreeMap<PlatformHandle, StandingPlatform>,
}

impl CollisionWorld {
    pub fn add_collider(&mut self, volume: ColliderVolume) -> ColliderHandle {
        let handle = ColliderHandle(self.next_collider);
        self.next_collider = self.next_collider.saturating_add(1);
        self.colliders.insert(handle, volume);
        handle
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) -> bool {
        let removed = self.colliders.remove(&handle).is_some();
        if removed {
            debug!(collider = handle.0, "collider_removed");
        }
        removed
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&ColliderVolume> {
        self.colliders.get(&handle)
    }

    pub fn add_platform(&mut self, platform: StandingPlatform) -> PlatformHandle {
        let handle = PlatformHandle(self.next_platform);
        self.next_platform = self.next_platform.saturating_add(1);
        self.platforms.insert(handle, platform);
        handle
    }

    pub fn remove_platform(&mut self, handle: PlatformHandle) -> bool {
        let removed = self.platforms.remove(&handle).is_some();
        if removed {
            debug!(platform = handle.0, "platform_removed");
        }
        removed
    }

    pub fn platform(&self, handle: PlatformHandle) -> Option<&StandingPlatform> {
        self.platforms.get(&handle)
    }

    pub fn set_platform_position(&mut self, handle: PlatformHandle, center: Vec3) -> bool {
        match self.platforms.get_mut(&handle) {
            Some(platform) => {
                platform.center = center;
                true
            }
            None => false,
        }
    }

    pub fn translate_platform(&mut self, handle: PlatformHandle, delta: Vec3) -> bool {
        match self.platforms.get_mut(&handle) {
            Some(platform) => {
                platform.center += delta;
                true
            }
            None => false,
        }
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn platform_count(&self) -> usize {
        self.platforms.len()
    }

    /// Colliders overlapping the actor, in handle order.
    pub fn touching_colliders(
        &self,
        position: Vec3,
        radius: f32,
        body_height: f32,
    ) -> Vec<ColliderHandle> {
        self.colliders
            .iter()
            .filter(|(_, volume)| volume.touches_actor(position, radius, body_height))
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Platforms whose footprint contains the actor and whose top lies within
    /// `vertical_tolerance` of the actor's feet, in handle order.
    pub fn platforms_in_reach(
        &self,
        position: Vec3,
        vertical_tolerance: f32,
    ) -> Vec<PlatformHandle> {
        let point = horizontal(position);
        self.platforms
            .iter()
            .filter(|(_, platform)| {
                platform.footprint().contains(point)
                    && (platform.top() - position.y).abs() <= vertical_tolerance
            })
            .map(|(handle, _)| *handle)
            .collect()
    }
}
