use glam::Vec3;

use crate::collision::{ColliderHandle, CollisionWorld, PlatformHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveColliderInfo {
    pub handle: ColliderHandle,
    /// Where the actor last stood validly when this collider started touching it.
    pub last_valid_position: Option<Vec3>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveStandingPlatformInfo {
    pub handle: PlatformHandle,
    pub last_position: Vec3,
    pub entered_at: f64,
    seq: u64,
}

/// Colliders and platforms currently in contact with one actor.
#[derive(Debug, Clone, Default)]
pub struct ContactTracker {
    colliders: Vec<ActiveColliderInfo>,
    platforms: Vec<ActiveStandingPlatformInfo>,
    next_seq: u64,
}

impl ContactTracker {
    pub fn colliders(&self) -> &[ActiveColliderInfo] {
        &self.colliders
    }

    pub fn platforms(&self) -> &[ActiveStandingPlatformInfo] {
        &self.platforms
    }

    pub fn is_touching_collider(&self) -> bool {
        !self.colliders.is_empty()
    }

    pub fn is_on_platform(&self) -> bool {
        !self.platforms.is_empty()
    }

    pub fn is_touching(&self, handle: ColliderHandle) -> bool {
        self.colliders.iter().any(|info| info.handle == handle)
    }

    pub fn is_on(&self, handle: PlatformHandle) -> bool {
        self.platforms.iter().any(|info| info.handle == handle)
    }

    pub fn begin_collision(&mut self, handle: ColliderHandle, last_valid_position: Option<Vec3>) {
        if self.is_touching(handle) {
            return;
        }
        self.colliders.push(ActiveColliderInfo {
            handle,
            last_valid_position,
        });
    }

    pub fn end_collision(&mut self, handle: ColliderHandle) {
        self.colliders.retain(|info| info.handle != handle);
    }

    pub fn enter_platform(&mut self, handle: PlatformHandle, platform_position: Vec3, now: f64) {
        if self.is_on(handle) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.platforms.push(ActiveStandingPlatformInfo {
            handle,
            last_position: platform_position,
            entered_at: now,
            seq,
        });
    }

    pub fn exit_platform(&mut self, handle: PlatformHandle) {
        self.platforms.retain(|info| info.handle != handle);
    }

    /// The most recently entered platform; entry order breaks equal timestamps.
    pub fn active_platform(&self) -> Option<&ActiveStandingPlatformInfo> {
        self.platforms
            .iter()
            .max_by(|a, b| a.entered_at.total_cmp(&b.entered_at).then(a.seq.cmp(&b.seq)))
    }

    /// Re-baselines every tracked platform on its current position and returns how far
    /// the active one moved since the last refresh.
    pub fn refresh_platform_positions(&mut self, world: &CollisionWorld) -> Option<Vec3> {
        let active = self.active_platform().map(|info| info.handle)?;
        let mut delta = None;
        for info in &mut self.platforms {
            let Some(platform) = world.platform(info.handle) else {
                continue;
            };
            if info.handle == active {
                delta = Some(platform.position() - info.last_position);
            }
            info.last_position = platform.position();
        }
        delta
    }

    /// Drops records whose collider or platform no longer exists. Returns how many went.
    pub fn prune(&mut self, world: &CollisionWorld) -> usize {
        let before = self.colliders.len() + self.platforms.len();
        self.colliders
            .retain(|info| world.collider(info.handle).is_some());
        self.platforms
            .retain(|info| world.platform(info.handle).is_some());
        before - (self.colliders.len() + self.platforms.len())
    }

    /// Recorded valid position closest to `position`, over every active collider.
    pub fn nearest_rollback_position(&self, position: Vec3) -> Option<Vec3> {
        self.colliders
            .iter()
            .filter_map(|info| info.last_valid_position)
            .min_by(|a, b| {
                a.distance_squared(position)
                    .total_cmp(&b.distance_squared(position))
            })
    }

    pub fn reset(&mut self) {
        self.colliders.clear();
        self.platforms.clear();
    }
}
