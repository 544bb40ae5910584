use glam::{Vec2, Vec3};
use tracing::{debug, warn};

use super::config::{ActorProfile, MovementConfig};
use super::contacts::ContactTracker;
use super::path::{EndAction, MoveMode, Path};
use super::waiter::{MovementWaiter, WaitOutcome};
use crate::collision::CollisionWorld;
use crate::geometry::{
    horizontal, horizontal_distance, move_angle_towards, yaw_from_direction, forward_from_yaw,
};
use crate::nav::{find_jump_target, JumpTarget, TileCoord, Tilemap};
use crate::world::{ActorId, MovementEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    InProgress,
    Blocked,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovementState {
    #[default]
    Idle,
    Following,
    OnHold,
    Completing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionName {
    Idle,
    Walk,
    Run,
    Stand,
    Jump,
}

impl ActionName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Walk => "walk",
            Self::Run => "run",
            Self::Stand => "stand",
            Self::Jump => "jump",
        }
    }

    pub fn for_mode(mode: MoveMode) -> Self {
        match mode {
            MoveMode::Walk | MoveMode::StepBack => Self::Walk,
            MoveMode::Run => Self::Run,
        }
    }
}

/// Read-only world state a controller needs for one tick.
#[derive(Debug, Clone, Copy)]
pub struct NavContext<'a> {
    pub tilemap: &'a Tilemap,
    pub collision: &'a CollisionWorld,
    pub config: &'a MovementConfig,
}

/// Which rule accepted a candidate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Platform,
    Tile,
    OtherLayer,
    Portal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPosition {
    pub height: f32,
    pub layer: usize,
    pub surface: Surface,
}

/// Requests a tick hands back to the world, which owns scheduling and disposal.
#[derive(Debug, Default)]
pub struct TickEffects {
    pub reverse_request: Option<Path>,
    pub dispose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSearch {
    pub generation: u64,
    pub goal: TileCoord,
}

/// Per-actor movement state machine.
#[derive(Debug)]
pub struct MovementController {
    actor: ActorId,
    profile: ActorProfile,
    position: Vec3,
    yaw: f32,
    layer: usize,
    state: MovementState,
    path: Option<Path>,
    kinematic: bool,
    generation: u64,
    pending_search: Option<PendingSearch>,
    contacts: ContactTracker,
    waiter: Option<MovementWaiter>,
    last_action: Option<ActionName>,
    last_tile: Option<(usize, TileCoord)>,
    last_valid_position: Option<Vec3>,
    events: Vec<MovementEvent>,
}

impl MovementController {
    pub fn new(actor: ActorId, profile: ActorProfile, position: Vec3, layer: usize) -> Self {
        Self {
            actor,
            profile,
            position,
            yaw: 0.0,
            layer,
            state: MovementState::Idle,
            path: None,
            kinematic: false,
            generation: 0,
            pending_search: None,
            contacts: ContactTracker::default(),
            waiter: None,
            last_action: None,
            last_tile: None,
            last_valid_position: None,
            events: Vec::new(),
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn profile(&self) -> &ActorProfile {
        &self.profile
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn forward(&self) -> Vec3 {
        forward_from_yaw(self.yaw)
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_search(&self) -> Option<PendingSearch> {
        self.pending_search
    }

    pub fn contacts(&self) -> &ContactTracker {
        &self.contacts
    }

    pub fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    pub fn set_kinematic(&mut self, kinematic: bool) {
        self.kinematic = kinematic;
    }

    pub fn is_busy(&self) -> bool {
        self.path.is_some() || self.pending_search.is_some()
    }

    pub fn take_events(&mut self) -> Vec<MovementEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn tile(&self, tilemap: &Tilemap) -> Option<TileCoord> {
        tilemap.world_to_tile(self.position, self.layer)
    }

    /// Starts a new command: releases the previous waiter as superseded, drops any
    /// path or search and invalidates in-flight results. Returns the new generation.
    pub fn begin_command(&mut self) -> u64 {
        if let Some(waiter) = self.waiter.take() {
            waiter.release(WaitOutcome::Superseded);
        }
        self.path = None;
        self.pending_search = None;
        self.state = MovementState::Idle;
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub fn attach_waiter(&mut self, waiter: MovementWaiter) {
        if !self.is_busy() {
            waiter.release(WaitOutcome::Completed);
            return;
        }
        if let Some(previous) = self.waiter.replace(waiter) {
            previous.release(WaitOutcome::Superseded);
        }
    }

    pub fn mark_search_pending(&mut self, goal: TileCoord) {
        self.pending_search = Some(PendingSearch {
            generation: self.generation,
            goal,
        });
        self.state = MovementState::Following;
    }

    /// Clears a pending search. `None` for stale generations or when nothing was pending.
    pub fn take_pending_search(&mut self, generation: u64) -> Option<PendingSearch> {
        match self.pending_search {
            Some(pending) if pending.generation == generation => self.pending_search.take(),
            _ => None,
        }
    }

    pub fn fail_search(&mut self) {
        self.pending_search = None;
        self.state = MovementState::Idle;
        self.release_waiter(WaitOutcome::PathNotFound);
    }

    pub fn setup_path(
        &mut self,
        waypoints: Vec<Vec3>,
        mode: MoveMode,
        end_action: EndAction,
        ignore_obstacle: bool,
    ) {
        if waypoints.is_empty() {
            self.path = None;
            self.state = MovementState::Idle;
            self.request_action(ActionName::Idle);
            self.release_waiter(WaitOutcome::Completed);
            return;
        }
        debug!(
            actor = self.actor.0,
            waypoints = waypoints.len(),
            mode = ?mode,
            end_action = ?end_action,
            "path_setup"
        );
        self.path = Some(Path::new(
            waypoints,
            mode,
            end_action,
            ignore_obstacle,
            self.position,
        ));
        self.state = MovementState::Following;
        self.request_action(ActionName::for_mode(mode));
    }

    /// Installs a prebuilt path, e.g. a reversed replay.
    pub fn install_path(&mut self, path: Path) {
        let mode = path.mode;
        self.path = Some(path);
        self.state = MovementState::Following;
        self.request_action(ActionName::for_mode(mode));
    }

    pub fn pause_movement(&mut self) {
        if self.state != MovementState::Following || self.path.is_none() {
            return;
        }
        self.state = MovementState::OnHold;
        self.request_action(ActionName::Stand);
    }

    pub fn resume_movement(&mut self) {
        if self.state != MovementState::OnHold {
            return;
        }
        self.state = MovementState::Following;
        if let Some(mode) = self.path.as_ref().map(|path| path.mode) {
            self.request_action(ActionName::for_mode(mode));
        }
    }

    pub fn cancel_movement(&mut self, outcome: WaitOutcome) {
        let was_busy = self.is_busy();
        self.path = None;
        self.pending_search = None;
        self.state = MovementState::Idle;
        self.generation = self.generation.wrapping_add(1);
        if was_busy {
            self.request_action(ActionName::Idle);
        }
        self.release_waiter(outcome);
    }

    pub fn deactivate(&mut self) {
        self.cancel_movement(WaitOutcome::Deactivated);
        self.contacts.reset();
        self.last_valid_position = None;
    }

    pub fn logic_tick(&mut self, ctx: &NavContext<'_>, dt: f32) -> TickEffects {
        let mut effects = TickEffects::default();
        if self.state != MovementState::Following {
            return effects;
        }
        let Some((waypoint, mode, ignore_obstacle, last)) = self.path.as_ref().and_then(|path| {
            path.current_waypoint()
                .map(|waypoint| (waypoint, path.mode, path.ignore_obstacle, path.is_last_waypoint()))
        }) else {
            return effects;
        };

        let dt = dt.max(0.0);
        let outcome = self.move_towards(
            ctx,
            waypoint,
            mode,
            ignore_obstacle,
            self.profile.speed_for(mode) * dt,
            self.profile.turn_speed_radians * dt,
        );

        match outcome {
            MoveOutcome::InProgress => {}
            MoveOutcome::Completed if !last => {
                if let Some(path) = self.path.as_mut() {
                    path.advance_waypoint();
                }
            }
            MoveOutcome::Completed => {
                self.state = MovementState::Completing;
                self.reaching_to_end_of_path(WaitOutcome::Completed, &mut effects);
            }
            MoveOutcome::Blocked => {
                debug!(actor = self.actor.0, "movement_blocked");
                self.state = MovementState::Completing;
                self.reaching_to_end_of_path(WaitOutcome::GaveUp, &mut effects);
            }
        }
        self.sync_tile(ctx.tilemap, true);
        effects
    }

    fn reaching_to_end_of_path(&mut self, outcome: WaitOutcome, effects: &mut TickEffects) {
        let Some(path) = self.path.take() else {
            self.state = MovementState::Idle;
            return;
        };
        self.state = MovementState::Idle;
        self.request_action(ActionName::Idle);
        match path.end_action {
            EndAction::Idle => {}
            EndAction::DisposeSelf => effects.dispose = true,
            EndAction::WaitAndReverse => effects.reverse_request = Some(path.reversed()),
        }
        self.release_waiter(outcome);
    }

    /// One integration step toward `target`.
    pub fn move_towards(
        &mut self,
        ctx: &NavContext<'_>,
        target: Vec3,
        mode: MoveMode,
        ignore_obstacle: bool,
        max_distance_delta: f32,
        max_radians_delta: f32,
    ) -> MoveOutcome {
        let arrival = ctx.config.arrival_tolerance;
        let current = self.position;
        let to_target = horizontal(target) - horizontal(current);
        let distance = to_target.length();
        if distance <= arrival {
            return MoveOutcome::Completed;
        }

        let direction = to_target / distance;
        let step = distance.min(max_distance_delta.max(0.0));
        let next_horizontal = horizontal(current) + direction * step;
        let height_delta = target.y - current.y;
        let next_height = if height_delta.abs() < ctx.config.height_snap_epsilon {
            target.y
        } else {
            current.y + height_delta * (step / distance)
        };
        let mut candidate = Vec3::new(next_horizontal.x, next_height, next_horizontal.y);

        if self.collider_ahead(ctx, next_horizontal, direction) {
            self.ease_rotation(direction, mode, max_radians_delta);
            return MoveOutcome::InProgress;
        }

        let mut layer = self.layer;
        match self.can_goto_position(ctx, candidate) {
            Some(resolved) => {
                layer = resolved.layer;
                candidate.y = match resolved.surface {
                    Surface::Portal => current.y,
                    Surface::Tile | Surface::Platform | Surface::OtherLayer => resolved.height,
                };
            }
            None if !ignore_obstacle => return MoveOutcome::Blocked,
            None => candidate.y = current.y,
        }

        self.ease_rotation(direction, mode, max_radians_delta);
        self.position = candidate;
        if layer != self.layer {
            debug!(actor = self.actor.0, from = self.layer, to = layer, "nav_layer_switched");
            self.layer = layer;
        }

        if horizontal_distance(candidate, target) <= arrival {
            MoveOutcome::Completed
        } else {
            MoveOutcome::InProgress
        }
    }

    fn collider_ahead(&self, ctx: &NavContext<'_>, next: Vec2, direction: Vec2) -> bool {
        if !self.contacts.is_touching_collider() {
            return false;
        }
        let probe = next + direction * self.profile.radius;
        self.contacts.colliders().iter().any(|info| {
            ctx.collision
                .collider(info.handle)
                .is_some_and(|volume| volume.footprint().contains(probe))
        })
    }

    /// Platform, then current layer, then other layers, then portals.
    pub fn can_goto_position(
        &self,
        ctx: &NavContext<'_>,
        candidate: Vec3,
    ) -> Option<ResolvedPosition> {
        let current_height = self.position.y;
        let point = horizontal(candidate);

        let platform_height = self
            .contacts
            .platforms()
            .iter()
            .filter_map(|info| ctx.collision.platform(info.handle))
            .filter(|platform| {
                platform
                    .footprint()
                    .expanded(ctx.config.platform_slope_tolerance)
                    .contains(point)
                    && (platform.top() - current_height).abs() <= ctx.config.cross_platform_tolerance
            })
            .map(|platform| platform.top())
            .reduce(f32::max);

        if let Some((_, tile)) = ctx.tilemap.walkable_tile_at(candidate, self.layer) {
            return Some(match platform_height {
                Some(top) if top > tile.height => ResolvedPosition {
                    height: top,
                    layer: self.layer,
                    surface: Surface::Platform,
                },
                _ => ResolvedPosition {
                    height: tile.height,
                    layer: self.layer,
                    surface: Surface::Tile,
                },
            });
        }
        if let Some(top) = platform_height {
            return Some(ResolvedPosition {
                height: top,
                layer: self.layer,
                surface: Surface::Platform,
            });
        }

        if ctx.tilemap.layer_count() <= 1 {
            return None;
        }
        for other in (0..ctx.tilemap.layer_count()).filter(|&other| other != self.layer) {
            if let Some((_, tile)) = ctx.tilemap.walkable_tile_at(candidate, other) {
                if (tile.height - current_height).abs() <= ctx.config.cross_layer_tolerance {
                    return Some(ResolvedPosition {
                        height: tile.height,
                        layer: other,
                        surface: Surface::OtherLayer,
                    });
                }
            }
            if ctx.tilemap.is_inside_portal_area(candidate, self.layer)
                || ctx.tilemap.is_inside_portal_area(candidate, other)
            {
                let layer = if ctx.tilemap.walkable_tile_at(candidate, other).is_some() {
                    other
                } else {
                    self.layer
                };
                return Some(ResolvedPosition {
                    height: current_height,
                    layer,
                    surface: Surface::Portal,
                });
            }
        }
        None
    }

    pub fn ease_rotation(&mut self, direction: Vec2, mode: MoveMode, max_radians_delta: f32) {
        if direction.length_squared() <= f32::EPSILON {
            return;
        }
        if mode == MoveMode::StepBack {
            self.yaw = yaw_from_direction(-direction);
            return;
        }
        self.yaw = move_angle_towards(self.yaw, yaw_from_direction(direction), max_radians_delta);
    }

    /// Carries the actor along with the platform it most recently stepped on.
    pub fn late_tick(&mut self, ctx: &NavContext<'_>) {
        let Some(delta) = self.contacts.refresh_platform_positions(ctx.collision) else {
            return;
        };
        if delta == Vec3::ZERO {
            return;
        }
        self.position += delta;
        self.sync_tile(ctx.tilemap, false);
    }

    /// Overlap diff against the collision world followed by drift correction.
    pub fn physics_tick(&mut self, ctx: &NavContext<'_>, now: f64) {
        let pruned = self.contacts.prune(ctx.collision);
        if pruned > 0 {
            debug!(actor = self.actor.0, pruned, "stale_contacts_pruned");
        }
        self.diff_colliders(ctx);
        self.diff_platforms(ctx, now);

        if self.contacts.is_touching_collider() && !self.contacts.is_on_platform() {
            match ctx.tilemap.walkable_tile_at(self.position, self.layer) {
                Some((_, tile)) => self.position.y = tile.height,
                None => match self.contacts.nearest_rollback_position(self.position) {
                    Some(rollback) => {
                        debug!(actor = self.actor.0, "collision_rollback");
                        self.position = rollback;
                    }
                    None => warn!(actor = self.actor.0, "collision_rollback_without_record"),
                },
            }
        } else if !self.contacts.is_on_platform() && !self.is_on_any_walkable_tile(ctx) {
            match self.last_valid_position {
                Some(valid) => {
                    debug!(actor = self.actor.0, "drift_corrected");
                    self.position = valid;
                }
                None => warn!(actor = self.actor.0, "drift_without_valid_position"),
            }
        }

        if self.contacts.is_on_platform() || self.is_on_any_walkable_tile(ctx) {
            self.last_valid_position = Some(self.position);
        }
        self.sync_tile(ctx.tilemap, false);
    }

    fn is_on_any_walkable_tile(&self, ctx: &NavContext<'_>) -> bool {
        ctx.tilemap.walkable_tile_at(self.position, self.layer).is_some()
    }

    fn diff_colliders(&mut self, ctx: &NavContext<'_>) {
        let touching = ctx.collision.touching_colliders(
            self.position,
            self.profile.radius,
            self.profile.body_height,
        );
        let ended = self
            .contacts
            .colliders()
            .iter()
            .map(|info| info.handle)
            .filter(|handle| !touching.contains(handle))
            .collect::<Vec<_>>();
        for handle in ended {
            self.contacts.end_collision(handle);
        }
        for handle in touching {
            if !self.contacts.is_touching(handle) {
                let valid = self.snapped_valid_position(ctx);
                self.contacts.begin_collision(handle, valid);
            }
        }
    }

    fn diff_platforms(&mut self, ctx: &NavContext<'_>, now: f64) {
        let tolerance = ctx.config.cross_platform_tolerance;
        let in_reach = ctx.collision.platforms_in_reach(self.position, tolerance);
        let exited = self
            .contacts
            .platforms()
            .iter()
            .map(|info| info.handle)
            .filter(|handle| !in_reach.contains(handle))
            .collect::<Vec<_>>();
        for handle in exited {
            self.contacts.exit_platform(handle);
        }
        for handle in in_reach {
            if self.contacts.is_on(handle) {
                continue;
            }
            let Some(platform) = ctx.collision.platform(handle) else {
                continue;
            };
            self.contacts.enter_platform(handle, platform.position(), now);
            let lift = platform.top() - self.position.y;
            if lift > 0.0 && lift <= tolerance {
                self.position.y = platform.top();
            }
        }
    }

    /// Current position if valid, else the nearest walkable tile center.
    fn snapped_valid_position(&self, ctx: &NavContext<'_>) -> Option<Vec3> {
        if self.contacts.is_on_platform() || self.is_on_any_walkable_tile(ctx) {
            return Some(self.position);
        }
        let tile = ctx.tilemap.world_to_tile(self.position, self.layer)?;
        let snapped = ctx
            .tilemap
            .try_get_adjacent_walkable_tile(tile, self.layer)
            .or_else(|| ctx.tilemap.find_nearest_walkable_tile(tile, self.layer, 2))?;
        ctx.tilemap.tile_to_world(snapped, self.layer)
    }

    /// Teleport to a tile center, switching layer if the tile is only walkable elsewhere.
    pub fn set_tile_position(&mut self, ctx: &NavContext<'_>, tile: TileCoord) {
        let tilemap = ctx.tilemap;
        let mut layer = self.layer;
        if !tilemap.is_walkable(tile, layer) {
            let current_height = self.position.y;
            let switched = (0..tilemap.layer_count())
                .filter(|&other| other != layer)
                .find(|&other| {
                    tilemap.get_tile(tile.x, tile.y, other).is_some_and(|nav_tile| {
                        nav_tile.walkable
                            && (nav_tile.height - current_height).abs()
                                <= ctx.config.cross_layer_tolerance
                    })
                });
            if let Some(other) = switched {
                layer = other;
            }
        }

        let mut target = tile;
        if !tilemap.is_walkable(target, layer) {
            match tilemap.try_get_adjacent_walkable_tile(target, layer) {
                Some(adjacent) => target = adjacent,
                None => warn!(
                    actor = self.actor.0,
                    x = tile.x,
                    y = tile.y,
                    layer,
                    "teleport_target_unwalkable"
                ),
            }
        }

        if let Some(position) = tilemap.tile_to_world(target, layer) {
            self.position = position;
            self.layer = layer;
            self.last_valid_position = Some(position);
        }
        self.sync_tile(tilemap, true);
    }

    /// Layer a world (x, z) point should resolve to: current layer when walkable there,
    /// else the walkable layer whose tile height is closest to the actor.
    pub fn resolve_layer_for(&self, tilemap: &Tilemap, x: f32, z: f32) -> usize {
        let probe = Vec3::new(x, self.position.y, z);
        if tilemap.walkable_tile_at(probe, self.layer).is_some() {
            return self.layer;
        }
        (0..tilemap.layer_count())
            .filter_map(|layer| {
                tilemap
                    .walkable_tile_at(probe, layer)
                    .map(|(_, tile)| (layer, (tile.height - self.position.y).abs()))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(layer, _)| layer)
            .unwrap_or(self.layer)
    }

    pub fn set_layer(&mut self, layer: usize) {
        self.layer = layer;
        self.last_tile = None;
    }

    pub fn jump(&mut self, ctx: &NavContext<'_>, direction: Vec2) -> JumpTarget {
        let target = find_jump_target(
            ctx.tilemap,
            self.position,
            self.layer,
            direction,
            &ctx.config.jump,
        );
        if let Some(direction) = direction.try_normalize() {
            self.yaw = yaw_from_direction(direction);
        }
        self.position = target.position;
        self.layer = target.layer;
        self.request_action(ActionName::Jump);
        self.sync_tile(ctx.tilemap, true);
        target
    }

    /// External displacement, as a physics engine would apply. Kinematic actors ignore it.
    pub fn push(&mut self, delta: Vec3) -> bool {
        if self.kinematic {
            return false;
        }
        self.position += delta;
        true
    }

    fn request_action(&mut self, action: ActionName) {
        if self.last_action == Some(action) {
            return;
        }
        self.last_action = Some(action);
        self.events.push(MovementEvent::ActionRequested {
            actor: self.actor,
            action,
        });
    }

    fn release_waiter(&mut self, outcome: WaitOutcome) {
        if let Some(waiter) = self.waiter.take() {
            waiter.release(outcome);
        }
    }

    fn sync_tile(&mut self, tilemap: &Tilemap, script_driven: bool) {
        let Some(tile) = tilemap.world_to_tile(self.position, self.layer) else {
            return;
        };
        let current = (self.layer, tile);
        if self.last_tile == Some(current) {
            return;
        }
        self.last_tile = Some(current);
        self.events.push(MovementEvent::TilePositionChanged {
            actor: self.actor,
            layer: self.layer,
            tile,
            script_driven,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ColliderVolume, StandingPlatform};
    use crate::movement::waiter::waiter_pair;
    use crate::nav::{NavLayer, TileRect};

    fn flat_layer(width: u32, height: u32, tile_height: f32, walkable: &[bool]) -> NavLayer {
        let heights = vec![tile_height; walkable.len()];
        NavLayer::from_walkable_mask(width, height, Vec2::ZERO, walkable, &heights).expect("layer")
    }

    fn open_tilemap(width: u32, height: u32) -> Tilemap {
        let walkable = vec![true; (width * height) as usize];
        Tilemap::new(1.0, vec![flat_layer(width, height, 0.0, &walkable)]).expect("tilemap")
    }

    fn controller_at(position: Vec3) -> MovementController {
        MovementController::new(ActorId(0), ActorProfile::default(), position, 0)
    }

    fn assert_vec3_close(actual: Vec3, expected: Vec3) {
        assert!(
            actual.distance(expected) < 1e-4,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn blocked_move_leaves_position_unchanged() {
        let mut walkable = vec![true; 9];
        walkable[1] = false; // (1,0)
        let tilemap =
            Tilemap::new(1.0, vec![flat_layer(3, 3, 0.0, &walkable)]).expect("tilemap");
        let collision = CollisionWorld::default();
        let config = MovementConfig::default();
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let start = Vec3::new(0.9, 0.0, 0.5);
        let mut controller = controller_at(start);

        let outcome = controller.move_towards(
            &ctx,
            Vec3::new(1.5, 0.0, 0.5),
            MoveMode::Walk,
            false,
            0.5,
            1.0,
        );
        assert_eq!(outcome, MoveOutcome::Blocked);
        assert_eq!(controller.position(), start);

        let forced = controller.move_towards(
            &ctx,
            Vec3::new(1.5, 0.0, 0.5),
            MoveMode::Walk,
            true,
            0.5,
            1.0,
        );
        assert_eq!(forced, MoveOutcome::InProgress);
        assert_vec3_close(controller.position(), Vec3::new(1.4, 0.0, 0.5));
    }

    #[test]
    fn cross_layer_switch_respects_tolerance() {
        let config = MovementConfig::default();
        let collision = CollisionWorld::default();
        let epsilon = 0.01;
        for (upper_height, expect_switch) in [
            (config.cross_layer_tolerance - epsilon, true),
            (config.cross_layer_tolerance + epsilon, false),
        ] {
            let mut lower = vec![true; 4];
            lower[1] = false;
            let mut upper = vec![false; 4];
            upper[1] = true;
            let tilemap = Tilemap::new(
                1.0,
                vec![
                    flat_layer(4, 1, 0.0, &lower),
                    flat_layer(4, 1, upper_height, &upper),
                ],
            )
            .expect("tilemap");
            let ctx = NavContext {
                tilemap: &tilemap,
                collision: &collision,
                config: &config,
            };
            let controller = controller_at(Vec3::new(0.9, 0.0, 0.5));
            let resolved = controller.can_goto_position(&ctx, Vec3::new(1.2, 0.0, 0.5));
            if expect_switch {
                let resolved = resolved.expect("accepted within tolerance");
                assert_eq!(resolved.layer, 1);
                assert_eq!(resolved.surface, Surface::OtherLayer);
                assert!((resolved.height - upper_height).abs() < 1e-6);
            } else {
                assert_eq!(resolved, None);
            }
        }
    }

    #[test]
    fn portal_accepts_regardless_of_height() {
        let config = MovementConfig::default();
        let collision = CollisionWorld::default();
        let mut lower = vec![true; 4];
        lower[1] = false;
        let mut upper = vec![false; 4];
        upper[1] = true;
        let tilemap = Tilemap::new(
            1.0,
            vec![
                flat_layer(4, 1, 0.0, &lower).with_portals(vec![TileRect::new(1, 0, 1, 0)]),
                flat_layer(4, 1, 5.0, &upper),
            ],
        )
        .expect("tilemap");
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let controller = controller_at(Vec3::new(0.9, 0.0, 0.5));
        let resolved = controller
            .can_goto_position(&ctx, Vec3::new(1.2, 0.0, 0.5))
            .expect("portal");
        assert_eq!(resolved.surface, Surface::Portal);
        assert_eq!(resolved.layer, 1);
        assert_eq!(resolved.height, 0.0);
    }

    #[test]
    fn platform_takes_priority_and_higher_surface_wins() {
        let config = MovementConfig::default();
        let tilemap = open_tilemap(4, 4);
        let mut collision = CollisionWorld::default();
        collision.add_platform(StandingPlatform {
            center: Vec3::new(2.0, 0.3, 2.0),
            half_extents: Vec2::splat(1.0),
        });
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let mut controller = controller_at(Vec3::new(2.0, 0.0, 2.0));
        controller.physics_tick(&ctx, 0.0);
        assert!(controller.contacts().is_on_platform());
        assert!((controller.position().y - 0.3).abs() < 1e-6);

        let resolved = controller
            .can_goto_position(&ctx, Vec3::new(2.5, 0.0, 2.5))
            .expect("resolved");
        assert_eq!(resolved.surface, Surface::Platform);
        assert!((resolved.height - 0.3).abs() < 1e-6);
    }

    #[test]
    fn platform_co_motion_has_no_drift() {
        let config = MovementConfig::default();
        let tilemap = open_tilemap(64, 8);
        let mut collision = CollisionWorld::default();
        let platform = collision.add_platform(StandingPlatform {
            center: Vec3::new(2.0, 0.0, 2.0),
            half_extents: Vec2::splat(1.5),
        });
        let start = Vec3::new(2.25, 0.0, 2.5);
        let mut controller = controller_at(start);
        {
            let ctx = NavContext {
                tilemap: &tilemap,
                collision: &collision,
                config: &config,
            };
            controller.physics_tick(&ctx, 0.0);
        }
        assert!(controller.contacts().is_on(platform));

        let delta = Vec3::new(0.125, 0.0, 0.0);
        for tick in 1..=200 {
            collision.translate_platform(platform, delta);
            let ctx = NavContext {
                tilemap: &tilemap,
                collision: &collision,
                config: &config,
            };
            controller.late_tick(&ctx);
            controller.physics_tick(&ctx, f64::from(tick));
        }
        let platform_moved = collision.platform(platform).expect("platform").position()
            - Vec3::new(2.0, 0.0, 2.0);
        assert_vec3_close(controller.position(), start + platform_moved);
    }

    #[test]
    fn collision_rolls_back_to_nearest_recorded_position() {
        let mut walkable = vec![true; 16];
        walkable[2 * 4 + 2] = false; // (2,2)
        let tilemap = Tilemap::new(1.0, vec![flat_layer(4, 4, 0.0, &walkable)]).expect("tilemap");
        let mut collision = CollisionWorld::default();
        let config = MovementConfig::default();
        collision.add_collider(ColliderVolume::new(
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(3.0, 1.0, 3.0),
        ));
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };

        let valid = Vec3::new(1.8, 0.0, 2.5);
        let mut controller = controller_at(valid);
        controller.physics_tick(&ctx, 0.0);
        assert!(controller.contacts().is_touching_collider());

        assert!(controller.push(Vec3::new(0.6, 0.0, 0.0)));
        controller.physics_tick(&ctx, 1.0);
        assert_vec3_close(controller.position(), valid);
    }

    #[test]
    fn kinematic_actor_ignores_push() {
        let mut controller = controller_at(Vec3::ZERO);
        controller.set_kinematic(true);
        assert!(!controller.push(Vec3::X));
        assert_eq!(controller.position(), Vec3::ZERO);
    }

    #[test]
    fn follows_path_and_releases_waiter_on_completion() {
        let config = MovementConfig::default();
        let tilemap = open_tilemap(6, 1);
        let collision = CollisionWorld::default();
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let mut controller = controller_at(Vec3::new(0.5, 0.0, 0.5));
        controller.begin_command();
        controller.setup_path(
            vec![Vec3::new(1.5, 0.0, 0.5), Vec3::new(3.5, 0.0, 0.5)],
            MoveMode::Run,
            EndAction::Idle,
            false,
        );
        let (waiter, mut handle) = waiter_pair();
        controller.attach_waiter(waiter);

        for _ in 0..200 {
            controller.logic_tick(&ctx, 0.05);
            if controller.state() == MovementState::Idle {
                break;
            }
        }
        assert_eq!(controller.state(), MovementState::Idle);
        assert!(horizontal_distance(controller.position(), Vec3::new(3.5, 0.0, 0.5)) <= 0.05);
        assert_eq!(handle.try_outcome(), Some(WaitOutcome::Completed));

        let actions = controller
            .take_events()
            .into_iter()
            .filter_map(|event| match event {
                MovementEvent::ActionRequested { action, .. } => Some(action),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(actions, vec![ActionName::Run, ActionName::Idle]);
    }

    #[test]
    fn step_back_faces_away_from_travel() {
        let mut controller = controller_at(Vec3::ZERO);
        controller.ease_rotation(Vec2::new(0.0, -1.0), MoveMode::StepBack, 0.01);
        assert!(controller.yaw().abs() < 1e-6);
        controller.ease_rotation(Vec2::new(1.0, 0.0), MoveMode::Walk, 0.1);
        assert!((controller.yaw() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn blocked_path_gives_up_with_end_action() {
        let mut walkable = vec![true; 4];
        walkable[2] = false;
        let tilemap = Tilemap::new(1.0, vec![flat_layer(4, 1, 0.0, &walkable)]).expect("tilemap");
        let collision = CollisionWorld::default();
        let config = MovementConfig::default();
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let mut controller = controller_at(Vec3::new(1.5, 0.0, 0.5));
        controller.setup_path(
            vec![Vec3::new(3.5, 0.0, 0.5)],
            MoveMode::Walk,
            EndAction::WaitAndReverse,
            false,
        );
        let (waiter, mut handle) = waiter_pair();
        controller.attach_waiter(waiter);

        let mut reverse = None;
        for _ in 0..100 {
            let effects = controller.logic_tick(&ctx, 0.1);
            if effects.reverse_request.is_some() {
                reverse = effects.reverse_request;
                break;
            }
        }
        assert!(reverse.is_some());
        assert_eq!(controller.state(), MovementState::Idle);
        assert_eq!(handle.try_outcome(), Some(WaitOutcome::GaveUp));
        assert!(controller.position().x < 2.0);
    }

    #[test]
    fn pause_and_resume_reissue_actions() {
        let mut controller = controller_at(Vec3::ZERO);
        controller.setup_path(vec![Vec3::X * 3.0], MoveMode::Walk, EndAction::Idle, false);
        controller.pause_movement();
        assert_eq!(controller.state(), MovementState::OnHold);
        controller.resume_movement();
        assert_eq!(controller.state(), MovementState::Following);
        let actions = controller
            .take_events()
            .into_iter()
            .filter_map(|event| match event {
                MovementEvent::ActionRequested { action, .. } => Some(action),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(actions, vec![ActionName::Walk, ActionName::Stand, ActionName::Walk]);
    }

    #[test]
    fn resolved_tile_height_overrides_target_height() {
        let config = MovementConfig::default();
        let tilemap = open_tilemap(8, 1);
        let collision = CollisionWorld::default();
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let mut controller = controller_at(Vec3::new(0.5, 0.0, 0.5));
        controller.move_towards(&ctx, Vec3::new(4.5, 0.005, 0.5), MoveMode::Walk, false, 1.0, 1.0);
        assert_eq!(controller.position().y, 0.0);

        let mut controller = controller_at(Vec3::new(0.5, 0.0, 0.5));
        controller.move_towards(&ctx, Vec3::new(4.5, 2.0, 0.5), MoveMode::Walk, false, 1.0, 1.0);
        assert_eq!(controller.position().y, 0.0);
    }

    #[test]
    fn walking_over_raised_tile_takes_its_height() {
        let walkable = [true; 4];
        let heights = [0.0, 0.5, 0.0, 0.0];
        let layer = NavLayer::from_walkable_mask(4, 1, Vec2::ZERO, &walkable, &heights)
            .expect("layer");
        let tilemap = Tilemap::new(1.0, vec![layer]).expect("tilemap");
        let collision = CollisionWorld::default();
        let config = MovementConfig::default();
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let mut controller = controller_at(Vec3::new(0.5, 0.0, 0.5));

        let outcome = controller.move_towards(
            &ctx,
            Vec3::new(2.5, 0.0, 0.5),
            MoveMode::Walk,
            false,
            1.0,
            1.0,
        );
        assert_eq!(outcome, MoveOutcome::InProgress);
        assert_vec3_close(controller.position(), Vec3::new(1.5, 0.5, 0.5));

        controller.physics_tick(&ctx, 0.0);
        assert!((controller.position().y - 0.5).abs() < 1e-6);

        controller.move_towards(&ctx, Vec3::new(2.5, 0.0, 0.5), MoveMode::Walk, false, 1.0, 1.0);
        assert_vec3_close(controller.position(), Vec3::new(2.5, 0.0, 0.5));
    }

    #[test]
    fn older_platform_does_not_replay_motion_after_newer_one_leaves() {
        let config = MovementConfig::default();
        let tilemap = open_tilemap(16, 16);
        let mut collision = CollisionWorld::default();
        let outer = collision.add_platform(StandingPlatform {
            center: Vec3::new(5.0, 0.0, 5.0),
            half_extents: Vec2::splat(3.0),
        });
        let start = Vec3::new(5.0, 0.0, 5.0);
        let mut controller = controller_at(start);
        {
            let ctx = NavContext {
                tilemap: &tilemap,
                collision: &collision,
                config: &config,
            };
            controller.physics_tick(&ctx, 0.0);
        }
        let inner = collision.add_platform(StandingPlatform {
            center: Vec3::new(5.0, 0.0, 5.0),
            half_extents: Vec2::splat(1.0),
        });
        {
            let ctx = NavContext {
                tilemap: &tilemap,
                collision: &collision,
                config: &config,
            };
            controller.physics_tick(&ctx, 1.0);
        }
        assert_eq!(controller.contacts().active_platform().map(|info| info.handle), Some(inner));

        collision.translate_platform(outer, Vec3::new(1.0, 0.0, 0.0));
        {
            let ctx = NavContext {
                tilemap: &tilemap,
                collision: &collision,
                config: &config,
            };
            controller.late_tick(&ctx);
            controller.physics_tick(&ctx, 2.0);
        }
        assert_vec3_close(controller.position(), start);

        assert!(collision.remove_platform(inner));
        {
            let ctx = NavContext {
                tilemap: &tilemap,
                collision: &collision,
                config: &config,
            };
            controller.physics_tick(&ctx, 3.0);
            assert_eq!(controller.contacts().active_platform().map(|info| info.handle), Some(outer));
            controller.late_tick(&ctx);
        }
        assert_vec3_close(controller.position(), start);

        collision.translate_platform(outer, Vec3::new(0.5, 0.0, 0.0));
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        controller.late_tick(&ctx);
        assert_vec3_close(controller.position(), start + Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn touching_collider_blocks_steps_into_it_but_not_away() {
        let tilemap = open_tilemap(4, 1);
        let mut collision = CollisionWorld::default();
        collision.add_collider(ColliderVolume::new(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 1.0),
        ));
        let config = MovementConfig::default();
        let ctx = NavContext {
            tilemap: &tilemap,
            collision: &collision,
            config: &config,
        };
        let start = Vec3::new(0.8, 0.0, 0.5);
        let mut controller = controller_at(start);
        controller.physics_tick(&ctx, 0.0);
        assert!(controller.contacts().is_touching_collider());

        let outcome = controller.move_towards(
            &ctx,
            Vec3::new(3.5, 0.0, 0.5),
            MoveMode::Walk,
            false,
            0.1,
            0.5,
        );
        assert_eq!(outcome, MoveOutcome::InProgress);
        assert_eq!(controller.position().x, start.x);
        assert_eq!(controller.position().z, start.z);
        assert!((controller.yaw() - 0.5).abs() < 1e-6);

        let outcome = controller.move_towards(
            &ctx,
            Vec3::new(0.0, 0.0, 0.5),
            MoveMode::Walk,
            false,
            0.1,
            0.5,
        );
        assert_eq!(outcome, MoveOutcome::InProgress);
        assert_vec3_close(controller.position(), Vec3::new(0.7, 0.0, 0.5));
    }
}
