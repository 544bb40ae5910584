use std::collections::HashSet;
use std::sync::Arc;

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::{MovementEvent, MovementEventBus};
use super::scheduler::{TaskHandle, TaskScheduler};
use crate::collision::CollisionWorld;
use crate::movement::{
    waiter_pair, ActorProfile, EndAction, MoveMode, MovementConfig, MovementController,
    NavContext, Path, PathCommand, TickEffects, WaitHandle, WaitOutcome,
};
use crate::nav::{
    JumpTarget, PathJob, PathOutcome, PathTicket, PathWorkerPool, TileCoord, Tilemap, TilemapError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown actor {0:?}")]
    UnknownActor(ActorId),
    #[error("actor {0:?} is inactive")]
    InactiveActor(ActorId),
    #[error("layer {layer} out of range (layer_count={layer_count})")]
    LayerOutOfRange { layer: usize, layer_count: usize },
    #[error("tile ({x}, {y}) is outside layer {layer}")]
    TileOutOfRange { x: i32, y: i32, layer: usize },
    #[error(transparent)]
    Tilemap(#[from] TilemapError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    pub movement: MovementConfig,
    /// 0 runs searches inline; results still arrive on the next tick.
    pub path_worker_threads: usize,
    /// Seed for reverse-replay delays. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            movement: MovementConfig::default(),
            path_worker_threads: 2,
            rng_seed: None,
        }
    }
}

#[derive(Debug)]
pub struct Actor {
    pub id: ActorId,
    pub def_name: String,
    pub is_player: bool,
    active: bool,
    controller: MovementController,
    pending_command: Option<PathCommand>,
    reverse_task: Option<TaskHandle>,
}

impl Actor {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn controller(&self) -> &MovementController {
        &self.controller
    }
}

#[derive(Debug)]
enum WorldTask {
    ReversePath {
        actor: ActorId,
        generation: u64,
        path: Path,
    },
}

/// Owns every actor of a scene and drives the logic, late and physics phases.
pub struct ActorWorld {
    config: WorldConfig,
    tilemap: Arc<Tilemap>,
    collision: CollisionWorld,
    actors: Vec<Actor>,
    scheduler: TaskScheduler<WorldTask>,
    path_workers: PathWorkerPool,
    events: MovementEventBus,
    rng: StdRng,
    elapsed_seconds: f64,
    tick_count: u64,
}

impl ActorWorld {
    pub fn new(tilemap: Arc<Tilemap>, collision: CollisionWorld, config: WorldConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let path_workers = PathWorkerPool::new(config.path_worker_threads);
        info!(
            layers = tilemap.layer_count(),
            tile_size = tilemap.tile_size(),
            path_threads = path_workers.thread_count(),
            "actor_world_created"
        );
        Self {
            config,
            tilemap,
            collision,
            actors: Vec::new(),
            scheduler: TaskScheduler::default(),
            path_workers,
            events: MovementEventBus::default(),
            rng,
            elapsed_seconds: 0.0,
            tick_count: 0,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn tilemap(&self) -> &Arc<Tilemap> {
        &self.tilemap
    }

    pub fn collision(&self) -> &CollisionWorld {
        &self.collision
    }

    pub fn collision_mut(&mut self) -> &mut CollisionWorld {
        &mut self.collision
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(id.0 as usize)
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn path_jobs_in_flight(&self) -> usize {
        self.path_workers.in_flight()
    }

    pub fn scheduled_tasks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn events(&self) -> &MovementEventBus {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<MovementEvent> {
        self.events.drain()
    }

    pub fn spawn_actor(
        &mut self,
        def_name: &str,
        profile: ActorProfile,
        tile: TileCoord,
        layer: usize,
        is_player: bool,
    ) -> Result<ActorId, CommandError> {
        self.check_tile(tile, layer)?;
        let id = ActorId(self.actors.len() as u32);
        let mut spawn_tile = tile;
        if !self.tilemap.is_walkable(tile, layer) {
            match self.tilemap.find_nearest_walkable_tile(tile, layer, 4) {
                Some(snapped) => {
                    warn!(
                        actor = id.0,
                        x = tile.x,
                        y = tile.y,
                        snapped_x = snapped.x,
                        snapped_y = snapped.y,
                        "spawn_snapped_to_walkable"
                    );
                    spawn_tile = snapped;
                }
                None => warn!(actor = id.0, x = tile.x, y = tile.y, "spawn_on_unwalkable_tile"),
            }
        }

        let position = self
            .tilemap
            .tile_to_world(spawn_tile, layer)
            .unwrap_or(Vec3::ZERO);
        let mut controller = MovementController::new(id, profile, position, layer);
        controller.set_kinematic(is_player);
        self.actors.push(Actor {
            id,
            def_name: def_name.to_string(),
            is_player,
            active: true,
            controller,
            pending_command: None,
            reverse_task: None,
        });
        info!(
            actor = id.0,
            def = def_name,
            layer,
            x = spawn_tile.x,
            y = spawn_tile.y,
            "actor_spawned"
        );
        self.with_controller(id, |controller, ctx| {
            controller.set_tile_position(ctx, spawn_tile)
        })?;
        Ok(id)
    }

    /// Runs one fixed step: path results, due tasks, then logic, late and physics phases.
    pub fn tick(&mut self, dt_seconds: f32) {
        self.tick_count = self.tick_count.saturating_add(1);
        self.elapsed_seconds += f64::from(dt_seconds.max(0.0));

        for outcome in self.path_workers.poll_completed() {
            self.apply_path_outcome(outcome);
        }
        self.run_due_tasks();

        let effects = self.logic_phase(dt_seconds);
        for (index, tick_effects) in effects {
            self.merge_effects(index, tick_effects);
        }

        self.late_phase();
        self.physics_phase();
        self.collect_controller_events();
        self.events.finish_tick_rollover();
    }

    fn logic_phase(&mut self, dt_seconds: f32) -> Vec<(usize, TickEffects)> {
        let ctx = NavContext {
            tilemap: &self.tilemap,
            collision: &self.collision,
            config: &self.config.movement,
        };
        self.actors
            .par_iter_mut()
            .enumerate()
            .filter(|(_, actor)| actor.active)
            .map(|(index, actor)| (index, actor.controller.logic_tick(&ctx, dt_seconds)))
            .collect()
    }

    fn late_phase(&mut self) {
        let ctx = NavContext {
            tilemap: &self.tilemap,
            collision: &self.collision,
            config: &self.config.movement,
        };
        for actor in self.actors.iter_mut().filter(|actor| actor.active) {
            actor.controller.late_tick(&ctx);
        }
    }

    fn physics_phase(&mut self) {
        let ctx = NavContext {
            tilemap: &self.tilemap,
            collision: &self.collision,
            config: &self.config.movement,
        };
        let now = self.elapsed_seconds;
        for actor in self.actors.iter_mut().filter(|actor| actor.active) {
            actor.controller.physics_tick(&ctx, now);
        }
    }

    fn collect_controller_events(&mut self) {
        for actor in &mut self.actors {
            self.events.extend(actor.controller.take_events());
        }
    }

    fn merge_effects(&mut self, index: usize, effects: TickEffects) {
        let Some(actor) = self.actors.get_mut(index) else {
            return;
        };
        self.events.extend(actor.controller.take_events());

        if let Some(path) = effects.reverse_request {
            let config = &self.config.movement;
            let (min, max) = (
                config.reverse_delay_min_seconds.min(config.reverse_delay_max_seconds),
                config.reverse_delay_min_seconds.max(config.reverse_delay_max_seconds),
            );
            let delay = self.rng.gen_range(min..=max);
            let wake_at = self.elapsed_seconds + f64::from(delay);
            let handle = self.scheduler.schedule(
                wake_at,
                WorldTask::ReversePath {
                    actor: actor.id,
                    generation: actor.controller.generation(),
                    path,
                },
            );
            actor.reverse_task = Some(handle);
            debug!(actor = actor.id.0, delay, "reverse_path_scheduled");
        }

        if effects.dispose {
            actor.active = false;
            actor.controller.deactivate();
            self.events.extend(actor.controller.take_events());
            self.events.emit(MovementEvent::ActorDisposed { actor: actor.id });
            info!(actor = actor.id.0, "actor_disposed");
        }
    }

    fn run_due_tasks(&mut self) {
        for (handle, task) in self.scheduler.drain_due(self.elapsed_seconds) {
            match task {
                WorldTask::ReversePath {
                    actor,
                    generation,
                    path,
                } => {
                    let Some(entry) = self.actors.get_mut(actor.0 as usize) else {
                        continue;
                    };
                    if entry.reverse_task != Some(handle) {
                        continue;
                    }
                    entry.reverse_task = None;
                    if !entry.active || entry.controller.generation() != generation {
                        debug!(actor = actor.0, "reverse_path_dropped");
                        continue;
                    }
                    debug!(
                        actor = actor.0,
                        waypoints = path.waypoints().len(),
                        "reverse_path_started"
                    );
                    entry.controller.install_path(path);
                }
            }
        }
    }

    fn apply_path_outcome(&mut self, outcome: PathOutcome) {
        let actor_id = outcome.ticket.actor;
        let Some(actor) = self.actors.get_mut(actor_id.0 as usize) else {
            return;
        };
        let Some(pending) = actor
            .controller
            .take_pending_search(outcome.ticket.generation)
        else {
            warn!(
                actor = actor_id.0,
                generation = outcome.ticket.generation,
                current = actor.controller.generation(),
                "stale_path_result_dropped"
            );
            return;
        };
        let command = actor.pending_command.take().unwrap_or_default();

        if outcome.tiles.is_empty() {
            self.events.emit(MovementEvent::PathSearchFailed {
                actor: actor_id,
                layer: outcome.layer,
                goal: pending.goal,
            });
            let fallback = command
                .fallback_to_direct
                .then(|| self.tilemap.tile_to_world(pending.goal, outcome.layer))
                .flatten();
            match fallback {
                Some(target) => {
                    debug!(actor = actor_id.0, "path_search_failed_direct_fallback");
                    actor
                        .controller
                        .setup_path(vec![target], command.mode, command.end_action, true);
                }
                None => {
                    debug!(actor = actor_id.0, "path_search_failed");
                    actor.controller.fail_search();
                }
            }
            self.events.extend(actor.controller.take_events());
            return;
        }

        // First tile is where the actor already stands.
        let waypoints = outcome
            .tiles
            .iter()
            .skip(1)
            .filter_map(|tile| self.tilemap.tile_to_world(*tile, outcome.layer))
            .collect::<Vec<_>>();
        actor.controller.setup_path(
            waypoints,
            command.mode,
            command.end_action,
            command.ignore_obstacle,
        );
        self.events.extend(actor.controller.take_events());
    }

    fn check_layer(&self, layer: usize) -> Result<(), CommandError> {
        let layer_count = self.tilemap.layer_count();
        if layer >= layer_count {
            return Err(CommandError::LayerOutOfRange { layer, layer_count });
        }
        Ok(())
    }

    fn check_tile(&self, tile: TileCoord, layer: usize) -> Result<(), CommandError> {
        self.check_layer(layer)?;
        if self.tilemap.get_tile(tile.x, tile.y, layer).is_none() {
            return Err(CommandError::TileOutOfRange {
                x: tile.x,
                y: tile.y,
                layer,
            });
        }
        Ok(())
    }

    fn index_of(&self, id: ActorId) -> Result<usize, CommandError> {
        let index = id.0 as usize;
        if index >= self.actors.len() {
            return Err(CommandError::UnknownActor(id));
        }
        Ok(index)
    }

    fn active_index(&self, id: ActorId) -> Result<usize, CommandError> {
        let index = self.index_of(id)?;
        if !self.actors[index].active {
            return Err(CommandError::InactiveActor(id));
        }
        Ok(index)
    }

    fn with_controller<R>(
        &mut self,
        id: ActorId,
        apply: impl FnOnce(&mut MovementController, &NavContext<'_>) -> R,
    ) -> Result<R, CommandError> {
        let index = self.active_index(id)?;
        let ctx = NavContext {
            tilemap: &self.tilemap,
            collision: &self.collision,
            config: &self.config.movement,
        };
        let actor = &mut self.actors[index];
        let result = apply(&mut actor.controller, &ctx);
        self.events.extend(actor.controller.take_events());
        Ok(result)
    }

    /// Drops the reverse replay and the previous command. New movement commands
    /// pass `None` and supersede; stop-style commands pass the outcome to report.
    fn interrupt(
        &mut self,
        id: ActorId,
        cancel_with: Option<WaitOutcome>,
    ) -> Result<u64, CommandError> {
        let index = self.active_index(id)?;
        let actor = &mut self.actors[index];
        if let Some(handle) = actor.reverse_task.take() {
            self.scheduler.cancel(handle);
        }
        actor.pending_command = None;
        let generation = match cancel_with {
            Some(outcome) => {
                actor.controller.cancel_movement(outcome);
                actor.controller.generation()
            }
            None => actor.controller.begin_command(),
        };
        self.events.extend(actor.controller.take_events());
        Ok(generation)
    }

    pub fn set_tile_position(&mut self, id: ActorId, x: i32, y: i32) -> Result<(), CommandError> {
        let index = self.active_index(id)?;
        let tile = TileCoord::new(x, y);
        self.check_tile(tile, self.actors[index].controller.layer())?;
        self.interrupt(id, Some(WaitOutcome::Cancelled))?;
        debug!(actor = id.0, x, y, "set_tile_position");
        self.with_controller(id, |controller, ctx| controller.set_tile_position(ctx, tile))
    }

    pub fn set_world_position(&mut self, id: ActorId, x: f32, z: f32) -> Result<(), CommandError> {
        let index = self.active_index(id)?;
        let controller = &self.actors[index].controller;
        let layer = controller.resolve_layer_for(&self.tilemap, x, z);
        let probe = Vec3::new(x, controller.position().y, z);
        let tile = self
            .tilemap
            .world_to_tile(probe, layer)
            .ok_or(CommandError::LayerOutOfRange {
                layer,
                layer_count: self.tilemap.layer_count(),
            })?;
        self.check_tile(tile, layer)?;
        if layer != controller.layer() {
            self.actors[index].controller.set_layer(layer);
        }
        self.set_tile_position(id, tile.x, tile.y)
    }

    pub fn path_to(
        &mut self,
        id: ActorId,
        x: i32,
        y: i32,
        command: PathCommand,
    ) -> Result<(), CommandError> {
        let index = self.active_index(id)?;
        let layer = self.actors[index].controller.layer();
        let goal = TileCoord::new(x, y);
        self.check_tile(goal, layer)?;
        let generation = self.interrupt(id, None)?;

        let blocked = self.dynamic_obstacles(id, layer);
        let actor = &mut self.actors[index];
        let start = actor
            .controller
            .tile(&self.tilemap)
            .unwrap_or(TileCoord::new(0, 0));
        actor.controller.mark_search_pending(goal);
        actor.pending_command = Some(command);
        debug!(
            actor = id.0,
            generation,
            layer,
            from_x = start.x,
            from_y = start.y,
            to_x = x,
            to_y = y,
            blocked = blocked.len(),
            "path_search_submitted"
        );
        self.path_workers.submit(PathJob {
            ticket: PathTicket {
                actor: id,
                generation,
            },
            tilemap: Arc::clone(&self.tilemap),
            layer,
            start,
            goal,
            blocked,
        });
        Ok(())
    }

    /// Tiles held by other active actors on `layer`.
    fn dynamic_obstacles(&self, except: ActorId, layer: usize) -> HashSet<TileCoord> {
        self.actors
            .iter()
            .filter(|actor| {
                actor.active && actor.id != except && actor.controller.layer() == layer
            })
            .filter_map(|actor| actor.controller.tile(&self.tilemap))
            .collect()
    }

    pub fn move_to(
        &mut self,
        id: ActorId,
        x: i32,
        y: i32,
        mode: MoveMode,
    ) -> Result<(), CommandError> {
        let index = self.active_index(id)?;
        let layer = self.actors[index].controller.layer();
        let tile = TileCoord::new(x, y);
        self.check_tile(tile, layer)?;
        let target = self
            .tilemap
            .tile_to_world(tile, layer)
            .ok_or(CommandError::TileOutOfRange { x, y, layer })?;
        self.interrupt(id, None)?;
        debug!(actor = id.0, x, y, mode = ?mode, "move_to");
        self.with_controller(id, |controller, _| {
            controller.setup_path(vec![target], mode, EndAction::Idle, false)
        })
    }

    pub fn move_backwards(&mut self, id: ActorId, distance: f32) -> Result<(), CommandError> {
        self.interrupt(id, None)?;
        debug!(actor = id.0, distance, "move_backwards");
        self.with_controller(id, |controller, _| {
            let target = controller.position() - controller.forward() * distance;
            controller.setup_path(vec![target], MoveMode::StepBack, EndAction::Idle, false)
        })
    }

    pub fn stop_and_cancel(&mut self, id: ActorId) -> Result<(), CommandError> {
        debug!(actor = id.0, "stop_and_cancel");
        self.interrupt(id, Some(WaitOutcome::Cancelled)).map(|_| ())
    }

    pub fn set_nav_layer(&mut self, id: ActorId, layer: usize) -> Result<(), CommandError> {
        self.check_layer(layer)?;
        debug!(actor = id.0, layer, "set_nav_layer");
        self.with_controller(id, |controller, _| controller.set_layer(layer))
    }

    pub fn activate(&mut self, id: ActorId) -> Result<(), CommandError> {
        let index = self.index_of(id)?;
        let actor = &mut self.actors[index];
        if !actor.active {
            actor.active = true;
            info!(actor = id.0, "actor_activated");
        }
        Ok(())
    }

    pub fn deactivate(&mut self, id: ActorId) -> Result<(), CommandError> {
        let index = self.index_of(id)?;
        let actor = &mut self.actors[index];
        if !actor.active {
            return Ok(());
        }
        if let Some(handle) = actor.reverse_task.take() {
            self.scheduler.cancel(handle);
        }
        actor.pending_command = None;
        actor.controller.deactivate();
        actor.active = false;
        self.events.extend(actor.controller.take_events());
        info!(actor = id.0, "actor_deactivated");
        Ok(())
    }

    pub fn pause_movement(&mut self, id: ActorId) -> Result<(), CommandError> {
        self.with_controller(id, |controller, _| controller.pause_movement())
    }

    pub fn resume_movement(&mut self, id: ActorId) -> Result<(), CommandError> {
        self.with_controller(id, |controller, _| controller.resume_movement())
    }

    pub fn jump(&mut self, id: ActorId, direction: Vec2) -> Result<JumpTarget, CommandError> {
        self.interrupt(id, None)?;
        let target = self.with_controller(id, |controller, ctx| controller.jump(ctx, direction))?;
        debug!(actor = id.0, layer = target.layer, landed = target.tile.is_some(), "jump");
        Ok(target)
    }

    pub fn set_kinematic(&mut self, id: ActorId, kinematic: bool) -> Result<(), CommandError> {
        self.with_controller(id, |controller, _| controller.set_kinematic(kinematic))
    }

    /// Applies an external displacement. Returns false when the actor is kinematic.
    pub fn push_actor(&mut self, id: ActorId, delta: Vec3) -> Result<bool, CommandError> {
        self.with_controller(id, |controller, _| controller.push(delta))
    }

    /// Copy-on-write: searches already in flight keep their snapshot.
    pub fn mark_obstacle(
        &mut self,
        x: i32,
        y: i32,
        layer: usize,
        blocked: bool,
    ) -> Result<(), CommandError> {
        self.check_tile(TileCoord::new(x, y), layer)?;
        Arc::make_mut(&mut self.tilemap).mark_obstacle(TileCoord::new(x, y), layer, blocked)?;
        debug!(x, y, layer, blocked, "obstacle_marked");
        Ok(())
    }

    /// Handle released when the current movement ends. Idle actors release immediately.
    pub fn attach_waiter(&mut self, id: ActorId) -> Result<WaitHandle, CommandError> {
        let (waiter, handle) = waiter_pair();
        self.with_controller(id, |controller, _| controller.attach_waiter(waiter))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementState;
    use crate::nav::NavLayer;

    fn tilemap_from_rows(rows: &[&str]) -> Arc<Tilemap> {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut walkable = vec![true; (width * height) as usize];
        for (row_index, row) in rows.iter().enumerate() {
            let y = height as usize - 1 - row_index;
            for (x, symbol) in row.chars().enumerate() {
                walkable[y * width as usize + x] = symbol != '#';
            }
        }
        let heights = vec![0.0; walkable.len()];
        let layer = NavLayer::from_walkable_mask(width, height, Vec2::ZERO, &walkable, &heights)
            .expect("layer");
        Arc::new(Tilemap::new(1.0, vec![layer]).expect("tilemap"))
    }

    fn inline_world(rows: &[&str]) -> ActorWorld {
        ActorWorld::new(
            tilemap_from_rows(rows),
            CollisionWorld::default(),
            WorldConfig {
                path_worker_threads: 0,
                rng_seed: Some(7),
                ..WorldConfig::default()
            },
        )
    }

    fn tick_until_idle(world: &mut ActorWorld, actor: ActorId, max_ticks: usize) {
        for _ in 0..max_ticks {
            world.tick(0.1);
            let controller = world.actor(actor).expect("actor").controller();
            if controller.state() == MovementState::Idle && !controller.is_busy() {
                return;
            }
        }
        panic!("actor {actor:?} never went idle");
    }

    fn current_tile(world: &ActorWorld, actor: ActorId) -> TileCoord {
        world
            .actor(actor)
            .expect("actor")
            .controller()
            .tile(world.tilemap())
            .expect("tile")
    }

    #[test]
    fn path_to_reaches_goal_around_wall() {
        let mut world = inline_world(&[
            "..........",
            ".....#....",
            ".....#....",
            ".....#....",
            ".....#....",
            ".....#....",
            ".....#....",
            ".....#....",
            ".....#....",
            ".....#....",
        ]);
        let actor = world
            .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 0), 0, false)
            .expect("spawn");
        world
            .path_to(actor, 9, 0, PathCommand::default())
            .expect("path_to");
        let mut handle = world.attach_waiter(actor).expect("waiter");

        let mut visited = Vec::new();
        for _ in 0..2000 {
            world.tick(0.1);
            visited.push(current_tile(&world, actor));
            if handle.try_outcome().is_some() {
                break;
            }
        }
        assert_eq!(handle.try_outcome(), Some(WaitOutcome::Completed));
        assert_eq!(current_tile(&world, actor), TileCoord::new(9, 0));
        assert!(visited.contains(&TileCoord::new(5, 9)));
        assert!(visited.iter().all(|tile| tile.x != 5 || tile.y == 9));
    }

    #[test]
    fn newer_command_discards_stale_search() {
        let mut world = inline_world(&["........"; 4]);
        let actor = world
            .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 0), 0, false)
            .expect("spawn");
        world.path_to(actor, 7, 0, PathCommand::default()).expect("first");
        let mut first = world.attach_waiter(actor).expect("first waiter");
        world.path_to(actor, 0, 3, PathCommand::default()).expect("second");
        assert_eq!(first.try_outcome(), Some(WaitOutcome::Superseded));

        tick_until_idle(&mut world, actor, 500);
        assert_eq!(current_tile(&world, actor), TileCoord::new(0, 3));
    }

    #[test]
    fn cancel_mid_path_stops_and_releases_waiter_once() {
        let mut world = inline_world(&["............"; 3]);
        let actor = world
            .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 1), 0, false)
            .expect("spawn");
        world.path_to(actor, 11, 1, PathCommand::default()).expect("path_to");
        let mut handle = world.attach_waiter(actor).expect("waiter");
        for _ in 0..10 {
            world.tick(0.1);
        }
        assert_eq!(handle.try_outcome(), None);

        world.stop_and_cancel(actor).expect("cancel");
        world.tick(0.1);
        let stopped_at = world.actor(actor).expect("actor").controller().position();
        assert_eq!(
            world.actor(actor).expect("actor").controller().state(),
            MovementState::Idle
        );
        for _ in 0..20 {
            world.tick(0.1);
        }
        assert_eq!(world.actor(actor).expect("actor").controller().position(), stopped_at);
        assert_eq!(handle.pending_releases(), 1);
        assert_eq!(handle.try_outcome(), Some(WaitOutcome::Cancelled));
        assert_eq!(handle.pending_releases(), 0);
    }

    #[test]
    fn other_actors_block_search() {
        let mut world = inline_world(&["#####", ".....", "#####"]);
        let walker = world
            .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 1), 0, false)
            .expect("walker");
        world
            .spawn_actor("guard", ActorProfile::default(), TileCoord::new(2, 1), 0, false)
            .expect("guard");
        world.drain_events();

        world.path_to(walker, 4, 1, PathCommand::default()).expect("path_to");
        let mut handle = world.attach_waiter(walker).expect("waiter");
        world.tick(0.1);

        assert_eq!(handle.try_outcome(), Some(WaitOutcome::PathNotFound));
        assert!(world.drain_events().iter().any(|event| matches!(
            event,
            MovementEvent::PathSearchFailed { actor, .. } if *actor == walker
        )));
    }

    #[test]
    fn dispose_self_deactivates_actor() {
        let mut world = inline_world(&["....."]);
        let actor = world
            .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 0), 0, false)
            .expect("spawn");
        world
            .path_to(
                actor,
                3,
                0,
                PathCommand {
                    end_action: EndAction::DisposeSelf,
                    ..PathCommand::default()
                },
            )
            .expect("path_to");
        let mut disposed = false;
        for _ in 0..200 {
            world.tick(0.1);
            if world
                .drain_events()
                .iter()
                .any(|event| matches!(event, MovementEvent::ActorDisposed { .. }))
            {
                disposed = true;
                break;
            }
        }
        assert!(disposed);
        assert!(!world.actor(actor).expect("actor").is_active());
        assert_eq!(
            world.move_to(actor, 0, 0, MoveMode::Walk),
            Err(CommandError::InactiveActor(actor))
        );
    }

    #[test]
    fn wait_and_reverse_patrols_back_and_forth() {
        let mut world = inline_world(&["......"]);
        let actor = world
            .spawn_actor("patrol", ActorProfile::default(), TileCoord::new(0, 0), 0, false)
            .expect("spawn");
        world
            .path_to(
                actor,
                4,
                0,
                PathCommand {
                    end_action: EndAction::WaitAndReverse,
                    ..PathCommand::default()
                },
            )
            .expect("path_to");
        tick_until_idle(&mut world, actor, 200);
        assert_eq!(current_tile(&world, actor), TileCoord::new(4, 0));
        assert_eq!(world.scheduled_tasks(), 1);

        // 8 s upper bound for each delay plus the walk.
        for expected in [TileCoord::new(0, 0), TileCoord::new(4, 0)] {
            let mut arrived = false;
            for _ in 0..200 {
                world.tick(0.1);
                let controller = world.actor(actor).expect("actor").controller();
                if controller.state() == MovementState::Idle
                    && current_tile(&world, actor) == expected
                {
                    arrived = true;
                    break;
                }
            }
            assert!(arrived, "patrol never reached {expected:?}");
            assert_eq!(world.scheduled_tasks(), 1);
        }

        world.stop_and_cancel(actor).expect("stop");
        assert_eq!(world.scheduled_tasks(), 0);
    }

    #[test]
    fn mark_obstacle_is_copy_on_write() {
        let mut world = inline_world(&["...", "...", "..."]);
        let snapshot = Arc::clone(world.tilemap());
        world.mark_obstacle(1, 1, 0, true).expect("mark");
        assert!(snapshot.is_walkable(TileCoord::new(1, 1), 0));
        assert!(!world.tilemap().is_walkable(TileCoord::new(1, 1), 0));
        assert!(matches!(
            world.mark_obstacle(5, 5, 0, true),
            Err(CommandError::TileOutOfRange { .. })
        ));
    }

    #[test]
    fn invalid_ids_and_indices_are_errors() {
        let mut world = inline_world(&["..."]);
        let actor = world
            .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 0), 0, false)
            .expect("spawn");
        assert_eq!(
            world.stop_and_cancel(ActorId(9)),
            Err(CommandError::UnknownActor(ActorId(9)))
        );
        assert_eq!(
            world.set_nav_layer(actor, 3),
            Err(CommandError::LayerOutOfRange {
                layer: 3,
                layer_count: 1
            })
        );
        assert!(matches!(
            world.path_to(actor, 0, 4, PathCommand::default()),
            Err(CommandError::TileOutOfRange { .. })
        ));
    }

    #[test]
    fn idle_actor_waiter_releases_immediately() {
        let mut world = inline_world(&["..."]);
        let actor = world
            .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 0), 0, false)
            .expect("spawn");
        let mut handle = world.attach_waiter(actor).expect("waiter");
        assert_eq!(handle.try_outcome(), Some(WaitOutcome::Completed));
    }

    #[test]
    fn threaded_search_matches_inline_result() {
        let rows = [".......", "..###..", ".......", "......."];
        let mut inline = inline_world(&rows);
        let mut threaded = ActorWorld::new(
            tilemap_from_rows(&rows),
            CollisionWorld::default(),
            WorldConfig {
                path_worker_threads: 2,
                rng_seed: Some(7),
                ..WorldConfig::default()
            },
        );
        let mut finals = Vec::new();
        for world in [&mut inline, &mut threaded] {
            let actor = world
                .spawn_actor("walker", ActorProfile::default(), TileCoord::new(0, 0), 0, false)
                .expect("spawn");
            world.path_to(actor, 6, 3, PathCommand::default()).expect("path_to");
            for _ in 0..1000 {
                world.tick(0.1);
                std::thread::sleep(std::time::Duration::from_millis(1));
                if !world.actor(actor).expect("actor").controller().is_busy() {
                    break;
                }
            }
            finals.push(current_tile(world, actor));
        }
        assert_eq!(finals[0], TileCoord::new(6, 3));
        assert_eq!(finals[0], finals[1]);
    }
}
