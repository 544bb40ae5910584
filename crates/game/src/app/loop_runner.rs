use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tilewalk_engine::{
    compile_actor_defs, load_scene, spawn_scene_actors, ActorId, ActorWorld, AppPaths,
    CommandError, MovementConfig, MovementEvent, MovementEventCounts, MovementState,
    PlatformHandle, TileCoord, Vec2, Vec3, WaitHandle, WaitOutcome, WorldConfig,
};
use tracing::{debug, info, warn};

use super::bootstrap::SimConfig;
use super::metrics::{TickMetricsAccumulator, TickMetricsSnapshot};
use super::script::{load_script, CommandScript, ScriptCommand, SCRIPT_VERSION};
use super::AppError;

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActorSummary {
    pub(crate) name: String,
    pub(crate) active: bool,
    pub(crate) layer: usize,
    pub(crate) tile: Option<TileCoord>,
    pub(crate) position: Vec3,
    pub(crate) state: MovementState,
}

#[derive(Debug, Clone)]
pub(crate) struct SimSummary {
    pub(crate) scene: String,
    pub(crate) fingerprint: String,
    pub(crate) ticks_run: u64,
    pub(crate) events: MovementEventCounts,
    pub(crate) applied_steps: usize,
    pub(crate) rejected_steps: usize,
    /// Released waits in release order, keyed by actor name.
    pub(crate) wait_outcomes: Vec<(String, WaitOutcome)>,
    pub(crate) actors: Vec<ActorSummary>,
}

struct PendingWait {
    actor: String,
    issued_at_tick: u64,
    handle: WaitHandle,
}

struct Simulation {
    world: ActorWorld,
    actor_ids: BTreeMap<String, ActorId>,
    actor_names: BTreeMap<ActorId, String>,
    platforms: BTreeMap<String, PlatformHandle>,
    waits: Vec<PendingWait>,
    wait_outcomes: Vec<(String, WaitOutcome)>,
    events: MovementEventCounts,
    applied_steps: usize,
    rejected_steps: usize,
}

pub(crate) fn run_simulation(config: &SimConfig, paths: &AppPaths) -> Result<SimSummary, AppError> {
    let defs = compile_actor_defs(&paths.defs_dir)?;
    let scene = load_scene(&config.scene_path)?;
    let script = match &config.script_path {
        Some(path) => {
            let script = load_script(path)?;
            info!(path = %path.display(), steps = script.steps.len(), "script_loaded");
            script
        }
        None => CommandScript {
            version: SCRIPT_VERSION,
            steps: Vec::new(),
        },
    };

    let mut world = ActorWorld::new(
        Arc::new(scene.tilemap),
        scene.collision,
        WorldConfig {
            movement: MovementConfig::default(),
            path_worker_threads: config.path_worker_threads,
            rng_seed: config.rng_seed,
        },
    );
    let actor_ids = spawn_scene_actors(&mut world, &scene.spawns, &defs)?;
    validate_script(&script, &actor_ids, &scene.platforms)?;

    let mut sim = Simulation {
        world,
        actor_names: actor_ids
            .iter()
            .map(|(name, id)| (*id, name.clone()))
            .collect(),
        actor_ids,
        platforms: scene.platforms,
        waits: Vec::new(),
        wait_outcomes: Vec::new(),
        events: MovementEventCounts::default(),
        applied_steps: 0,
        rejected_steps: 0,
    };

    let dt = config.fixed_dt_seconds();
    let mut metrics = TickMetricsAccumulator::new(METRICS_LOG_INTERVAL, Instant::now());
    let mut next_step = 0usize;
    for tick in 0..config.ticks {
        let started = Instant::now();
        while let Some(step) = script.steps.get(next_step).filter(|step| step.at_tick <= tick) {
            sim.apply_step(tick, &step.command);
            next_step += 1;
        }
        sim.world.tick(dt);
        let event_count = sim.drain_events(tick);
        sim.poll_waits(tick);

        let now = Instant::now();
        metrics.record_tick(now.saturating_duration_since(started), event_count);
        if let Some(snapshot) = metrics.maybe_snapshot(now) {
            log_metrics(&sim.world, snapshot);
        }
    }
    if let Some(snapshot) = metrics.flush(Instant::now()) {
        log_metrics(&sim.world, snapshot);
    }
    if next_step < script.steps.len() {
        warn!(
            remaining = script.steps.len() - next_step,
            ticks = config.ticks,
            "script_steps_not_reached"
        );
    }
    for wait in &sim.waits {
        debug!(actor = %wait.actor, issued_at_tick = wait.issued_at_tick, "wait_unresolved");
    }

    Ok(sim.summary(scene.name, scene.fingerprint, config.ticks))
}

fn validate_script(
    script: &CommandScript,
    actor_ids: &BTreeMap<String, ActorId>,
    platforms: &BTreeMap<String, PlatformHandle>,
) -> Result<(), AppError> {
    for (step, entry) in script.steps.iter().enumerate() {
        if let Some(name) = entry.command.actor() {
            if !actor_ids.contains_key(name) {
                return Err(AppError::UnknownScriptActor {
                    step,
                    name: name.to_string(),
                });
            }
        }
        if let ScriptCommand::MovePlatform { platform, .. } = &entry.command {
            if !platforms.contains_key(platform) {
                return Err(AppError::UnknownScriptPlatform {
                    step,
                    name: platform.clone(),
                });
            }
        }
    }
    Ok(())
}

fn log_metrics(world: &ActorWorld, snapshot: TickMetricsSnapshot) {
    info!(
        tick = world.tick_count(),
        tps = snapshot.tps,
        tick_ms = snapshot.tick_time_ms,
        max_tick_ms = snapshot.max_tick_time_ms,
        events_per_tick = snapshot.events_per_tick,
        path_jobs_in_flight = world.path_jobs_in_flight(),
        scheduled_tasks = world.scheduled_tasks(),
        "tick_metrics"
    );
}

impl Simulation {
    fn apply_step(&mut self, tick: u64, command: &ScriptCommand) {
        match self.execute(tick, command) {
            Ok(()) => {
                self.applied_steps += 1;
                debug!(
                    tick,
                    command = command.name(),
                    actor = ?command.actor(),
                    "script_command_applied"
                );
            }
            Err(err) => {
                self.rejected_steps += 1;
                warn!(
                    tick,
                    command = command.name(),
                    actor = ?command.actor(),
                    error = %err,
                    "script_command_rejected"
                );
            }
        }
    }

    fn execute(&mut self, tick: u64, command: &ScriptCommand) -> Result<(), CommandError> {
        // Names are validated against the spawn table before the loop starts;
        // an unmatched name maps to an id no actor holds.
        let id = command
            .actor()
            .and_then(|name| self.actor_ids.get(name).copied())
            .unwrap_or(ActorId(u32::MAX));
        let world = &mut self.world;
        match command {
            ScriptCommand::PathTo { x, y, options, .. } => world.path_to(id, *x, *y, *options),
            ScriptCommand::MoveTo { x, y, mode, .. } => world.move_to(id, *x, *y, *mode),
            ScriptCommand::MoveBackwards { distance, .. } => world.move_backwards(id, *distance),
            ScriptCommand::Stop { .. } => world.stop_and_cancel(id),
            ScriptCommand::SetTilePosition { x, y, .. } => world.set_tile_position(id, *x, *y),
            ScriptCommand::SetWorldPosition { x, z, .. } => world.set_world_position(id, *x, *z),
            ScriptCommand::SetNavLayer { layer, .. } => world.set_nav_layer(id, *layer),
            ScriptCommand::Activate { .. } => world.activate(id),
            ScriptCommand::Deactivate { .. } => world.deactivate(id),
            ScriptCommand::Pause { .. } => world.pause_movement(id),
            ScriptCommand::Resume { .. } => world.resume_movement(id),
            ScriptCommand::Jump { actor, direction } => {
                let target = world.jump(id, Vec2::from_array(*direction))?;
                debug!(
                    actor = %actor,
                    layer = target.layer,
                    x = target.position.x,
                    y = target.position.y,
                    z = target.position.z,
                    "jump_target"
                );
                Ok(())
            }
            ScriptCommand::SetKinematic { kinematic, .. } => world.set_kinematic(id, *kinematic),
            ScriptCommand::Push { actor, delta } => {
                let moved = world.push_actor(id, Vec3::from_array(*delta))?;
                if !moved {
                    debug!(actor = %actor, "push_ignored_kinematic");
                }
                Ok(())
            }
            ScriptCommand::MarkObstacle {
                x,
                y,
                layer,
                blocked,
            } => world.mark_obstacle(*x, *y, *layer, *blocked),
            ScriptCommand::MovePlatform { platform, delta } => {
                let moved = self
                    .platforms
                    .get(platform)
                    .is_some_and(|handle| {
                        world
                            .collision_mut()
                            .translate_platform(*handle, Vec3::from_array(*delta))
                    });
                if !moved {
                    warn!(platform = %platform, "platform_missing");
                }
                Ok(())
            }
            ScriptCommand::Wait { actor } => {
                let handle = world.attach_waiter(id)?;
                self.waits.push(PendingWait {
                    actor: actor.clone(),
                    issued_at_tick: tick,
                    handle,
                });
                Ok(())
            }
        }
    }

    fn name_of(&self, id: ActorId) -> &str {
        self.actor_names.get(&id).map(String::as_str).unwrap_or("?")
    }

    fn drain_events(&mut self, tick: u64) -> u32 {
        let events = self.world.drain_events();
        for event in &events {
            self.events.record(event.kind());
            let actor = self.name_of(event.actor());
            match *event {
                MovementEvent::ActionRequested { action, .. } => {
                    debug!(tick, actor, action = action.as_str(), "action_requested");
                }
                MovementEvent::TilePositionChanged {
                    layer,
                    tile,
                    script_driven,
                    ..
                } => {
                    debug!(
                        tick,
                        actor,
                        layer,
                        x = tile.x,
                        y = tile.y,
                        script_driven,
                        "tile_position_changed"
                    );
                }
                MovementEvent::PathSearchFailed { layer, goal, .. } => {
                    info!(tick, actor, layer, x = goal.x, y = goal.y, "path_search_failed");
                }
                MovementEvent::ActorDisposed { .. } => {
                    info!(tick, actor, "actor_disposed");
                }
            }
        }
        events.len() as u32
    }

    fn poll_waits(&mut self, tick: u64) {
        let mut index = 0;
        while index < self.waits.len() {
            match self.waits[index].handle.try_outcome() {
                Some(outcome) => {
                    let wait = self.waits.remove(index);
                    info!(
                        tick,
                        actor = %wait.actor,
                        waited_ticks = tick.saturating_sub(wait.issued_at_tick),
                        outcome = ?outcome,
                        "wait_released"
                    );
                    self.wait_outcomes.push((wait.actor, outcome));
                }
                None => index += 1,
            }
        }
    }

    fn summary(self, scene: String, fingerprint: String, ticks_run: u64) -> SimSummary {
        let tilemap = self.world.tilemap();
        let actors = self
            .actor_ids
            .iter()
            .filter_map(|(name, id)| {
                self.world.actor(*id).map(|actor| {
                    let controller = actor.controller();
                    ActorSummary {
                        name: name.clone(),
                        active: actor.is_active(),
                        layer: controller.layer(),
                        tile: controller.tile(tilemap),
                        position: controller.position(),
                        state: controller.state(),
                    }
                })
            })
            .collect();
        SimSummary {
            scene,
            fingerprint,
            ticks_run,
            events: self.events,
            applied_steps: self.applied_steps,
            rejected_steps: self.rejected_steps,
            wait_outcomes: self.wait_outcomes,
            actors,
        }
    }
}
