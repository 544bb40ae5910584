use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod collision;
pub mod content;
pub mod geometry;
pub mod movement;
pub mod nav;
pub mod world;

pub use collision::{
    ColliderHandle, ColliderVolume, CollisionWorld, PlatformHandle, StandingPlatform,
};
pub use content::{
    compile_actor_defs, load_scene, spawn_scene_actors, ActorDef, ActorDefDatabase, ActorDefId,
    ActorSpawn, ContentCompileError, ContentErrorCode, LoadedScene, SceneLoadError,
    SourceLocation,
};
pub use movement::{
    waiter_pair, ActionName, ActorProfile, EndAction, MoveMode, MovementConfig,
    MovementController, MovementState, PathCommand, WaitHandle, WaitOutcome,
};
pub use nav::{
    find_tile_path, FloorKind, JumpParams, NavLayer, NavTile, PathWorkerPool, TileCoord, TileRect,
    Tilemap, TilemapError,
};
pub use world::{
    Actor, ActorId, ActorWorld, CommandError, MovementEvent, MovementEventBus,
    MovementEventCounts, MovementEventKind, WorldConfig,
};

pub use glam::{Vec2, Vec3};

pub const ROOT_ENV_VAR: &str = "TILEWALK_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub defs_dir: PathBuf,
    pub scenes_dir: PathBuf,
    pub scripts_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "TILEWALK_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from: {start_dir}\n\
Expected a directory containing Cargo.toml and assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/tilewalk\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    Ok(app_paths_for_root(root))
}

pub fn app_paths_for_root(root: PathBuf) -> AppPaths {
    let assets_dir = root.join("assets");
    AppPaths {
        defs_dir: assets_dir.join("defs"),
        scenes_dir: assets_dir.join("scenes"),
        scripts_dir: assets_dir.join("scripts"),
        assets_dir,
        root,
    }
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            if let Some(found) = exe_dir.ancestors().find(|candidate| is_repo_marker(candidate)) {
                return Ok(normalize_path(found));
            }
            // `cargo run` from a checkout keeps the cwd at the workspace.
            if let Ok(cwd) = env::current_dir() {
                if let Some(found) = cwd.ancestors().find(|candidate| is_repo_marker(candidate)) {
                    return Ok(normalize_path(found));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    path.join("Cargo.toml").is_file() && path.join("assets").is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
