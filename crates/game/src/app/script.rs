use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tilewalk_engine::{MoveMode, PathCommand};

pub(crate) const SCRIPT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum ScriptError {
    #[error("failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse script {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("script version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CommandScript {
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScriptStep {
    pub(crate) at_tick: u64,
    pub(crate) command: ScriptCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ScriptCommand {
    PathTo {
        actor: String,
        x: i32,
        y: i32,
        #[serde(default)]
        options: PathCommand,
    },
    MoveTo {
        actor: String,
        x: i32,
        y: i32,
        #[serde(default)]
        mode: MoveMode,
    },
    MoveBackwards {
        actor: String,
        distance: f32,
    },
    Stop {
        actor: String,
    },
    SetTilePosition {
        actor: String,
        x: i32,
        y: i32,
    },
    SetWorldPosition {
        actor: String,
        x: f32,
        z: f32,
    },
    SetNavLayer {
        actor: String,
        layer: usize,
    },
    Activate {
        actor: String,
    },
    Deactivate {
        actor: String,
    },
    Pause {
        actor: String,
    },
    Resume {
        actor: String,
    },
    Jump {
        actor: String,
        direction: [f32; 2],
    },
    SetKinematic {
        actor: String,
        kinematic: bool,
    },
    Push {
        actor: String,
        delta: [f32; 3],
    },
    MarkObstacle {
        x: i32,
        y: i32,
        #[serde(default)]
        layer: usize,
        blocked: bool,
    },
    MovePlatform {
        platform: String,
        delta: [f32; 3],
    },
    /// Attach a waiter to the actor's current movement; its outcome is logged once released.
    Wait {
        actor: String,
    },
}

impl ScriptCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::PathTo { .. } => "path_to",
            Self::MoveTo { .. } => "move_to",
            Self::MoveBackwards { .. } => "move_backwards",
            Self::Stop { .. } => "stop",
            Self::SetTilePosition { .. } => "set_tile_position",
            Self::SetWorldPosition { .. } => "set_world_position",
            Self::SetNavLayer { .. } => "set_nav_layer",
            Self::Activate { .. } => "activate",
            Self::Deactivate { .. } => "deactivate",
            Self::Pause { .. } => "pause",
            Self::Resume { .. } => "resume",
            Self::Jump { .. } => "jump",
            Self::SetKinematic { .. } => "set_kinematic",
            Self::Push { .. } => "push",
            Self::MarkObstacle { .. } => "mark_obstacle",
            Self::MovePlatform { .. } => "move_platform",
            Self::Wait { .. } => "wait",
        }
    }

    pub(crate) fn actor(&self) -> Option<&str> {
        match self {
            Self::PathTo { actor, .. }
            | Self::MoveTo { actor, .. }
            | Self::MoveBackwards { actor, .. }
            | Self::Stop { actor }
            | Self::SetTilePosition { actor, .. }
            | Self::SetWorldPosition { actor, .. }
            | Self::SetNavLayer { actor, .. }
            | Self::Activate { actor }
            | Self::Deactivate { actor }
            | Self::Pause { actor }
            | Self::Resume { actor }
            | Self::Jump { actor, .. }
            | Self::SetKinematic { actor, .. }
            | Self::Push { actor, .. }
            | Self::Wait { actor } => Some(actor),
            Self::MarkObstacle { .. } | Self::MovePlatform { .. } => None,
        }
    }
}

pub(crate) fn load_script(path: &Path) -> Result<CommandScript, ScriptError> {
    let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script_json(&raw, path)
}

/// Steps come back ordered by tick; steps sharing a tick keep file order.
pub(crate) fn parse_script_json(raw: &str, path: &Path) -> Result<CommandScript, ScriptError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let mut script: CommandScript =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let field = error.path().to_string();
            ScriptError::Parse {
                path: path.to_path_buf(),
                field,
                source: error.into_inner(),
            }
        })?;
    if script.version != SCRIPT_VERSION {
        return Err(ScriptError::UnsupportedVersion {
            found: script.version,
            expected: SCRIPT_VERSION,
        });
    }
    script.steps.sort_by_key(|step| step.at_tick);
    Ok(script)
}
