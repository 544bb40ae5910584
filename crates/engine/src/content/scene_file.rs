use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::database::ActorDefDatabase;
use super::hashing::sha256_hex;
use crate::collision::{ColliderVolume, CollisionWorld, PlatformHandle, StandingPlatform};
use crate::nav::{
    compute_obstacle_distances, FloorKind, NavLayer, NavTile, TileCoord, TileRect, Tilemap,
    TilemapError,
};
use crate::world::{ActorId, ActorWorld, CommandError};

pub const SCENE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SceneLoadError {
    #[error("failed to read scene {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scene {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("scene version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("layer {layer} is invalid: {message}")]
    InvalidLayer { layer: usize, message: String },
    #[error(transparent)]
    Tilemap(#[from] TilemapError),
    #[error("actor '{actor}' references unknown def '{def}'")]
    UnknownActorDef { actor: String, def: String },
    #[error("failed to spawn actor '{actor}': {source}")]
    Spawn {
        actor: String,
        #[source]
        source: CommandError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    pub version: u32,
    pub name: String,
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,
    pub layers: Vec<SceneLayer>,
    #[serde(default)]
    pub colliders: Vec<SceneCollider>,
    #[serde(default)]
    pub platforms: Vec<ScenePlatform>,
    #[serde(default)]
    pub actors: Vec<SceneActor>,
}

fn default_tile_size() -> f32 {
    1.0
}

/// Rows are listed top (highest y) first. `.` walkable, `#` blocked, a digit sets the
/// obstacle distance directly (`0` blocked).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLayer {
    #[serde(default)]
    pub origin: [f32; 2],
    pub rows: Vec<String>,
    #[serde(default)]
    pub height: f32,
    /// Per-tile heights, same orientation as `rows`. Overrides `height`.
    #[serde(default)]
    pub heights: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub floor_rows: Option<Vec<String>>,
    #[serde(default)]
    pub portals: Vec<SceneRect>,
    #[serde(default)]
    pub jumpable: Vec<SceneRect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRect {
    pub min: [i32; 2],
    pub max: [i32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneCollider {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePlatform {
    pub name: String,
    pub center: [f32; 3],
    pub half_extents: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneActor {
    pub name: String,
    pub def: String,
    pub tile: [i32; 2],
    #[serde(default)]
    pub layer: usize,
    #[serde(default)]
    pub player: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorSpawn {
    pub name: String,
    pub def: String,
    pub tile: TileCoord,
    pub layer: usize,
    pub player: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedScene {
    pub name: String,
    /// SHA-256 of the raw scene bytes.
    pub fingerprint: String,
    pub tilemap: Tilemap,
    pub collision: CollisionWorld,
    pub platforms: BTreeMap<String, PlatformHandle>,
    pub spawns: Vec<ActorSpawn>,
}

pub fn load_scene(path: &Path) -> Result<LoadedScene, SceneLoadError> {
    let bytes = fs::read(path).map_err(|source| SceneLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let fingerprint = sha256_hex(&bytes);
    let raw = String::from_utf8_lossy(&bytes);
    let file = parse_scene_json(&raw, path)?;
    let scene = build_scene(file, fingerprint)?;
    info!(
        scene = %scene.name,
        layers = scene.tilemap.layer_count(),
        colliders = scene.collision.collider_count(),
        platforms = scene.collision.platform_count(),
        actors = scene.spawns.len(),
        fingerprint = %scene.fingerprint,
        "scene_loaded"
    );
    Ok(scene)
}

pub fn parse_scene_json(raw: &str, path: &Path) -> Result<SceneFile, SceneLoadError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let file: SceneFile = serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        SceneLoadError::Parse {
            path: path.to_path_buf(),
            field: if field.is_empty() { ".".to_string() } else { field },
            source: error.into_inner(),
        }
    })?;
    if file.version != SCENE_VERSION {
        return Err(SceneLoadError::UnsupportedVersion {
            found: file.version,
            expected: SCENE_VERSION,
        });
    }
    Ok(file)
}

pub fn build_scene(file: SceneFile, fingerprint: String) -> Result<LoadedScene, SceneLoadError> {
    let layers = file
        .layers
        .iter()
        .enumerate()
        .map(|(index, layer)| build_layer(index, layer))
        .collect::<Result<Vec<_>, _>>()?;
    let tilemap = Tilemap::new(file.tile_size, layers)?;

    let mut collision = CollisionWorld::default();
    for collider in &file.colliders {
        collision.add_collider(ColliderVolume::new(
            Vec3::from_array(collider.min),
            Vec3::from_array(collider.max),
        ));
    }
    let mut platforms = BTreeMap::new();
    for platform in &file.platforms {
        let handle = collision.add_platform(StandingPlatform {
            center: Vec3::from_array(platform.center),
            half_extents: Vec2::from_array(platform.half_extents),
        });
        if platforms.insert(platform.name.clone(), handle).is_some() {
            warn!(platform = %platform.name, "duplicate_platform_name_replaced");
        }
    }

    let spawns = file
        .actors
        .iter()
        .map(|actor| ActorSpawn {
            name: actor.name.clone(),
            def: actor.def.clone(),
            tile: TileCoord::new(actor.tile[0], actor.tile[1]),
            layer: actor.layer,
            player: actor.player,
        })
        .collect();

    Ok(LoadedScene {
        name: file.name,
        fingerprint,
        tilemap,
        collision,
        platforms,
        spawns,
    })
}

fn build_layer(index: usize, layer: &SceneLayer) -> Result<NavLayer, SceneLoadError> {
    let invalid = |message: String| SceneLoadError::InvalidLayer {
        layer: index,
        message,
    };
    let height = layer.rows.len();
    let width = layer.rows.first().map(|row| row.chars().count()).unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(invalid("layer has no tiles".to_string()));
    }
    if let Some(row) = layer.rows.iter().position(|row| row.chars().count() != width) {
        return Err(invalid(format!("row {row} width differs from row 0 ({width})")));
    }

    let tile_count = width * height;
    let mut walkable = vec![true; tile_count];
    let mut explicit_distance = vec![None::<u8>; tile_count];
    for (row_index, row) in layer.rows.iter().enumerate() {
        let y = height - 1 - row_index;
        for (x, symbol) in row.chars().enumerate() {
            let index = y * width + x;
            match symbol {
                '.' => {}
                '#' => walkable[index] = false,
                digit if digit.is_ascii_digit() => {
                    let distance = digit as u8 - b'0';
                    walkable[index] = distance > 0;
                    explicit_distance[index] = Some(distance);
                }
                other => {
                    return Err(invalid(format!(
                        "unknown tile symbol '{other}' at row {row_index}, column {x}"
                    )))
                }
            }
        }
    }

    let heights = match &layer.heights {
        Some(rows) => {
            if rows.len() != height || rows.iter().any(|row| row.len() != width) {
                return Err(invalid(format!("heights must be {height} rows of {width}")));
            }
            let mut heights = vec![0.0; tile_count];
            for (row_index, row) in rows.iter().enumerate() {
                let y = height - 1 - row_index;
                heights[y * width..(y + 1) * width].copy_from_slice(row);
            }
            heights
        }
        None => vec![layer.height; tile_count],
    };

    let mut floors = vec![FloorKind::Default; tile_count];
    if let Some(rows) = &layer.floor_rows {
        if rows.len() != height || rows.iter().any(|row| row.chars().count() != width) {
            return Err(invalid(format!("floor_rows must be {height} rows of {width}")));
        }
        for (row_index, row) in rows.iter().enumerate() {
            let y = height - 1 - row_index;
            for (x, symbol) in row.chars().enumerate() {
                floors[y * width + x] = FloorKind::from_symbol(symbol);
            }
        }
    }

    let computed = compute_obstacle_distances(width as u32, height as u32, &walkable);
    let tiles = (0..tile_count)
        .map(|index| {
            let distance = explicit_distance[index].unwrap_or(computed[index]);
            NavTile::new(distance, heights[index], floors[index])
        })
        .collect();

    let to_rect = |rect: &SceneRect| TileRect::new(rect.min[0], rect.min[1], rect.max[0], rect.max[1]);
    Ok(NavLayer::new(
        width as u32,
        height as u32,
        Vec2::from_array(layer.origin),
        tiles,
    )?
    .with_portals(layer.portals.iter().map(to_rect).collect())
    .with_jumpable_areas(layer.jumpable.iter().map(to_rect).collect()))
}

/// Spawns every scene actor, in file order. Returns ids keyed by scene actor name.
pub fn spawn_scene_actors(
    world: &mut ActorWorld,
    spawns: &[ActorSpawn],
    defs: &ActorDefDatabase,
) -> Result<BTreeMap<String, ActorId>, SceneLoadError> {
    let mut ids = BTreeMap::new();
    for spawn in spawns {
        let def = defs
            .def_by_name(&spawn.def)
            .ok_or_else(|| SceneLoadError::UnknownActorDef {
                actor: spawn.name.clone(),
                def: spawn.def.clone(),
            })?;
        let id = world
            .spawn_actor(&def.def_name, def.profile, spawn.tile, spawn.layer, spawn.player)
            .map_err(|source| SceneLoadError::Spawn {
                actor: spawn.name.clone(),
                source,
            })?;
        ids.insert(spawn.name.clone(), id);
    }
    Ok(ids)
}
