mod compiler;
mod database;
mod hashing;
mod scene_file;

pub use compiler::{
    compile_actor_defs, parse_actor_defs, ContentCompileError, ContentErrorCode, SourceLocation,
};
pub use database::{ActorDef, ActorDefDatabase, ActorDefId};
pub use hashing::sha256_hex;
pub use scene_file::{
    build_scene, load_scene, parse_scene_json, spawn_scene_actors, ActorSpawn, LoadedScene,
    SceneActor, SceneCollider, SceneFile, SceneLayer, SceneLoadError, ScenePlatform, SceneRect,
    SCENE_VERSION,
};
