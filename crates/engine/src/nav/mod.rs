mod jump;
mod path_worker;
mod pathfinder;
mod tilemap;

pub use jump::{find_jump_target, JumpParams, JumpTarget};
pub use path_worker::{PathJob, PathOutcome, PathTicket, PathWorkerPool};
pub use pathfinder::{
    find_tile_path, obstacle_weight, octile_distance, path_cost, search_grid,
    DIAGONAL_STEP_COST, ORTHOGONAL_STEP_COST,
};
pub use tilemap::{
    compute_obstacle_distances, FloorKind, NavLayer, NavTile, TileCoord, TileRect, Tilemap,
    TilemapError, NEIGHBOR_OFFSETS,
};
