use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use super::tilemap::{TileCoord, Tilemap, NEIGHBOR_OFFSETS};

pub const ORTHOGONAL_STEP_COST: u32 = 10;
pub const DIAGONAL_STEP_COST: u32 = 14;

/// Extra cost for entering a tile close to an obstacle. Keeps paths off walls
/// without forbidding one-tile corridors.
pub fn obstacle_weight(obstacle_distance: u8) -> u32 {
    match obstacle_distance {
        1 => 10,
        2 => 5,
        3 => 2,
        _ => 0,
    }
}

/// Weighted A* over one layer. Tiles in `blocked` are treated as unwalkable,
/// except the start tile. A non-walkable goal is replaced by its first adjacent
/// walkable tile. Returns `start..=goal`, or an empty path on failure.
pub fn find_tile_path(
    tilemap: &Tilemap,
    layer: usize,
    start: TileCoord,
    goal: TileCoord,
    blocked: &HashSet<TileCoord>,
) -> Vec<TileCoord> {
    let Some(nav_layer) = tilemap.layer(layer) else {
        return Vec::new();
    };
    if nav_layer.index_of(start).is_none() || nav_layer.index_of(goal).is_none() {
        return Vec::new();
    }

    let is_open = |tile: TileCoord| nav_layer.is_walkable(tile) && !blocked.contains(&tile);
    let goal = if is_open(goal) {
        goal
    } else {
        match nav_layer.first_adjacent_where(goal, is_open) {
            Some(substitute) => substitute,
            None => return Vec::new(),
        }
    };

    search_grid(
        nav_layer.width(),
        nav_layer.height(),
        start,
        goal,
        is_open,
        |tile| {
            nav_layer
                .tile(tile)
                .map(|nav_tile| obstacle_weight(nav_tile.obstacle_distance))
                .unwrap_or(0)
        },
    )
}

/// Total cost of an 8-connected tile path under the same model `find_tile_path` minimizes.
pub fn path_cost(tilemap: &Tilemap, layer: usize, path: &[TileCoord]) -> Option<u32> {
    let nav_layer = tilemap.layer(layer)?;
    let mut total = 0u32;
    for pair in path.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let step = step_cost(to.x - from.x, to.y - from.y)?;
        let weight = obstacle_weight(nav_layer.tile(to)?.obstacle_distance);
        total = total.saturating_add(step).saturating_add(weight);
    }
    Some(total)
}

/// Octile distance in the 10/14 fixed-point model.
pub fn octile_distance(a: TileCoord, b: TileCoord) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    let diagonal = dx.min(dy);
    let straight = dx.max(dy) - diagonal;
    diagonal
        .saturating_mul(DIAGONAL_STEP_COST)
        .saturating_add(straight.saturating_mul(ORTHOGONAL_STEP_COST))
}

fn step_cost(dx: i32, dy: i32) -> Option<u32> {
    match (dx.abs(), dy.abs()) {
        (1, 0) | (0, 1) => Some(ORTHOGONAL_STEP_COST),
        (1, 1) => Some(DIAGONAL_STEP_COST),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    f_cost: u32,
    h_cost: u32,
    y: i32,
    x: i32,
    insertion_order: u64,
}

/// Grid A* core. `is_walkable` decides which tiles may be entered; `tile_cost`
/// adds per-tile weight on entry. Diagonal steps may not cut blocked corners.
pub fn search_grid<W, C>(
    width: u32,
    height: u32,
    start: TileCoord,
    goal: TileCoord,
    mut is_walkable: W,
    mut tile_cost: C,
) -> Vec<TileCoord>
where
    W: FnMut(TileCoord) -> bool,
    C: FnMut(TileCoord) -> u32,
{
    let index_of = |tile: TileCoord| -> Option<usize> {
        if tile.x < 0 || tile.y < 0 || tile.x as u32 >= width || tile.y as u32 >= height {
            return None;
        }
        Some(tile.y as usize * width as usize + tile.x as usize)
    };
    let (Some(start_index), Some(goal_index)) = (index_of(start), index_of(goal)) else {
        return Vec::new();
    };
    if start == goal {
        return vec![start];
    }

    let node_count = width as usize * height as usize;
    let mut closed = vec![false; node_count];
    let mut best_g = vec![u32::MAX; node_count];
    let mut parent = vec![None::<usize>; node_count];
    let mut open = BinaryHeap::new();
    let mut next_insertion = 0u64;

    let start_h = octile_distance(start, goal);
    best_g[start_index] = 0;
    open.push(Reverse(OpenNode {
        f_cost: start_h,
        h_cost: start_h,
        y: start.y,
        x: start.x,
        insertion_order: next_insertion,
    }));

    while let Some(Reverse(current)) = open.pop() {
        let coord = TileCoord::new(current.x, current.y);
        let Some(current_index) = index_of(coord) else {
            continue;
        };
        if closed[current_index] {
            continue;
        }
        closed[current_index] = true;

        if current_index == goal_index {
            return reconstruct_tile_path(&parent, width, start_index, goal_index);
        }

        let current_g = best_g[current_index];
        for (dx, dy) in NEIGHBOR_OFFSETS {
            let neighbor = coord.offset(dx, dy);
            let Some(neighbor_index) = index_of(neighbor) else {
                continue;
            };
            if closed[neighbor_index] || !is_walkable(neighbor) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal && !(is_walkable(coord.offset(dx, 0)) && is_walkable(coord.offset(0, dy)))
            {
                continue;
            }

            let step = if diagonal {
                DIAGONAL_STEP_COST
            } else {
                ORTHOGONAL_STEP_COST
            };
            let tentative_g = current_g
                .saturating_add(step)
                .saturating_add(tile_cost(neighbor));
            if tentative_g >= best_g[neighbor_index] {
                continue;
            }

            best_g[neighbor_index] = tentative_g;
            parent[neighbor_index] = Some(current_index);
            let h_cost = octile_distance(neighbor, goal);
            next_insertion = next_insertion.saturating_add(1);
            open.push(Reverse(OpenNode {
                f_cost: tentative_g.saturating_add(h_cost),
                h_cost,
                y: neighbor.y,
                x: neighbor.x,
                insertion_order: next_insertion,
            }));
        }
    }

    Vec::new()
}

fn reconstruct_tile_path(
    parent: &[Option<usize>],
    width: u32,
    start_index: usize,
    goal_index: usize,
) -> Vec<TileCoord> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];

    while cursor != start_index {
        let Some(next) = parent.get(cursor).and_then(|value| *value) else {
            return Vec::new();
        };
        cursor = next;
        indices.push(cursor);
    }
    indices.reverse();
    indices
        .into_iter()
        .map(|index| TileCoord {
            x: (index % width as usize) as i32,
            y: (index / width as usize) as i32,
        })
        .collect()
}
