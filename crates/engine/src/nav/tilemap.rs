use std::collections::VecDeque;

use glam::{Vec2, Vec3};
use thiserror::Error;

use crate::geometry::horizontal;

/// Fixed neighbor enumeration order: N, NE, E, SE, S, SW, W, NW.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

/// Inclusive tile-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl TileRect {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        tile.x >= self.min_x && tile.x <= self.max_x && tile.y >= self.min_y && tile.y <= self.max_y
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FloorKind {
    #[default]
    Default,
    Grass,
    Snow,
    Sand,
}

impl FloorKind {
    pub fn from_symbol(symbol: char) -> Self {
        match symbol {
            'g' | 'G' => Self::Grass,
            's' | 'S' => Self::Snow,
            'a' | 'A' => Self::Sand,
            _ => Self::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavTile {
    pub walkable: bool,
    pub height: f32,
    pub floor: FloorKind,
    pub obstacle_distance: u8,
}

impl NavTile {
    pub fn new(obstacle_distance: u8, height: f32, floor: FloorKind) -> Self {
        Self {
            walkable: obstacle_distance > 0,
            height,
            floor,
            obstacle_distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TilemapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
    #[error("tilemap needs at least one layer")]
    NoLayers,
    #[error("tile size must be finite and > 0, got {tile_size}")]
    InvalidTileSize { tile_size: f32 },
    #[error("layer {layer} out of range (layer_count={layer_count})")]
    LayerOutOfRange { layer: usize, layer_count: usize },
    #[error("tile ({x}, {y}) is outside layer {layer}")]
    TileOutOfRange { x: i32, y: i32, layer: usize },
}

/// Layer origin convention:
/// - `origin` is the world (x, z) position of tile (0,0) bottom-left corner.
/// - Tile (x, y) spans `origin + (x, y) * tile_size` to `origin + (x + 1, y + 1) * tile_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct NavLayer {
    width: u32,
    height: u32,
    origin: Vec2,
    tiles: Vec<NavTile>,
    portals: Vec<TileRect>,
    jumpable_areas: Vec<TileRect>,
}

impl NavLayer {
    pub fn new(
        width: u32,
        height: u32,
        origin: Vec2,
        tiles: Vec<NavTile>,
    ) -> Result<Self, TilemapError> {
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TilemapError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            origin,
            tiles,
            portals: Vec::new(),
            jumpable_areas: Vec::new(),
        })
    }

    /// Builds a layer from a row-major walkability mask, deriving obstacle distances.
    pub fn from_walkable_mask(
        width: u32,
        height: u32,
        origin: Vec2,
        walkable: &[bool],
        heights: &[f32],
    ) -> Result<Self, TilemapError> {
        let expected = width as usize * height as usize;
        if walkable.len() != expected {
            return Err(TilemapError::TileCountMismatch {
                expected,
                actual: walkable.len(),
            });
        }
        if heights.len() != expected {
            return Err(TilemapError::TileCountMismatch {
                expected,
                actual: heights.len(),
            });
        }
        let distances = compute_obstacle_distances(width, height, walkable);
        let tiles = distances
            .into_iter()
            .zip(heights.iter().copied())
            .map(|(distance, height)| NavTile::new(distance, height, FloorKind::Default))
            .collect();
        Self::new(width, height, origin, tiles)
    }

    pub fn with_portals(mut self, portals: Vec<TileRect>) -> Self {
        self.portals = portals;
        self
    }

    pub fn with_jumpable_areas(mut self, jumpable_areas: Vec<TileRect>) -> Self {
        self.jumpable_areas = jumpable_areas;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn portals(&self) -> &[TileRect] {
        &self.portals
    }

    pub fn jumpable_areas(&self) -> &[TileRect] {
        &self.jumpable_areas
    }

    pub fn tiles(&self) -> &[NavTile] {
        &self.tiles
    }

    pub fn index_of(&self, tile: TileCoord) -> Option<usize> {
        if tile.x < 0 || tile.y < 0 {
            return None;
        }
        let (x, y) = (tile.x as u32, tile.y as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile(&self, tile: TileCoord) -> Option<&NavTile> {
        self.index_of(tile).and_then(|index| self.tiles.get(index))
    }

    pub fn is_walkable(&self, tile: TileCoord) -> bool {
        self.tile(tile).is_some_and(|nav_tile| nav_tile.walkable)
    }

    pub fn is_inside_portal(&self, tile: TileCoord) -> bool {
        self.portals.iter().any(|rect| rect.contains(tile))
    }

    pub fn is_jumpable(&self, tile: TileCoord) -> bool {
        self.jumpable_areas.iter().any(|rect| rect.contains(tile))
    }

    pub fn world_to_tile(&self, position: Vec3, tile_size: f32) -> TileCoord {
        let local = (horizontal(position) - self.origin) / tile_size;
        TileCoord {
            x: local.x.floor() as i32,
            y: local.y.floor() as i32,
        }
    }

    /// First neighbor in [`NEIGHBOR_OFFSETS`] order that satisfies `accept`.
    pub fn first_adjacent_where<F>(&self, tile: TileCoord, mut accept: F) -> Option<TileCoord>
    where
        F: FnMut(TileCoord) -> bool,
    {
        NEIGHBOR_OFFSETS
            .iter()
            .map(|&(dx, dy)| tile.offset(dx, dy))
            .find(|&neighbor| self.index_of(neighbor).is_some() && accept(neighbor))
    }

    fn tile_mut(&mut self, tile: TileCoord) -> Option<&mut NavTile> {
        let index = self.index_of(tile)?;
        self.tiles.get_mut(index)
    }
}

/// Ordered, per-scene set of navigation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Tilemap {
    tile_size: f32,
    layers: Vec<NavLayer>,
}

impl Tilemap {
    pub fn new(tile_size: f32, layers: Vec<NavLayer>) -> Result<Self, TilemapError> {
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(TilemapError::InvalidTileSize { tile_size });
        }
        if layers.is_empty() {
            return Err(TilemapError::NoLayers);
        }
        Ok(Self { tile_size, layers })
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, layer: usize) -> Option<&NavLayer> {
        self.layers.get(layer)
    }

    pub fn layers(&self) -> &[NavLayer] {
        &self.layers
    }

    pub fn get_tile(&self, x: i32, y: i32, layer: usize) -> Option<&NavTile> {
        self.layers.get(layer)?.tile(TileCoord { x, y })
    }

    pub fn is_walkable(&self, tile: TileCoord, layer: usize) -> bool {
        self.layers
            .get(layer)
            .is_some_and(|nav_layer| nav_layer.is_walkable(tile))
    }

    /// `None` only when `layer` does not exist; the tile itself may lie outside the grid.
    pub fn world_to_tile(&self, position: Vec3, layer: usize) -> Option<TileCoord> {
        self.layers
            .get(layer)
            .map(|nav_layer| nav_layer.world_to_tile(position, self.tile_size))
    }

    /// Tile center on the horizontal axes. Vertical comes from the stored tile height,
    /// or 0 for tiles outside the grid.
    pub fn tile_to_world(&self, tile: TileCoord, layer: usize) -> Option<Vec3> {
        let nav_layer = self.layers.get(layer)?;
        let origin = nav_layer.origin();
        let height = nav_layer.tile(tile).map(|nav_tile| nav_tile.height).unwrap_or(0.0);
        Some(Vec3::new(
            origin.x + (tile.x as f32 + 0.5) * self.tile_size,
            height,
            origin.y + (tile.y as f32 + 0.5) * self.tile_size,
        ))
    }

    /// Walkable tile under `position` on `layer`, if any.
    pub fn walkable_tile_at(&self, position: Vec3, layer: usize) -> Option<(TileCoord, &NavTile)> {
        let tile = self.world_to_tile(position, layer)?;
        let nav_tile = self.layers.get(layer)?.tile(tile)?;
        nav_tile.walkable.then_some((tile, nav_tile))
    }

    pub fn try_get_adjacent_walkable_tile(&self, tile: TileCoord, layer: usize) -> Option<TileCoord> {
        let nav_layer = self.layers.get(layer)?;
        nav_layer.first_adjacent_where(tile, |neighbor| nav_layer.is_walkable(neighbor))
    }

    /// Ring search outward from `tile`, nearest Chebyshev ring first.
    pub fn find_nearest_walkable_tile(
        &self,
        tile: TileCoord,
        layer: usize,
        max_radius: u32,
    ) -> Option<TileCoord> {
        let nav_layer = self.layers.get(layer)?;
        if nav_layer.is_walkable(tile) {
            return Some(tile);
        }
        for radius in 1..=max_radius as i32 {
            let mut best: Option<(i64, TileCoord)> = None;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let candidate = tile.offset(dx, dy);
                    if !nav_layer.is_walkable(candidate) {
                        continue;
                    }
                    let distance_sq = i64::from(dx) * i64::from(dx) + i64::from(dy) * i64::from(dy);
                    if best.map_or(true, |(best_sq, _)| distance_sq < best_sq) {
                        best = Some((distance_sq, candidate));
                    }
                }
            }
            if let Some((_, found)) = best {
                return Some(found);
            }
        }
        None
    }

    pub fn is_inside_portal_area(&self, position: Vec3, layer: usize) -> bool {
        let Some(nav_layer) = self.layers.get(layer) else {
            return false;
        };
        let tile = nav_layer.world_to_tile(position, self.tile_size);
        nav_layer.is_inside_portal(tile)
    }

    /// Runtime override of one tile's walkable flag. Obstacle distances are left as loaded.
    pub fn mark_obstacle(
        &mut self,
        tile: TileCoord,
        layer: usize,
        blocked: bool,
    ) -> Result<(), TilemapError> {
        let layer_count = self.layers.len();
        let nav_layer = self
            .layers
            .get_mut(layer)
            .ok_or(TilemapError::LayerOutOfRange { layer, layer_count })?;
        let nav_tile = nav_layer
            .tile_mut(tile)
            .ok_or(TilemapError::TileOutOfRange {
                x: tile.x,
                y: tile.y,
                layer,
            })?;
        nav_tile.walkable = !blocked;
        Ok(())
    }
}

/// Chebyshev distance from each tile to the nearest non-walkable tile, saturating at
/// `u8::MAX`. Non-walkable tiles get 0. Grid borders do not count as obstacles.
pub fn compute_obstacle_distances(width: u32, height: u32, walkable: &[bool]) -> Vec<u8> {
    let tile_count = width as usize * height as usize;
    let mut distances = vec![u8::MAX; tile_count];
    let mut queue = VecDeque::new();

    for (index, is_walkable) in walkable.iter().take(tile_count).enumerate() {
        if !is_walkable {
            distances[index] = 0;
            queue.push_back(index);
        }
    }

    while let Some(index) = queue.pop_front() {
        let next_distance = distances[index].saturating_add(1);
        if next_distance == u8::MAX {
            continue;
        }
        let x = (index % width as usize) as i32;
        let y = (index / width as usize) as i32;
        for (dx, dy) in NEIGHBOR_OFFSETS {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                continue;
            }
            let neighbor = ny as usize * width as usize + nx as usize;
            if distances[neighbor] <= next_distance {
                continue;
            }
            distances[neighbor] = next_distance;
            queue.push_back(neighbor);
        }
    }

    distances
}
