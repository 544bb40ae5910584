use glam::{Vec2, Vec3};

use super::tilemap::{TileCoord, Tilemap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpParams {
    pub min_range: f32,
    pub max_range: f32,
    pub step: f32,
    pub vertical_tolerance: f32,
}

impl Default for JumpParams {
    fn default() -> Self {
        Self {
            min_range: 1.0,
            max_range: 4.0,
            step: 0.5,
            vertical_tolerance: 1.5,
        }
    }
}

impl JumpParams {
    fn sample_count(&self) -> usize {
        if !(self.step > 0.0) || self.max_range < self.min_range {
            return 1;
        }
        ((self.max_range - self.min_range) / self.step).floor() as usize + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpTarget {
    pub position: Vec3,
    pub layer: usize,
    /// `None` when no landing tile qualified and the jump is a hop in place.
    pub tile: Option<TileCoord>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    target: JumpTarget,
    other_layer: bool,
    obstacle_distance: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        (self.other_layer, self.obstacle_distance) > (other.other_layer, other.obstacle_distance)
    }
}

/// Samples landing tiles along `direction` (horizontal x, z) from `origin`.
/// Candidates must be walkable, inside a jumpable area and within the vertical
/// tolerance of `origin.y`. A different layer wins first, then the larger
/// obstacle distance; the earliest sample wins ties.
pub fn find_jump_target(
    tilemap: &Tilemap,
    origin: Vec3,
    current_layer: usize,
    direction: Vec2,
    params: &JumpParams,
) -> JumpTarget {
    let hop_in_place = JumpTarget {
        position: origin,
        layer: current_layer,
        tile: None,
    };
    let Some(direction) = direction.try_normalize() else {
        return hop_in_place;
    };

    let mut best: Option<Candidate> = None;
    for sample in 0..params.sample_count() {
        let distance = params.min_range + sample as f32 * params.step;
        let probe = origin + Vec3::new(direction.x, 0.0, direction.y) * distance;

        for (layer_index, nav_layer) in tilemap.layers().iter().enumerate() {
            let tile = nav_layer.world_to_tile(probe, tilemap.tile_size());
            let Some(nav_tile) = nav_layer.tile(tile) else {
                continue;
            };
            if !nav_tile.walkable || !nav_layer.is_jumpable(tile) {
                continue;
            }
            if (nav_tile.height - origin.y).abs() > params.vertical_tolerance {
                continue;
            }
            let Some(position) = tilemap.tile_to_world(tile, layer_index) else {
                continue;
            };
            let candidate = Candidate {
                target: JumpTarget {
                    position,
                    layer: layer_index,
                    tile: Some(tile),
                },
                other_layer: layer_index != current_layer,
                obstacle_distance: nav_tile.obstacle_distance,
            };
            if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                best = Some(candidate);
            }
        }
    }

    best.map(|candidate| candidate.target).unwrap_or(hop_in_place)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::tilemap::{NavLayer, TileRect};

    fn layer(width: u32, height: u32, walkable: &[bool], tile_height: f32) -> NavLayer {
        let heights = vec![tile_height; walkable.len()];
        NavLayer::from_walkable_mask(width, height, Vec2::ZERO, walkable, &heights)
            .expect("layer")
    }

    #[test]
    fn sample_count_includes_both_ends() {
        assert_eq!(JumpParams::default().sample_count(), 7);
    }

    #[test]
    fn no_jumpable_area_means_hop_in_place() {
        let tilemap = Tilemap::new(1.0, vec![layer(8, 1, &[true; 8], 0.0)]).expect("tilemap");
        let origin = Vec3::new(0.5, 0.0, 0.5);
        let target = find_jump_target(&tilemap, origin, 0, Vec2::X, &JumpParams::default());
        assert_eq!(target.position, origin);
        assert_eq!(target.layer, 0);
        assert_eq!(target.tile, None);
    }

    #[test]
    fn prefers_other_layer_within_tolerance() {
        let ground =
            layer(8, 1, &[true; 8], 0.0).with_jumpable_areas(vec![TileRect::new(0, 0, 7, 0)]);
        let ledge =
            layer(8, 1, &[true; 8], 1.0).with_jumpable_areas(vec![TileRect::new(3, 0, 3, 0)]);
        let tilemap = Tilemap::new(1.0, vec![ground, ledge]).expect("tilemap");
        let target = find_jump_target(
            &tilemap,
            Vec3::new(0.5, 0.0, 0.5),
            0,
            Vec2::X,
            &JumpParams::default(),
        );
        assert_eq!(target.layer, 1);
        assert_eq!(target.tile, Some(TileCoord::new(3, 0)));
        assert!((target.position.y - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_landing_beyond_vertical_tolerance() {
        let cliff =
            layer(8, 1, &[true; 8], 3.0).with_jumpable_areas(vec![TileRect::new(0, 0, 7, 0)]);
        let tilemap = Tilemap::new(1.0, vec![cliff]).expect("tilemap");
        let target = find_jump_target(
            &tilemap,
            Vec3::new(0.5, 0.0, 0.5),
            0,
            Vec2::X,
            &JumpParams::default(),
        );
        assert_eq!(target.tile, None);
    }

    #[test]
    fn prefers_open_ground_and_keeps_earliest_on_ties() {
        // Wall at x=7: x=6 has distance 1, everything from x=1..=3 is farther away.
        let mut walkable = [true; 8];
        walkable[7] = false;
        let ground =
            layer(8, 1, &walkable, 0.0).with_jumpable_areas(vec![TileRect::new(0, 0, 7, 0)]);
        let tilemap = Tilemap::new(1.0, vec![ground]).expect("tilemap");
        let target = find_jump_target(
            &tilemap,
            Vec3::new(0.5, 0.0, 0.5),
            0,
            Vec2::X,
            &JumpParams::default(),
        );
        // Distances from the wall: x=1 -> 6, the largest reachable sample.
        assert_eq!(target.tile, Some(TileCoord::new(1, 0)));
    }
}
