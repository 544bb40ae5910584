use serde::{Deserialize, Serialize};

use super::path::MoveMode;
use crate::nav::JumpParams;

/// Shared tolerances for every actor in a world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementConfig {
    /// Horizontal distance at which a waypoint counts as reached.
    pub arrival_tolerance: f32,
    /// Height deltas below this snap instead of interpolating.
    pub height_snap_epsilon: f32,
    pub cross_layer_tolerance: f32,
    pub cross_platform_tolerance: f32,
    pub platform_slope_tolerance: f32,
    pub reverse_delay_min_seconds: f32,
    pub reverse_delay_max_seconds: f32,
    pub jump: JumpParams,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            arrival_tolerance: 0.05,
            height_snap_epsilon: 0.01,
            cross_layer_tolerance: 1.0,
            cross_platform_tolerance: 0.5,
            platform_slope_tolerance: 0.1,
            reverse_delay_min_seconds: 3.0,
            reverse_delay_max_seconds: 8.0,
            jump: JumpParams::default(),
        }
    }
}

/// Per-actor kinematic parameters, usually compiled from an `ActorDef`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub walk_speed: f32,
    pub run_speed: f32,
    pub step_back_speed: f32,
    pub turn_speed_radians: f32,
    pub radius: f32,
    pub body_height: f32,
}

impl Default for ActorProfile {
    fn default() -> Self {
        Self {
            walk_speed: 1.5,
            run_speed: 4.0,
            step_back_speed: 1.0,
            turn_speed_radians: 8.0,
            radius: 0.3,
            body_height: 1.8,
        }
    }
}

impl ActorProfile {
    pub fn speed_for(&self, mode: MoveMode) -> f32 {
        match mode {
            MoveMode::Walk => self.walk_speed,
            MoveMode::Run => self.run_speed,
            MoveMode::StepBack => self.step_back_speed,
        }
    }
}
