use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    #[default]
    Walk,
    Run,
    StepBack,
}

/// What happens once the final waypoint is reached or the actor gives up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndAction {
    #[default]
    Idle,
    DisposeSelf,
    WaitAndReverse,
}

/// Options for a path-to-tile command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathCommand {
    pub mode: MoveMode,
    pub end_action: EndAction,
    pub ignore_obstacle: bool,
    /// On search failure, walk straight at the goal ignoring obstacles.
    pub fallback_to_direct: bool,
}

/// The single live route of one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    waypoints: Vec<Vec3>,
    next: usize,
    pub mode: MoveMode,
    pub end_action: EndAction,
    pub ignore_obstacle: bool,
    /// Where the actor stood when the path was issued; the end of a reversed replay.
    pub origin: Vec3,
}

impl Path {
    pub fn new(
        waypoints: Vec<Vec3>,
        mode: MoveMode,
        end_action: EndAction,
        ignore_obstacle: bool,
        origin: Vec3,
    ) -> Self {
        Self {
            waypoints,
            next: 0,
            mode,
            end_action,
            ignore_obstacle,
            origin,
        }
    }

    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    pub fn current_waypoint(&self) -> Option<Vec3> {
        self.waypoints.get(self.next).copied()
    }

    pub fn is_last_waypoint(&self) -> bool {
        self.next + 1 >= self.waypoints.len()
    }

    pub fn advance_waypoint(&mut self) {
        self.next = self.next.saturating_add(1).min(self.waypoints.len());
    }

    pub fn is_complete(&self) -> bool {
        self.next >= self.waypoints.len()
    }

    /// Same route walked back to `origin`. The end action carries over, so a
    /// `WaitAndReverse` patrol keeps going back and forth.
    pub fn reversed(&self) -> Path {
        let mut waypoints = self
            .waypoints
            .iter()
            .rev()
            .skip(1)
            .copied()
            .collect::<Vec<_>>();
        waypoints.push(self.origin);
        let final_position = self.waypoints.last().copied().unwrap_or(self.origin);
        Path::new(
            waypoints,
            self.mode,
            self.end_action,
            self.ignore_obstacle,
            final_position,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_walks_waypoints_in_order() {
        let mut path = Path::new(
            vec![Vec3::X, Vec3::Z],
            MoveMode::Run,
            EndAction::Idle,
            false,
            Vec3::ZERO,
        );
        assert_eq!(path.current_waypoint(), Some(Vec3::X));
        assert!(!path.is_last_waypoint());
        path.advance_waypoint();
        assert_eq!(path.current_waypoint(), Some(Vec3::Z));
        assert!(path.is_last_waypoint());
        path.advance_waypoint();
        assert!(path.is_complete());
        path.advance_waypoint();
        assert_eq!(path.current_waypoint(), None);
    }

    #[test]
    fn reversed_path_returns_to_origin() {
        let origin = Vec3::new(-1.0, 0.0, 0.0);
        let path = Path::new(
            vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0)],
            MoveMode::Walk,
            EndAction::WaitAndReverse,
            false,
            origin,
        );
        let reversed = path.reversed();
        assert_eq!(
            reversed.waypoints(),
            &[Vec3::new(2.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), origin]
        );
        assert_eq!(reversed.end_action, EndAction::WaitAndReverse);
        assert_eq!(reversed.origin, Vec3::new(3.0, 0.0, 0.0));

        let back_again = reversed.reversed();
        assert_eq!(
            back_again.waypoints(),
            &[Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0)]
        );
        assert_eq!(back_again.origin, origin);
    }

    #[test]
    fn path_command_fields_default_when_missing() {
        let command: PathCommand =
            serde_json::from_str(r#"{"mode":"run"}"#).expect("parse path command");
        assert_eq!(command.mode, MoveMode::Run);
        assert_eq!(command.end_action, EndAction::Idle);
        assert!(!command.fallback_to_direct);
    }
}
