use crate::movement::ActionName;
use crate::nav::TileCoord;
use crate::world::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementEvent {
    /// Animation collaborator should play `action`. Only emitted on change.
    ActionRequested { actor: ActorId, action: ActionName },
    TilePositionChanged {
        actor: ActorId,
        layer: usize,
        tile: TileCoord,
        /// False when physics (push, platform, rollback) moved the actor.
        script_driven: bool,
    },
    PathSearchFailed {
        actor: ActorId,
        layer: usize,
        goal: TileCoord,
    },
    ActorDisposed { actor: ActorId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementEventKind {
    ActionRequested,
    TilePositionChanged,
    PathSearchFailed,
    ActorDisposed,
}

impl MovementEvent {
    pub fn kind(&self) -> MovementEventKind {
        match self {
            Self::ActionRequested { .. } => MovementEventKind::ActionRequested,
            Self::TilePositionChanged { .. } => MovementEventKind::TilePositionChanged,
            Self::PathSearchFailed { .. } => MovementEventKind::PathSearchFailed,
            Self::ActorDisposed { .. } => MovementEventKind::ActorDisposed,
        }
    }

    pub fn actor(&self) -> ActorId {
        match *self {
            Self::ActionRequested { actor, .. }
            | Self::TilePositionChanged { actor, .. }
            | Self::PathSearchFailed { actor, .. }
            | Self::ActorDisposed { actor } => actor,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementEventCounts {
    pub total: u32,
    pub action_requested: u32,
    pub tile_position_changed: u32,
    pub path_search_failed: u32,
    pub actor_disposed: u32,
}

impl MovementEventCounts {
    pub fn record(&mut self, kind: MovementEventKind) {
        self.total = self.total.saturating_add(1);
        match kind {
            MovementEventKind::ActionRequested => {
                self.action_requested = self.action_requested.saturating_add(1)
            }
            MovementEventKind::TilePositionChanged => {
                self.tile_position_changed = self.tile_position_changed.saturating_add(1)
            }
            MovementEventKind::PathSearchFailed => {
                self.path_search_failed = self.path_search_failed.saturating_add(1)
            }
            MovementEventKind::ActorDisposed => {
                self.actor_disposed = self.actor_disposed.saturating_add(1)
            }
        }
    }
}

/// Outbound events, in emission order. Consumers drain; counts roll over per tick.
#[derive(Debug, Default)]
pub struct MovementEventBus {
    pending: Vec<MovementEvent>,
    current_tick_counts: MovementEventCounts,
    last_tick_counts: MovementEventCounts,
}

impl MovementEventBus {
    pub fn emit(&mut self, event: MovementEvent) {
        self.current_tick_counts.record(event.kind());
        self.pending.push(event);
    }

    pub fn extend<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = MovementEvent>,
    {
        for event in events {
            self.emit(event);
        }
    }

    pub fn pending(&self) -> &[MovementEvent] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<MovementEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn finish_tick_rollover(&mut self) {
        self.last_tick_counts = std::mem::take(&mut self.current_tick_counts);
    }

    pub fn last_tick_counts(&self) -> MovementEventCounts {
        self.last_tick_counts
    }
}
