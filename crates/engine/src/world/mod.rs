mod actor_world;
mod events;
mod scheduler;

pub use actor_world::{Actor, ActorId, ActorWorld, CommandError, WorldConfig};
pub use events::{MovementEvent, MovementEventBus, MovementEventCounts, MovementEventKind};
pub use scheduler::{TaskHandle, TaskScheduler};
