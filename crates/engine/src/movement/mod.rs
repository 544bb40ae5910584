mod config;
mod contacts;
mod controller;
mod path;
mod waiter;

pub use config::{ActorProfile, MovementConfig};
pub use contacts::{ActiveColliderInfo, ActiveStandingPlatformInfo, ContactTracker};
pub use controller::{
    ActionName, MoveOutcome, MovementController, MovementState, NavContext, PendingSearch,
    ResolvedPosition, Surface, TickEffects,
};
pub use path::{EndAction, MoveMode, Path, PathCommand};
pub use waiter::{waiter_pair, MovementWaiter, WaitHandle, WaitOutcome};
