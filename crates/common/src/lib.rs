//! Shared value types for the bendsim engine.
//!
//! # Invariants
//! - Every type here is a plain value: no interior references to world state.
//! - Orderings are total so collections keyed by these types iterate
//!   deterministically.

pub mod block;
pub mod time;
pub mod types;
pub mod world;

pub use block::{BlockState, Material};
pub use time::{Clock, ManualClock, SystemClock, TICK_MILLIS, Timestamp};
pub use types::{BlockPos, EntityId};
pub use world::{BlockAccess, EntityQuery, EntityRef, GameWorld};
