//! Temporal block overlay.
//!
//! Abilities rewrite small parts of the world for a while: a tunnel bored
//! through rock, a wall of ice, scorched ground. Every such edit goes through
//! the [`TempBlockManager`], which remembers what was there first and puts it
//! back when the deadline passes.
//!
//! # Invariants
//! - At most one record per position.
//! - The original snapshot is taken at first creation and never replaced.
//! - Records are only reverted from the tick thread, by [`TempBlockManager::sweep`]
//!   or an explicit revert.

mod manager;
mod record;

pub use manager::TempBlockManager;
pub use record::{TempBlock, TempBlockOptions};
