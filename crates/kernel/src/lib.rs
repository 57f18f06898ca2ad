//! Reference world: an in-memory implementation of the block and entity
//! collaborators, with deterministic stepping and replay.
//!
//! # Invariants
//! - All state mutations flow through explicit operations and are logged.
//! - Iteration order is canonical (BTreeMap), so replays hash identically.

mod grid;
pub mod world;

pub use grid::{CellCoord, GridPartition};
pub use world::{DEFAULT_DRAG, EntityData, World, WorldEvent};
