use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bendsim_common::{BlockAccess, BlockPos, BlockState, Timestamp};

use crate::record::{TempBlock, TempBlockOptions};

/// Registry of live overrides for one world.
///
/// Deadlines live in an ordered index so a sweep only touches records that
/// are actually due.
#[derive(Debug, Default)]
pub struct TempBlockManager {
    records: BTreeMap<BlockPos, TempBlock>,
    deadlines: BTreeSet<(Timestamp, BlockPos)>,
}

impl TempBlockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `pos` with `state`, reverting `ttl` after `now` (`None` for
    /// never). See [`TempBlockManager::create_with`].
    pub fn create<W: BlockAccess + ?Sized>(
        &mut self,
        world: &mut W,
        pos: BlockPos,
        state: BlockState,
        ttl: Option<Duration>,
        force: bool,
        now: Timestamp,
    ) -> &TempBlock {
        let opts = TempBlockOptions {
            ttl,
            force,
            bendable: false,
        };
        self.create_with(world, pos, state, opts, now)
    }

    /// Apply `state` at `pos` immediately.
    ///
    /// The first override on a position snapshots the world's current block.
    /// Later overrides replace the applied state and merge deadline and flags
    /// but keep that snapshot, so reverting always restores the real terrain.
    pub fn create_with<W: BlockAccess + ?Sized>(
        &mut self,
        world: &mut W,
        pos: BlockPos,
        state: BlockState,
        opts: TempBlockOptions,
        now: Timestamp,
    ) -> &TempBlock {
        let revert_at = opts.ttl.map(|ttl| now.after(ttl));
        let record = match self.records.entry(pos) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                tracing::trace!(
                    %pos,
                    original = ?record.original,
                    "overlay refresh keeps first snapshot"
                );
                if let Some(at) = record.revert_at {
                    self.deadlines.remove(&(at, pos));
                }
                record.refresh(state, revert_at, &opts);
                record
            }
            Entry::Vacant(entry) => {
                let original = world.block(pos);
                tracing::debug!(%pos, ?original, ?state, ?revert_at, "temp block created");
                entry.insert(TempBlock {
                    pos,
                    original,
                    applied: state,
                    revert_at,
                    force: opts.force,
                    bendable: opts.bendable,
                })
            }
        };
        if let Some(at) = record.revert_at {
            self.deadlines.insert((at, pos));
        }
        world.set_block(pos, state);
        record
    }

    /// Override with air: the common case of carving terrain out.
    pub fn create_air<W: BlockAccess + ?Sized>(
        &mut self,
        world: &mut W,
        pos: BlockPos,
        ttl: Option<Duration>,
        now: Timestamp,
    ) -> &TempBlock {
        self.create(world, pos, BlockState::AIR, ttl, false, now)
    }

    /// Something outside the engine edited `pos`.
    ///
    /// A normal record is dropped without touching the world, so the outside
    /// edit becomes the truth. A forced record stays and still restores its
    /// original at the deadline. Returns true if a record was dropped.
    pub fn mark_for_removal(&mut self, pos: BlockPos) -> bool {
        match self.records.get(&pos) {
            Some(record) if record.force => {
                tracing::trace!(%pos, "forced temp block survives external edit");
                false
            }
            Some(_) => {
                self.forget(pos);
                tracing::debug!(%pos, "temp block cancelled by external edit");
                true
            }
            None => false,
        }
    }

    /// Restore the original now. False if `pos` is not overridden.
    pub fn revert<W: BlockAccess + ?Sized>(&mut self, world: &mut W, pos: BlockPos) -> bool {
        let Some(record) = self.forget(pos) else {
            return false;
        };
        world.set_block(pos, record.original);
        tracing::debug!(%pos, original = ?record.original, "temp block reverted");
        true
    }

    /// Revert every record whose deadline is at or before `now`. Returns the
    /// reverted positions in deadline order.
    pub fn sweep<W: BlockAccess + ?Sized>(
        &mut self,
        world: &mut W,
        now: Timestamp,
    ) -> Vec<BlockPos> {
        let mut reverted = Vec::new();
        while let Some(&(at, pos)) = self.deadlines.first() {
            if at > now {
                break;
            }
            self.deadlines.pop_first();
            if let Some(record) = self.records.remove(&pos) {
                world.set_block(pos, record.original);
                reverted.push(pos);
            }
        }
        if !reverted.is_empty() {
            tracing::trace!(count = reverted.len(), now = now.as_millis(), "overlay sweep");
        }
        reverted
    }

    /// Restore everything, e.g. when the world unloads.
    pub fn revert_all<W: BlockAccess + ?Sized>(&mut self, world: &mut W) -> usize {
        let records = std::mem::take(&mut self.records);
        self.deadlines.clear();
        let count = records.len();
        for (pos, record) in records {
            world.set_block(pos, record.original);
        }
        if count > 0 {
            tracing::debug!(count, "all temp blocks reverted");
        }
        count
    }

    pub fn is_temp(&self, pos: BlockPos) -> bool {
        self.records.contains_key(&pos)
    }

    /// Real terrain is always bendable; an override only when flagged.
    pub fn is_bendable(&self, pos: BlockPos) -> bool {
        self.records.get(&pos).is_none_or(|r| r.bendable)
    }

    pub fn get(&self, pos: BlockPos) -> Option<&TempBlock> {
        self.records.get(&pos)
    }

    pub fn records(&self) -> impl Iterator<Item = &TempBlock> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn forget(&mut self, pos: BlockPos) -> Option<TempBlock> {
        let record = self.records.remove(&pos)?;
        if let Some(at) = record.revert_at {
            self.deadlines.remove(&(at, pos));
        }
        Some(record)
    }
}
