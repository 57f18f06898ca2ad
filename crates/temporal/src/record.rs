use std::time::Duration;

use bendsim_common::{BlockPos, BlockState, Timestamp};

/// How a temporary block should behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TempBlockOptions {
    /// `None` keeps the override until it is reverted by hand.
    pub ttl: Option<Duration>,
    /// Restore the original at the deadline even after an external edit.
    pub force: bool,
    /// Other abilities may pick this block as a source.
    pub bendable: bool,
}

impl TempBlockOptions {
    pub fn lasting(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn permanent() -> Self {
        Self::default()
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn bendable(mut self, bendable: bool) -> Self {
        self.bendable = bendable;
        self
    }
}

/// One live override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempBlock {
    pub(crate) pos: BlockPos,
    pub(crate) original: BlockState,
    pub(crate) applied: BlockState,
    pub(crate) revert_at: Option<Timestamp>,
    pub(crate) force: bool,
    pub(crate) bendable: bool,
}

impl TempBlock {
    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    /// What the world held before the first override.
    pub fn original(&self) -> BlockState {
        self.original
    }

    pub fn applied(&self) -> BlockState {
        self.applied
    }

    pub fn revert_at(&self) -> Option<Timestamp> {
        self.revert_at
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    pub fn is_bendable(&self) -> bool {
        self.bendable
    }

    /// Merge a later request on the same position: the latest data wins, the
    /// later deadline wins and a permanent request makes the record permanent.
    pub(crate) fn refresh(
        &mut self,
        state: BlockState,
        revert_at: Option<Timestamp>,
        opts: &TempBlockOptions,
    ) {
        self.applied = state;
        self.revert_at = match (self.revert_at, revert_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        self.force |= opts.force;
        self.bendable |= opts.bendable;
    }
}
