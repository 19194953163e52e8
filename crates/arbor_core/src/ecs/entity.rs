//! # Entity Identity
//!
//! Every node carries two identifiers:
//! - [`InstanceId`]: issued by the [`IdAllocator`], locally unique, never reused
//! - [`EntityId`]: externally meaningful (e.g. assigned by a server), defaults
//!   to the instance value when the creator does not supply one

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EntityError, EntityResult};

/// Locally unique identifier of a live node.
///
/// Issued monotonically by an [`IdAllocator`]. A value is never handed out
/// twice within a process run, so a stale `InstanceId` can only ever resolve
/// to "not found", never to a different node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wraps a raw value. Intended for tests and wire adapters.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Externally meaningful identifier of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The external id a node receives when its creator supplies none.
    #[inline]
    #[must_use]
    pub const fn from_instance(instance: InstanceId) -> Self {
        Self(instance.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues [`InstanceId`]s.
///
/// Lock-free and safe to share between threads. Identifiers are handed out in
/// strictly increasing order starting at 1; freed identifiers are never
/// recycled. Running past `u64::MAX` is fatal: the allocator refuses to wrap
/// and reports [`EntityError::AllocatorExhausted`] forever after.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Creates an allocator whose first identifier is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an allocator whose first identifier is `first`.
    ///
    /// Zero is reserved and bumped to 1.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        let first = if first == 0 { 1 } else { first };
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocates the next identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::AllocatorExhausted`] once the identifier space
    /// is used up.
    pub fn allocate(&self) -> EntityResult<InstanceId> {
        // u64::MAX is the exhaustion sentinel, never issued
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == u64::MAX {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .map(InstanceId)
            .map_err(|_| EntityError::AllocatorExhausted)
    }

    /// Returns the identifier the next call to [`allocate`](Self::allocate)
    /// would issue, without consuming it.
    #[must_use]
    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
