//! Node identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity for a participant in the credit graph.
///
/// `NodeId` owns nothing; it is referenced by creditlines and payments and
/// carried around as a plain value, never as a pointer, so the (inherently
/// cyclic) flow graph can be represented with plain maps keyed by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Monotonically-increasing allocator for `NodeId`s, mirroring the
/// account/creditline/payment id allocators in `ledger.rs`.
#[derive(Debug, Default)]
pub struct NodeIdAllocator {
    next: u64,
}

impl NodeIdAllocator {
    pub fn new() -> Self {
        NodeIdAllocator { next: 1 }
    }

    /// Resume allocation after the highest id already present in a loaded
    /// ledger, so freshly created nodes never collide with persisted ones.
    pub fn starting_after(max_existing: Option<NodeId>) -> Self {
        NodeIdAllocator {
            next: max_existing.map_or(1, |NodeId(id)| id + 1),
        }
    }

    pub fn alloc(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}
