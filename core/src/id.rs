// id.rs — Stable semantic identifiers for elaboration artifacts
//
// These IDs provide deterministic identity for methods, transactions,
// signatures and call sites. Allocated in definition order during
// elaboration; threaded through the map, conflict, resolve, schedule and
// lower passes. Method and transaction IDs embed the ID of the elaboration
// context that created them, so cross-context mixing is detectable.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of one elaboration context. Unique per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CtxId(pub u32);

static NEXT_CTX: AtomicU32 = AtomicU32::new(0);

impl CtxId {
    /// Allocate a fresh context identifier.
    pub fn fresh() -> CtxId {
        CtxId(NEXT_CTX.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable identifier for an interned method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureId(pub u32);

/// Stable identifier for a method within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    pub ctx: CtxId,
    pub index: u32,
}

/// Stable identifier for a transaction within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId {
    pub ctx: CtxId,
    pub index: u32,
}

/// Stable identifier for a recorded call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSiteId(pub u32);

/// A call-graph participant: transactions and methods both call methods,
/// so callers are a tagged variant rather than a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Caller {
    Transaction(TransactionId),
    Method(MethodId),
}

impl Caller {
    pub fn ctx(&self) -> CtxId {
        match self {
            Caller::Transaction(t) => t.ctx,
            Caller::Method(m) => m.ctx,
        }
    }
}

impl From<TransactionId> for Caller {
    fn from(t: TransactionId) -> Self {
        Caller::Transaction(t)
    }
}

impl From<MethodId> for Caller {
    fn from(m: MethodId) -> Self {
        Caller::Method(m)
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Transaction(t) => write!(f, "transaction #{}", t.index),
            Caller::Method(m) => write!(f, "method #{}", m.index),
        }
    }
}

/// Allocator for per-context IDs. Produces monotonically increasing IDs in
/// allocation (definition) order, ensuring deterministic assignment.
#[derive(Debug)]
pub struct IdAllocator {
    ctx: CtxId,
    next_method: u32,
    next_transaction: u32,
    next_call_site: u32,
}

impl IdAllocator {
    pub fn new(ctx: CtxId) -> Self {
        IdAllocator {
            ctx,
            next_method: 0,
            next_transaction: 0,
            next_call_site: 0,
        }
    }

    pub fn ctx(&self) -> CtxId {
        self.ctx
    }

    pub fn alloc_method(&mut self) -> MethodId {
        let id = MethodId {
            ctx: self.ctx,
            index: self.next_method,
        };
        self.next_method += 1;
        id
    }

    pub fn alloc_transaction(&mut self) -> TransactionId {
        let id = TransactionId {
            ctx: self.ctx,
            index: self.next_transaction,
        };
        self.next_transaction += 1;
        id
    }

    pub fn alloc_call_site(&mut self) -> CallSiteId {
        let id = CallSiteId(self.next_call_site);
        self.next_call_site += 1;
        id
    }
}
