// registry.rs — Signature registry and declaration records
//
// Interns method signatures (input layout, output layout, nonexclusive
// flag) so that structurally equal interfaces share one `SignatureId`, and
// holds the declaration-side records used by later passes: priority
// relations, reducers and method parameters. Two methods with the same
// signature remain distinct identities; only the interface descriptor is
// shared.

use std::collections::HashMap;
use std::fmt;

use crate::diag::{codes, Diagnostic, SrcLoc};
use crate::id::{Caller, SignatureId};
use crate::layout::Layout;
use crate::netlist::{NetId, NetTable, Wire};

// ── Signatures ──────────────────────────────────────────────────────────────

/// An immutable descriptor of a method interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub input: Layout,
    pub output: Layout,
    pub nonexclusive: bool,
}

/// Interns signatures and tracks the signature bound to each method name,
/// so a re-registration with an incompatible layout is caught early.
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    signatures: Vec<Signature>,
    interner: HashMap<Signature, SignatureId>,
    by_name: HashMap<String, SignatureId>,
}

impl SignatureRegistry {
    pub fn new() -> SignatureRegistry {
        SignatureRegistry::default()
    }

    /// Intern a signature. Structurally equal layouts return the same id.
    pub fn intern(&mut self, input: Layout, output: Layout, nonexclusive: bool) -> SignatureId {
        let sig = Signature {
            input,
            output,
            nonexclusive,
        };
        if let Some(&id) = self.interner.get(&sig) {
            return id;
        }
        let id = SignatureId(self.signatures.len() as u32);
        self.signatures.push(sig.clone());
        self.interner.insert(sig, id);
        id
    }

    pub fn get(&self, id: SignatureId) -> &Signature {
        &self.signatures[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Bind a method name to a signature. Registering the same name again
    /// with a matching signature is allowed (the methods stay distinct);
    /// a non-matching signature fails with a layout mismatch.
    pub fn bind_name(
        &mut self,
        name: &str,
        id: SignatureId,
        loc: SrcLoc,
    ) -> Result<(), Diagnostic> {
        match self.by_name.get(name) {
            None => {
                self.by_name.insert(name.to_string(), id);
                Ok(())
            }
            Some(&existing) if existing == id => Ok(()),
            Some(&existing) => {
                let old = self.get(existing);
                Err(Diagnostic::error(
                    codes::LAYOUT_MISMATCH,
                    format!(
                        "method '{}' re-registered with a different signature \
                         (was in {} out {}, now in {} out {})",
                        name,
                        old.input,
                        old.output,
                        self.get(id).input,
                        self.get(id).output,
                    ),
                )
                .at(loc))
            }
        }
    }
}

// ── Priority relations ──────────────────────────────────────────────────────

/// Priority between two conflicting transactions or methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Conflicting transactions/methods don't have a priority order.
    Undefined,
    /// The left transaction/method is prioritized over the right one.
    Left,
    /// The right transaction/method is prioritized over the left one.
    Right,
}

/// A declared relation between two call-graph participants. `conflict`
/// relations forbid simultaneous execution; pure priority relations
/// (from `schedule_before`) only order the arbiter.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub start: Caller,
    pub end: Caller,
    pub priority: Priority,
    pub conflict: bool,
    pub loc: SrcLoc,
}

// ── Reducers ────────────────────────────────────────────────────────────────

/// Combiner for the arguments of a nonexclusive method with several live
/// callers. The closure receives the per-caller argument wires and the
/// per-caller activity bits, and must produce one merged argument wire.
pub enum Reducer {
    /// Bitwise OR of the active callers' arguments. Valid only for
    /// reduction-compatible layouts (every field one bit wide).
    Or,
    /// Designer-declared combiner.
    Custom(Box<dyn Fn(&mut NetTable, &[Wire], &[NetId]) -> Wire>),
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Or => write!(f, "Reducer::Or"),
            Reducer::Custom(_) => write!(f, "Reducer::Custom(..)"),
        }
    }
}

// ── Method parameters ───────────────────────────────────────────────────────

/// Declaration-time options for a method.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodParams {
    /// A nonexclusive method may be called by several transactions in the
    /// same cycle; its callers' arguments are merged by a reducer instead
    /// of arbitrated.
    pub nonexclusive: bool,
    /// A single-caller method must resolve to at most one caller.
    pub single_caller: bool,
}

// ── Tests ───────────────────────────────────────────────────────────────────
