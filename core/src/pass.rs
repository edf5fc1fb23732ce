// pass.rs — The pass graph: identifiers, descriptors, subset selection
//
// The five analysis and lowering passes are declared here together with
// the artifacts they produce and the passes they consume. `ALL_PASSES`
// lists them in declaration order, which is also a valid execution order:
// every pass appears after all of its inputs. Subset selection for a
// terminal artifact exploits that ordering instead of re-deriving it.

use std::collections::HashSet;

// ── Identifiers ────────────────────────────────────────────────────────────

/// Identifies each pass (elaboration itself happens before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    BuildMap,
    Conflicts,
    Resolve,
    Schedule,
    Lower,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type in
/// the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Map,       // MethodMap
    Conflicts, // ConflictGraph
    Resolved,  // ResolvedDesign
    Schedule,  // Schedule
    Netlist,   // Netlist + Interface
}

// ── Descriptors ────────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Name shown in timing lines and pipeline errors.
    pub name: &'static str,
    /// Passes whose artifacts this one reads.
    pub inputs: &'static [PassId],
    /// Artifacts this pass yields into the compilation state.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Static descriptor for a pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::BuildMap => PassDescriptor {
            name: "build_map",
            inputs: &[],
            outputs: &[ArtifactId::Map],
            invariants: "call graph acyclic, effective readies computed",
        },
        PassId::Conflicts => PassDescriptor {
            name: "conflicts",
            inputs: &[PassId::BuildMap],
            outputs: &[ArtifactId::Conflicts],
            invariants: "priority order total, components sorted",
        },
        PassId::Resolve => PassDescriptor {
            name: "resolve",
            inputs: &[PassId::BuildMap],
            outputs: &[ArtifactId::Resolved],
            invariants: "every method classified, caller sites merged",
        },
        PassId::Schedule => PassDescriptor {
            name: "schedule",
            inputs: &[PassId::Conflicts],
            outputs: &[ArtifactId::Schedule],
            invariants: "grants gated by request, readiness and conflicts",
        },
        PassId::Lower => PassDescriptor {
            name: "lower",
            inputs: &[PassId::Resolve, PassId::Schedule],
            outputs: &[ArtifactId::Netlist],
            invariants: "argument muxes one-hot, signals complete",
        },
    }
}

// ── Subset selection ───────────────────────────────────────────────────────

/// All 5 pass IDs in declaration order. Declaration order is execution
/// order: every pass is listed after the passes it consumes.
pub const ALL_PASSES: [PassId; 5] = [
    PassId::BuildMap,
    PassId::Conflicts,
    PassId::Resolve,
    PassId::Schedule,
    PassId::Lower,
];

/// Compute the minimal set of passes needed to produce `terminal`, in
/// execution order.
///
/// A single reverse sweep over `ALL_PASSES` suffices: when a pass is
/// already known to be needed, its inputs (which all sit earlier in the
/// list) become needed too, and a forward filter then restores execution
/// order. No explicit graph traversal is required.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut needed: HashSet<PassId> = HashSet::from([terminal]);
    for pass in ALL_PASSES.into_iter().rev() {
        if needed.contains(&pass) {
            needed.extend(descriptor(pass).inputs.iter().copied());
        }
    }
    ALL_PASSES
        .into_iter()
        .filter(|pass| needed.contains(pass))
        .collect()
}

// ── Verification certificates ──────────────────────────────────────────────

/// Machine-checkable evidence for a pass's postconditions.
pub trait StageCert {
    /// True if all obligations pass.
    fn all_pass(&self) -> bool;
    /// Named obligations with their outcomes.
    fn obligations(&self) -> Vec<(&'static str, bool)>;
}

// ── Tests ────────────────────────────────────────────────────────────────
