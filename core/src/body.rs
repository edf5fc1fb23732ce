// body.rs — Bodies, control paths and call sites
//
// A `Body` is the elaborated circuit fragment behind a method or a
// transaction: its interface wires, its local ready predicate, and the
// call sites recorded while the body was open. Control paths give call
// sites and bodies a structural mutual-exclusion witness: two paths that
// pass through different arms of the same conditional region can never be
// live in the same cycle.

use crate::diag::SrcLoc;
use crate::id::{CallSiteId, Caller, MethodId};
use crate::layout::Layout;
use crate::netlist::{NetId, Wire};

// ── Control paths ───────────────────────────────────────────────────────────

/// One conditional region entry: which region, which arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlStep {
    pub region: u32,
    pub arm: u32,
}

/// The stack of conditional regions in force at a point of elaboration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtrlPath {
    pub steps: Vec<CtrlStep>,
}

impl CtrlPath {
    pub fn root() -> CtrlPath {
        CtrlPath::default()
    }

    /// Structural mutual exclusion: true when the two paths take different
    /// arms of one shared region. Paths that merely diverge into different
    /// regions, or where one is a prefix of the other, may overlap.
    pub fn exclusive_with(&self, other: &CtrlPath) -> bool {
        for (a, b) in self.steps.iter().zip(&other.steps) {
            if a.region != b.region {
                return false;
            }
            if a.arm != b.arm {
                return true;
            }
        }
        false
    }
}

// ── Call sites ──────────────────────────────────────────────────────────────

/// A recorded method invocation: caller, callee, the enable predicate in
/// force at the site (conjunction of nested guards and the explicit call
/// enable), the control path, and the argument expression.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub id: CallSiteId,
    pub caller: Caller,
    pub callee: MethodId,
    pub enable: NetId,
    pub path: CtrlPath,
    pub args: Wire,
    pub loc: SrcLoc,
}

// ── Bodies ──────────────────────────────────────────────────────────────────

/// The elaborated body of a method or transaction. Created at declaration
/// time; interface wires exist immediately, the ready predicate, output
/// expression and call sites are filled in when the body is defined.
#[derive(Debug)]
pub struct Body {
    pub owner: Caller,
    pub name: String,
    /// Position in the global definition order; the deterministic
    /// tiebreaker for scheduling.
    pub def_order: u32,
    pub loc: SrcLoc,
    pub layout_in: Layout,
    pub layout_out: Layout,
    /// Input port, driven by the lowering emitter's argument mux.
    pub data_in: Wire,
    /// Output port, read by callers; driven from `out_expr` at lowering.
    /// Port variables exist from declaration time so forward calls can
    /// reference a callee's result before its body is defined.
    pub data_out: Wire,
    /// Output expression, set when the body closes.
    pub out_expr: Option<Wire>,
    /// Local ready predicate (for transactions: the request predicate).
    pub local_ready: Option<NetId>,
    pub nonexclusive: bool,
    pub single_caller: bool,
    /// Control path at the point of definition; the exclusion witness for
    /// whole bodies.
    pub path: CtrlPath,
    pub call_sites: Vec<CallSite>,
    pub defined: bool,
}

impl Body {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: Caller,
        name: String,
        def_order: u32,
        loc: SrcLoc,
        layout_in: Layout,
        layout_out: Layout,
        data_in: Wire,
        data_out: Wire,
        nonexclusive: bool,
        single_caller: bool,
    ) -> Body {
        Body {
            owner,
            name,
            def_order,
            loc,
            layout_in,
            layout_out,
            data_in,
            data_out,
            out_expr: None,
            local_ready: None,
            nonexclusive,
            single_caller,
            path: CtrlPath::root(),
            call_sites: Vec::new(),
            defined: false,
        }
    }

    /// Direct callees of this body, in first-call order, without duplicates.
    pub fn callees(&self) -> Vec<MethodId> {
        let mut out = Vec::new();
        for site in &self.call_sites {
            if !out.contains(&site.callee) {
                out.push(site.callee);
            }
        }
        out
    }

    /// The call sites targeting one callee, in record order.
    pub fn sites_for(&self, callee: MethodId) -> Vec<&CallSite> {
        self.call_sites
            .iter()
            .filter(|s| s.callee == callee)
            .collect()
    }
}

/// What a method body definition yields: the local ready predicate and the
/// output expression.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub ready: NetId,
    pub data_out: Wire,
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn path(steps: &[(u32, u32)]) -> CtrlPath {
        CtrlPath {
            steps: steps
                .iter()
                .map(|&(region, arm)| CtrlStep { region, arm })
                .collect(),
        }
    }

    #[test]
    fn different_arms_of_one_region_are_exclusive() {
        let a = path(&[(0, 0)]);
        let b = path(&[(0, 1)]);
        assert!(a.exclusive_with(&b));
        assert!(b.exclusive_with(&a));
    }

    #[test]
    fn same_arm_is_not_exclusive() {
        let a = path(&[(0, 0), (1, 0)]);
        let b = path(&[(0, 0), (1, 0)]);
        assert!(!a.exclusive_with(&b));
    }

    #[test]
    fn divergence_below_a_shared_arm_is_exclusive() {
        let a = path(&[(0, 0), (1, 0)]);
        let b = path(&[(0, 0), (1, 1)]);
        assert!(a.exclusive_with(&b));
    }

    #[test]
    fn different_regions_are_not_exclusive() {
        // Two independent `when` regions can both be live.
        let a = path(&[(0, 0)]);
        let b = path(&[(1, 0)]);
        assert!(!a.exclusive_with(&b));
    }

    #[test]
    fn prefix_paths_are_not_exclusive() {
        let outer = path(&[(0, 0)]);
        let inner = path(&[(0, 0), (1, 1)]);
        assert!(!outer.exclusive_with(&inner));
        assert!(!inner.exclusive_with(&outer));
    }

    #[test]
    fn empty_paths_overlap() {
        assert!(!CtrlPath::root().exclusive_with(&CtrlPath::root()));
    }
}
