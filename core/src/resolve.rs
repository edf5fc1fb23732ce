// resolve.rs — Method resolver: caller classification and argument merging
//
// For each method, computes the set of callers that may drive it in a
// given cycle and how their arguments combine: a direct connection for a
// lone caller, a caller-select mux for an exclusive method with several
// callers, or a reducer for a nonexclusive method. Call sites within one
// caller merge first, by a one-hot mux over their (pairwise exclusive)
// site enables.
//
// Preconditions: `map` was built without errors.
// Postconditions: every method has a `ResolvedMethod` entry.
// Failure modes: single-caller methods with several callers; nonexclusive
//                methods whose arguments cannot be merged.
// Side effects: appends merged-argument nets to `table`.

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::elab::Design;
use crate::graph::MethodMap;
use crate::id::{Caller, MethodId};
use crate::netlist::{NetId, NetTable, Wire};

// ── Public types ────────────────────────────────────────────────────────────

/// One caller of a method, with its call sites already merged: `args` is
/// the caller's argument expression, `enable` the OR of its site enables.
#[derive(Debug, Clone)]
pub struct ResolvedCaller {
    pub caller: Caller,
    pub args: Wire,
    pub enable: NetId,
}

/// How a method's input is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    /// No callers; the method is never invoked.
    Unused,
    /// Exactly one caller; direct connection.
    Direct,
    /// Exclusive method, several callers: one-hot mux indexed by the
    /// callers' grant-derived activity.
    CallerSelect,
    /// Nonexclusive method, several callers: commutative reducer over the
    /// live callers' arguments.
    Reduce,
}

/// Resolution outcome for one method.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub method: MethodId,
    pub callers: Vec<ResolvedCaller>,
    pub kind: MergeKind,
}

/// Resolution outcome for the whole design, indexed by method index.
#[derive(Debug)]
pub struct ResolvedDesign {
    pub methods: Vec<ResolvedMethod>,
}

/// Result of method resolution.
#[derive(Debug)]
pub struct ResolveResult {
    pub resolved: ResolvedDesign,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolveResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagLevel::Error)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve callers and argument merging for every method.
pub fn resolve(design: &Design, map: &MethodMap, table: &mut NetTable) -> ResolveResult {
    let mut diagnostics = Vec::new();
    let mut methods = Vec::with_capacity(design.methods.len());

    for m in design.method_ids() {
        let slot = &design.methods[m.index as usize];
        let body = &slot.body;

        let callers: Vec<ResolvedCaller> = map
            .callers(m)
            .iter()
            .map(|&caller| merge_caller_sites(design, table, caller, m))
            .collect();

        let kind = if callers.is_empty() {
            MergeKind::Unused
        } else if callers.len() == 1 {
            MergeKind::Direct
        } else if body.single_caller {
            diagnostics.push(
                Diagnostic::error(
                    codes::SINGLE_CALLER,
                    format!(
                        "single-caller method '{}' called from {} places",
                        body.name,
                        callers.len()
                    ),
                )
                .at(body.loc),
            );
            MergeKind::CallerSelect
        } else if !body.nonexclusive {
            MergeKind::CallerSelect
        } else if slot.reducer.is_some()
            || body.layout_in.is_empty()
            || body.layout_in.is_reduction_compatible()
        {
            MergeKind::Reduce
        } else {
            diagnostics.push(
                Diagnostic::error(
                    codes::UNMERGED_NONEXCLUSIVE,
                    format!(
                        "nonexclusive method '{}' has {} callers but its input \
                         layout {} is not reduction-compatible and no reducer \
                         is declared",
                        body.name,
                        callers.len(),
                        body.layout_in
                    ),
                )
                .at(body.loc)
                .with_hint("declare a reducer with set_reducer"),
            );
            MergeKind::Reduce
        };

        methods.push(ResolvedMethod {
            method: m,
            callers,
            kind,
        });
    }

    ResolveResult {
        resolved: ResolvedDesign { methods },
        diagnostics,
    }
}

/// Merge the call sites of one caller into a single argument/enable pair.
/// Sites are pairwise control-path exclusive, so a one-hot mux chain is
/// sound: at most one site enable is live.
fn merge_caller_sites(
    design: &Design,
    table: &mut NetTable,
    caller: Caller,
    callee: MethodId,
) -> ResolvedCaller {
    let sites = design.body(caller).sites_for(callee);
    debug_assert!(!sites.is_empty());

    if sites.len() == 1 {
        return ResolvedCaller {
            caller,
            args: sites[0].args.clone(),
            enable: sites[0].enable,
        };
    }

    let layout = design.method(callee).layout_in.clone();
    let mut args = table.wire_zero(&layout);
    let mut enables = Vec::with_capacity(sites.len());
    for site in sites {
        args = table.wire_mux(site.enable, &site.args, &args);
        enables.push(site.enable);
    }
    let enable = table.or_any(&enables);
    ResolvedCaller {
        caller,
        args,
        enable,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
