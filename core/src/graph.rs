// graph.rs — Method map: call closure, cycle detection, effective ready
//
// Derives, from the frozen design, everything the conflict and scheduling
// passes need to know about who calls whom: the transitive method closure
// of every transaction, the per-call enable chains, the direct caller sets,
// and the effective-ready predicate of every body.
//
// Preconditions: `design` is a finalized `Design`; `table` is its
//                expression table.
// Postconditions: returns a `MapResult`; on success the method call graph
//                 is acyclic and every used method has a defined body.
// Failure modes: call graph cycles, calls to never-defined methods,
//                transactions declared without bodies, one method reached
//                twice from the same transaction.
// Side effects: appends derived nets (enable chains, effective readies)
//               to `table`.

use std::collections::HashMap;

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::elab::Design;
use crate::id::{Caller, MethodId, TransactionId};
use crate::netlist::{NetId, NetTable};

// ── Public types ────────────────────────────────────────────────────────────

/// The derived call structure of a design.
#[derive(Debug)]
pub struct MethodMap {
    /// Transitively called methods per transaction, in discovery order.
    pub methods_by_transaction: Vec<Vec<MethodId>>,
    /// Transactions whose closure includes each method, in definition order.
    pub transactions_by_method: Vec<Vec<TransactionId>>,
    /// Methods reachable from any transaction, in first-discovery order.
    pub used_methods: Vec<MethodId>,
    /// Direct callers (methods or transactions) per method.
    pub direct_callers: Vec<Vec<Caller>>,
    /// Conjunction of call enables along the path from a transaction to a
    /// transitively called method.
    pub enable_by_call: HashMap<(TransactionId, MethodId), NetId>,
    /// Call path from a method up toward the transaction (the method
    /// itself first). Used for the nonexclusive-ancestor refinement.
    pub ancestors_by_call: HashMap<(TransactionId, MethodId), Vec<MethodId>>,
    /// Per caller and direct callee: OR of the enables of every call site.
    pub called_under: HashMap<(Caller, MethodId), NetId>,
    /// Effective ready per method (indexed by method index).
    pub method_ready: Vec<NetId>,
    /// Effective ready per transaction (indexed by transaction index).
    pub transaction_ready: Vec<NetId>,
}

impl MethodMap {
    pub fn callers(&self, m: MethodId) -> &[Caller] {
        &self.direct_callers[m.index as usize]
    }
}

/// Result of map construction.
#[derive(Debug)]
pub struct MapResult {
    pub map: MethodMap,
    pub diagnostics: Vec<Diagnostic>,
}

impl MapResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagLevel::Error)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Build the method map for a finalized design.
pub fn build_map(design: &Design, table: &mut NetTable) -> MapResult {
    let mut builder = MapBuilder::new(design, table);
    builder.check_bodies();
    builder.detect_cycles();
    if !builder.fatal {
        builder.collect_called_under();
        builder.walk_transactions();
        builder.compute_effective_ready();
    }
    builder.build_result()
}

// ── Internal builder ────────────────────────────────────────────────────────

struct MapBuilder<'a> {
    design: &'a Design,
    table: &'a mut NetTable,
    diagnostics: Vec<Diagnostic>,
    /// Set when recursion over the call graph would be unsound.
    fatal: bool,
    methods_by_transaction: Vec<Vec<MethodId>>,
    transactions_by_method: Vec<Vec<TransactionId>>,
    used_methods: Vec<MethodId>,
    direct_callers: Vec<Vec<Caller>>,
    enable_by_call: HashMap<(TransactionId, MethodId), NetId>,
    ancestors_by_call: HashMap<(TransactionId, MethodId), Vec<MethodId>>,
    called_under: HashMap<(Caller, MethodId), NetId>,
    method_ready: Vec<Option<NetId>>,
    transaction_ready: Vec<NetId>,
}

impl<'a> MapBuilder<'a> {
    fn new(design: &'a Design, table: &'a mut NetTable) -> Self {
        let n_methods = design.methods.len();
        let n_transactions = design.transactions.len();
        MapBuilder {
            design,
            table,
            diagnostics: Vec::new(),
            fatal: false,
            methods_by_transaction: vec![Vec::new(); n_transactions],
            transactions_by_method: vec![Vec::new(); n_methods],
            used_methods: Vec::new(),
            direct_callers: vec![Vec::new(); n_methods],
            enable_by_call: HashMap::new(),
            ancestors_by_call: HashMap::new(),
            called_under: HashMap::new(),
            method_ready: vec![None; n_methods],
            transaction_ready: Vec::new(),
        }
    }

    fn error(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    // ── Body checks ─────────────────────────────────────────────────────

    fn check_bodies(&mut self) {
        for body in &self.design.transactions {
            if !body.defined {
                self.fatal = true;
                self.error(
                    Diagnostic::error(
                        codes::UNDEFINED_BODY,
                        format!("transaction '{}' declared but never defined", body.name),
                    )
                    .at(body.loc),
                );
            }
        }
        // A method needs a body only when something calls it.
        let mut reported = vec![false; self.design.methods.len()];
        let all_bodies = self
            .design
            .methods
            .iter()
            .map(|s| &s.body)
            .chain(self.design.transactions.iter());
        let mut missing = Vec::new();
        for body in all_bodies {
            for site in &body.call_sites {
                if !self.design.method(site.callee).defined
                    && !std::mem::replace(&mut reported[site.callee.index as usize], true)
                {
                    missing.push((site.callee, site.loc));
                }
            }
        }
        for (callee, loc) in missing {
            self.fatal = true;
            let callee_body = self.design.method(callee);
            self.error(
                Diagnostic::error(
                    codes::MISSING_CALLEE,
                    format!(
                        "method '{}' is called but was never defined",
                        callee_body.name
                    ),
                )
                .at(loc)
                .with_note(callee_body.loc, "declared here"),
            );
        }
    }

    // ── Cycle detection (DFS with color marker) ─────────────────────────

    fn detect_cycles(&mut self) {
        let n = self.design.methods.len();
        let adj: Vec<Vec<u32>> = self
            .design
            .methods
            .iter()
            .map(|slot| slot.body.callees().iter().map(|m| m.index).collect())
            .collect();

        // 0 = unvisited, 1 = in progress, 2 = done
        let mut color = vec![0u8; n];
        let mut path: Vec<u32> = Vec::new();
        let mut cycles: Vec<Vec<u32>> = Vec::new();

        for start in 0..n as u32 {
            if color[start as usize] == 0 {
                dfs_cycle(start, &adj, &mut color, &mut path, &mut cycles);
            }
        }

        for cycle in cycles {
            self.fatal = true;
            let names: Vec<&str> = cycle
                .iter()
                .map(|&i| self.design.methods[i as usize].body.name.as_str())
                .collect();
            let loc = self.design.methods[cycle[0] as usize].body.loc;
            self.error(
                Diagnostic::error(
                    codes::CALL_GRAPH_CYCLE,
                    format!("method call graph contains a cycle: {}", names.join(" -> ")),
                )
                .at(loc),
            );
        }
    }

    // ── Per-caller callee enables ───────────────────────────────────────

    fn collect_called_under(&mut self) {
        let all_bodies = self
            .design
            .methods
            .iter()
            .map(|s| &s.body)
            .chain(self.design.transactions.iter());
        for body in all_bodies {
            for callee in body.callees() {
                let enables: Vec<NetId> =
                    body.sites_for(callee).iter().map(|s| s.enable).collect();
                let combined = self.table.or_any(&enables);
                self.called_under.insert((body.owner, callee), combined);
                self.direct_callers[callee.index as usize].push(body.owner);
            }
        }
    }

    // ── Transaction closure walk ────────────────────────────────────────

    fn walk_transactions(&mut self) {
        for t in self.design.transaction_ids() {
            let root = Caller::Transaction(t);
            let start = self.table.true_();
            self.walk(t, root, start, &[]);
        }
    }

    fn walk(&mut self, t: TransactionId, source: Caller, path_enable: NetId, ancestors: &[MethodId]) {
        for callee in self.design.body(source).callees() {
            if self.methods_by_transaction[t.index as usize].contains(&callee) {
                let tx = self.design.transaction(t);
                let callee_body = self.design.method(callee);
                self.error(
                    Diagnostic::error(
                        codes::DUPLICATE_CALL,
                        format!(
                            "method '{}' reached twice from transaction '{}'",
                            callee_body.name, tx.name
                        ),
                    )
                    .at(tx.loc)
                    .with_note(callee_body.loc, "method declared here"),
                );
                continue;
            }
            self.methods_by_transaction[t.index as usize].push(callee);
            self.transactions_by_method[callee.index as usize].push(t);
            if !self.used_methods.contains(&callee) {
                self.used_methods.push(callee);
            }

            let edge = self.called_under[&(source, callee)];
            let enable = self.table.and(path_enable, edge);
            self.enable_by_call.insert((t, callee), enable);

            let mut chain = Vec::with_capacity(ancestors.len() + 1);
            chain.push(callee);
            chain.extend_from_slice(ancestors);
            self.ancestors_by_call.insert((t, callee), chain.clone());

            self.walk(t, Caller::Method(callee), enable, &chain);
        }
    }

    // ── Effective ready ─────────────────────────────────────────────────

    fn compute_effective_ready(&mut self) {
        for m in self.design.method_ids() {
            if self.design.method(m).defined {
                self.eff_method(m);
            }
        }
        for t in self.design.transaction_ids() {
            let eff = self.eff_callees(Caller::Transaction(t));
            self.transaction_ready.push(eff);
        }
    }

    /// `eff(m) = local_ready(m) ∧ AND over callees c of
    /// (¬called_under[c] ∨ eff(c))`, memoized over the acyclic call graph.
    fn eff_method(&mut self, m: MethodId) -> NetId {
        if let Some(cached) = self.method_ready[m.index as usize] {
            return cached;
        }
        let body = self.design.method(m);
        let local = match body.local_ready {
            Some(r) => r,
            None => self.table.false_(),
        };
        let callees_part = self.eff_callees(Caller::Method(m));
        let eff = self.table.and(local, callees_part);
        self.method_ready[m.index as usize] = Some(eff);
        eff
    }

    fn eff_callees(&mut self, owner: Caller) -> NetId {
        let callees = self.design.body(owner).callees();
        let mut acc = self.table.true_();
        for callee in callees {
            let under = self.called_under[&(owner, callee)];
            let callee_eff = self.eff_method(callee);
            let not_under = self.table.not(under);
            let term = self.table.or(not_under, callee_eff);
            acc = self.table.and(acc, term);
        }
        acc
    }

    fn build_result(mut self) -> MapResult {
        // Undefined or unreachable methods are never ready.
        let never = self.table.false_();
        let method_ready = self
            .method_ready
            .into_iter()
            .map(|r| r.unwrap_or(never))
            .collect();
        MapResult {
            map: MethodMap {
                methods_by_transaction: self.methods_by_transaction,
                transactions_by_method: self.transactions_by_method,
                used_methods: self.used_methods,
                direct_callers: self.direct_callers,
                enable_by_call: self.enable_by_call,
                ancestors_by_call: self.ancestors_by_call,
                called_under: self.called_under,
                method_ready,
                transaction_ready: self.transaction_ready,
            },
            diagnostics: self.diagnostics,
        }
    }
}

// ── DFS cycle extraction ────────────────────────────────────────────────────

fn dfs_cycle(
    node: u32,
    adj: &[Vec<u32>],
    color: &mut [u8],
    path: &mut Vec<u32>,
    cycles: &mut Vec<Vec<u32>>,
) {
    color[node as usize] = 1; // in progress
    path.push(node);

    for &next in &adj[node as usize] {
        match color[next as usize] {
            0 => dfs_cycle(next, adj, color, path, cycles),
            1 => {
                if let Some(pos) = path.iter().position(|&n| n == next) {
                    cycles.push(path[pos..].to_vec());
                }
            }
            _ => {}
        }
    }

    path.pop();
    color[node as usize] = 2; // done
}

// ── Tests ───────────────────────────────────────────────────────────────────
