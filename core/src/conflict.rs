// conflict.rs — Conflict graph, priority order, connected components
//
// Derives the undirected conflict graph on transactions and the directed
// priority graph from the method map plus the declared relations.
// Conflicts are implicit (two transactions sharing an exclusive method
// under possibly overlapping enables) or explicit (declared). Enables are
// opaque: absent a structural mutual-exclusion witness, overlap is
// conservatively assumed. False conflicts waste parallelism but never
// violate atomicity.
//
// Preconditions: `map` was built without errors.
// Postconditions: every transaction has a priority rank; components are
//                 sorted by rank.
// Failure modes: cycles in the priority graph.
// Side effects: none.

use std::collections::{BTreeSet, HashSet};

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::elab::Design;
use crate::graph::MethodMap;
use crate::id::{Caller, MethodId, TransactionId};
use crate::registry::Priority;

// ── Public types ────────────────────────────────────────────────────────────

/// Why two transactions conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictCause {
    /// Both transactions reach this exclusive method.
    SharedMethod(MethodId),
    /// The designer declared the conflict.
    Declared,
}

/// One undirected conflict edge, labeled by cause.
#[derive(Debug, Clone, Copy)]
pub struct ConflictEdge {
    pub a: TransactionId,
    pub b: TransactionId,
    pub cause: ConflictCause,
}

/// The conflict structure of a design.
#[derive(Debug)]
pub struct ConflictGraph {
    /// Adjacency per transaction index.
    pub adjacency: Vec<BTreeSet<u32>>,
    /// All edges with causes, for the structural report.
    pub edges: Vec<ConflictEdge>,
    /// Priority rank per transaction index; lower rank wins arbitration.
    pub porder: Vec<usize>,
    /// Connected components, each sorted by priority rank. Transactions
    /// in different components schedule independently.
    pub components: Vec<Vec<TransactionId>>,
}

impl ConflictGraph {
    pub fn conflicts(&self, a: TransactionId, b: TransactionId) -> bool {
        self.adjacency[a.index as usize].contains(&b.index)
    }
}

/// Result of conflict analysis.
#[derive(Debug)]
pub struct ConflictResult {
    pub graph: ConflictGraph,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConflictResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagLevel::Error)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Build the conflict and priority structure for a design.
pub fn build_conflicts(design: &Design, map: &MethodMap) -> ConflictResult {
    let n = design.transactions.len();
    let mut builder = ConflictBuilder {
        design,
        map,
        adjacency: vec![BTreeSet::new(); n],
        // successors[i] holds transactions that must rank after i
        successors: vec![BTreeSet::new(); n],
        edges: Vec::new(),
        seen_edges: HashSet::new(),
        diagnostics: Vec::new(),
    };
    builder.implicit_conflicts();
    builder.explicit_relations();
    let porder = builder.priority_order();
    builder.tiebreak_warnings(&porder);
    let components = builder.connected_components(&porder);

    ConflictResult {
        graph: ConflictGraph {
            adjacency: builder.adjacency,
            edges: builder.edges,
            porder,
            components,
        },
        diagnostics: builder.diagnostics,
    }
}

// ── Internal builder ────────────────────────────────────────────────────────

struct ConflictBuilder<'a> {
    design: &'a Design,
    map: &'a MethodMap,
    adjacency: Vec<BTreeSet<u32>>,
    successors: Vec<BTreeSet<u32>>,
    edges: Vec<ConflictEdge>,
    seen_edges: HashSet<(u32, u32, ConflictCause)>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ConflictBuilder<'a> {
    /// True when the two transactions can never be live in the same cycle:
    /// some pair of bodies among the transactions and their transitively
    /// called methods sits in different arms of one conditional region.
    fn transactions_exclusive(&self, t1: TransactionId, t2: TransactionId) -> bool {
        let bodies1 = self.bodies_of(t1);
        let bodies2 = self.bodies_of(t2);
        for b1 in &bodies1 {
            for b2 in &bodies2 {
                if b1.exclusive_with(b2) {
                    return true;
                }
            }
        }
        false
    }

    fn bodies_of(&self, t: TransactionId) -> Vec<&'a crate::body::CtrlPath> {
        let mut out = vec![&self.design.transaction(t).path];
        for &m in &self.map.methods_by_transaction[t.index as usize] {
            out.push(&self.design.method(m).path);
        }
        out
    }

    /// True when the deepest common ancestor on the two call paths to
    /// `method` is nonexclusive, so the shared use induces no conflict.
    fn calls_nonexclusive(&self, t1: TransactionId, t2: TransactionId, method: MethodId) -> bool {
        let a1 = &self.map.ancestors_by_call[&(t1, method)];
        let a2 = &self.map.ancestors_by_call[&(t2, method)];
        let mut last_common = None;
        for (x, y) in a1.iter().zip(a2.iter()) {
            if x == y {
                last_common = Some(*x);
            } else {
                break;
            }
        }
        match last_common {
            Some(m) => self.design.method(m).nonexclusive,
            None => false,
        }
    }

    fn add_edge(
        &mut self,
        begin: TransactionId,
        end: TransactionId,
        priority: Priority,
        conflict: bool,
        cause: ConflictCause,
    ) {
        if conflict && begin != end {
            self.adjacency[begin.index as usize].insert(end.index);
            self.adjacency[end.index as usize].insert(begin.index);
            let key = (
                begin.index.min(end.index),
                begin.index.max(end.index),
                cause,
            );
            if self.seen_edges.insert(key) {
                self.edges.push(ConflictEdge {
                    a: begin,
                    b: end,
                    cause,
                });
            }
        }
        match priority {
            Priority::Left => {
                self.successors[begin.index as usize].insert(end.index);
            }
            Priority::Right => {
                self.successors[end.index as usize].insert(begin.index);
            }
            Priority::Undefined => {}
        }
    }

    // ── Implicit conflicts ──────────────────────────────────────────────

    fn implicit_conflicts(&mut self) {
        for &method in &self.map.used_methods {
            let users = &self.map.transactions_by_method[method.index as usize];
            for (i, &t1) in users.iter().enumerate() {
                for &t2 in &users[i + 1..] {
                    if self.transactions_exclusive(t1, t2) {
                        continue;
                    }
                    if self.calls_nonexclusive(t1, t2, method) {
                        continue;
                    }
                    self.add_edge(
                        t1,
                        t2,
                        Priority::Undefined,
                        true,
                        ConflictCause::SharedMethod(method),
                    );
                }
            }
        }
    }

    // ── Explicit relations ──────────────────────────────────────────────

    fn transactions_for(&self, caller: Caller) -> Vec<TransactionId> {
        match caller {
            Caller::Transaction(t) => vec![t],
            Caller::Method(m) => self.map.transactions_by_method[m.index as usize].clone(),
        }
    }

    fn explicit_relations(&mut self) {
        for relation in &self.design.relations {
            if !relation.conflict {
                // Relation added with schedule_before: check against
                // definition order, the deterministic tiebreaker.
                let start_order = self.design.body(relation.start).def_order;
                let end_order = self.design.body(relation.end).def_order;
                if end_order < start_order {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            codes::PRIORITY_AGAINST_DEF_ORDER,
                            format!(
                                "'{}' scheduled before '{}', but defined afterwards",
                                self.design.body(relation.start).name,
                                self.design.body(relation.end).name
                            ),
                        )
                        .at(relation.loc),
                    );
                }
            }
            for trans_start in self.transactions_for(relation.start) {
                for trans_end in self.transactions_for(relation.end) {
                    let conflict = relation.conflict
                        && !self.transactions_exclusive(trans_start, trans_end);
                    self.add_edge(
                        trans_start,
                        trans_end,
                        relation.priority,
                        conflict,
                        ConflictCause::Declared,
                    );
                }
            }
        }
    }

    // ── Priority order (Kahn, definition-order tiebreak) ────────────────

    fn priority_order(&mut self) -> Vec<usize> {
        let n = self.design.transactions.len();
        let mut in_degree = vec![0usize; n];
        for succs in &self.successors {
            for &s in succs {
                in_degree[s as usize] += 1;
            }
        }

        let def_order: Vec<u32> = self
            .design
            .transactions
            .iter()
            .map(|b| b.def_order)
            .collect();

        let mut ready: Vec<u32> = (0..n as u32).filter(|&i| in_degree[i as usize] == 0).collect();
        let mut porder = vec![usize::MAX; n];
        let mut rank = 0;

        while !ready.is_empty() {
            // Deterministic tiebreak: earliest definition first.
            let pos = ready
                .iter()
                .enumerate()
                .min_by_key(|(_, &i)| def_order[i as usize])
                .map(|(p, _)| p)
                .unwrap();
            let node = ready.swap_remove(pos);
            porder[node as usize] = rank;
            rank += 1;
            for &next in &self.successors[node as usize] {
                in_degree[next as usize] -= 1;
                if in_degree[next as usize] == 0 {
                    ready.push(next);
                }
            }
        }

        if rank < n {
            let stuck: Vec<usize> = (0..n).filter(|&i| porder[i] == usize::MAX).collect();
            let names: Vec<&str> = stuck
                .iter()
                .map(|&i| self.design.transactions[i].name.as_str())
                .collect();
            self.diagnostics.push(
                Diagnostic::error(
                    codes::PRIORITY_CYCLE,
                    format!(
                        "cycle in priority declarations involving: {}",
                        names.join(", ")
                    ),
                )
                .at(self.design.transactions[stuck[0]].loc),
            );
            // Leave the stuck transactions in definition order behind the
            // sorted ones so later passes stay index-safe.
            let mut remaining: Vec<usize> =
                (0..n).filter(|&i| porder[i] == usize::MAX).collect();
            remaining.sort_by_key(|&i| def_order[i]);
            for i in remaining {
                porder[i] = rank;
                rank += 1;
            }
        }

        porder
    }

    // ── Tiebreak warnings ───────────────────────────────────────────────

    fn tiebreak_warnings(&mut self, porder: &[usize]) {
        let mut reported = HashSet::new();
        let mut warnings = Vec::new();
        for edge in &self.edges {
            let (a, b) = (edge.a.index, edge.b.index);
            let ordered = self.successors[a as usize].contains(&b)
                || self.successors[b as usize].contains(&a);
            if ordered || !reported.insert((a.min(b), a.max(b))) {
                continue;
            }
            let (first, second) = if porder[a as usize] < porder[b as usize] {
                (edge.a, edge.b)
            } else {
                (edge.b, edge.a)
            };
            warnings.push(
                Diagnostic::warning(
                    codes::NO_PRIORITY_TIEBREAK,
                    format!(
                        "transactions '{}' and '{}' conflict without a declared priority; \
                         '{}' wins by definition order",
                        self.design.transaction(edge.a).name,
                        self.design.transaction(edge.b).name,
                        self.design.transaction(first).name,
                    ),
                )
                .with_note(
                    self.design.transaction(second).loc,
                    "lower-priority transaction here",
                ),
            );
        }
        self.diagnostics.extend(warnings);
    }

    // ── Connected components ────────────────────────────────────────────

    fn connected_components(&self, porder: &[usize]) -> Vec<Vec<TransactionId>> {
        let n = self.design.transactions.len();
        let ctx = self.design.ctx;
        let mut visited = vec![false; n];
        let mut components = Vec::new();

        for start in 0..n as u32 {
            if visited[start as usize] {
                continue;
            }
            let mut stack = vec![start];
            let mut members = Vec::new();
            visited[start as usize] = true;
            while let Some(i) = stack.pop() {
                members.push(i);
                for &j in &self.adjacency[i as usize] {
                    if !std::mem::replace(&mut visited[j as usize], true) {
                        stack.push(j);
                    }
                }
            }
            members.sort_by_key(|&i| porder[i as usize]);
            components.push(
                members
                    .into_iter()
                    .map(|index| TransactionId { ctx, index })
                    .collect(),
            );
        }
        components
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
