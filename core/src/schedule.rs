// schedule.rs — Grant synthesis for transaction arbitration
//
// Emits, per transaction, a grant net such that granted transactions are
// requested and effectively ready, and no two conflicting grants coexist.
// Each connected component of the conflict graph is scheduled
// independently; transactions in different components never gate each
// other.
//
// Two generators are available. The eager deterministic arbiter walks the
// component in priority order and gates every transaction by the absence
// of earlier conflicting grants; non-conflicting transactions start
// concurrently. The round-robin arbiter grants at most one transaction
// per component per cycle from a rotating pointer held in emitted
// registers; it trades parallelism for starvation freedom.
//
// Preconditions: `map` and `conflicts` were built without errors.
// Postconditions: every transaction has request, runnable and grant nets.
// Failure modes: none — structural problems were rejected earlier.
// Side effects: appends gating nets (and, for round-robin, registers) to
//               `table`.

use crate::conflict::ConflictGraph;
use crate::elab::Design;
use crate::graph::MethodMap;
use crate::netlist::{NetId, NetTable, Register};
use crate::pass::StageCert;

// ── Public types ────────────────────────────────────────────────────────────

/// Which arbiter to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// Greedy priority cascade; maximal progress within a component.
    #[default]
    EagerDeterministic,
    /// One grant per component per cycle, rotating for fairness.
    RoundRobin,
}

/// The synthesized schedule: per-transaction nets, indexed by transaction
/// index, plus any registers the arbiter needs.
#[derive(Debug)]
pub struct Schedule {
    pub kind: SchedulerKind,
    pub requests: Vec<NetId>,
    pub runnable: Vec<NetId>,
    pub grants: Vec<NetId>,
    pub registers: Vec<Register>,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Synthesize grant logic for every transaction.
pub fn synthesize(
    design: &Design,
    map: &MethodMap,
    conflicts: &ConflictGraph,
    kind: SchedulerKind,
    table: &mut NetTable,
) -> Schedule {
    let n = design.transactions.len();
    let mut requests = Vec::with_capacity(n);
    let mut runnable = Vec::with_capacity(n);
    for (i, body) in design.transactions.iter().enumerate() {
        let request = body.local_ready.unwrap_or_else(|| table.false_());
        let eff = map.transaction_ready[i];
        requests.push(request);
        runnable.push(table.and(request, eff));
    }

    let mut grants = vec![table.false_(); n];
    let mut registers = Vec::new();

    for (cc_index, cc) in conflicts.components.iter().enumerate() {
        match kind {
            SchedulerKind::EagerDeterministic => {
                eager_component(conflicts, cc, &runnable, &mut grants, table);
            }
            SchedulerKind::RoundRobin => {
                round_robin_component(
                    cc_index,
                    cc,
                    &runnable,
                    &mut grants,
                    &mut registers,
                    table,
                );
            }
        }
    }

    Schedule {
        kind,
        requests,
        runnable,
        grants,
        registers,
    }
}

// ── Eager deterministic arbiter ─────────────────────────────────────────────

/// `grant_t = runnable_t ∧ AND over earlier conflicting t' of ¬grant_{t'}`.
/// The component is already sorted by priority rank, so the cascade
/// respects declared priorities with definition order as the tiebreak.
fn eager_component(
    conflicts: &ConflictGraph,
    cc: &[crate::id::TransactionId],
    runnable: &[NetId],
    grants: &mut [NetId],
    table: &mut NetTable,
) {
    for (k, &t) in cc.iter().enumerate() {
        let mut blockers = Vec::new();
        for &earlier in &cc[..k] {
            if conflicts.conflicts(t, earlier) {
                blockers.push(grants[earlier.index as usize]);
            }
        }
        let blocked = table.or_any(&blockers);
        let noconflict = table.not(blocked);
        grants[t.index as usize] = table.and(runnable[t.index as usize], noconflict);
    }
}

// ── Round-robin arbiter ─────────────────────────────────────────────────────

/// At most one grant per component per cycle. A one-hot pointer register
/// marks the highest-priority slot; the first requesting transaction at or
/// after the pointer wins, and the pointer then moves past the winner.
fn round_robin_component(
    cc_index: usize,
    cc: &[crate::id::TransactionId],
    runnable: &[NetId],
    grants: &mut [NetId],
    registers: &mut Vec<Register>,
    table: &mut NetTable,
) {
    let n = cc.len();
    if n == 1 {
        let t = cc[0];
        grants[t.index as usize] = runnable[t.index as usize];
        return;
    }

    let ptr: Vec<NetId> = (0..n)
        .map(|i| table.var(format!("rr{cc_index}.ptr{i}")))
        .collect();
    let reqs: Vec<NetId> = cc.iter().map(|&t| runnable[t.index as usize]).collect();

    let mut cc_grants = Vec::with_capacity(n);
    for k in 0..n {
        let mut terms = Vec::with_capacity(n);
        for s in 0..n {
            let mut term = table.and(ptr[s], reqs[k]);
            let mut j = s;
            while j != k {
                let not_req = table.not(reqs[j]);
                term = table.and(term, not_req);
                j = (j + 1) % n;
            }
            terms.push(term);
        }
        let grant = table.or_any(&terms);
        cc_grants.push(grant);
        grants[cc[k].index as usize] = grant;
    }

    let any_grant = table.or_any(&cc_grants);
    for i in 0..n {
        // After a grant the pointer points one past the winner.
        let prev = cc_grants[(i + n - 1) % n];
        let next = table.mux(any_grant, prev, ptr[i]);
        registers.push(Register {
            name: format!("rr{cc_index}.ptr{i}"),
            var: table.as_var(ptr[i]).expect("pointer is a var"),
            init: i == 0,
            next,
        });
    }
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for the scheduler postconditions.
#[derive(Debug, Clone)]
pub struct ScheduleCert {
    /// S1: every transaction has request, runnable and grant nets.
    pub s1_all_transactions_granted: bool,
    /// S2: every conflict edge is gated — the lower-priority grant
    /// structurally depends on the higher-priority one (eager), or the
    /// component owns arbiter state (round-robin).
    pub s2_conflict_gating: bool,
}

impl StageCert for ScheduleCert {
    fn all_pass(&self) -> bool {
        self.s1_all_transactions_granted && self.s2_conflict_gating
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("S1_all_transactions_granted", self.s1_all_transactions_granted),
            ("S2_conflict_gating", self.s2_conflict_gating),
        ]
    }
}

/// Verify schedule postconditions.
pub fn verify_schedule(
    schedule: &Schedule,
    conflicts: &ConflictGraph,
    table: &NetTable,
) -> ScheduleCert {
    let n = conflicts.porder.len();
    let s1 = schedule.grants.len() == n
        && schedule.runnable.len() == n
        && schedule.requests.len() == n;

    let is_const = |g: NetId| matches!(table.node(g), crate::netlist::NetNode::Const(_));
    let s2 = match schedule.kind {
        SchedulerKind::EagerDeterministic => conflicts.edges.iter().all(|edge| {
            let (hi, lo) = if conflicts.porder[edge.a.index as usize]
                < conflicts.porder[edge.b.index as usize]
            {
                (edge.a, edge.b)
            } else {
                (edge.b, edge.a)
            };
            let hi_grant = schedule.grants[hi.index as usize];
            let lo_grant = schedule.grants[lo.index as usize];
            // A constant grant folded away its gating; vacuously safe.
            is_const(hi_grant) || is_const(lo_grant) || table.depends_on(lo_grant, hi_grant)
        }),
        SchedulerKind::RoundRobin => {
            let expected: usize = conflicts
                .components
                .iter()
                .map(|cc| if cc.len() > 1 { cc.len() } else { 0 })
                .sum();
            schedule.registers.len() == expected
        }
    };

    ScheduleCert {
        s1_all_transactions_granted: s1,
        s2_conflict_gating: s2,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
