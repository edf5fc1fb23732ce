// lower.rs — Lowering emitter: gating, muxes, fan-out, named signals
//
// Consumes grants, the method map and the resolver's caller classification
// to produce the final netlist fragment: per-transaction request/runnable/
// grant/locked signals, per-method ready/called signals, argument muxes
// driving each method's input port, output-port drives, and per-call-site
// activity signals that gate result latching on the caller side.
//
// Preconditions: upstream passes ran without error-level diagnostics.
// Postconditions: `LowerResult` carries the complete netlist, the signal
//   interface for hosts and profilers, and Cert evidence for the L1-L4
//   obligations.
// Failure modes: obligation violations surface through the cert; the
//   pipeline turns a failed cert into an error diagnostic.
// Side effects: consumes the expression table into the netlist.

use std::collections::HashMap;

use crate::conflict::ConflictGraph;
use crate::diag::Diagnostic;
use crate::elab::Design;
use crate::graph::MethodMap;
use crate::id::{Caller, MethodId, TransactionId};
use crate::netlist::{Binding, NetId, NetTable, Netlist, Signal, Wire, WireBinding};
use crate::pass::StageCert;
use crate::registry::Reducer;
use crate::resolve::{MergeKind, ResolvedDesign};
use crate::schedule::Schedule;

// ── Interface types ─────────────────────────────────────────────────────────

/// Emitted signal names for one transaction.
#[derive(Debug, Clone)]
pub struct TransactionSignals {
    pub name: String,
    pub request: String,
    pub grant: String,
    pub runnable: String,
    /// `request ∧ ¬grant` — the transaction wanted to fire but lost.
    pub locked: String,
}

/// One transaction that can reach a method, with the signal telling
/// whether the call path is live this cycle.
#[derive(Debug, Clone)]
pub struct MethodCallerSignal {
    pub transaction: String,
    pub active: String,
}

/// Emitted signal names for one method.
#[derive(Debug, Clone)]
pub struct MethodSignals {
    pub name: String,
    pub ready: String,
    pub called: String,
    pub callers: Vec<MethodCallerSignal>,
}

/// The named-signal map of an emitted design, indexed like the design's
/// transaction and method tables. Consumed by hosts and by the profile
/// sampler.
#[derive(Debug, Clone, Default)]
pub struct Interface {
    pub transactions: Vec<TransactionSignals>,
    pub methods: Vec<MethodSignals>,
}

/// Result of lowering.
#[derive(Debug)]
pub struct LowerResult {
    pub netlist: Netlist,
    pub interface: Interface,
    pub cert: LowerCert,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for the lowering obligations.
#[derive(Debug, Clone)]
pub struct LowerCert {
    /// L1: every called method's input port is fully driven.
    pub l1_inputs_driven: bool,
    /// L2: the signal interface is complete for every transaction and
    /// method.
    pub l2_signals_complete: bool,
    /// L3: for every exclusive method, any two transactions that reach it
    /// are mutually excluded — by the conflict graph or by a structural
    /// witness — so at most one call-site selector can be live.
    pub l3_selectors_one_hot: bool,
    /// L4: every recorded call site has an activity signal.
    pub l4_sites_covered: bool,
}

impl StageCert for LowerCert {
    fn all_pass(&self) -> bool {
        self.l1_inputs_driven
            && self.l2_signals_complete
            && self.l3_selectors_one_hot
            && self.l4_sites_covered
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("L1_inputs_driven", self.l1_inputs_driven),
            ("L2_signals_complete", self.l2_signals_complete),
            ("L3_selectors_one_hot", self.l3_selectors_one_hot),
            ("L4_sites_covered", self.l4_sites_covered),
        ]
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Lower the scheduled design into its netlist fragment and verify the
/// L1-L4 obligations.
pub fn lower_and_verify(
    design: &Design,
    map: &MethodMap,
    conflicts: &ConflictGraph,
    resolved: &ResolvedDesign,
    schedule: &Schedule,
    table: NetTable,
) -> LowerResult {
    let mut engine = LowerEngine {
        design,
        map,
        resolved,
        schedule,
        table,
        signals: Vec::new(),
        wires: Vec::new(),
        bindings: Vec::new(),
        interface: Interface::default(),
        caller_run_cache: HashMap::new(),
        site_signal_count: 0,
    };

    engine.emit_transaction_signals();
    engine.emit_method_signals();
    engine.drive_method_ports();
    engine.emit_site_activity();

    let cert = engine.verify_obligations(conflicts);

    let netlist = Netlist {
        table: engine.table,
        signals: engine.signals,
        wires: engine.wires,
        bindings: engine.bindings,
        registers: schedule.registers.clone(),
    };

    LowerResult {
        netlist,
        interface: engine.interface,
        cert,
        diagnostics: Vec::new(),
    }
}

// ── Lowering engine ─────────────────────────────────────────────────────────

struct LowerEngine<'a> {
    design: &'a Design,
    map: &'a MethodMap,
    resolved: &'a ResolvedDesign,
    schedule: &'a Schedule,
    table: NetTable,
    signals: Vec<Signal>,
    wires: Vec<WireBinding>,
    bindings: Vec<Binding>,
    interface: Interface,
    caller_run_cache: HashMap<Caller, NetId>,
    site_signal_count: usize,
}

impl<'a> LowerEngine<'a> {
    fn signal(&mut self, name: String, net: NetId) -> String {
        self.signals.push(Signal {
            name: name.clone(),
            net,
        });
        name
    }

    /// Emission names, with duplicates disambiguated by `$k` suffixes so
    /// the signal namespace stays injective.
    fn emission_names(bodies: impl Iterator<Item = &'a crate::body::Body>) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        bodies
            .map(|b| {
                let n = counts.entry(b.name.clone()).or_insert(0);
                *n += 1;
                if *n == 1 {
                    b.name.clone()
                } else {
                    format!("{}${}", b.name, n)
                }
            })
            .collect()
    }

    fn transaction_names(&self) -> Vec<String> {
        Self::emission_names(self.design.transactions.iter())
    }

    fn method_names(&self) -> Vec<String> {
        Self::emission_names(self.design.methods.iter().map(|s| &s.body))
    }

    // ── Transaction signals ─────────────────────────────────────────────

    fn emit_transaction_signals(&mut self) {
        let names = self.transaction_names();
        for (i, name) in names.into_iter().enumerate() {
            let request = self.schedule.requests[i];
            let runnable = self.schedule.runnable[i];
            let grant = self.schedule.grants[i];
            let not_grant = self.table.not(grant);
            let locked = self.table.and(request, not_grant);
            let sigs = TransactionSignals {
                request: self.signal(format!("{name}_request"), request),
                runnable: self.signal(format!("{name}_runnable"), runnable),
                grant: self.signal(format!("{name}_grant"), grant),
                locked: self.signal(format!("{name}_locked"), locked),
                name,
            };
            self.interface.transactions.push(sigs);
        }
    }

    // ── Method signals ──────────────────────────────────────────────────

    fn emit_method_signals(&mut self) {
        let t_names = self.transaction_names();
        let m_names = self.method_names();
        for (i, name) in m_names.into_iter().enumerate() {
            let m = MethodId {
                ctx: self.design.ctx,
                index: i as u32,
            };
            let ready = self.map.method_ready[i];
            let mut callers = Vec::new();
            let mut call_terms = Vec::new();
            for &t in &self.map.transactions_by_method[i] {
                let enable = self.map.enable_by_call[&(t, m)];
                let grant = self.schedule.grants[t.index as usize];
                let active = self.table.and(grant, enable);
                call_terms.push(active);
                let t_name = &t_names[t.index as usize];
                callers.push(MethodCallerSignal {
                    transaction: t_name.clone(),
                    active: self.signal(format!("{t_name}->{name}_active"), active),
                });
            }
            let called = self.table.or_any(&call_terms);
            let sigs = MethodSignals {
                ready: self.signal(format!("{name}_ready"), ready),
                called: self.signal(format!("{name}_called"), called),
                callers,
                name,
            };
            self.interface.methods.push(sigs);
        }
    }

    // ── Caller activity ─────────────────────────────────────────────────

    /// The run predicate of a caller: a transaction runs when granted; a
    /// method runs when any transaction above it is granted.
    fn caller_run(&mut self, caller: Caller) -> NetId {
        if let Some(&cached) = self.caller_run_cache.get(&caller) {
            return cached;
        }
        let run = match caller {
            Caller::Transaction(t) => self.schedule.grants[t.index as usize],
            Caller::Method(m) => {
                let grants: Vec<NetId> = self.map.transactions_by_method[m.index as usize]
                    .iter()
                    .map(|t| self.schedule.grants[t.index as usize])
                    .collect();
                self.table.or_any(&grants)
            }
        };
        self.caller_run_cache.insert(caller, run);
        run
    }

    // ── Input and output port drives ────────────────────────────────────

    fn drive_method_ports(&mut self) {
        let m_names = self.method_names();
        for (i, rm) in self.resolved.methods.iter().enumerate() {
            let body = &self.design.methods[i].body;
            let name = &m_names[i];

            // Expose the ports as named wires for the host.
            self.wires.push(WireBinding {
                name: format!("{name}_data_in"),
                wire: body.data_in.clone(),
            });
            self.wires.push(WireBinding {
                name: format!("{name}_data_out"),
                wire: body.data_out.clone(),
            });

            // Output port: drive from the body's output expression.
            if let Some(out_expr) = &body.out_expr {
                for (&port, &bit) in body.data_out.bits.iter().zip(&out_expr.bits) {
                    let var = self.table.as_var(port).expect("port is a var");
                    self.bindings.push(Binding { var, net: bit });
                }
            }

            // Input port: merge caller arguments per the resolver's plan.
            if body.layout_in.is_empty() {
                continue;
            }
            let merged = match rm.kind {
                MergeKind::Unused => continue,
                MergeKind::Direct => rm.callers[0].args.clone(),
                MergeKind::CallerSelect => {
                    let mut acc = self.table.wire_zero(&body.layout_in);
                    for rc in &rm.callers {
                        let run = self.caller_run(rc.caller);
                        let active = self.table.and(run, rc.enable);
                        acc = self.table.wire_mux(active, &rc.args, &acc);
                    }
                    acc
                }
                MergeKind::Reduce => {
                    let args: Vec<Wire> = rm.callers.iter().map(|rc| rc.args.clone()).collect();
                    let actives: Vec<NetId> = rm
                        .callers
                        .iter()
                        .map(|rc| {
                            let run = self.caller_run(rc.caller);
                            self.table.and(run, rc.enable)
                        })
                        .collect();
                    match &self.design.methods[i].reducer {
                        Some(Reducer::Custom(f)) => f(&mut self.table, &args, &actives),
                        Some(Reducer::Or) | None => {
                            let mut acc = self.table.wire_zero(&body.layout_in);
                            for (arg, &active) in args.iter().zip(&actives) {
                                let gated = self.table.wire_gate(active, arg);
                                acc = self.table.wire_or(&acc, &gated);
                            }
                            acc
                        }
                    }
                }
            };
            for (&port, &bit) in body.data_in.bits.iter().zip(&merged.bits) {
                let var = self.table.as_var(port).expect("port is a var");
                self.bindings.push(Binding { var, net: bit });
            }
        }
    }

    // ── Per-site activity ───────────────────────────────────────────────

    /// One signal per call site: the caller is running and the site enable
    /// holds. Results latch into the caller only under this signal.
    fn emit_site_activity(&mut self) {
        let m_names = self.method_names();
        let all_bodies: Vec<Caller> = self
            .design
            .method_ids()
            .map(Caller::Method)
            .chain(self.design.transaction_ids().map(Caller::Transaction))
            .collect();
        let t_names = self.transaction_names();
        for owner in all_bodies {
            let owner_name = match owner {
                Caller::Method(m) => m_names[m.index as usize].clone(),
                Caller::Transaction(t) => t_names[t.index as usize].clone(),
            };
            let run = self.caller_run(owner);
            let sites: Vec<(usize, NetId, MethodId)> = self
                .design
                .body(owner)
                .call_sites
                .iter()
                .enumerate()
                .map(|(k, s)| (k, s.enable, s.callee))
                .collect();
            for (k, enable, callee) in sites {
                let active = self.table.and(run, enable);
                let callee_name = &m_names[callee.index as usize];
                self.signal(
                    format!("{owner_name}.{callee_name}#{k}_active"),
                    active,
                );
                self.site_signal_count += 1;
            }
        }
    }

    // ── Obligations ─────────────────────────────────────────────────────

    fn verify_obligations(&self, conflicts: &ConflictGraph) -> LowerCert {
        let l1 = self.verify_l1_inputs_driven();
        let l2 = self.verify_l2_signals_complete();
        let l3 = self.verify_l3_one_hot(conflicts);
        let l4 = self.verify_l4_sites_covered();
        LowerCert {
            l1_inputs_driven: l1,
            l2_signals_complete: l2,
            l3_selectors_one_hot: l3,
            l4_sites_covered: l4,
        }
    }

    /// L1: every called method with a nonempty input layout has one
    /// binding per input bit; every defined method drives its output port.
    fn verify_l1_inputs_driven(&self) -> bool {
        let mut driven: HashMap<crate::netlist::VarId, usize> = HashMap::new();
        for b in &self.bindings {
            *driven.entry(b.var).or_insert(0) += 1;
        }
        for (i, rm) in self.resolved.methods.iter().enumerate() {
            let body = &self.design.methods[i].body;
            let in_expected = rm.kind != MergeKind::Unused;
            for &bit in &body.data_in.bits {
                let var = match self.table.as_var(bit) {
                    Some(v) => v,
                    None => return false,
                };
                let count = driven.get(&var).copied().unwrap_or(0);
                if in_expected && count != 1 {
                    return false;
                }
                if !in_expected && count != 0 {
                    return false;
                }
            }
            if body.defined {
                for &bit in &body.data_out.bits {
                    let var = match self.table.as_var(bit) {
                        Some(v) => v,
                        None => return false,
                    };
                    if driven.get(&var).copied().unwrap_or(0) != 1 {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// L2: the interface tables are as long as the design tables and every
    /// named signal exists in the netlist signal list.
    fn verify_l2_signals_complete(&self) -> bool {
        if self.interface.transactions.len() != self.design.transactions.len()
            || self.interface.methods.len() != self.design.methods.len()
        {
            return false;
        }
        let have: std::collections::HashSet<&str> =
            self.signals.iter().map(|s| s.name.as_str()).collect();
        self.interface.transactions.iter().all(|t| {
            have.contains(t.request.as_str())
                && have.contains(t.runnable.as_str())
                && have.contains(t.grant.as_str())
                && have.contains(t.locked.as_str())
        }) && self.interface.methods.iter().all(|m| {
            have.contains(m.ready.as_str())
                && have.contains(m.called.as_str())
                && m.callers.iter().all(|c| have.contains(c.active.as_str()))
        })
    }

    /// L3: exclusive methods cannot see two live callers: any two
    /// transactions reaching one either conflict or carry an exclusion
    /// witness. Follows from conflict analysis; re-checked here.
    fn verify_l3_one_hot(&self, conflicts: &ConflictGraph) -> bool {
        for &m in &self.map.used_methods {
            if self.design.method(m).nonexclusive {
                continue;
            }
            let users = &self.map.transactions_by_method[m.index as usize];
            for (i, &t1) in users.iter().enumerate() {
                for &t2 in &users[i + 1..] {
                    if conflicts.conflicts(t1, t2) {
                        continue;
                    }
                    if self.transactions_exclusive(t1, t2) {
                        continue;
                    }
                    return false;
                }
            }
        }
        true
    }

    fn transactions_exclusive(&self, t1: TransactionId, t2: TransactionId) -> bool {
        let paths = |t: TransactionId| {
            let mut out = vec![&self.design.transaction(t).path];
            for &m in &self.map.methods_by_transaction[t.index as usize] {
                out.push(&self.design.method(m).path);
            }
            out
        };
        for p1 in paths(t1) {
            for p2 in paths(t2) {
                if p1.exclusive_with(p2) {
                    return true;
                }
            }
        }
        false
    }

    /// L4: one activity signal per recorded call site.
    fn verify_l4_sites_covered(&self) -> bool {
        let total: usize = self
            .design
            .methods
            .iter()
            .map(|s| s.body.call_sites.len())
            .chain(self.design.transactions.iter().map(|b| b.call_sites.len()))
            .sum();
        self.site_signal_count == total
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::MethodDef;
    use crate::conflict::build_conflicts;
    use crate::elab::ElabContext;
    use crate::graph::build_map;
    use crate::layout::{layout, Layout};
    use crate::netlist::Evaluator;
    use crate::registry::MethodParams;
    use crate::schedule::{synthesize, SchedulerKind};

    fn lower_design(mut ctx: ElabContext) -> LowerResult {
        let (design, mut table) = ctx.finalize().unwrap();
        let map_result = build_map(&design, &mut table);
        assert!(!map_result.has_errors(), "{:?}", map_result.diagnostics);
        let conflict_result = build_conflicts(&design, &map_result.map);
        assert!(
            !conflict_result.has_errors(),
            "{:?}",
            conflict_result.diagnostics
        );
        let resolve_result = crate::resolve::resolve(&design, &map_result.map, &mut table);
        assert!(
            !resolve_result.has_errors(),
            "{:?}",
            resolve_result.diagnostics
        );
        let schedule = synthesize(
            &design,
            &map_result.map,
            &conflict_result.graph,
            SchedulerKind::EagerDeterministic,
            &mut table,
        );
        let result = lower_and_verify(
            &design,
            &map_result.map,
            &conflict_result.graph,
            &resolve_result.resolved,
            &schedule,
            table,
        );
        assert!(
            result.cert.all_pass(),
            "lower cert failed: {:?}",
            result.cert.obligations()
        );
        result
    }

    // ── Exclusive argument mux ──────────────────────────────────────────

    #[test]
    fn winning_caller_drives_the_input_port() {
        let mut ctx = ElabContext::new();
        let put = ctx
            .add_method("put", layout([("d", 2)]), Layout::empty(), MethodParams::default())
            .unwrap();
        ctx.def_method(put, |ctx, _| {
            let ready = ctx.nets().true_();
            let out = ctx.nets().wire_zero(&Layout::empty());
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();

        let mut reqs = Vec::new();
        for (name, bits) in [("t1", [true, false]), ("t2", [false, true])] {
            let t = ctx.add_transaction(name).unwrap();
            let req = ctx.input(format!("{name}_req"));
            reqs.push(req);
            let b0 = ctx.nets().const_(bits[0]);
            let b1 = ctx.nets().const_(bits[1]);
            let data = Wire {
                layout: layout([("d", 2)]),
                bits: vec![b0, b1],
            };
            ctx.def_transaction(t, req, |ctx| ctx.call(put, data).map(|_| ()))
                .unwrap();
        }

        let result = lower_design(ctx);
        let data_in = result.netlist.wire("put_data_in").unwrap().clone();
        let mut ev = Evaluator::new(&result.netlist);

        // t1 wins the tie: port carries t1's constant.
        ev.set_net(reqs[0], true);
        ev.set_net(reqs[1], true);
        assert_eq!(ev.eval_wire(&data_in), vec![true, false]);

        // t1 idle: t2 drives.
        ev.set_net(reqs[0], false);
        assert_eq!(ev.eval_wire(&data_in), vec![false, true]);
    }

    // ── Nonexclusive fan-out ────────────────────────────────────────────

    #[test]
    fn nonexclusive_callers_share_the_output() {
        let mut ctx = ElabContext::new();
        let value = ctx.input("value");
        let peek = ctx
            .add_method(
                "peek",
                Layout::empty(),
                layout([("v", 1)]),
                MethodParams {
                    nonexclusive: true,
                    ..Default::default()
                },
            )
            .unwrap();
        ctx.def_method(peek, |ctx, _| {
            let ready = ctx.nets().true_();
            let out = Wire {
                layout: layout([("v", 1)]),
                bits: vec![value],
            };
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();

        let mut reqs = Vec::new();
        let mut results = Vec::new();
        for name in ["ta", "tb"] {
            let t = ctx.add_transaction(name).unwrap();
            let req = ctx.input(format!("{name}_req"));
            reqs.push(req);
            let mut seen = None;
            ctx.def_transaction(t, req, |ctx| {
                let args = ctx.nets().wire_zero(&Layout::empty());
                seen = Some(ctx.call(peek, args)?);
                Ok(())
            })
            .unwrap();
            results.push(seen.unwrap());
        }

        let result = lower_design(ctx);
        let mut ev = Evaluator::new(&result.netlist);
        ev.set_net(reqs[0], true);
        ev.set_net(reqs[1], true);
        ev.set_net(value, true);

        // Both grants can coexist.
        assert!(ev.signal("ta_grant"));
        assert!(ev.signal("tb_grant"));
        // Both observe the same output.
        assert_eq!(ev.eval_wire(&results[0]), vec![true]);
        assert_eq!(ev.eval_wire(&results[1]), vec![true]);
    }

    #[test]
    fn or_reducer_merges_live_caller_arguments() {
        let mut ctx = ElabContext::new();
        let mark = ctx
            .add_method(
                "mark",
                layout([("flag", 1)]),
                Layout::empty(),
                MethodParams {
                    nonexclusive: true,
                    ..Default::default()
                },
            )
            .unwrap();
        ctx.def_method(mark, |ctx, _| {
            let ready = ctx.nets().true_();
            let out = ctx.nets().wire_zero(&Layout::empty());
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();

        let mut reqs = Vec::new();
        for (name, bit) in [("ta", false), ("tb", true)] {
            let t = ctx.add_transaction(name).unwrap();
            let req = ctx.input(format!("{name}_req"));
            reqs.push(req);
            let b = ctx.nets().const_(bit);
            let data = Wire {
                layout: layout([("flag", 1)]),
                bits: vec![b],
            };
            ctx.def_transaction(t, req, |ctx| ctx.call(mark, data).map(|_| ()))
                .unwrap();
        }

        let result = lower_design(ctx);
        let data_in = result.netlist.wire("mark_data_in").unwrap().clone();
        let mut ev = Evaluator::new(&result.netlist);

        ev.set_net(reqs[0], true);
        ev.set_net(reqs[1], false);
        assert_eq!(ev.eval_wire(&data_in), vec![false], "only ta live");
        ev.set_net(reqs[1], true);
        assert_eq!(ev.eval_wire(&data_in), vec![true], "tb contributes a one");
    }

    // ── Method signals ──────────────────────────────────────────────────

    #[test]
    fn method_called_follows_the_granted_caller() {
        let mut ctx = ElabContext::new();
        let put = ctx
            .add_method("put", Layout::empty(), Layout::empty(), MethodParams::default())
            .unwrap();
        ctx.def_method(put, |ctx, _| {
            let ready = ctx.nets().true_();
            let out = ctx.nets().wire_zero(&Layout::empty());
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();
        let t = ctx.add_transaction("t").unwrap();
        let req = ctx.input("req");
        ctx.def_transaction(t, req, |ctx| {
            let args = ctx.nets().wire_zero(&Layout::empty());
            ctx.call(put, args).map(|_| ())
        })
        .unwrap();

        let result = lower_design(ctx);
        let mut ev = Evaluator::new(&result.netlist);
        ev.set_net(req, false);
        assert!(!ev.signal("put_called"));
        assert!(ev.signal("put_ready"));
        ev.set_net(req, true);
        assert!(ev.signal("put_called"));
        assert!(ev.signal("t->put_active"));
        assert!(ev.signal("t.put#0_active"));
    }

    #[test]
    fn locked_flags_a_losing_requester() {
        let mut ctx = ElabContext::new();
        let put = ctx
            .add_method("put", Layout::empty(), Layout::empty(), MethodParams::default())
            .unwrap();
        ctx.def_method(put, |ctx, _| {
            let ready = ctx.nets().true_();
            let out = ctx.nets().wire_zero(&Layout::empty());
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();
        let mut reqs = Vec::new();
        for name in ["t1", "t2"] {
            let t = ctx.add_transaction(name).unwrap();
            let req = ctx.input(format!("{name}_req"));
            reqs.push(req);
            ctx.def_transaction(t, req, |ctx| {
                let args = ctx.nets().wire_zero(&Layout::empty());
                ctx.call(put, args).map(|_| ())
            })
            .unwrap();
        }
        let result = lower_design(ctx);
        let mut ev = Evaluator::new(&result.netlist);
        ev.set_net(reqs[0], true);
        ev.set_net(reqs[1], true);
        assert!(ev.signal("t1_grant"));
        assert!(!ev.signal("t1_locked"));
        assert!(!ev.signal("t2_grant"));
        assert!(ev.signal("t2_locked"));
    }

    // ── Duplicate names ─────────────────────────────────────────────────

    #[test]
    fn duplicate_transaction_names_get_distinct_signals() {
        let mut ctx = ElabContext::new();
        let put = ctx
            .add_method("put", Layout::empty(), Layout::empty(), MethodParams::default())
            .unwrap();
        ctx.def_method(put, |ctx, _| {
            let ready = ctx.nets().true_();
            let out = ctx.nets().wire_zero(&Layout::empty());
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();
        for _ in 0..2 {
            let t = ctx.add_transaction("worker").unwrap();
            let req = ctx.input("req");
            ctx.def_transaction(t, req, |ctx| {
                let args = ctx.nets().wire_zero(&Layout::empty());
                ctx.call(put, args).map(|_| ())
            })
            .unwrap();
        }
        let result = lower_design(ctx);
        assert!(result.netlist.signal("worker_grant").is_some());
        assert!(result.netlist.signal("worker$2_grant").is_some());
    }
}
