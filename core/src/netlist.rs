// netlist.rs — Combinational expression DAG and emitted netlist fragment
//
// The abstract netlist handed to the host HDL emitter. Expressions are
// bit-level nodes {Const, Var, And, Or, Not, Mux, Eq}, hash-consed for
// sharing and deterministic structure; typed records travel as `Wire`
// bundles (a layout plus one net per bit). The emitted artifact collects
// named signals, named wire bindings, bindings for internally driven
// variables, and registers for host state.
//
// Preconditions: none (types and constructors only).
// Postconditions: node ids are stable under identical build sequences.
// Failure modes: none — malformed references are unrepresentable by ids
//                allocated from the same table.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::layout::Layout;

// ── Public types ────────────────────────────────────────────────────────────

/// Identifier of a node in the expression DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub u32);

/// Identifier of a variable (a named external input, an internally driven
/// signal, or the current value of a register).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// A single-bit expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetNode {
    Const(bool),
    Var(VarId),
    And(NetId, NetId),
    Or(NetId, NetId),
    Not(NetId),
    /// `sel ? a : b`
    Mux { sel: NetId, a: NetId, b: NetId },
    Eq(NetId, NetId),
}

/// A typed record value: one net per bit, in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    pub layout: Layout,
    pub bits: Vec<NetId>,
}

impl Wire {
    pub fn width(&self) -> u32 {
        self.bits.len() as u32
    }
}

// ── Expression table ────────────────────────────────────────────────────────

/// The hash-consed node table. All expressions of one elaboration context
/// live in a single table; identical subexpressions share a node.
#[derive(Debug, Default)]
pub struct NetTable {
    nodes: Vec<NetNode>,
    interner: HashMap<NetNode, NetId>,
    var_names: Vec<String>,
}

impl NetTable {
    pub fn new() -> NetTable {
        NetTable::default()
    }

    pub fn node(&self, id: NetId) -> NetNode {
        self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn var_count(&self) -> usize {
        self.var_names.len()
    }

    pub fn var_name(&self, var: VarId) -> &str {
        &self.var_names[var.0 as usize]
    }

    fn intern(&mut self, node: NetNode) -> NetId {
        if let Some(&id) = self.interner.get(&node) {
            return id;
        }
        let id = NetId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.interner.insert(node, id);
        id
    }

    // ── Constructors ────────────────────────────────────────────────────

    pub fn const_(&mut self, value: bool) -> NetId {
        self.intern(NetNode::Const(value))
    }

    pub fn true_(&mut self) -> NetId {
        self.const_(true)
    }

    pub fn false_(&mut self) -> NetId {
        self.const_(false)
    }

    /// Allocate a fresh named variable. Variables are never interned
    /// against each other: every call produces a distinct identity.
    pub fn var(&mut self, name: impl Into<String>) -> NetId {
        let var = VarId(self.var_names.len() as u32);
        self.var_names.push(name.into());
        let id = NetId(self.nodes.len() as u32);
        self.nodes.push(NetNode::Var(var));
        id
    }

    /// The variable behind a `Var` node, if it is one.
    pub fn as_var(&self, id: NetId) -> Option<VarId> {
        match self.node(id) {
            NetNode::Var(v) => Some(v),
            _ => None,
        }
    }

    fn const_value(&self, id: NetId) -> Option<bool> {
        match self.node(id) {
            NetNode::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn and(&mut self, a: NetId, b: NetId) -> NetId {
        match (self.const_value(a), self.const_value(b)) {
            (Some(false), _) | (_, Some(false)) => self.false_(),
            (Some(true), _) => b,
            (_, Some(true)) => a,
            _ if a == b => a,
            _ => {
                // Canonical operand order keeps and(a,b) == and(b,a)
                let (a, b) = if a <= b { (a, b) } else { (b, a) };
                self.intern(NetNode::And(a, b))
            }
        }
    }

    pub fn or(&mut self, a: NetId, b: NetId) -> NetId {
        match (self.const_value(a), self.const_value(b)) {
            (Some(true), _) | (_, Some(true)) => self.true_(),
            (Some(false), _) => b,
            (_, Some(false)) => a,
            _ if a == b => a,
            _ => {
                let (a, b) = if a <= b { (a, b) } else { (b, a) };
                self.intern(NetNode::Or(a, b))
            }
        }
    }

    pub fn not(&mut self, a: NetId) -> NetId {
        match self.node(a) {
            NetNode::Const(v) => self.const_(!v),
            NetNode::Not(inner) => inner,
            _ => self.intern(NetNode::Not(a)),
        }
    }

    pub fn mux(&mut self, sel: NetId, a: NetId, b: NetId) -> NetId {
        match self.const_value(sel) {
            Some(true) => a,
            Some(false) => b,
            None if a == b => a,
            None => self.intern(NetNode::Mux { sel, a, b }),
        }
    }

    pub fn eq(&mut self, a: NetId, b: NetId) -> NetId {
        if a == b {
            return self.true_();
        }
        if let (Some(x), Some(y)) = (self.const_value(a), self.const_value(b)) {
            return self.const_(x == y);
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.intern(NetNode::Eq(a, b))
    }

    /// Conjunction of all nets; the empty conjunction is true.
    pub fn and_all(&mut self, nets: &[NetId]) -> NetId {
        let mut acc = self.true_();
        for &n in nets {
            acc = self.and(acc, n);
        }
        acc
    }

    /// Disjunction of all nets; the empty disjunction is false.
    pub fn or_any(&mut self, nets: &[NetId]) -> NetId {
        let mut acc = self.false_();
        for &n in nets {
            acc = self.or(acc, n);
        }
        acc
    }

    // ── Wire constructors ───────────────────────────────────────────────

    /// A wire of fresh variables, one per bit, named `prefix.field[i]`.
    pub fn wire_var(&mut self, prefix: &str, layout: &Layout) -> Wire {
        let mut bits = Vec::with_capacity(layout.width() as usize);
        for field in &layout.fields {
            for i in 0..field.width {
                bits.push(self.var(format!("{}.{}[{}]", prefix, field.name, i)));
            }
        }
        Wire {
            layout: layout.clone(),
            bits,
        }
    }

    /// An all-zero wire of the given layout.
    pub fn wire_zero(&mut self, layout: &Layout) -> Wire {
        let zero = self.false_();
        Wire {
            layout: layout.clone(),
            bits: vec![zero; layout.width() as usize],
        }
    }

    /// Bitwise mux of two wires with identical layouts.
    pub fn wire_mux(&mut self, sel: NetId, a: &Wire, b: &Wire) -> Wire {
        debug_assert_eq!(a.layout, b.layout);
        let bits = a
            .bits
            .iter()
            .zip(&b.bits)
            .map(|(&x, &y)| self.mux(sel, x, y))
            .collect();
        Wire {
            layout: a.layout.clone(),
            bits,
        }
    }

    /// Bitwise OR of two wires with identical layouts.
    pub fn wire_or(&mut self, a: &Wire, b: &Wire) -> Wire {
        debug_assert_eq!(a.layout, b.layout);
        let bits = a
            .bits
            .iter()
            .zip(&b.bits)
            .map(|(&x, &y)| self.or(x, y))
            .collect();
        Wire {
            layout: a.layout.clone(),
            bits,
        }
    }

    /// Bitwise AND of a wire with a single gate bit.
    pub fn wire_gate(&mut self, gate: NetId, a: &Wire) -> Wire {
        let bits = a.bits.iter().map(|&x| self.and(gate, x)).collect();
        Wire {
            layout: a.layout.clone(),
            bits,
        }
    }

    /// Single-bit equality of two wires with identical layouts.
    pub fn wire_eq(&mut self, a: &Wire, b: &Wire) -> NetId {
        debug_assert_eq!(a.layout, b.layout);
        let mut acc = self.true_();
        for (&x, &y) in a.bits.iter().zip(&b.bits) {
            let e = self.eq(x, y);
            acc = self.and(acc, e);
        }
        acc
    }

    /// True iff `target` is reachable from `root` in the expression DAG.
    pub fn depends_on(&self, root: NetId, target: NetId) -> bool {
        let mut stack = vec![root];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if std::mem::replace(&mut seen[id.0 as usize], true) {
                continue;
            }
            match self.node(id) {
                NetNode::Const(_) | NetNode::Var(_) => {}
                NetNode::And(a, b) | NetNode::Or(a, b) | NetNode::Eq(a, b) => {
                    stack.push(a);
                    stack.push(b);
                }
                NetNode::Not(a) => stack.push(a),
                NetNode::Mux { sel, a, b } => {
                    stack.push(sel);
                    stack.push(a);
                    stack.push(b);
                }
            }
        }
        false
    }
}

// ── Emitted netlist ─────────────────────────────────────────────────────────

/// A named single-bit output of the elaboration.
#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub net: NetId,
}

/// A named record-valued output of the elaboration.
#[derive(Debug, Clone)]
pub struct WireBinding {
    pub name: String,
    pub wire: Wire,
}

/// A combinational drive for an internally generated variable (for example
/// a method's `data_in` bit, driven by the argument mux).
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub var: VarId,
    pub net: NetId,
}

/// A register for host state (used by the round-robin arbiter pointer).
/// `var` exposes the current value; `next` is latched at the clock edge.
#[derive(Debug, Clone)]
pub struct Register {
    pub name: String,
    pub var: VarId,
    pub init: bool,
    pub next: NetId,
}

/// The complete netlist fragment handed to the host HDL emitter.
#[derive(Debug, Default)]
pub struct Netlist {
    pub table: NetTable,
    pub signals: Vec<Signal>,
    pub wires: Vec<WireBinding>,
    pub bindings: Vec<Binding>,
    pub registers: Vec<Register>,
}

impl Netlist {
    /// Look up a named single-bit signal.
    pub fn signal(&self, name: &str) -> Option<NetId> {
        self.signals.iter().find(|s| s.name == name).map(|s| s.net)
    }

    /// Look up a named wire binding.
    pub fn wire(&self, name: &str) -> Option<&Wire> {
        self.wires.iter().find(|w| w.name == name).map(|w| &w.wire)
    }

    /// A canonical, line-oriented dump of the netlist. Stable across
    /// elaborations of the same design; used for determinism fingerprints.
    pub fn canonical_text(&self) -> String {
        let mut out = String::new();
        use std::fmt::Write;
        for (i, node) in self.table.nodes.iter().enumerate() {
            match node {
                NetNode::Const(v) => {
                    let _ = writeln!(out, "n{i} = const {}", u8::from(*v));
                }
                NetNode::Var(v) => {
                    let _ = writeln!(out, "n{i} = var {}", self.table.var_name(*v));
                }
                NetNode::And(a, b) => {
                    let _ = writeln!(out, "n{i} = and n{} n{}", a.0, b.0);
                }
                NetNode::Or(a, b) => {
                    let _ = writeln!(out, "n{i} = or n{} n{}", a.0, b.0);
                }
                NetNode::Not(a) => {
                    let _ = writeln!(out, "n{i} = not n{}", a.0);
                }
                NetNode::Mux { sel, a, b } => {
                    let _ = writeln!(out, "n{i} = mux n{} n{} n{}", sel.0, a.0, b.0);
                }
                NetNode::Eq(a, b) => {
                    let _ = writeln!(out, "n{i} = eq n{} n{}", a.0, b.0);
                }
            }
        }
        for s in &self.signals {
            let _ = writeln!(out, "signal {} = n{}", s.name, s.net.0);
        }
        for w in &self.wires {
            let bits: Vec<String> = w.wire.bits.iter().map(|b| format!("n{}", b.0)).collect();
            let _ = writeln!(out, "wire {} = [{}]", w.name, bits.join(" "));
        }
        for b in &self.bindings {
            let _ = writeln!(
                out,
                "drive {} = n{}",
                self.table.var_name(b.var),
                b.net.0
            );
        }
        for r in &self.registers {
            let _ = writeln!(
                out,
                "reg {} init {} next n{}",
                r.name,
                u8::from(r.init),
                r.next.0
            );
        }
        out
    }
}

impl fmt::Display for Netlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Netlist ({} nodes, {} signals, {} registers)",
            self.table.len(),
            self.signals.len(),
            self.registers.len()
        )?;
        for s in &self.signals {
            writeln!(f, "  signal {} = n{}", s.name, s.net.0)?;
        }
        Ok(())
    }
}

// ── Reference evaluator ─────────────────────────────────────────────────────

/// Cycle-accurate reference evaluator for an emitted netlist.
///
/// Variables resolve in order: externally set inputs, then internal
/// bindings, then register state. Unset external inputs read as zero.
/// `step` latches all registers from their `next` expressions, emulating
/// one clock edge.
pub struct Evaluator<'a> {
    netlist: &'a Netlist,
    inputs: HashMap<VarId, bool>,
    bindings: HashMap<VarId, NetId>,
    reg_by_var: HashMap<VarId, usize>,
    reg_state: Vec<bool>,
    cache: HashMap<NetId, bool>,
}

impl<'a> Evaluator<'a> {
    pub fn new(netlist: &'a Netlist) -> Evaluator<'a> {
        let bindings = netlist.bindings.iter().map(|b| (b.var, b.net)).collect();
        let reg_by_var = netlist
            .registers
            .iter()
            .enumerate()
            .map(|(i, r)| (r.var, i))
            .collect();
        let reg_state = netlist.registers.iter().map(|r| r.init).collect();
        Evaluator {
            netlist,
            inputs: HashMap::new(),
            bindings,
            reg_by_var,
            reg_state,
            cache: HashMap::new(),
        }
    }

    /// Drive an external input variable for the current cycle.
    pub fn set(&mut self, var: VarId, value: bool) {
        self.inputs.insert(var, value);
        self.cache.clear();
    }

    /// Drive an external input by its `Var` net.
    pub fn set_net(&mut self, net: NetId, value: bool) {
        let var = self
            .netlist
            .table
            .as_var(net)
            .expect("set_net requires a Var node");
        self.set(var, value);
    }

    pub fn eval(&mut self, net: NetId) -> bool {
        if let Some(&v) = self.cache.get(&net) {
            return v;
        }
        let value = match self.netlist.table.node(net) {
            NetNode::Const(v) => v,
            NetNode::Var(var) => {
                if let Some(&v) = self.inputs.get(&var) {
                    v
                } else if let Some(&driven) = self.bindings.get(&var) {
                    self.eval(driven)
                } else if let Some(&idx) = self.reg_by_var.get(&var) {
                    self.reg_state[idx]
                } else {
                    false
                }
            }
            NetNode::And(a, b) => self.eval(a) && self.eval(b),
            NetNode::Or(a, b) => self.eval(a) || self.eval(b),
            NetNode::Not(a) => !self.eval(a),
            NetNode::Mux { sel, a, b } => {
                if self.eval(sel) {
                    self.eval(a)
                } else {
                    self.eval(b)
                }
            }
            NetNode::Eq(a, b) => self.eval(a) == self.eval(b),
        };
        self.cache.insert(net, value);
        value
    }

    /// Evaluate a named signal; panics if the signal does not exist.
    pub fn signal(&mut self, name: &str) -> bool {
        let net = self
            .netlist
            .signal(name)
            .unwrap_or_else(|| panic!("no signal named '{name}'"));
        self.eval(net)
    }

    /// Evaluate a wire into a little-endian bit vector.
    pub fn eval_wire(&mut self, wire: &Wire) -> Vec<bool> {
        wire.bits.iter().map(|&b| self.eval(b)).collect()
    }

    /// Latch all registers, emulating one clock edge.
    pub fn step(&mut self) {
        let nexts: Vec<NetId> = self.netlist.registers.iter().map(|r| r.next).collect();
        let next: Vec<bool> = nexts.into_iter().map(|n| self.eval(n)).collect();
        self.reg_state = next;
        self.cache.clear();
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout;

    // ── Construction and folding ────────────────────────────────────────

    #[test]
    fn constants_are_shared() {
        let mut t = NetTable::new();
        assert_eq!(t.true_(), t.true_());
        assert_ne!(t.true_(), t.false_());
    }

    #[test]
    fn vars_are_never_merged() {
        let mut t = NetTable::new();
        let a = t.var("a");
        let b = t.var("a");
        assert_ne!(a, b, "two vars with the same name are distinct nets");
    }

    #[test]
    fn and_or_folding() {
        let mut t = NetTable::new();
        let a = t.var("a");
        let tt = t.true_();
        let ff = t.false_();
        assert_eq!(t.and(a, tt), a);
        assert_eq!(t.and(a, ff), ff);
        assert_eq!(t.or(a, ff), a);
        assert_eq!(t.or(a, tt), tt);
        assert_eq!(t.and(a, a), a);
    }

    #[test]
    fn and_is_commutative_after_interning() {
        let mut t = NetTable::new();
        let a = t.var("a");
        let b = t.var("b");
        assert_eq!(t.and(a, b), t.and(b, a));
        assert_eq!(t.or(a, b), t.or(b, a));
    }

    #[test]
    fn double_negation_cancels() {
        let mut t = NetTable::new();
        let a = t.var("a");
        let na = t.not(a);
        assert_eq!(t.not(na), a);
    }

    #[test]
    fn mux_folding() {
        let mut t = NetTable::new();
        let a = t.var("a");
        let b = t.var("b");
        let s = t.var("s");
        let tt = t.true_();
        let ff = t.false_();
        assert_eq!(t.mux(tt, a, b), a);
        assert_eq!(t.mux(ff, a, b), b);
        assert_eq!(t.mux(s, a, a), a);
    }

    #[test]
    fn empty_reductions() {
        let mut t = NetTable::new();
        let conj = t.and_all(&[]);
        let disj = t.or_any(&[]);
        assert_eq!(t.node(conj), NetNode::Const(true));
        assert_eq!(t.node(disj), NetNode::Const(false));
    }

    // ── Wires ───────────────────────────────────────────────────────────

    #[test]
    fn wire_var_names_follow_layout() {
        let mut t = NetTable::new();
        let l = layout([("addr", 2), ("v", 1)]);
        let w = t.wire_var("put.data_in", &l);
        assert_eq!(w.width(), 3);
        let v0 = t.as_var(w.bits[0]).unwrap();
        assert_eq!(t.var_name(v0), "put.data_in.addr[0]");
        let v2 = t.as_var(w.bits[2]).unwrap();
        assert_eq!(t.var_name(v2), "put.data_in.v[0]");
    }

    #[test]
    fn depends_on_walks_the_dag() {
        let mut t = NetTable::new();
        let a = t.var("a");
        let b = t.var("b");
        let c = t.var("c");
        let ab = t.and(a, b);
        let nab = t.not(ab);
        assert!(t.depends_on(nab, a));
        assert!(t.depends_on(nab, ab));
        assert!(!t.depends_on(nab, c));
    }

    // ── Evaluator ───────────────────────────────────────────────────────

    fn simple_netlist() -> Netlist {
        let mut table = NetTable::new();
        let a = table.var("a");
        let b = table.var("b");
        let out = table.and(a, b);
        let mut netlist = Netlist {
            table,
            ..Netlist::default()
        };
        netlist.signals.push(Signal {
            name: "out".into(),
            net: out,
        });
        netlist.signals.push(Signal {
            name: "a".into(),
            net: a,
        });
        netlist.signals.push(Signal {
            name: "b".into(),
            net: b,
        });
        netlist
    }

    #[test]
    fn eval_combinational() {
        let netlist = simple_netlist();
        let mut ev = Evaluator::new(&netlist);
        assert!(!ev.signal("out"), "unset inputs read as zero");
        ev.set_net(netlist.signal("a").unwrap(), true);
        ev.set_net(netlist.signal("b").unwrap(), true);
        assert!(ev.signal("out"));
        ev.set_net(netlist.signal("b").unwrap(), false);
        assert!(!ev.signal("out"));
    }

    #[test]
    fn bindings_resolve_internal_vars() {
        let mut table = NetTable::new();
        let ext = table.var("ext");
        let internal = table.var("internal");
        let internal_var = table.as_var(internal).unwrap();
        let out = table.not(internal);
        let mut netlist = Netlist {
            table,
            ..Netlist::default()
        };
        netlist.bindings.push(Binding {
            var: internal_var,
            net: ext,
        });
        netlist.signals.push(Signal {
            name: "out".into(),
            net: out,
        });
        let mut ev = Evaluator::new(&netlist);
        ev.set_net(ext, true);
        assert!(!ev.signal("out"));
        ev.set_net(ext, false);
        assert!(ev.signal("out"));
    }

    #[test]
    fn registers_latch_on_step() {
        // A toggle flop: next = !current.
        let mut table = NetTable::new();
        let q = table.var("q");
        let q_var = table.as_var(q).unwrap();
        let next = table.not(q);
        let mut netlist = Netlist {
            table,
            ..Netlist::default()
        };
        netlist.registers.push(Register {
            name: "q".into(),
            var: q_var,
            init: false,
            next,
        });
        netlist.signals.push(Signal {
            name: "q".into(),
            net: q,
        });
        let mut ev = Evaluator::new(&netlist);
        assert!(!ev.signal("q"));
        ev.step();
        assert!(ev.signal("q"));
        ev.step();
        assert!(!ev.signal("q"));
    }

    // ── Canonical text ──────────────────────────────────────────────────

    #[test]
    fn canonical_text_is_reproducible() {
        let a = simple_netlist();
        let b = simple_netlist();
        assert_eq!(a.canonical_text(), b.canonical_text());
        assert!(a.canonical_text().contains("signal out"));
    }
}
