// elab.rs — Elaboration context: the designer-facing definition surface
//
// One `ElabContext` holds all process state for a single elaboration:
// the signature registry, method and transaction bodies, declared
// relations, the shared expression table, and the ambient body/guard
// stacks. Definitions register here; `finalize` freezes the context into
// an immutable `Design` consumed by the analysis and lowering passes.
//
// Preconditions: none.
// Postconditions: after `finalize`, every further mutation fails with a
//                 frozen-context diagnostic; the returned `Design` is
//                 immutable.
// Failure modes: structural misuse (orphan calls, context mixing,
//                duplicate definitions, layout mismatches) produces
//                error diagnostics at the offending call.
// Side effects: none outside the context itself.

use crate::body::{Body, CallSite, CtrlPath, CtrlStep, MethodDef};
use crate::diag::{codes, Diagnostic, SrcLoc};
use crate::id::{Caller, CtxId, IdAllocator, MethodId, TransactionId};
use crate::layout::Layout;
use crate::netlist::{NetId, NetTable, Wire};
use crate::registry::{MethodParams, Priority, Reducer, Relation, SignatureRegistry};

// ── Method slots ────────────────────────────────────────────────────────────

/// A registered method: its interned signature, its body, and an optional
/// reducer for nonexclusive merging.
#[derive(Debug)]
pub struct MethodSlot {
    pub sig: crate::id::SignatureId,
    pub body: Body,
    pub reducer: Option<Reducer>,
}

// ── The frozen design ───────────────────────────────────────────────────────

/// Everything the passes need, frozen after elaboration completes.
#[derive(Debug)]
pub struct Design {
    pub ctx: CtxId,
    pub methods: Vec<MethodSlot>,
    pub transactions: Vec<Body>,
    pub relations: Vec<Relation>,
    pub signatures: SignatureRegistry,
}

impl Design {
    pub fn method(&self, id: MethodId) -> &Body {
        &self.methods[id.index as usize].body
    }

    pub fn transaction(&self, id: TransactionId) -> &Body {
        &self.transactions[id.index as usize]
    }

    pub fn body(&self, caller: Caller) -> &Body {
        match caller {
            Caller::Method(m) => self.method(m),
            Caller::Transaction(t) => self.transaction(t),
        }
    }

    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> + '_ {
        let ctx = self.ctx;
        (0..self.methods.len() as u32).map(move |index| MethodId { ctx, index })
    }

    pub fn transaction_ids(&self) -> impl Iterator<Item = TransactionId> + '_ {
        let ctx = self.ctx;
        (0..self.transactions.len() as u32).map(move |index| TransactionId { ctx, index })
    }

    /// A canonical, line-oriented description of the design structure.
    /// Stable across elaborations of the same source; the input to the
    /// provenance fingerprint.
    pub fn canonical_text(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (i, slot) in self.methods.iter().enumerate() {
            let b = &slot.body;
            let _ = writeln!(
                out,
                "method {} '{}' in {} out {} nonexclusive {} single_caller {} def_order {}",
                i, b.name, b.layout_in, b.layout_out, b.nonexclusive, b.single_caller, b.def_order
            );
            for site in &b.call_sites {
                let _ = writeln!(out, "  calls method {}", site.callee.index);
            }
        }
        for (i, b) in self.transactions.iter().enumerate() {
            let _ = writeln!(out, "transaction {} '{}' def_order {}", i, b.name, b.def_order);
            for site in &b.call_sites {
                let _ = writeln!(out, "  calls method {}", site.callee.index);
            }
        }
        for r in &self.relations {
            let _ = writeln!(
                out,
                "relation {} -> {} priority {:?} conflict {}",
                r.start, r.end, r.priority, r.conflict
            );
        }
        out
    }
}

// ── Elaboration context ─────────────────────────────────────────────────────

struct BodyFrame {
    owner: Caller,
}

/// The scoped, process-wide state of one elaboration. Not ambient: it is
/// threaded explicitly through every definition. Concurrent elaborations
/// require separate contexts.
pub struct ElabContext {
    ids: IdAllocator,
    table: NetTable,
    signatures: SignatureRegistry,
    methods: Vec<MethodSlot>,
    transactions: Vec<Body>,
    relations: Vec<Relation>,
    def_counter: u32,
    body_stack: Vec<BodyFrame>,
    path: CtrlPath,
    guards: Vec<NetId>,
    next_region: u32,
    frozen: bool,
}

impl Default for ElabContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ElabContext {
    pub fn new() -> ElabContext {
        ElabContext {
            ids: IdAllocator::new(CtxId::fresh()),
            table: NetTable::new(),
            signatures: SignatureRegistry::new(),
            methods: Vec::new(),
            transactions: Vec::new(),
            relations: Vec::new(),
            def_counter: 0,
            body_stack: Vec::new(),
            path: CtrlPath::root(),
            guards: Vec::new(),
            next_region: 0,
            frozen: false,
        }
    }

    pub fn ctx_id(&self) -> CtxId {
        self.ids.ctx()
    }

    /// The shared expression table, for building request, ready and
    /// argument expressions.
    pub fn nets(&mut self) -> &mut NetTable {
        &mut self.table
    }

    /// A fresh named external input bit.
    pub fn input(&mut self, name: impl Into<String>) -> NetId {
        self.table.var(name)
    }

    /// A fresh named external input record.
    pub fn input_wire(&mut self, name: &str, layout: &Layout) -> Wire {
        self.table.wire_var(name, layout)
    }

    fn check_unfrozen(&self, loc: SrcLoc) -> Result<(), Diagnostic> {
        if self.frozen {
            Err(Diagnostic::error(
                codes::FROZEN_CONTEXT,
                "elaboration context mutated after lowering started",
            )
            .at(loc))
        } else {
            Ok(())
        }
    }

    fn check_same_ctx(&self, other: CtxId, what: &str, loc: SrcLoc) -> Result<(), Diagnostic> {
        if other != self.ids.ctx() {
            Err(Diagnostic::error(
                codes::CONTEXT_MISMATCH,
                format!("{what} belongs to a different elaboration context"),
            )
            .at(loc))
        } else {
            Ok(())
        }
    }

    fn next_def_order(&mut self) -> u32 {
        let order = self.def_counter;
        self.def_counter += 1;
        order
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Register a method: interface layouts, exclusivity, and parameters.
    /// The body is attached separately with `def_method`.
    #[track_caller]
    pub fn add_method(
        &mut self,
        name: &str,
        input: Layout,
        output: Layout,
        params: MethodParams,
    ) -> Result<MethodId, Diagnostic> {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        let sig = self
            .signatures
            .intern(input.clone(), output.clone(), params.nonexclusive);
        self.signatures.bind_name(name, sig, loc)?;
        let id = self.ids.alloc_method();
        let data_in = self.table.wire_var(&format!("{name}.data_in"), &input);
        let data_out = self.table.wire_var(&format!("{name}.data_out"), &output);
        let def_order = self.next_def_order();
        self.methods.push(MethodSlot {
            sig,
            body: Body::new(
                Caller::Method(id),
                name.to_string(),
                def_order,
                loc,
                input,
                output,
                data_in,
                data_out,
                params.nonexclusive,
                params.single_caller,
            ),
            reducer: None,
        });
        Ok(id)
    }

    /// Register a transaction. The body and request predicate are attached
    /// separately with `def_transaction`.
    #[track_caller]
    pub fn add_transaction(&mut self, name: &str) -> Result<TransactionId, Diagnostic> {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        let id = self.ids.alloc_transaction();
        let data_in = self.table.wire_var(&format!("{name}.void_in"), &Layout::empty());
        let data_out = self.table.wire_var(&format!("{name}.void_out"), &Layout::empty());
        let def_order = self.next_def_order();
        self.transactions.push(Body::new(
            Caller::Transaction(id),
            name.to_string(),
            def_order,
            loc,
            Layout::empty(),
            Layout::empty(),
            data_in,
            data_out,
            false,
            false,
        ));
        Ok(id)
    }

    // ── Body definition ─────────────────────────────────────────────────

    /// Define a method body. The closure receives the context and the
    /// method's input wire, records calls to other methods, and returns
    /// the local ready predicate together with the output expression.
    #[track_caller]
    pub fn def_method<F>(&mut self, id: MethodId, f: F) -> Result<(), Diagnostic>
    where
        F: FnOnce(&mut ElabContext, Wire) -> Result<MethodDef, Diagnostic>,
    {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        self.check_same_ctx(id.ctx, "method", loc)?;
        let body = &self.methods[id.index as usize].body;
        if body.defined {
            return Err(Diagnostic::error(
                codes::DUPLICATE_DEFINITION,
                format!("method '{}' already defined", body.name),
            )
            .at(loc)
            .with_note(body.loc, "first declared here"));
        }
        let data_in = body.data_in.clone();
        let opened_path = self.path.clone();

        self.body_stack.push(BodyFrame {
            owner: Caller::Method(id),
        });
        let result = f(self, data_in);
        self.body_stack.pop();
        let def = result?;

        let body = &mut self.methods[id.index as usize].body;
        if def.data_out.layout != body.layout_out {
            return Err(Diagnostic::error(
                codes::LAYOUT_MISMATCH,
                format!(
                    "method '{}' defined with output layout {} but declared {}",
                    body.name, def.data_out.layout, body.layout_out
                ),
            )
            .at(loc));
        }
        body.path = opened_path;
        body.local_ready = Some(def.ready);
        body.out_expr = Some(def.data_out);
        body.defined = true;
        Ok(())
    }

    /// Define a transaction body. `request` is asserted when the designer
    /// wants the transaction to fire; the closure records method calls.
    #[track_caller]
    pub fn def_transaction<F>(
        &mut self,
        id: TransactionId,
        request: NetId,
        f: F,
    ) -> Result<(), Diagnostic>
    where
        F: FnOnce(&mut ElabContext) -> Result<(), Diagnostic>,
    {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        self.check_same_ctx(id.ctx, "transaction", loc)?;
        let body = &self.transactions[id.index as usize];
        if body.defined {
            return Err(Diagnostic::error(
                codes::DUPLICATE_DEFINITION,
                format!("transaction '{}' already defined", body.name),
            )
            .at(loc)
            .with_note(body.loc, "first declared here"));
        }
        let opened_path = self.path.clone();

        self.body_stack.push(BodyFrame {
            owner: Caller::Transaction(id),
        });
        let result = f(self);
        self.body_stack.pop();
        result?;

        let body = &mut self.transactions[id.index as usize];
        body.path = opened_path;
        body.local_ready = Some(request);
        body.defined = true;
        Ok(())
    }

    // ── Calls ───────────────────────────────────────────────────────────

    /// Record a call site in the current body and return the callee's
    /// output wire. The call is enabled whenever the enclosing guards
    /// hold.
    #[track_caller]
    pub fn call(&mut self, callee: MethodId, args: Wire) -> Result<Wire, Diagnostic> {
        let loc = SrcLoc::here();
        let enable = self.table.true_();
        self.record_call(callee, enable, args, loc)
    }

    /// Record a call site with an explicit enable predicate, ANDed with
    /// the enclosing guards. Disabled calls still participate in conflict
    /// analysis.
    #[track_caller]
    pub fn call_when(
        &mut self,
        enable: NetId,
        callee: MethodId,
        args: Wire,
    ) -> Result<Wire, Diagnostic> {
        let loc = SrcLoc::here();
        self.record_call(callee, enable, args, loc)
    }

    fn record_call(
        &mut self,
        callee: MethodId,
        enable: NetId,
        args: Wire,
        loc: SrcLoc,
    ) -> Result<Wire, Diagnostic> {
        self.check_unfrozen(loc)?;
        let owner = match self.body_stack.last() {
            Some(frame) => frame.owner,
            None => {
                return Err(Diagnostic::error(
                    codes::ORPHAN_CALL,
                    "method call outside an open body",
                )
                .at(loc))
            }
        };
        self.check_same_ctx(callee.ctx, "callee", loc)?;

        let callee_body = &self.methods[callee.index as usize].body;
        if args.layout != callee_body.layout_in {
            return Err(Diagnostic::error(
                codes::LAYOUT_MISMATCH,
                format!(
                    "call to method '{}' with argument layout {} but declared {}",
                    callee_body.name, args.layout, callee_body.layout_in
                ),
            )
            .at(loc));
        }
        let result = callee_body.data_out.clone();
        let callee_name = callee_body.name.clone();

        let guard = self.table.and_all(&self.guards.clone());
        let enable = self.table.and(guard, enable);
        let path = self.path.clone();

        // A caller may contain several sites to one method only when the
        // sites can never be live together.
        let caller_body = self.body(owner);
        for site in caller_body.sites_for(callee) {
            if !site.path.exclusive_with(&path) {
                return Err(Diagnostic::error(
                    codes::DUPLICATE_CALL,
                    format!(
                        "method '{}' called twice from '{}' under overlapping conditions",
                        callee_name, caller_body.name
                    ),
                )
                .at(loc)
                .with_note(site.loc, "previous call site here")
                .with_hint("place the calls in different arms of an if_else region"));
            }
        }

        let id = self.ids.alloc_call_site();
        let site = CallSite {
            id,
            caller: owner,
            callee,
            enable,
            path,
            args,
            loc,
        };
        self.body_mut(owner).call_sites.push(site);
        Ok(result)
    }

    fn body(&self, caller: Caller) -> &Body {
        match caller {
            Caller::Method(m) => &self.methods[m.index as usize].body,
            Caller::Transaction(t) => &self.transactions[t.index as usize],
        }
    }

    fn body_mut(&mut self, caller: Caller) -> &mut Body {
        match caller {
            Caller::Method(m) => &mut self.methods[m.index as usize].body,
            Caller::Transaction(t) => &mut self.transactions[t.index as usize],
        }
    }

    // ── Conditional regions ─────────────────────────────────────────────

    /// Guard a region: calls recorded inside are enabled only under
    /// `cond`. No mutual-exclusion witness is created.
    pub fn when<F>(&mut self, cond: NetId, f: F) -> Result<(), Diagnostic>
    where
        F: FnOnce(&mut ElabContext) -> Result<(), Diagnostic>,
    {
        let region = self.next_region;
        self.next_region += 1;
        self.path.steps.push(CtrlStep { region, arm: 0 });
        self.guards.push(cond);
        let result = f(self);
        self.guards.pop();
        self.path.steps.pop();
        result
    }

    /// A two-arm conditional region. Calls in the two arms are guarded by
    /// `cond` and `¬cond`, and their call sites carry a structural
    /// mutual-exclusion witness: the conflict pass treats them as never
    /// live together.
    pub fn if_else<F, G>(&mut self, cond: NetId, then_f: F, else_f: G) -> Result<(), Diagnostic>
    where
        F: FnOnce(&mut ElabContext) -> Result<(), Diagnostic>,
        G: FnOnce(&mut ElabContext) -> Result<(), Diagnostic>,
    {
        let region = self.next_region;
        self.next_region += 1;

        self.path.steps.push(CtrlStep { region, arm: 0 });
        self.guards.push(cond);
        let then_result = then_f(self);
        self.guards.pop();
        self.path.steps.pop();
        then_result?;

        let not_cond = self.table.not(cond);
        self.path.steps.push(CtrlStep { region, arm: 1 });
        self.guards.push(not_cond);
        let else_result = else_f(self);
        self.guards.pop();
        self.path.steps.pop();
        else_result
    }

    // ── Relations and reducers ──────────────────────────────────────────

    /// Declare an explicit conflict: the transactions reached from `a` and
    /// `b` must never be granted in the same cycle. An optional priority
    /// orders the arbiter between them.
    #[track_caller]
    pub fn add_conflict(
        &mut self,
        a: impl Into<Caller>,
        b: impl Into<Caller>,
        priority: Priority,
    ) -> Result<(), Diagnostic> {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        let (a, b) = (a.into(), b.into());
        self.check_same_ctx(a.ctx(), "conflict endpoint", loc)?;
        self.check_same_ctx(b.ctx(), "conflict endpoint", loc)?;
        self.relations.push(Relation {
            start: a,
            end: b,
            priority,
            conflict: true,
            loc,
        });
        Ok(())
    }

    /// Declare a priority without a conflict: when both are runnable and
    /// conflict for another reason, prefer `first`.
    #[track_caller]
    pub fn schedule_before(
        &mut self,
        first: impl Into<Caller>,
        second: impl Into<Caller>,
    ) -> Result<(), Diagnostic> {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        let (first, second) = (first.into(), second.into());
        self.check_same_ctx(first.ctx(), "priority endpoint", loc)?;
        self.check_same_ctx(second.ctx(), "priority endpoint", loc)?;
        self.relations.push(Relation {
            start: first,
            end: second,
            priority: Priority::Left,
            conflict: false,
            loc,
        });
        Ok(())
    }

    /// Declare the reducer merging simultaneous callers of a nonexclusive
    /// method.
    #[track_caller]
    pub fn set_reducer(&mut self, method: MethodId, reducer: Reducer) -> Result<(), Diagnostic> {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        self.check_same_ctx(method.ctx, "method", loc)?;
        self.methods[method.index as usize].reducer = Some(reducer);
        Ok(())
    }

    // ── Freezing ────────────────────────────────────────────────────────

    /// Freeze the context and hand the design and expression table to the
    /// passes. Any later mutation of this context fails.
    #[track_caller]
    pub fn finalize(&mut self) -> Result<(Design, NetTable), Diagnostic> {
        let loc = SrcLoc::here();
        self.check_unfrozen(loc)?;
        if !self.body_stack.is_empty() {
            return Err(Diagnostic::error(
                codes::FROZEN_CONTEXT,
                "finalize called inside an open body",
            )
            .at(loc));
        }
        self.frozen = true;
        let design = Design {
            ctx: self.ids.ctx(),
            methods: std::mem::take(&mut self.methods),
            transactions: std::mem::take(&mut self.transactions),
            relations: std::mem::take(&mut self.relations),
            signatures: std::mem::take(&mut self.signatures),
        };
        Ok((design, std::mem::take(&mut self.table)))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
