// pipeline.rs — Pass orchestration over the compilation state
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId. Any pass emitting error-level diagnostics stops the
// run: no partial netlist is ever handed out. Verification certificates
// from the schedule and lower passes are checked here and turned into
// error diagnostics on failure.
//
// Preconditions: the design was finalized by its elaboration context.
// Postconditions: artifacts for all required passes are populated, or
//                 `has_error` is set.
// Failure modes: any pass with error diagnostics; cert failures.
// Side effects: with `verbose`, per-pass timing on stderr; with the
//               TRANSACTRON_VERBOSE environment variable set, the
//               structural report is printed after elaboration.

use std::time::Instant;

use crate::conflict::ConflictGraph;
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::elab::Design;
use crate::graph::MethodMap;
use crate::lower::{Interface, LowerResult};
use crate::netlist::{NetTable, Netlist};
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::report::{build_report, StructuralReport};
use crate::resolve::ResolvedDesign;
use crate::schedule::{Schedule, SchedulerKind};

// ── Options ─────────────────────────────────────────────────────────────────

/// Configuration for one elaboration run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElabOptions {
    /// Which arbiter the scheduler synthesizer emits.
    pub scheduler: SchedulerKind,
    /// Per-pass timing on stderr.
    pub verbose: bool,
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Fingerprints for determinism checks and cache keys.
///
/// `design_hash`: SHA-256 of the design's canonical description.
/// `netlist_hash`: SHA-256 of the emitted netlist's canonical text; two
/// elaborations of the same source must agree on both.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub design_hash: [u8; 32],
    pub netlist_hash: Option<[u8; 32]>,
    pub crate_version: &'static str,
}

impl Provenance {
    pub fn design_hash_hex(&self) -> String {
        hex_string(&self.design_hash)
    }

    pub fn netlist_hash_hex(&self) -> Option<String> {
        self.netlist_hash.as_ref().map(hex_string)
    }

    /// Serialize provenance as a JSON string.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"design_hash\": \"{}\",\n  \"netlist_hash\": \"{}\",\n  \"crate_version\": \"{}\"\n}}\n",
            self.design_hash_hex(),
            self.netlist_hash_hex().unwrap_or_default(),
            self.crate_version,
        )
    }
}

fn hex_string(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Compute the design-side provenance fingerprint.
pub fn compute_provenance(design: &Design) -> Provenance {
    Provenance {
        design_hash: sha256(&design.canonical_text()),
        netlist_hash: None,
        crate_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ───────────────────────────────────────────────────────

/// Holds all artifacts and accumulated diagnostics for one run.
pub struct CompilationState {
    pub design: Design,
    /// Consumed into the netlist by the lower pass.
    pub table: Option<NetTable>,
    pub map: Option<MethodMap>,
    pub conflicts: Option<ConflictGraph>,
    pub resolved: Option<ResolvedDesign>,
    pub schedule: Option<Schedule>,
    pub netlist: Option<Netlist>,
    pub interface: Option<Interface>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Provenance,
}

impl CompilationState {
    pub fn new(design: Design, table: NetTable) -> Self {
        let provenance = compute_provenance(&design);
        CompilationState {
            design,
            table: Some(table),
            map: None,
            conflicts: None,
            resolved: None,
            schedule: None,
            netlist: None,
            interface: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance,
        }
    }
}

// ── Error type ──────────────────────────────────────────────────────────────

/// Pipeline execution stopped at a pass with error-level diagnostics.
/// The diagnostics themselves are in `CompilationState.diagnostics`.
#[derive(Debug, Clone, Copy)]
pub struct PipelineError {
    /// The pass whose diagnostics stopped the run.
    pub pass: PassId,
    /// Its human-readable name.
    pub pass_name: &'static str,
    /// How many error-level diagnostics that pass produced.
    pub error_count: usize,
}

// ── Pipeline runner ─────────────────────────────────────────────────────────

/// Run every pass required for `terminal`, in execution order.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &ElabOptions,
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let started = Instant::now();
        let diags = execute_pass(state, pass_id, options);
        if options.verbose {
            eprintln!(
                "[transactron] pass {} finished in {}us",
                descriptor(pass_id).name,
                started.elapsed().as_micros()
            );
        }
        let error_count = diags.iter().filter(|d| d.level == DiagLevel::Error).count();
        state.diagnostics.extend(diags);
        if error_count > 0 {
            state.has_error = true;
            return Err(PipelineError {
                pass: pass_id,
                pass_name: descriptor(pass_id).name,
                error_count,
            });
        }
    }
    Ok(())
}

/// Execute one pass against the state, storing its artifact and returning
/// its diagnostics.
fn execute_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    options: &ElabOptions,
) -> Vec<Diagnostic> {
    match pass_id {
        PassId::BuildMap => {
            let result = crate::graph::build_map(&state.design, state.table.as_mut().unwrap());
            state.map = Some(result.map);
            result.diagnostics
        }
        PassId::Conflicts => {
            let result =
                crate::conflict::build_conflicts(&state.design, state.map.as_ref().unwrap());
            state.conflicts = Some(result.graph);
            result.diagnostics
        }
        PassId::Resolve => {
            let result = crate::resolve::resolve(
                &state.design,
                state.map.as_ref().unwrap(),
                state.table.as_mut().unwrap(),
            );
            state.resolved = Some(result.resolved);
            result.diagnostics
        }
        PassId::Schedule => {
            let table = state.table.as_mut().unwrap();
            let schedule = crate::schedule::synthesize(
                &state.design,
                state.map.as_ref().unwrap(),
                state.conflicts.as_ref().unwrap(),
                options.scheduler,
                table,
            );
            let cert = crate::schedule::verify_schedule(
                &schedule,
                state.conflicts.as_ref().unwrap(),
                table,
            );
            state.schedule = Some(schedule);
            match cert.all_pass() {
                true => Vec::new(),
                false => vec![cert_failure(codes::SCHEDULE_CERT, "schedule", &cert)],
            }
        }
        PassId::Lower => {
            let table = state.table.take().unwrap();
            let LowerResult {
                netlist,
                interface,
                cert,
                mut diagnostics,
            } = crate::lower::lower_and_verify(
                &state.design,
                state.map.as_ref().unwrap(),
                state.conflicts.as_ref().unwrap(),
                state.resolved.as_ref().unwrap(),
                state.schedule.as_ref().unwrap(),
                table,
            );
            if !cert.all_pass() {
                diagnostics.push(cert_failure(codes::LOWER_CERT, "lowering", &cert));
            }
            state.provenance.netlist_hash = Some(sha256(&netlist.canonical_text()));
            state.netlist = Some(netlist);
            state.interface = Some(interface);
            diagnostics
        }
    }
}

fn cert_failure(code: crate::diag::DiagCode, what: &str, cert: &impl StageCert) -> Diagnostic {
    let failed: Vec<&str> = cert
        .obligations()
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    Diagnostic::error(
        code,
        format!("{what} verification failed: {}", failed.join(", ")),
    )
}

// ── Convenience wrapper ─────────────────────────────────────────────────────

/// Result of a full elaboration: netlist, signal interface, structural
/// report, provenance, and the surviving (warning-level) diagnostics.
#[derive(Debug)]
pub struct ElaborationResult {
    pub netlist: Netlist,
    pub interface: Interface,
    pub report: StructuralReport,
    pub provenance: Provenance,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run all passes over a finalized design. On error, returns every
/// accumulated diagnostic; no netlist is emitted.
pub fn elaborate(
    design: Design,
    table: NetTable,
    options: &ElabOptions,
) -> Result<ElaborationResult, Vec<Diagnostic>> {
    let mut state = CompilationState::new(design, table);
    if run_pipeline(&mut state, PassId::Lower, options).is_err() {
        return Err(state.diagnostics);
    }

    let report = build_report(
        &state.design,
        state.map.as_ref().unwrap(),
        state.conflicts.as_ref().unwrap(),
        &state.diagnostics,
    );

    if std::env::var_os("TRANSACTRON_VERBOSE").is_some() {
        eprintln!("{report}");
    }

    Ok(ElaborationResult {
        netlist: state.netlist.unwrap(),
        interface: state.interface.unwrap(),
        report,
        provenance: state.provenance,
        diagnostics: state.diagnostics,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::MethodDef;
    use crate::diag::DiagLevel;
    use crate::elab::ElabContext;
    use crate::layout::Layout;
    use crate::registry::MethodParams;

    fn two_caller_design() -> (Design, NetTable) {
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
        for name in ["t1", "t2"] {
            let t = ctx.add_transaction(name).unwrap();
            let req = ctx.input(format!("{name}_req"));
            ctx.def_transaction(t, req, |ctx| {
                let args = ctx.nets().wire_zero(&Layout::empty());
                ctx.call(put, args).map(|_| ())
            })
            .unwrap();
        }
        ctx.finalize().unwrap()
    }

    #[test]
    fn full_pipeline_produces_all_artifacts() {
        let (design, table) = two_caller_design();
        let mut state = CompilationState::new(design, table);
        run_pipeline(&mut state, PassId::Lower, &ElabOptions::default()).unwrap();
        assert!(state.map.is_some());
        assert!(state.conflicts.is_some());
        assert!(state.resolved.is_some());
        assert!(state.schedule.is_some());
        assert!(state.netlist.is_some());
        assert!(state.interface.is_some());
        assert!(state.provenance.netlist_hash.is_some());
        assert!(!state.has_error);
    }

    #[test]
    fn partial_pipeline_stops_at_terminal() {
        let (design, table) = two_caller_design();
        let mut state = CompilationState::new(design, table);
        run_pipeline(&mut state, PassId::Conflicts, &ElabOptions::default()).unwrap();
        assert!(state.map.is_some());
        assert!(state.conflicts.is_some());
        assert!(state.resolved.is_none());
        assert!(state.netlist.is_none());
    }

    #[test]
    fn errors_stop_the_run_without_a_netlist() {
        let mut ctx = ElabContext::new();
        // A method that is called but never defined.
        let ghost = ctx
            .add_method("ghost", Layout::empty(), Layout::empty(), MethodParams::default())
            .unwrap();
        let t = ctx.add_transaction("t").unwrap();
        let req = ctx.input("req");
        ctx.def_transaction(t, req, |ctx| {
            let args = ctx.nets().wire_zero(&Layout::empty());
            ctx.call(ghost, args).map(|_| ())
        })
        .unwrap();
        let (design, table) = ctx.finalize().unwrap();

        let mut state = CompilationState::new(design, table);
        let err =
            run_pipeline(&mut state, PassId::Lower, &ElabOptions::default()).unwrap_err();
        assert_eq!(err.pass, PassId::BuildMap);
        assert_eq!(err.pass_name, "build_map");
        assert!(err.error_count > 0);
        assert!(state.netlist.is_none());
        assert!(state.diagnostics.iter().any(|d| d.level == DiagLevel::Error));
    }

    #[test]
    fn elaborate_returns_report_and_warnings() {
        let (design, table) = two_caller_design();
        let result = elaborate(design, table, &ElabOptions::default()).unwrap();
        assert_eq!(result.report.transactions.len(), 2);
        // The undeclared-priority tiebreak surfaces as a warning.
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.level == DiagLevel::Warning));
        assert!(!result.report.ambiguities.is_empty());
    }

    #[test]
    fn provenance_is_reproducible() {
        let (d1, t1) = two_caller_design();
        let (d2, t2) = two_caller_design();
        let r1 = elaborate(d1, t1, &ElabOptions::default()).unwrap();
        let r2 = elaborate(d2, t2, &ElabOptions::default()).unwrap();
        assert_eq!(r1.provenance.design_hash, r2.provenance.design_hash);
        assert_eq!(r1.provenance.netlist_hash, r2.provenance.netlist_hash);
        assert_eq!(r1.provenance.to_json(), r2.provenance.to_json());
    }

    #[test]
    fn hex_encoding_is_lowercase_and_64_chars() {
        let (design, table) = two_caller_design();
        let state = CompilationState::new(design, table);
        let hex = state.provenance.design_hash_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn scheduler_kind_changes_the_netlist() {
        let (d1, t1) = two_caller_design();
        let (d2, t2) = two_caller_design();
        let eager = elaborate(d1, t1, &ElabOptions::default()).unwrap();
        let rr = elaborate(
            d2,
            t2,
            &ElabOptions {
                scheduler: SchedulerKind::RoundRobin,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(eager.netlist.registers.is_empty());
        assert_eq!(rr.netlist.registers.len(), 2);
        assert_ne!(eager.provenance.netlist_hash, rr.provenance.netlist_hash);
    }
}
