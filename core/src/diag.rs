// diag.rs — Diagnostics: codes, locations, severity
//
// Every structural validation failure in the crate is reported through
// the `Diagnostic` type defined here, tagged with a stable code and the
// source location captured when the offending definition was registered.
// Errors are fatal: a design with error-level diagnostics never produces
// a netlist. Warnings (deterministic tiebreaks, priority declared against
// definition order) are carried into the structural report without
// halting lowering.

use std::fmt;
use std::panic::Location;

// ── Source locations ─────────────────────────────────────────────────────

/// The source location of a definition or declaration, captured at
/// registration time via `#[track_caller]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SrcLoc {
    pub file: &'static str,
    pub line: u32,
}

impl SrcLoc {
    /// Capture the location of the caller of the annotated function.
    #[track_caller]
    pub fn here() -> SrcLoc {
        let loc = Location::caller();
        SrcLoc {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

impl fmt::Display for SrcLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// ── Code table ───────────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0201`, `W0601`).
///
/// The constants in the `codes` module below are the only source of
/// codes, and a published code keeps its meaning forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Stable diagnostic codes for every structural validation failure.
pub mod codes {
    use super::DiagCode;

    /// Re-registration or definition with an incompatible layout.
    pub const LAYOUT_MISMATCH: DiagCode = DiagCode("E0101");
    /// A method or transaction body defined more than once.
    pub const DUPLICATE_DEFINITION: DiagCode = DiagCode("E0102");
    /// A declared transaction that was never given a body.
    pub const UNDEFINED_BODY: DiagCode = DiagCode("E0103");
    /// A method call outside an open body.
    pub const ORPHAN_CALL: DiagCode = DiagCode("E0201");
    /// A call site whose callee was never given a body.
    pub const MISSING_CALLEE: DiagCode = DiagCode("E0202");
    /// Caller and callee belong to different elaboration contexts.
    pub const CONTEXT_MISMATCH: DiagCode = DiagCode("E0203");
    /// A mutation attempted after lowering started.
    pub const FROZEN_CONTEXT: DiagCode = DiagCode("E0204");
    /// The same method called twice under overlapping enable conditions.
    pub const DUPLICATE_CALL: DiagCode = DiagCode("E0205");
    /// A cycle in the method call graph.
    pub const CALL_GRAPH_CYCLE: DiagCode = DiagCode("E0301");
    /// A cycle in the priority hints.
    pub const PRIORITY_CYCLE: DiagCode = DiagCode("E0302");
    /// A nonexclusive method with multiple callers and no usable reducer.
    pub const UNMERGED_NONEXCLUSIVE: DiagCode = DiagCode("E0401");
    /// A single-caller method resolved to more than one caller.
    pub const SINGLE_CALLER: DiagCode = DiagCode("E0402");
    /// Schedule verification obligations not met.
    pub const SCHEDULE_CERT: DiagCode = DiagCode("E0501");
    /// Lowering verification obligations not met.
    pub const LOWER_CERT: DiagCode = DiagCode("E0502");
    /// Conflicting transactions with no declared priority; definition
    /// order tiebreak applied.
    pub const NO_PRIORITY_TIEBREAK: DiagCode = DiagCode("W0601");
    /// `schedule_before` contradicts definition order.
    pub const PRIORITY_AGAINST_DEF_ORDER: DiagCode = DiagCode("W0602");
}

// ── Severity ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

impl DiagLevel {
    fn label(self) -> &'static str {
        match self {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        }
    }
}

// ── Diagnostic records ───────────────────────────────────────────────────

/// A labeled secondary location attached to a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedLoc {
    pub loc: SrcLoc,
    pub label: String,
}

/// A diagnostic emitted by any elaboration pass.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub loc: Option<SrcLoc>,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedLoc>,
}

impl Diagnostic {
    fn fresh(level: DiagLevel, code: Option<DiagCode>, message: String) -> Self {
        Diagnostic {
            code,
            level,
            loc: None,
            message,
            hint: None,
            related: Vec::new(),
        }
    }

    /// An error-level diagnostic. Every error carries its stable code
    /// from construction; there is no separate code-attachment step.
    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Diagnostic::fresh(DiagLevel::Error, Some(code), message.into())
    }

    /// A warning-level diagnostic with its stable code.
    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Diagnostic::fresh(DiagLevel::Warning, Some(code), message.into())
    }

    /// An uncoded diagnostic, for ad-hoc notes.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Diagnostic::fresh(level, None, message.into())
    }

    /// Attach the source location of the offending definition.
    pub fn at(self, loc: SrcLoc) -> Self {
        Diagnostic {
            loc: Some(loc),
            ..self
        }
    }

    /// Attach a hint suggesting a fix.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        Diagnostic {
            hint: Some(hint.into()),
            ..self
        }
    }

    /// Attach a labeled secondary location.
    pub fn with_note(mut self, loc: SrcLoc, label: impl Into<String>) -> Self {
        self.related.push(RelatedLoc {
            loc,
            label: label.into(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.level.label())?;
        if let Some(code) = self.code {
            write!(f, "[{code}]")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(loc) = self.loc {
            write!(f, "\n  at: {loc}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

/// True if any diagnostic in the slice is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}
