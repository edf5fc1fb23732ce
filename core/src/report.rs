// report.rs — Structural report
//
// Enumerates the elaborated design for humans and tools: transactions with
// the methods they reach, methods with their callers, conflict edges with
// causes, the priority order, connected components, and the ambiguities
// the analysis resolved by convention (tiebreaks, priorities declared
// against definition order). Deterministically ordered throughout.

use std::fmt;

use serde::Serialize;

use crate::conflict::{ConflictCause, ConflictGraph};
use crate::diag::{DiagLevel, Diagnostic};
use crate::elab::Design;
use crate::graph::MethodMap;

// ── Report data ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TransactionEntry {
    pub name: String,
    pub location: String,
    /// Transitively called methods, in discovery order.
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodEntry {
    pub name: String,
    pub location: String,
    pub nonexclusive: bool,
    /// Transactions whose call closure includes this method.
    pub called_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictEntry {
    pub a: String,
    pub b: String,
    pub cause: String,
}

/// The complete structural report.
#[derive(Debug, Clone, Serialize)]
pub struct StructuralReport {
    pub transactions: Vec<TransactionEntry>,
    pub methods: Vec<MethodEntry>,
    pub conflicts: Vec<ConflictEntry>,
    /// Transaction names in priority order (highest priority first).
    pub priority_order: Vec<String>,
    /// Independent scheduling groups, each in priority order.
    pub components: Vec<Vec<String>>,
    /// Warning messages: ambiguities resolved by convention.
    pub ambiguities: Vec<String>,
}

// ── Construction ────────────────────────────────────────────────────────────

/// Build the structural report from the analysis artifacts.
pub fn build_report(
    design: &Design,
    map: &MethodMap,
    conflicts: &ConflictGraph,
    diagnostics: &[Diagnostic],
) -> StructuralReport {
    let t_name = |i: usize| design.transactions[i].name.clone();

    let transactions = design
        .transactions
        .iter()
        .enumerate()
        .map(|(i, body)| TransactionEntry {
            name: body.name.clone(),
            location: body.loc.to_string(),
            methods: map.methods_by_transaction[i]
                .iter()
                .map(|m| design.method(*m).name.clone())
                .collect(),
        })
        .collect();

    let methods = design
        .methods
        .iter()
        .enumerate()
        .map(|(i, slot)| MethodEntry {
            name: slot.body.name.clone(),
            location: slot.body.loc.to_string(),
            nonexclusive: slot.body.nonexclusive,
            called_by: map.transactions_by_method[i]
                .iter()
                .map(|t| t_name(t.index as usize))
                .collect(),
        })
        .collect();

    let conflict_entries = conflicts
        .edges
        .iter()
        .map(|edge| ConflictEntry {
            a: t_name(edge.a.index as usize),
            b: t_name(edge.b.index as usize),
            cause: match edge.cause {
                ConflictCause::SharedMethod(m) => {
                    format!("shared:{}", design.method(m).name)
                }
                ConflictCause::Declared => "declared".to_string(),
            },
        })
        .collect();

    let mut by_rank: Vec<usize> = (0..design.transactions.len()).collect();
    by_rank.sort_by_key(|&i| conflicts.porder[i]);
    let priority_order = by_rank.into_iter().map(t_name).collect();

    let components = conflicts
        .components
        .iter()
        .map(|cc| cc.iter().map(|t| t_name(t.index as usize)).collect())
        .collect();

    let ambiguities = diagnostics
        .iter()
        .filter(|d| d.level == DiagLevel::Warning)
        .map(|d| d.message.clone())
        .collect();

    StructuralReport {
        transactions,
        methods,
        conflicts: conflict_entries,
        priority_order,
        components,
        ambiguities,
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for StructuralReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Design structure ({} transactions, {} methods, {} conflicts, {} groups)",
            self.transactions.len(),
            self.methods.len(),
            self.conflicts.len(),
            self.components.len()
        )?;
        writeln!(f, "Transactions:")?;
        for t in &self.transactions {
            writeln!(f, "  {} ({})", t.name, t.location)?;
            for m in &t.methods {
                writeln!(f, "    calls {}", m)?;
            }
        }
        writeln!(f, "Methods:")?;
        for m in &self.methods {
            let kind = if m.nonexclusive { "nonexclusive" } else { "exclusive" };
            writeln!(f, "  {} ({}, {})", m.name, kind, m.location)?;
            for t in &m.called_by {
                writeln!(f, "    called by {}", t)?;
            }
        }
        if !self.conflicts.is_empty() {
            writeln!(f, "Conflicts:")?;
            for c in &self.conflicts {
                writeln!(f, "  {} <-> {} [{}]", c.a, c.b, c.cause)?;
            }
        }
        writeln!(f, "Priority order: {}", self.priority_order.join(" > "))?;
        for (i, cc) in self.components.iter().enumerate() {
            writeln!(f, "  group {}: {}", i, cc.join(", "))?;
        }
        if !self.ambiguities.is_empty() {
            writeln!(f, "Ambiguities:")?;
            for a in &self.ambiguities {
                writeln!(f, "  {}", a)?;
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
