//! The deterministic, offline Gate Battery.
//!
//! Every gate is a pure function of the repository tree (plus, for the two
//! diff-based gates, a resolved base ref) and returns a [`GateResult`]. They
//! are independent and read-only, so [`run_all`] executes them in parallel
//! with `rayon` rather than a hand-rolled thread pool.

mod catalog;

use std::path::PathBuf;

use serde_json::json;

use crate::config::Mode;

pub use catalog::{PROJECT_CONTRACT_PATH, SAMPLE_PANEL_PATH, sample_panel_integrity};

#[derive(Debug, Clone)]
pub struct GateCtx {
    pub repo_root: PathBuf,
    pub mode: Option<Mode>,
}

#[derive(Debug, Clone)]
pub struct GateResult {
    pub name: &'static str,
    pub ok: bool,
    pub details: serde_json::Value,
}

impl GateResult {
    pub fn pass(name: &'static str, details: serde_json::Value) -> Self {
        Self { name, ok: true, details }
    }

    pub fn fail(name: &'static str, details: serde_json::Value) -> Self {
        Self { name, ok: false, details }
    }

    pub fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, ok: true, details: json!({ "skipped": true, "reason": reason }) }
    }
}

/// Run every gate in the catalog. Conditional gates (mode-gated, or
/// requiring a resolvable base ref) report `skipped: true` rather than
/// being omitted, so callers always see one result per catalog entry.
pub fn run_all(ctx: &GateCtx) -> Vec<GateResult> {
    use rayon::prelude::*;
    catalog::ALL_GATES.par_iter().map(|gate_fn| gate_fn(ctx)).collect()
}
