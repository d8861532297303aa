//! The twelve named gates, in catalog order.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Command;

use regex::Regex;
use serde_json::json;

use crate::config::{Mode, parse_top_level_keys};
use crate::task_store;

use super::{GateCtx, GateResult};

pub const CONTRACTS_DIR: &str = "contracts";
pub const PROJECT_CONTRACT_PATH: &str = "contracts/project.yaml";
pub const DECISIONS_PATH: &str = "contracts/decisions.md";
pub const CHANGELOG_PATH: &str = "contracts/CHANGELOG.md";
pub const PROTOCOL_DOC_PATH: &str = "docs/protocol.md";
pub const REGISTRY_DIR: &str = "registry";
pub const REGISTRY_CHANGELOG_PATH: &str = "registry/CHANGELOG.md";
pub const RAW_MANIFEST_DIR: &str = "data/raw_manifest";
pub const PANEL_SCHEMA_PATH: &str = "contracts/panel_schema_str_v1.yaml";
pub const SAMPLE_PANEL_PATH: &str = "data/sample_panel.csv";

const MODEL_SPEC_CANDIDATES: [&str; 3] = ["docs/model_spec.md", "docs/model_spec.yaml", "docs/model_spec.yml"];
const ENVIRONMENT_CANDIDATES: [&str; 4] = ["environment.yml", "requirements.txt", "Cargo.lock", "poetry.lock"];

pub type GateFn = fn(&GateCtx) -> GateResult;

pub const ALL_GATES: [GateFn; 12] = [
    repo_structure,
    project_contract,
    environment,
    protocol_complete,
    model_spec_complete,
    workstreams_complete,
    task_hygiene,
    task_dependencies,
    contract_change_discipline,
    registry_change_discipline,
    raw_manifest_validity,
    panel_schema_nonempty,
];

// `sample_panel_integrity` is catalog entry #13 in spec.md, run separately
// from the fixed-size array above because it is conditional on file
// presence rather than mode; the binary entry point runs it alongside the
// twelve above. See `sample_panel_integrity` below.

fn base_required_paths(mode: Option<Mode>) -> Vec<&'static str> {
    let mut required = vec![PROTOCOL_DOC_PATH, "AGENTS.md", "tasks"];
    match mode {
        Some(Mode::Empirical) => required.push(RAW_MANIFEST_DIR),
        Some(Mode::Modeling) => required.push("docs/model_spec.md"),
        Some(Mode::Hybrid) => {
            required.push(RAW_MANIFEST_DIR);
            required.push("docs/model_spec.md");
        }
        None => {}
    }
    required
}

fn repo_structure(ctx: &GateCtx) -> GateResult {
    let required = base_required_paths(ctx.mode);
    let missing: Vec<&str> = required.iter().copied().filter(|p| !ctx.repo_root.join(p).exists()).collect();
    if missing.is_empty() {
        GateResult::pass("repo_structure", json!({ "missing": Vec::<String>::new() }))
    } else {
        GateResult::fail("repo_structure", json!({ "missing": missing }))
    }
}

fn project_contract(ctx: &GateCtx) -> GateResult {
    let path = ctx.repo_root.join(PROJECT_CONTRACT_PATH);
    if !path.exists() {
        return GateResult::fail("project_contract", json!({ "reason": "missing", "path": PROJECT_CONTRACT_PATH }));
    }
    match task_store_mode_of(&path) {
        Some(_) => GateResult::pass("project_contract", json!({ "path": PROJECT_CONTRACT_PATH })),
        None => GateResult::fail("project_contract", json!({ "reason": "missing_or_invalid_mode", "path": PROJECT_CONTRACT_PATH })),
    }
}

fn task_store_mode_of(path: &Path) -> Option<Mode> {
    let text = std::fs::read_to_string(path).ok()?;
    let map = parse_top_level_keys(&text);
    map.get("mode").and_then(|m| m.parse().ok())
}

fn environment(ctx: &GateCtx) -> GateResult {
    let found: Vec<&str> = ENVIRONMENT_CANDIDATES.iter().copied().filter(|p| ctx.repo_root.join(p).exists()).collect();
    if found.is_empty() {
        return GateResult::fail("environment", json!({ "reason": "no_pinned_environment_descriptor_found" }));
    }
    GateResult::pass(
        "environment",
        json!({
            "descriptors": found,
            "cargo_pkg_version": env!("CARGO_PKG_VERSION"),
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }),
    )
}

static PROTOCOL_SECTIONS: [&str; 4] = ["## Description", "## Collection", "## Caveats", "## Change Log"];

fn protocol_complete(ctx: &GateCtx) -> GateResult {
    if ctx.mode == Some(Mode::Modeling) {
        return GateResult::skipped("protocol_complete", "mode is modeling");
    }
    let path = ctx.repo_root.join(PROTOCOL_DOC_PATH);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return GateResult::fail("protocol_complete", json!({ "reason": "missing", "path": PROTOCOL_DOC_PATH }));
    };

    let map = parse_top_level_keys(&text);
    let mut missing_fields = Vec::new();
    for field in ["Name", "Formula", "Units"] {
        let present = map.get(field).map(|v| !v.trim().is_empty()).unwrap_or(false);
        if !present {
            missing_fields.push(field);
        }
    }

    let mode_line_ok = match ctx.mode {
        Some(mode) => text.lines().any(|l| {
            let l = l.trim();
            l.strip_prefix("- Mode:").map(|v| v.trim() == mode.to_string()).unwrap_or(false)
        }),
        None => false,
    };

    let empty_sections = PROTOCOL_SECTIONS.iter().filter(|heading| !section_has_content(&text, heading)).collect::<Vec<_>>();

    let ok = missing_fields.is_empty() && mode_line_ok && empty_sections.is_empty();
    if ok {
        GateResult::pass("protocol_complete", json!({}))
    } else {
        GateResult::fail(
            "protocol_complete",
            json!({ "missing_fields": missing_fields, "mode_line_ok": mode_line_ok, "empty_sections": empty_sections }),
        )
    }
}

/// Whether `text` contains the `##` section named `heading` with at least
/// one alphanumeric line before the next `## ` heading or EOF.
fn section_has_content(text: &str, heading: &str) -> bool {
    let Some(start) = text.find(heading) else { return false };
    let after = &text[start + heading.len()..];
    let body = match after.find("\n## ") {
        Some(idx) => &after[..idx],
        None => after,
    };
    body.lines().any(|l| l.chars().any(|c| c.is_alphanumeric()))
}

static MODEL_SPEC_SECTIONS: [&str; 9] =
    ["## Outcome", "## Predictors", "## Functional Form", "## Estimation", "## Identification", "## Diagnostics", "## Robustness", "## Limitations", "## Outputs"];

fn model_spec_complete(ctx: &GateCtx) -> GateResult {
    if !matches!(ctx.mode, Some(Mode::Modeling) | Some(Mode::Hybrid)) {
        return GateResult::skipped("model_spec_complete", "mode does not require a model spec");
    }
    let Some(found) = MODEL_SPEC_CANDIDATES.iter().map(|p| ctx.repo_root.join(p)).find(|p| p.exists()) else {
        return GateResult::fail("model_spec_complete", json!({ "reason": "missing", "candidates": MODEL_SPEC_CANDIDATES }));
    };

    let is_markdown = found.extension().is_some_and(|ext| ext == "md");
    let Ok(text) = std::fs::read_to_string(&found) else {
        return GateResult::fail("model_spec_complete", json!({ "reason": "unreadable", "path": found }));
    };

    if !is_markdown {
        return if text.trim().is_empty() {
            GateResult::fail("model_spec_complete", json!({ "reason": "empty", "path": found }))
        } else {
            GateResult::pass("model_spec_complete", json!({ "path": found }))
        };
    }

    let empty_sections: Vec<&str> = MODEL_SPEC_SECTIONS.iter().filter(|h| !section_has_content(&text, h)).copied().collect();
    if empty_sections.is_empty() {
        GateResult::pass("model_spec_complete", json!({ "path": found }))
    } else {
        GateResult::fail("model_spec_complete", json!({ "path": found, "empty_sections": empty_sections }))
    }
}

fn workstreams_complete(ctx: &GateCtx) -> GateResult {
    let path = ctx.repo_root.join("tasks").join("workstreams.md");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return GateResult::fail("workstreams_complete", json!({ "reason": "missing", "path": "tasks/workstreams.md" }));
    };

    let row_re = Regex::new(r"^\|\s*W\d+\s+").unwrap();
    let mut row_count = 0usize;
    let mut bad_rows = Vec::new();
    for line in text.lines() {
        if !row_re.is_match(line) {
            continue;
        }
        row_count += 1;
        let cells: Vec<&str> = line.trim().trim_matches('|').split('|').map(str::trim).collect();
        let blank_in_first_four = cells.iter().take(4).any(|c| c.is_empty());
        if cells.len() < 6 || blank_in_first_four {
            bad_rows.push(line.trim().to_string());
        }
    }

    if row_count == 0 {
        GateResult::fail("workstreams_complete", json!({ "reason": "no_workstream_rows" }))
    } else if !bad_rows.is_empty() {
        GateResult::fail("workstreams_complete", json!({ "bad_rows": bad_rows }))
    } else {
        GateResult::pass("workstreams_complete", json!({ "row_count": row_count }))
    }
}

/// The six `##` headings every task descriptor's prose body must carry,
/// each with at least one non-blank line of content.
static TASK_HEADINGS: [&str; 6] = ["## Objective", "## Scope", "## Acceptance Criteria", "## Dependencies", "## Status", "## Notes / Decisions"];

fn task_hygiene(ctx: &GateCtx) -> GateResult {
    let (tasks, parse_errors) = task_store::list_tasks(&ctx.repo_root.join("tasks"));
    let mut problems: Vec<String> = parse_errors.iter().map(|e| e.to_string()).collect();

    let workstream_re = Regex::new(r"^W\d+$").unwrap();
    for task in &tasks {
        let stem = task.path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if !stem.starts_with(&format!("{}_", task.task_id)) && stem != task.task_id {
            problems.push(format!("{}: task_id is not the filename prefix", task.path.display()));
        }
        if !workstream_re.is_match(&task.workstream) {
            problems.push(format!("{}: workstream `{}` does not match W\\d+", task.path.display(), task.workstream));
        }
        if task.state.is_none() {
            problems.push(format!("{}: State line missing or unparseable", task.path.display()));
        }
        match &task.last_updated {
            Some(date) if is_iso_date(date) => {}
            _ => problems.push(format!("{}: Last-updated line missing or not ISO date", task.path.display())),
        }

        if let Ok(text) = std::fs::read_to_string(&task.path) {
            let missing_headings: Vec<&str> = TASK_HEADINGS.iter().copied().filter(|h| !section_has_content(&text, h)).collect();
            if !missing_headings.is_empty() {
                problems.push(format!("{}: missing or empty headings {:?}", task.path.display(), missing_headings));
            }
        } else {
            problems.push(format!("{}: unreadable", task.path.display()));
        }
    }

    if problems.is_empty() {
        GateResult::pass("task_hygiene", json!({ "task_count": tasks.len() }))
    } else {
        GateResult::fail("task_hygiene", json!({ "problems": problems }))
    }
}

fn is_iso_date(s: &str) -> bool {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap().is_match(s)
}

fn task_dependencies(ctx: &GateCtx) -> GateResult {
    let (tasks, _) = task_store::list_tasks(&ctx.repo_root.join("tasks"));
    let id_re = Regex::new(r"^T\d{3}$").unwrap();

    let known: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut problems = Vec::new();

    for task in &tasks {
        for dep in &task.dependencies {
            if !id_re.is_match(dep) {
                problems.push(format!("{}: dependency `{dep}` does not match T\\d{{3}}", task.task_id));
                continue;
            }
            if dep == &task.task_id {
                problems.push(format!("{}: self-dependency", task.task_id));
                continue;
            }
            if !known.contains(dep.as_str()) {
                problems.push(format!("{}: dependency `{dep}` does not resolve", task.task_id));
                continue;
            }
            edges.entry(task.task_id.as_str()).or_default().push(dep.as_str());
        }
    }

    if let Some(cycle) = find_cycle(&edges, tasks.iter().map(|t| t.task_id.as_str())) {
        problems.push(format!("dependency_cycle:{}", cycle.join("->")));
    }

    if problems.is_empty() {
        GateResult::pass("task_dependencies", json!({ "task_count": tasks.len() }))
    } else {
        GateResult::fail("task_dependencies", json!({ "problems": problems }))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Coloured DFS (white/grey/black); returns the cycle path on the first
/// back-edge found.
fn find_cycle<'a>(edges: &HashMap<&'a str, Vec<&'a str>>, nodes: impl Iterator<Item = &'a str>) -> Option<Vec<&'a str>> {
    let mut color: HashMap<&str, Color> = nodes.map(|n| (n, Color::White)).collect();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        color: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        color.insert(node, Color::Grey);
        stack.push(node);
        if let Some(deps) = edges.get(node) {
            for &dep in deps {
                match color.get(dep).copied().unwrap_or(Color::White) {
                    Color::Grey => {
                        let start = stack.iter().position(|n| *n == dep).unwrap_or(0);
                        let mut cycle: Vec<&str> = stack[start..].to_vec();
                        cycle.push(dep);
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = visit(dep, edges, color, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        stack.pop();
        color.insert(node, Color::Black);
        None
    }

    let white_nodes: Vec<&str> = color.iter().filter(|(_, c)| **c == Color::White).map(|(n, _)| *n).collect();
    for node in white_nodes {
        if color.get(node).copied() == Some(Color::White)
            && let Some(cycle) = visit(node, edges, &mut color, &mut stack)
        {
            return Some(cycle);
        }
    }
    None
}

fn resolve_base_ref(ctx: &GateCtx) -> Option<String> {
    if let Ok(base) = std::env::var("GATE_BASE_REF") {
        return ref_exists(&ctx.repo_root, &base).then_some(base);
    }
    for candidate in ["origin/main", "main"] {
        if ref_exists(&ctx.repo_root, candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

fn ref_exists(repo_root: &Path, reference: &str) -> bool {
    Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", reference])
        .current_dir(repo_root)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn changed_paths(repo_root: &Path, base_ref: &str) -> Vec<String> {
    let output = Command::new("git").args(["diff", "--name-only", base_ref, "--"]).current_dir(repo_root).output();
    match output {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).lines().map(str::to_string).collect()
        }
        _ => Vec::new(),
    }
}

fn change_discipline(ctx: &GateCtx, name: &'static str, watched_dir: &str, extra_watched_file: Option<&str>, required_updates: &[&str]) -> GateResult {
    let Some(base_ref) = resolve_base_ref(ctx) else {
        return GateResult::skipped(name, "no base ref resolvable");
    };
    let changed = changed_paths(&ctx.repo_root, &base_ref);
    let changed_set: HashSet<&str> = changed.iter().map(String::as_str).collect();

    let dir_prefix = format!("{watched_dir}/");
    let touches_watched = changed.iter().any(|p| {
        let under_dir = p.starts_with(&dir_prefix) && !required_updates.contains(&p.as_str());
        let is_extra_file = extra_watched_file.is_some_and(|f| f == p);
        under_dir || is_extra_file
    });

    if !touches_watched {
        return GateResult::pass(name, json!({ "base_ref": base_ref, "touched": false }));
    }

    let missing: Vec<&str> = required_updates.iter().copied().filter(|p| !changed_set.contains(p)).collect();
    if missing.is_empty() {
        GateResult::pass(name, json!({ "base_ref": base_ref, "touched": true }))
    } else {
        GateResult::fail(name, json!({ "base_ref": base_ref, "missing_required_updates": missing }))
    }
}

fn contract_change_discipline(ctx: &GateCtx) -> GateResult {
    change_discipline(ctx, "contract_change_discipline", CONTRACTS_DIR, Some(PROTOCOL_DOC_PATH), &[DECISIONS_PATH, CHANGELOG_PATH])
}

fn registry_change_discipline(ctx: &GateCtx) -> GateResult {
    change_discipline(ctx, "registry_change_discipline", REGISTRY_DIR, None, &[REGISTRY_CHANGELOG_PATH])
}

fn raw_manifest_validity(ctx: &GateCtx) -> GateResult {
    let dir = ctx.repo_root.join(RAW_MANIFEST_DIR);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return GateResult::pass("raw_manifest_validity", json!({ "checked": 0 }));
    };

    let sha_re = Regex::new(r"^[0-9a-f]{64}$").unwrap();
    let mut problems = Vec::new();
    let mut checked = 0usize;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        checked += 1;
        let Ok(text) = std::fs::read_to_string(&path) else {
            problems.push(format!("{}: unreadable", path.display()));
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            problems.push(format!("{}: invalid JSON", path.display()));
            continue;
        };
        let Some(obj) = value.as_object() else {
            problems.push(format!("{}: top-level value is not an object", path.display()));
            continue;
        };
        for key in ["source", "as_of_utc_date", "fetched_at_utc", "command", "files", "environment"] {
            if !obj.contains_key(key) {
                problems.push(format!("{}: missing top-level key `{key}`", path.display()));
            }
        }
        let Some(files) = obj.get("files").and_then(|v| v.as_array()) else { continue };
        for (i, file) in files.iter().enumerate() {
            let Some(file_obj) = file.as_object() else {
                problems.push(format!("{}: files[{i}] is not an object", path.display()));
                continue;
            };
            for key in ["path", "sha256", "bytes"] {
                if !file_obj.contains_key(key) {
                    problems.push(format!("{}: files[{i}] missing `{key}`", path.display()));
                }
            }
            if let Some(sha) = file_obj.get("sha256").and_then(|v| v.as_str())
                && !sha_re.is_match(sha)
            {
                problems.push(format!("{}: files[{i}] sha256 `{sha}` is not 64 lowercase hex chars", path.display()));
            }
        }
    }

    if problems.is_empty() {
        GateResult::pass("raw_manifest_validity", json!({ "checked": checked }))
    } else {
        GateResult::fail("raw_manifest_validity", json!({ "checked": checked, "problems": problems }))
    }
}

fn panel_schema_nonempty(ctx: &GateCtx) -> GateResult {
    if ctx.mode == Some(Mode::Modeling) {
        return GateResult::skipped("panel_schema_nonempty", "mode is modeling");
    }
    let path = ctx.repo_root.join(PANEL_SCHEMA_PATH);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return GateResult::fail("panel_schema_nonempty", json!({ "reason": "missing", "path": PANEL_SCHEMA_PATH }));
    };
    let has_key_line = text.lines().any(|l| {
        let l = l.trim();
        !l.is_empty() && !l.starts_with('#') && !l.starts_with(char::is_whitespace) && l.contains(':')
    });
    if has_key_line {
        GateResult::pass("panel_schema_nonempty", json!({ "path": PANEL_SCHEMA_PATH }))
    } else {
        GateResult::fail("panel_schema_nonempty", json!({ "reason": "no_top_level_keys", "path": PANEL_SCHEMA_PATH }))
    }
}

/// Run separately from [`ALL_GATES`]: conditional on the sample panel file
/// being present at all, per spec.md's `sample file present` condition.
pub fn sample_panel_integrity(ctx: &GateCtx) -> GateResult {
    let path = ctx.repo_root.join(SAMPLE_PANEL_PATH);
    if !path.exists() {
        return GateResult::skipped("sample_panel_integrity", "no sample panel file present");
    }
    let Ok(text) = std::fs::read_to_string(&path) else {
        return GateResult::fail("sample_panel_integrity", json!({ "reason": "unreadable", "path": SAMPLE_PANEL_PATH }));
    };

    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return GateResult::fail("sample_panel_integrity", json!({ "reason": "empty_file" }));
    };
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();

    let required_columns = ["entity_id", "period"];
    let missing_columns: Vec<&str> = required_columns.iter().copied().filter(|c| !columns.contains(c)).collect();
    if !missing_columns.is_empty() {
        return GateResult::fail("sample_panel_integrity", json!({ "missing_columns": missing_columns }));
    }

    let numeric_columns: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !required_columns.contains(name))
        .map(|(i, _)| i)
        .collect();

    let mut problems = Vec::new();
    for (row_idx, line) in lines.take(2000).enumerate() {
        let cells: Vec<&str> = line.split(',').collect();
        for &col in &numeric_columns {
            let Some(cell) = cells.get(col) else { continue };
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(v) if v >= 0.0 => {}
                Ok(_) => problems.push(format!("row {row_idx}: column {} is negative", columns[col])),
                Err(_) => problems.push(format!("row {row_idx}: column {} is not numeric", columns[col])),
            }
        }
    }

    if problems.is_empty() {
        GateResult::pass("sample_panel_integrity", json!({ "path": SAMPLE_PANEL_PATH }))
    } else {
        GateResult::fail("sample_panel_integrity", json!({ "problems": problems }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_detection_finds_injected_cycle() {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        edges.insert("T100", vec!["T101"]);
        edges.insert("T101", vec!["T100"]);
        let cycle = find_cycle(&edges, ["T100", "T101"].into_iter());
        assert!(cycle.is_some());
        let cycle = cycle.unwrap();
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn cycle_detection_accepts_dag() {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        edges.insert("T002", vec!["T001"]);
        let cycle = find_cycle(&edges, ["T001", "T002"].into_iter());
        assert!(cycle.is_none());
    }

    #[test]
    fn repo_structure_reports_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = GateCtx { repo_root: dir.path().to_path_buf(), mode: None };
        let result = repo_structure(&ctx);
        assert!(!result.ok);
    }

    #[test]
    fn sample_panel_skips_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = GateCtx { repo_root: dir.path().to_path_buf(), mode: None };
        let result = sample_panel_integrity(&ctx);
        assert!(result.ok);
        assert_eq!(result.details["skipped"], true);
    }

    #[test]
    fn sample_panel_flags_negative_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join(SAMPLE_PANEL_PATH), "entity_id,period,value\nA,2026-01,-1.0\n").unwrap();
        let ctx = GateCtx { repo_root: dir.path().to_path_buf(), mode: None };
        let result = sample_panel_integrity(&ctx);
        assert!(!result.ok);
    }

    fn write_task_with_headings(dir: &Path, headings: &[&str]) {
        let tasks_dir = dir.join("tasks").join("backlog");
        std::fs::create_dir_all(&tasks_dir).unwrap();
        let mut body = "---\ntask_id: T001\ntitle: Demo\nworkstream: W1\nrole: Worker\npriority: medium\n---\n\n".to_string();
        for heading in headings {
            body.push_str(heading);
            if *heading == "## Status" {
                body.push_str("\n\n- State: backlog\n- Last updated: 2026-01-01\n\n");
            } else {
                body.push_str("\n\nsome content\n\n");
            }
        }
        std::fs::write(tasks_dir.join("T001_demo.md"), body).unwrap();
    }

    #[test]
    fn task_hygiene_fails_when_headings_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_task_with_headings(dir.path(), &["## Status", "## Notes / Decisions"]);
        let ctx = GateCtx { repo_root: dir.path().to_path_buf(), mode: None };
        let result = task_hygiene(&ctx);
        assert!(!result.ok);
    }

    #[test]
    fn task_hygiene_passes_with_all_six_headings() {
        let dir = tempfile::tempdir().unwrap();
        write_task_with_headings(dir.path(), &TASK_HEADINGS);
        let ctx = GateCtx { repo_root: dir.path().to_path_buf(), mode: None };
        let result = task_hygiene(&ctx);
        assert!(result.ok, "{:?}", result.details);
    }
}
