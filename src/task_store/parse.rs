//! Header grammar: `---`-delimited frontmatter with a minimal key/value
//! syntax, followed by free-form Markdown prose. No external schema/YAML
//! engine — the parser must stay hermetic and fast since the Gate Battery
//! runs it over every task file on every invocation.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::LazyLock;

use super::model::{Priority, Role, Task, TaskState};

#[derive(Debug)]
pub enum TaskParseError {
    Io { path: PathBuf, source: std::io::Error },
    MissingFrontmatter { path: PathBuf },
    MissingKey { path: PathBuf, key: &'static str },
    InvalidEnum { path: PathBuf, key: &'static str, value: String },
}

impl fmt::Display for TaskParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskParseError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            TaskParseError::MissingFrontmatter { path } => {
                write!(f, "{}: missing --- delimited frontmatter header", path.display())
            }
            TaskParseError::MissingKey { path, key } => {
                write!(f, "{}: missing or invalid frontmatter key `{key}`", path.display())
            }
            TaskParseError::InvalidEnum { path, key, value } => {
                write!(f, "{}: frontmatter key `{key}` has invalid value `{value}`", path.display())
            }
        }
    }
}

impl std::error::Error for TaskParseError {}

/// One frontmatter value: a scalar or a list.
#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    List(Vec<String>),
}

fn strip_comment(line: &str) -> &str {
    // `#` starts a comment unless inside a quoted scalar. Frontmatter lines
    // here are simple enough that we only need to track one quote state.
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &line[..i],
            _ => {}
        }
    }
    line
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// Parse the `---`-delimited frontmatter block into a key/value map.
///
/// Supports three shapes: `key: scalar`, `key: [a, b, c]`, and `key:`
/// followed by indented `- item` continuation lines.
fn parse_frontmatter(text: &str) -> Option<HashMap<String, Value>> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 3 || lines[0].trim() != "---" {
        return None;
    }
    let end_idx = lines[1..].iter().position(|l| l.trim() == "---")? + 1;

    let mut data: HashMap<String, Value> = HashMap::new();
    let mut current_list_key: Option<String> = None;

    for raw_line in &lines[1..end_idx] {
        let line = strip_comment(raw_line).trim_end();
        if line.trim().is_empty() {
            continue;
        }

        if let Some(rest) = line.trim_start().strip_prefix("- ") {
            if let Some(key) = &current_list_key {
                let item = strip_quotes(rest);
                if let Some(Value::List(items)) = data.get_mut(key) {
                    items.push(item);
                }
                continue;
            }
        }

        current_list_key = None;
        let Some((key, rest)) = line.split_once(':') else { continue };
        let key = key.trim().to_string();
        let rest = rest.trim();

        if rest.is_empty() {
            data.insert(key.clone(), Value::List(Vec::new()));
            current_list_key = Some(key);
            continue;
        }

        if let Some(inner) = rest.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let items: Vec<String> = inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(strip_quotes)
                .collect();
            data.insert(key, Value::List(items));
            continue;
        }

        data.insert(key, Value::Scalar(strip_quotes(rest)));
    }

    Some(data)
}

fn get_scalar(data: &HashMap<String, Value>, key: &str) -> Option<String> {
    match data.get(key) {
        Some(Value::Scalar(s)) => Some(s.clone()),
        _ => None,
    }
}

fn get_list(data: &HashMap<String, Value>, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::List(items)) => items.clone(),
        Some(Value::Scalar(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn get_bool(data: &HashMap<String, Value>, key: &str) -> bool {
    match get_scalar(data, key).as_deref() {
        Some("true") | Some("yes") => true,
        _ => false,
    }
}

static STATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*-\s*State:\s*(\S+)\s*$").unwrap());
static LAST_UPDATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-\s*Last updated:\s*(\d{4}-\d{2}-\d{2})\s*$").unwrap());

pub fn parse_state_line(text: &str) -> Option<String> {
    STATE_RE.captures(text).map(|c| c[1].to_string())
}

pub fn parse_last_updated_line(text: &str) -> Option<String> {
    LAST_UPDATED_RE.captures(text).map(|c| c[1].to_string())
}

/// Parse a task descriptor file from disk.
pub fn load_task(path: &Path) -> Result<Task, TaskParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| TaskParseError::Io { path: path.to_path_buf(), source })?;
    parse_task_text(path, &text)
}

pub fn parse_task_text(path: &Path, text: &str) -> Result<Task, TaskParseError> {
    let data = parse_frontmatter(text).ok_or_else(|| TaskParseError::MissingFrontmatter { path: path.to_path_buf() })?;

    let task_id = get_scalar(&data, "task_id").ok_or(TaskParseError::MissingKey { path: path.to_path_buf(), key: "task_id" })?;
    let title = get_scalar(&data, "title").ok_or(TaskParseError::MissingKey { path: path.to_path_buf(), key: "title" })?;
    let workstream =
        get_scalar(&data, "workstream").ok_or(TaskParseError::MissingKey { path: path.to_path_buf(), key: "workstream" })?;

    let role_raw = get_scalar(&data, "role").ok_or(TaskParseError::MissingKey { path: path.to_path_buf(), key: "role" })?;
    let role: Role = role_raw
        .parse()
        .map_err(|_| TaskParseError::InvalidEnum { path: path.to_path_buf(), key: "role", value: role_raw.clone() })?;

    let priority_raw =
        get_scalar(&data, "priority").ok_or(TaskParseError::MissingKey { path: path.to_path_buf(), key: "priority" })?;
    let priority: Priority = priority_raw.to_lowercase().parse().map_err(|_| TaskParseError::InvalidEnum {
        path: path.to_path_buf(),
        key: "priority",
        value: priority_raw.clone(),
    })?;

    let dependencies = get_list(&data, "dependencies");
    let parallel_ok = get_bool(&data, "parallel_ok");
    let allowed_paths = get_list(&data, "allowed_paths");
    let disallowed_paths = get_list(&data, "disallowed_paths");
    let outputs = get_list(&data, "outputs");
    let gates = get_list(&data, "gates");
    let stop_conditions = get_list(&data, "stop_conditions");

    let state_raw = parse_state_line(text);
    let state = state_raw.as_deref().and_then(super::model::parse_state);
    let last_updated = parse_last_updated_line(text);

    Ok(Task {
        path: path.to_path_buf(),
        task_id,
        title,
        workstream,
        role,
        priority,
        dependencies,
        parallel_ok,
        allowed_paths,
        disallowed_paths,
        outputs,
        gates,
        stop_conditions,
        state,
        state_raw,
        last_updated,
    })
}

/// Surgically rewrite the `State` and `Last updated` lines and append a
/// note under "## Notes / Decisions", preserving all other bytes verbatim.
///
/// Fails if any of the three anchors cannot be found.
pub fn update_state_and_append_note(text: &str, new_state: TaskState, today: &str, note_line: &str) -> Result<String, &'static str> {
    if !STATE_RE.is_match(text) {
        return Err("could not find State line to update");
    }
    let text = replace_first_match(text, &STATE_RE, &format!("- State: {new_state}"));

    if !LAST_UPDATED_RE.is_match(&text) {
        return Err("could not find Last updated line to update");
    }
    let text = replace_first_match(&text, &LAST_UPDATED_RE, &format!("- Last updated: {today}"));

    let marker = "## Notes / Decisions";
    let Some(idx) = text.find(marker) else {
        return Err("could not find Notes / Decisions heading");
    };
    let insert_at = idx + marker.len();
    let mut out = String::with_capacity(text.len() + note_line.len() + 16);
    out.push_str(&text[..insert_at]);
    out.push_str(&format!("\n\n- {today}: {note_line}"));
    out.push_str(text[insert_at..].trim_start_matches(['\n']));
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn replace_first_match(text: &str, re: &Regex, replacement: &str) -> String {
    re.replacen(text, 1, replacement).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const FIXTURE: &str = r#"---
task_id: T001
title: Build ingest pipeline
workstream: W1
role: Worker
priority: high
dependencies: [T000]
parallel_ok: true
allowed_paths:
  - src/etl/
disallowed_paths: []
outputs: [data/raw.json]
gates:
  - cargo test
stop_conditions: [gates pass]
---

## Status

- State: backlog
- Last updated: 2026-01-01

## Notes / Decisions

- 2026-01-01: created
"#;

    #[test]
    fn parses_all_shapes() {
        let task = parse_task_text(&PathBuf::from("T001_ingest.md"), FIXTURE).unwrap();
        assert_eq!(task.task_id, "T001");
        assert_eq!(task.workstream, "W1");
        assert_eq!(task.role, Role::Worker);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.dependencies, vec!["T000"]);
        assert!(task.parallel_ok);
        assert_eq!(task.allowed_paths, vec!["src/etl/"]);
        assert!(task.disallowed_paths.is_empty());
        assert_eq!(task.gates, vec!["cargo test"]);
        assert_eq!(task.state, Some(TaskState::Backlog));
        assert_eq!(task.last_updated.as_deref(), Some("2026-01-01"));
    }

    #[test]
    fn missing_frontmatter_is_an_error() {
        let err = parse_task_text(&PathBuf::from("x.md"), "no frontmatter here").unwrap_err();
        assert!(matches!(err, TaskParseError::MissingFrontmatter { .. }));
    }

    #[test]
    fn surgical_update_preserves_other_bytes() {
        let updated = update_state_and_append_note(FIXTURE, TaskState::Active, "2026-02-02", "claimed").unwrap();
        assert!(updated.contains("- State: active"));
        assert!(updated.contains("- Last updated: 2026-02-02"));
        assert!(updated.contains("- 2026-02-02: claimed"));
        // Original note is preserved.
        assert!(updated.contains("- 2026-01-01: created"));
        // Unrelated header content untouched.
        assert!(updated.contains("task_id: T001"));
    }

    #[test]
    fn surgical_update_fails_without_anchors() {
        let text = "---\ntask_id: T001\n---\nno anchors here";
        assert!(update_state_and_append_note(text, TaskState::Done, "2026-01-01", "x").is_err());
    }
}
