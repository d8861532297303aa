//! Project Contract: the single top-level file declaring the project's
//! `mode`, parsed with the same `^key:` line-oriented stripping the rest of
//! the crate uses for task headers — no external YAML engine.

use std::path::Path;
use std::str::FromStr;

use strum::{Display, EnumString};

use super::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Empirical,
    Modeling,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct ProjectContract {
    pub mode: Mode,
    pub raw: std::collections::HashMap<String, String>,
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"') || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Strip a trailing parenthetical qualifier from a key, e.g. `Formula
/// (daily)` -> `Formula`, so a protocol doc's suffixed field still resolves
/// under its plain name.
fn strip_qualifier_suffix(key: &str) -> &str {
    match key.split_once('(') {
        Some((base, qualifier)) if qualifier.trim_end().ends_with(')') => base.trim(),
        _ => key,
    }
}

/// Parse every top-level `key: value` line in a contract-style file,
/// ignoring indented (nested) lines and `#`-to-EOL comments. A key may
/// carry a trailing parenthetical qualifier (`Formula (daily): ...`),
/// which is stripped before the key is stored.
pub fn parse_top_level_keys(text: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for line in text.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let line = strip_comment(line);
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = strip_qualifier_suffix(key.trim());
        if key.is_empty() || key.contains(' ') {
            continue;
        }
        map.insert(key.to_string(), strip_quotes(value).to_string());
    }
    map
}

impl ProjectContract {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let raw = parse_top_level_keys(&text);
        let mode_raw = raw.get("mode").ok_or_else(|| ConfigError::MissingMode { path: path.to_path_buf() })?;
        let mode = Mode::from_str(mode_raw)
            .map_err(|_| ConfigError::InvalidMode { path: path.to_path_buf(), value: mode_raw.clone() })?;
        Ok(Self { mode, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_with_parenthetical_qualifier_under_its_plain_name() {
        let text = "Formula (daily): mean(x)\n";
        let map = parse_top_level_keys(text);
        assert_eq!(map.get("Formula"), Some(&"mean(x)".to_string()));
    }

    #[test]
    fn parses_mode_and_ignores_comments_and_nested_lines() {
        let text = "mode: hybrid  # chosen at kickoff\nowner: data-team\n  nested: not-a-top-level-key\n";
        let map = parse_top_level_keys(text);
        assert_eq!(map.get("mode"), Some(&"hybrid".to_string()));
        assert_eq!(map.get("owner"), Some(&"data-team".to_string()));
        assert!(!map.contains_key("nested"));
    }

    #[test]
    fn load_rejects_invalid_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.yaml");
        std::fs::write(&path, "mode: quantum\n").unwrap();
        let err = ProjectContract::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMode { .. }));
    }

    #[test]
    fn load_parses_valid_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.yaml");
        std::fs::write(&path, "mode: empirical\n").unwrap();
        let contract = ProjectContract::load(&path).unwrap();
        assert_eq!(contract.mode, Mode::Empirical);
    }
}
