//! The Manifest Tool: hashes a data snapshot directory and emits the Raw
//! Manifest JSON document described in spec.md §3.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug)]
pub enum ManifestError {
    OutsideRepoRoot { path: PathBuf, repo_root: PathBuf },
    Io { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::OutsideRepoRoot { path, repo_root } => {
                write!(f, "{} is not inside repository root {}", path.display(), repo_root.display())
            }
            ManifestError::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl std::error::Error for ManifestError {}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct RawManifest {
    pub source: String,
    pub as_of_utc_date: String,
    pub fetched_at_utc: String,
    pub command: String,
    pub files: Vec<FileEntry>,
    pub environment: BTreeMap<String, String>,
}

const CHUNK_SIZE: usize = 1024 * 1024;

fn sha256_file(path: &Path) -> Result<(String, u64), ManifestError> {
    let mut file = std::fs::File::open(path).map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// Fail if `path` (once canonicalized) does not live inside `repo_root`.
fn ensure_within_repo(path: &Path, repo_root: &Path) -> Result<PathBuf, ManifestError> {
    let canonical_root = dunce::canonicalize(repo_root).map_err(|source| ManifestError::Io { path: repo_root.to_path_buf(), source })?;
    let canonical_path = dunce::canonicalize(path).map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
    if !canonical_path.starts_with(&canonical_root) {
        return Err(ManifestError::OutsideRepoRoot { path: canonical_path, repo_root: canonical_root });
    }
    Ok(canonical_path)
}

fn walk_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn runtime_environment() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("cargo_pkg_version".to_string(), env!("CARGO_PKG_VERSION").to_string());
    env.insert("platform".to_string(), std::env::consts::OS.to_string());
    env.insert("arch".to_string(), std::env::consts::ARCH.to_string());
    env
}

/// `as-of` inferred from the snapshot directory basename when it matches
/// `YYYY-MM-DD`.
pub fn infer_as_of_date(snapshot_dir: &Path) -> Option<String> {
    let name = snapshot_dir.file_name()?.to_str()?;
    let re = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    re.is_match(name).then(|| name.to_string())
}

pub struct BuildManifestArgs<'a> {
    pub source: &'a str,
    pub snapshot_dir: &'a Path,
    pub repo_root: &'a Path,
    pub as_of_utc_date: &'a str,
    pub fetched_at_utc: &'a str,
    pub command: &'a str,
}

pub fn build_manifest(args: &BuildManifestArgs) -> Result<RawManifest, ManifestError> {
    let canonical_snapshot = ensure_within_repo(args.snapshot_dir, args.repo_root)?;
    let canonical_root = dunce::canonicalize(args.repo_root).map_err(|source| ManifestError::Io { path: args.repo_root.to_path_buf(), source })?;

    let paths = walk_files(&canonical_snapshot).map_err(|source| ManifestError::Io { path: canonical_snapshot.clone(), source })?;

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let (sha256, bytes) = sha256_file(&path)?;
        let relative = path.strip_prefix(&canonical_root).unwrap_or(&path);
        files.push(FileEntry { path: relative.to_string_lossy().replace('\\', "/"), sha256, bytes });
    }

    Ok(RawManifest {
        source: args.source.to_string(),
        as_of_utc_date: args.as_of_utc_date.to_string(),
        fetched_at_utc: args.fetched_at_utc.to_string(),
        command: args.command.to_string(),
        files,
        environment: runtime_environment(),
    })
}

/// Serialize with keys sorted lexicographically, 2-space indentation, and a
/// trailing newline.
pub fn to_sorted_json(manifest: &RawManifest) -> anyhow::Result<String> {
    let value = serde_json::to_value(manifest)?;
    let sorted = sort_json_keys(value);
    let mut s = serde_json::to_string_pretty(&sorted)?;
    s.push('\n');
    Ok(s)
}

fn sort_json_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> = map.into_iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            serde_json::to_value(sorted).unwrap()
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.into_iter().map(sort_json_keys).collect()),
        other => other,
    }
}

pub fn default_output_path(repo_root: &Path, source: &str, as_of_utc_date: &str) -> PathBuf {
    repo_root.join("data").join("raw_manifest").join(format!("{source}_{as_of_utc_date}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_match_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        let (digest, bytes) = sha256_file(&dir.path().join("a.txt")).unwrap();
        assert_eq!(bytes, 6);
        assert_eq!(digest, "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03");
    }

    #[test]
    fn rejects_snapshot_dir_outside_repo_root() {
        let repo = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let args = BuildManifestArgs {
            source: "demo",
            snapshot_dir: outside.path(),
            repo_root: repo.path(),
            as_of_utc_date: "2026-01-01",
            fetched_at_utc: "2026-01-01T00:00:00Z",
            command: "echo hi",
        };
        let err = build_manifest(&args).unwrap_err();
        assert!(matches!(err, ManifestError::OutsideRepoRoot { .. }));
    }

    #[test]
    fn infers_as_of_date_from_dirname() {
        assert_eq!(infer_as_of_date(Path::new("/data/snapshots/2026-03-04")), Some("2026-03-04".to_string()));
        assert_eq!(infer_as_of_date(Path::new("/data/snapshots/latest")), None);
    }

    #[test]
    fn manifest_round_trips_with_sorted_keys() {
        let repo = tempfile::tempdir().unwrap();
        let snapshot = repo.path().join("snapshot");
        std::fs::create_dir_all(&snapshot).unwrap();
        std::fs::write(snapshot.join("a.txt"), "hello\n").unwrap();

        let args = BuildManifestArgs {
            source: "demo",
            snapshot_dir: &snapshot,
            repo_root: repo.path(),
            as_of_utc_date: "2026-01-01",
            fetched_at_utc: "2026-01-01T00:00:00Z",
            command: "echo hi",
        };
        let manifest = build_manifest(&args).unwrap();
        let json = to_sorted_json(&manifest).unwrap();
        assert!(json.ends_with('\n'));

        let reparsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let file_entry = &reparsed["files"][0];
        let (expected_digest, expected_bytes) = sha256_file(&snapshot.join("a.txt")).unwrap();
        assert_eq!(file_entry["sha256"], expected_digest);
        assert_eq!(file_entry["bytes"], expected_bytes);
    }
}
