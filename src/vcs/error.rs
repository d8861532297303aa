//! Version-control error type.

#[derive(Debug)]
pub enum VcsError {
    CommandFailed(String),
    ParseError(String),
    BranchAlreadyExists { branch: String },
    NoWorktreeFound { branch: String },
    WorktreePathExists { path: std::path::PathBuf },
    DetachedHead,
}

impl std::fmt::Display for VcsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VcsError::CommandFailed(msg) => write!(f, "{msg}"),
            VcsError::ParseError(msg) => write!(f, "failed to parse git output: {msg}"),
            VcsError::BranchAlreadyExists { branch } => write!(f, "branch already exists: {branch}"),
            VcsError::NoWorktreeFound { branch } => write!(f, "no worktree found for branch: {branch}"),
            VcsError::WorktreePathExists { path } => write!(f, "worktree path already exists: {}", path.display()),
            VcsError::DetachedHead => write!(f, "repository is in detached HEAD state"),
        }
    }
}

impl std::error::Error for VcsError {}
