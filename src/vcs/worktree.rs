//! Worktree record and `git worktree list --porcelain` parsing.

use std::path::PathBuf;

use super::error::VcsError;

#[derive(Debug, Clone, PartialEq)]
pub struct Worktree {
    pub path: PathBuf,
    pub head: String,
    pub branch: Option<String>,
    pub bare: bool,
    pub detached: bool,
}

impl Worktree {
    pub fn parse_porcelain_list(output: &str) -> Result<Vec<Self>, VcsError> {
        let mut worktrees = Vec::new();
        let mut current: Option<Worktree> = None;

        for line in output.lines() {
            if line.is_empty() {
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                continue;
            }

            let (key, value) = match line.split_once(' ') {
                Some((k, v)) => (k, Some(v)),
                None => (line, None),
            };

            match key {
                "worktree" => {
                    let path = value.ok_or_else(|| VcsError::ParseError("worktree line missing path".into()))?;
                    current = Some(Worktree {
                        path: PathBuf::from(path),
                        head: String::new(),
                        branch: None,
                        bare: false,
                        detached: false,
                    });
                }
                "HEAD" => {
                    if let Some(wt) = current.as_mut() {
                        wt.head = value.unwrap_or_default().to_string();
                    }
                }
                "branch" => {
                    if let Some(wt) = current.as_mut() {
                        let branch_ref = value.unwrap_or_default();
                        wt.branch = Some(branch_ref.strip_prefix("refs/heads/").unwrap_or(branch_ref).to_string());
                    }
                }
                "bare" => {
                    if let Some(wt) = current.as_mut() {
                        wt.bare = true;
                    }
                }
                "detached" => {
                    if let Some(wt) = current.as_mut() {
                        wt.detached = true;
                    }
                }
                _ => {}
            }
        }

        if let Some(wt) = current {
            worktrees.push(wt);
        }

        Ok(worktrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_worktrees() {
        let output = "worktree /repo\nHEAD abc123\nbranch refs/heads/main\n\nworktree /repo/.worktrees/T001_x\nHEAD def456\nbranch refs/heads/T001_x\n\n";
        let worktrees = Worktree::parse_porcelain_list(output).unwrap();
        assert_eq!(worktrees.len(), 2);
        assert_eq!(worktrees[0].branch.as_deref(), Some("main"));
        assert_eq!(worktrees[1].path, PathBuf::from("/repo/.worktrees/T001_x"));
        assert_eq!(worktrees[1].branch.as_deref(), Some("T001_x"));
    }

    #[test]
    fn parses_detached_worktree() {
        let output = "worktree /repo/.worktrees/scratch\nHEAD abc123\ndetached\n\n";
        let worktrees = Worktree::parse_porcelain_list(output).unwrap();
        assert_eq!(worktrees.len(), 1);
        assert!(worktrees[0].detached);
        assert!(worktrees[0].branch.is_none());
    }
}
