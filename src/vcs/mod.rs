//! Version control: a `git` CLI wrapper and a pull-request provider trait
//! with a `gh`-CLI-backed implementation.

mod claimed;
mod error;
mod pr;
mod repository;
mod worktree;

pub use claimed::claimed_task_ids;
pub use error::VcsError;
pub use pr::{ChecksRollup, GhPrProvider, OpenPr, PrProvider};
pub use repository::{Repository, StatusEntry};
pub use worktree::Worktree;
