//! Repository access: version control, file listing and state snapshots.

pub mod git;
pub mod lister;
pub mod state;

pub use git::{parse_porcelain_z, CommandLimits, GitCli, VersionControl};
pub use lister::{FileLister, RepoFileLister, WalkLister};
pub use state::{
    hash_changed_files, DiffStats, RepoState, RepoStateReader, NO_CHANGES_HASH, NO_GIT_REVISION,
};
