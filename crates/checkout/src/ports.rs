//! Port trait definitions.
//!
//! The bootstrapper sequences these traits; the `gitcli` and `sshtrust`
//! crates implement them by driving the system `git`, `git-lfs`, and OpenSSH
//! binaries. Keeping the seams here means every ordering property that
//! matters (trust before network, recovery before checkout, checkout before
//! LFS) is unit-testable with scripted fakes and no subprocesses.

use std::path::Path;

use async_trait::async_trait;

use crate::errors::PortError;
use crate::identifiers::GitRef;
use crate::types::{GitAuthContext, SshTrustConfig};

// ---------------------------------------------------------------------------
// Git operations
// ---------------------------------------------------------------------------

/// Operations against the git binary, scoped to one workspace directory.
///
/// Network-touching operations take a [`GitAuthContext`] so authentication is
/// always per-invocation: an SSH command string or a bearer `extraheader`,
/// expanded into `-c` arguments on the spawned process and nowhere else.
/// Implementations must never persist anything token-shaped into git
/// configuration.
#[async_trait]
pub trait GitCli: Send + Sync {
    /// Authoritative work-tree probe: `git -C <workspace> rev-parse
    /// --is-inside-work-tree`.
    ///
    /// Returns `Ok(false)` for a directory git does not recognise as a
    /// working tree (including one containing a `.git`-named plain file);
    /// errors are reserved for being unable to run git at all.
    async fn is_inside_work_tree(&self, workspace: &Path) -> Result<bool, PortError>;

    /// Initialise a fresh repository in `workspace`.
    async fn init(&self, workspace: &Path) -> Result<(), PortError>;

    /// Remove every `http.<url_base>.extraheader` entry from the workspace's
    /// local git configuration.
    ///
    /// Returns `true` if any residue was present. A missing key is not an
    /// error; stale tokens from prior jobs are the expected case on a
    /// persistent runner.
    async fn clear_http_extraheader(
        &self,
        workspace: &Path,
        url_base: &str,
    ) -> Result<bool, PortError>;

    /// Point the `origin` remote at `url`, creating the remote if absent.
    ///
    /// `url` is always one of the credential-free forms derived from the
    /// repository slug.
    async fn set_origin_url(&self, workspace: &Path, url: &str) -> Result<(), PortError>;

    /// `reset --hard` with LFS smudge disabled via per-command config.
    async fn reset_hard(&self, workspace: &Path) -> Result<(), PortError>;

    /// Remove untracked files and directories (`clean -df`).
    ///
    /// Never uses a `-x` variant: files matched by ignore rules (dependency
    /// and build caches) must survive recovery.
    async fn clean_untracked(&self, workspace: &Path) -> Result<(), PortError>;

    /// Targeted fetch of `git_ref` from `origin` (no tags, no full history).
    async fn fetch_ref(
        &self,
        workspace: &Path,
        git_ref: &GitRef,
        auth: &GitAuthContext,
    ) -> Result<(), PortError>;

    /// Force-checkout `FETCH_HEAD` (detached) with LFS smudge disabled via
    /// per-command config.
    async fn checkout_fetch_head(&self, workspace: &Path) -> Result<(), PortError>;

    /// Materialise large-file content: `git lfs pull`.
    async fn lfs_pull(&self, workspace: &Path, auth: &GitAuthContext) -> Result<(), PortError>;
}

// ---------------------------------------------------------------------------
// Host-key trust
// ---------------------------------------------------------------------------

/// Lifecycle of the pinned known-hosts file.
#[async_trait]
pub trait HostKeyStore: Send + Sync {
    /// Drop any existing entries for the configured host, then scan and
    /// append current keys, within the configured time bound.
    ///
    /// An empty or failed scan is an error; callers never fall back to
    /// unchecked host keys.
    async fn refresh(&self, trust: &SshTrustConfig) -> Result<(), PortError>;
}

// ---------------------------------------------------------------------------
// Workspace filesystem
// ---------------------------------------------------------------------------

/// Plain directory operations on the workspace path.
///
/// Separated from [`GitCli`] so the state-machine tests can script filesystem
/// shapes (absent, empty, corrupt) without touching a disk.
#[async_trait]
pub trait WorkspaceFs: Send + Sync {
    /// Whether the workspace path exists.
    async fn exists(&self, workspace: &Path) -> Result<bool, PortError>;

    /// Whether the workspace directory has no entries.
    async fn is_empty_dir(&self, workspace: &Path) -> Result<bool, PortError>;

    /// Create the workspace directory (and parents).
    async fn create_dir_all(&self, workspace: &Path) -> Result<(), PortError>;

    /// Remove every entry inside the workspace directory, keeping the
    /// directory itself so a caller holding it as its working directory is
    /// not unlinked out from under the job.
    async fn wipe_contents(&self, workspace: &Path) -> Result<(), PortError>;
}
