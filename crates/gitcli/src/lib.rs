//! RunnerWorks git infrastructure adapter.
//!
//! Implements the [`checkout::GitCli`] and [`checkout::WorkspaceFs`] ports by
//! shelling out to the system `git` binary with [`tokio::process::Command`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, per-command `-c` configuration,
//! prompt suppression, and stderr capture all live here. The [`checkout`]
//! crate sees only the port traits.
//!
//! Two properties the adapter enforces for every invocation:
//!
//! - Credential material is only ever expanded into per-process `-c`
//!   arguments (`core.sshCommand` or an `extraheader` bearer header); nothing
//!   token-shaped is written to a config file or a remote URL.
//! - LFS smudge filters are disabled for reset/checkout via per-command
//!   `filter.lfs.smudge=` / `filter.lfs.required=false` configuration, never
//!   via the `GIT_LFS_SKIP_SMUDGE` environment toggle, so the override is
//!   scoped to the invoked process.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use checkout::{GitAuthContext, GitCli, GitRef, PortError};

mod fsops;

pub use fsops::LocalWorkspaceFs;

/// Per-command configuration that keeps LFS smudge filters out of
/// reset/checkout operations.
const LFS_SMUDGE_OFF: [&str; 4] = [
    "-c",
    "filter.lfs.smudge=",
    "-c",
    "filter.lfs.required=false",
];

/// [`GitCli`] implementation over the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct SystemGitCli;

impl SystemGitCli {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self
    }
}

// ---------------------------------------------------------------------------
// Command plumbing
// ---------------------------------------------------------------------------

/// Base `git -C <workspace>` command with prompts disabled.
fn git_in(workspace: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(workspace);
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd
}

/// Expand the per-invocation auth context into `-c` arguments.
///
/// The bearer value is assembled here, at the last possible moment before the
/// process is spawned; it never appears in logs.
fn apply_auth(cmd: &mut Command, auth: &GitAuthContext) {
    if let Some(ssh_command) = &auth.ssh_command {
        cmd.arg("-c").arg(format!("core.sshCommand={ssh_command}"));
    }
    if let Some((config_key, token)) = &auth.bearer {
        cmd.arg("-c")
            .arg(format!("{config_key}=AUTHORIZATION: bearer {}", token.reveal()));
    }
}

/// Run a command to completion, failing with trimmed stderr on non-zero exit.
async fn run(mut cmd: Command, what: &str) -> Result<std::process::Output> {
    debug!(command = what, "spawning git");
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to spawn {what}"))?;
    if !output.status.success() {
        bail!(
            "{what} failed (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim(),
        );
    }
    Ok(output)
}

/// Collapse an adapter error chain into the port-seam error type.
fn seam(err: anyhow::Error) -> PortError {
    PortError::new(format!("{err:#}"))
}

// ---------------------------------------------------------------------------
// Port implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl GitCli for SystemGitCli {
    #[instrument(skip(self), fields(workspace = %workspace.display()))]
    async fn is_inside_work_tree(&self, workspace: &Path) -> Result<bool, PortError> {
        let mut cmd = git_in(workspace);
        cmd.arg("rev-parse").arg("--is-inside-work-tree");
        // A non-zero exit is an authoritative "not a work tree", not an
        // error; only failing to run git at all is.
        let output = cmd
            .output()
            .await
            .context("failed to spawn git rev-parse")
            .map_err(seam)?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    #[instrument(skip(self), fields(workspace = %workspace.display()))]
    async fn init(&self, workspace: &Path) -> Result<(), PortError> {
        let mut cmd = git_in(workspace);
        cmd.arg("init").arg("--quiet");
        run(cmd, "git init").await.map_err(seam)?;
        Ok(())
    }

    #[instrument(skip(self), fields(workspace = %workspace.display(), url_base))]
    async fn clear_http_extraheader(
        &self,
        workspace: &Path,
        url_base: &str,
    ) -> Result<bool, PortError> {
        let config_key = format!("http.{url_base}.extraheader");

        let mut probe = git_in(workspace);
        probe.arg("config").arg("--local").arg("--get-all").arg(&config_key);
        let output = probe
            .output()
            .await
            .context("failed to spawn git config --get-all")
            .map_err(seam)?;
        if !output.status.success() {
            // Key not present; nothing to clear.
            return Ok(false);
        }

        let mut unset = git_in(workspace);
        unset
            .arg("config")
            .arg("--local")
            .arg("--unset-all")
            .arg(&config_key);
        run(unset, "git config --unset-all http extraheader")
            .await
            .map_err(seam)?;
        Ok(true)
    }

    #[instrument(skip(self), fields(workspace = %workspace.display(), %url))]
    async fn set_origin_url(&self, workspace: &Path, url: &str) -> Result<(), PortError> {
        let mut probe = git_in(workspace);
        probe.arg("remote").arg("get-url").arg("origin");
        let has_origin = probe
            .output()
            .await
            .context("failed to spawn git remote get-url")
            .map_err(seam)?
            .status
            .success();

        let mut cmd = git_in(workspace);
        if has_origin {
            cmd.arg("remote").arg("set-url").arg("origin").arg(url);
        } else {
            cmd.arg("remote").arg("add").arg("origin").arg(url);
        }
        run(cmd, "git remote set-url/add origin").await.map_err(seam)?;
        Ok(())
    }

    #[instrument(skip(self), fields(workspace = %workspace.display()))]
    async fn reset_hard(&self, workspace: &Path) -> Result<(), PortError> {
        let mut cmd = git_in(workspace);
        cmd.args(LFS_SMUDGE_OFF).arg("reset").arg("--hard").arg("--quiet");
        run(cmd, "git reset --hard").await.map_err(seam)?;
        Ok(())
    }

    #[instrument(skip(self), fields(workspace = %workspace.display()))]
    async fn clean_untracked(&self, workspace: &Path) -> Result<(), PortError> {
        // -d for directories, -f to actually delete. Never -x: ignored files
        // (dependency and build caches) must survive.
        let mut cmd = git_in(workspace);
        cmd.arg("clean").arg("-df").arg("--quiet");
        run(cmd, "git clean -df").await.map_err(seam)?;
        Ok(())
    }

    #[instrument(skip(self, auth), fields(workspace = %workspace.display(), %git_ref))]
    async fn fetch_ref(
        &self,
        workspace: &Path,
        git_ref: &GitRef,
        auth: &GitAuthContext,
    ) -> Result<(), PortError> {
        let mut cmd = git_in(workspace);
        apply_auth(&mut cmd, auth);
        cmd.arg("fetch")
            .arg("--no-tags")
            .arg("--quiet")
            .arg("origin")
            .arg(git_ref.as_str());
        run(cmd, "git fetch").await.map_err(seam)?;
        Ok(())
    }

    #[instrument(skip(self), fields(workspace = %workspace.display()))]
    async fn checkout_fetch_head(&self, workspace: &Path) -> Result<(), PortError> {
        let mut cmd = git_in(workspace);
        cmd.args(LFS_SMUDGE_OFF)
            .arg("checkout")
            .arg("--force")
            .arg("--detach")
            .arg("--quiet")
            .arg("FETCH_HEAD");
        run(cmd, "git checkout FETCH_HEAD").await.map_err(seam)?;
        Ok(())
    }

    #[instrument(skip(self, auth), fields(workspace = %workspace.display()))]
    async fn lfs_pull(&self, workspace: &Path, auth: &GitAuthContext) -> Result<(), PortError> {
        let mut cmd = git_in(workspace);
        apply_auth(&mut cmd, auth);
        cmd.arg("lfs").arg("pull");
        run(cmd, "git lfs pull").await.map_err(seam)?;
        Ok(())
    }
}
