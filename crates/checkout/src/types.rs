//! Shared value types for the checkout domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants: the ephemeral token can never be
//! displayed or serialised, the trust configuration is threaded explicitly
//! into every SSH-touching operation rather than leaking into the process
//! environment, and the workspace state is derived from an authoritative
//! work-tree probe rather than a `.git` path-shape heuristic.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{BootstrapRunId, GitRef, RepoSlug, GITHUB_SSH_HOST};

// ---------------------------------------------------------------------------
// Credential material
// ---------------------------------------------------------------------------

/// A short-lived credential obtained by the orchestrator via an OIDC
/// identity-token exchange.
///
/// The token is intentionally opaque: it has no `Display`, its `Debug` output
/// is redacted, and it derives neither `Serialize` nor `Deserialize`. The only
/// way to extract the value is [`EphemeralToken::reveal`], which adapters call
/// at the moment they format a per-invocation `extraheader` argument.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralToken(String);

impl EphemeralToken {
    /// Wraps a raw token value. Returns `None` for empty input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the raw token. Callers must never write the result to a
    /// persisted config file or embed it in a URL.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for EphemeralToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EphemeralToken(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// How the bootstrapper authenticates git network operations.
///
/// SSH is the strategy; the ephemeral-HTTPS variant exists only for callers
/// that explicitly supply a short-lived token, and the two are never mixed
/// within a run. Under either variant the `origin` URL that ends up persisted
/// in git configuration is credential-free.
#[derive(Debug, Clone)]
pub enum Transport {
    /// SSH remote (`git@github.com:<slug>.git`) verified against the pinned
    /// known-hosts file with strict host-key checking.
    Ssh,
    /// Plain HTTPS remote with the token injected as a per-invocation
    /// `http.<base>.extraheader` bearer header. Nothing token-shaped is ever
    /// written to the remote URL or a long-lived config file.
    HttpsEphemeral(EphemeralToken),
}

impl Transport {
    /// Short label for logs and the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::HttpsEphemeral(_) => "https-ephemeral",
        }
    }
}

// ---------------------------------------------------------------------------
// SSH trust configuration
// ---------------------------------------------------------------------------

/// Where SSH host trust lives and how it is re-established.
///
/// Strict host-key checking is only safe because the known-hosts entries for
/// the host are refreshed at the start of every run; the two settings travel
/// together in this one structure so no call site can take one without the
/// other.
#[derive(Debug, Clone)]
pub struct SshTrustConfig {
    /// Pinned known-hosts file consulted by every SSH operation.
    pub known_hosts: PathBuf,
    /// Host whose keys are refreshed and trusted (`github.com`).
    pub host: String,
    /// Upper bound on the host-key scan. Expiry fails the run; there is no
    /// fallback to unchecked keys.
    pub scan_timeout: Duration,
}

impl SshTrustConfig {
    /// Trust configuration for `github.com` with the conventional 15-second
    /// scan bound.
    pub fn github(known_hosts: PathBuf) -> Self {
        Self {
            known_hosts,
            host: GITHUB_SSH_HOST.to_string(),
            scan_timeout: Duration::from_secs(15),
        }
    }

    /// The `ssh` invocation git should use: strict checking pinned to the
    /// known-hosts file, passed per-command via `core.sshCommand` rather than
    /// exported into the environment.
    pub fn ssh_command(&self) -> String {
        format!(
            "ssh -o StrictHostKeyChecking=yes -o UserKnownHostsFile={}",
            self.known_hosts.display()
        )
    }
}

// ---------------------------------------------------------------------------
// Per-invocation git auth context
// ---------------------------------------------------------------------------

/// Authentication material scoped to a single git sub-process.
///
/// Built by the bootstrapper from the selected [`Transport`]; adapters expand
/// it into `-c` arguments on the spawned command and nothing else. Exactly one
/// of the fields is populated for a network operation.
#[derive(Debug, Clone, Default)]
pub struct GitAuthContext {
    /// Value for `core.sshCommand` (SSH transport).
    pub ssh_command: Option<String>,
    /// Config key and token for an `extraheader` bearer header
    /// (ephemeral-HTTPS transport). The key is the full
    /// `http.<base>.extraheader` config name.
    pub bearer: Option<(String, EphemeralToken)>,
}

// ---------------------------------------------------------------------------
// Workspace state
// ---------------------------------------------------------------------------

/// Classified state of the workspace directory before recovery.
///
/// Derived from a directory probe plus `git rev-parse --is-inside-work-tree`;
/// a directory that merely contains a `.git`-named file classifies as
/// [`WorkspaceState::Corrupt`], not as a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceState {
    /// The directory does not exist.
    Absent,
    /// The directory exists and contains nothing.
    Empty,
    /// The directory is a valid git working tree and can be reused in place.
    ValidRepo,
    /// The directory has content but no valid working tree; it cannot be
    /// safely reused and is wiped before reinitialisation.
    Corrupt,
}

impl std::fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Empty => write!(f, "empty"),
            Self::ValidRepo => write!(f, "valid-repo"),
            Self::Corrupt => write!(f, "corrupt"),
        }
    }
}

// ---------------------------------------------------------------------------
// Request & report
// ---------------------------------------------------------------------------

/// Everything the bootstrapper needs for one run.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Repository to check out.
    pub repository: RepoSlug,
    /// Ref to bring the working tree to.
    pub git_ref: GitRef,
    /// Workspace directory on the runner. Exclusively owned by this job for
    /// the duration of the run.
    pub workspace: PathBuf,
    /// Authentication strategy for network git operations.
    pub transport: Transport,
}

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Serialisable summary of a completed bootstrap run.
///
/// Emitted on success only; a failed run reports nothing but its
/// phase-labeled error. Deliberately excludes any credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Correlation id for this run.
    pub run_id: BootstrapRunId,
    /// Repository slug that was checked out.
    pub repository: RepoSlug,
    /// Ref the working tree was brought to.
    pub git_ref: GitRef,
    /// Workspace path that was prepared.
    pub workspace: PathBuf,
    /// Transport label (`"ssh"` or `"https-ephemeral"`).
    pub transport: String,
    /// Workspace classification before recovery.
    pub initial_state: WorkspaceState,
    /// Whether legacy HTTP extra-header auth residue was found and cleared.
    pub legacy_auth_cleared: bool,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub finished_at: Timestamp,
}
