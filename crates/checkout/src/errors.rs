//! Phase-labeled error taxonomy for the bootstrap run.
//!
//! Every failure is terminal: there is no fallback from a failed host-key
//! refresh to unchecked keys, and no downgrade from SSH to tokenized HTTPS.
//! Transient network failures surface to the invoking orchestrator, which
//! owns retry policy; nothing here is silently retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Port-seam error
// ---------------------------------------------------------------------------

/// Error produced by an infrastructure port operation.
///
/// Adapters collapse their internal error chains (spawn failures, non-zero
/// exit statuses, trimmed stderr) into one displayable message at the seam;
/// the bootstrapper wraps it with the phase that was running.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PortError {
    /// Human-readable description of what the adapter observed.
    pub message: String,
}

impl PortError {
    /// Creates a port error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// The ordered phases of a bootstrap run.
///
/// Used to label diagnostics and to map failures onto distinct process exit
/// codes; the order here is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Refreshing `github.com` host keys in the pinned known-hosts file.
    TrustBootstrap,
    /// Classifying and recovering the workspace directory.
    WorkspaceRecovery,
    /// Clearing legacy auth residue and normalising the `origin` URL.
    AuthConfig,
    /// Fetching the requested ref and checking it out.
    FetchCheckout,
    /// Materialising large-file content after the base checkout.
    Lfs,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrustBootstrap => write!(f, "trust-bootstrap"),
            Self::WorkspaceRecovery => write!(f, "workspace-recovery"),
            Self::AuthConfig => write!(f, "auth-config"),
            Self::FetchCheckout => write!(f, "fetch-checkout"),
            Self::Lfs => write!(f, "lfs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap errors
// ---------------------------------------------------------------------------

/// Errors that abort a bootstrap run.
///
/// One variant per phase. All variants are terminal for the run: the binary
/// exits non-zero and presents no partial workspace state as success.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Host-key refresh failed or timed out.
    ///
    /// Raised before any git network operation is attempted; there is no
    /// fallback to insecure host-key checking.
    #[error("trust bootstrap failed: {source}")]
    TrustBootstrap {
        /// What the host-key store observed.
        #[source]
        source: PortError,
    },

    /// The workspace directory is in a state that could not be safely reset,
    /// wiped, or initialised.
    #[error("workspace recovery failed: {source}")]
    WorkspaceRecovery {
        /// What the filesystem or git probe observed.
        #[source]
        source: PortError,
    },

    /// Legacy auth headers could not be cleared or `origin` could not be
    /// normalised to its credential-free form.
    #[error("auth config failed: {source}")]
    AuthConfig {
        /// What the git adapter observed.
        #[source]
        source: PortError,
    },

    /// The requested ref could not be fetched, or the working tree could not
    /// be brought to it.
    #[error("fetch/checkout failed: {source}")]
    FetchCheckout {
        /// What the git adapter observed.
        #[source]
        source: PortError,
    },

    /// Large-file content could not be pulled after a successful base
    /// checkout.
    #[error("lfs pull failed: {source}")]
    Lfs {
        /// What the git adapter observed.
        #[source]
        source: PortError,
    },
}

impl BootstrapError {
    /// The phase this error was raised in.
    pub fn phase(&self) -> Phase {
        match self {
            Self::TrustBootstrap { .. } => Phase::TrustBootstrap,
            Self::WorkspaceRecovery { .. } => Phase::WorkspaceRecovery,
            Self::AuthConfig { .. } => Phase::AuthConfig,
            Self::FetchCheckout { .. } => Phase::FetchCheckout,
            Self::Lfs { .. } => Phase::Lfs,
        }
    }
}
