//! Core checkout domain for RunnerWorks.
//!
//! This crate contains every domain concept of the self-hosted checkout
//! bootstrapper: newtype identifiers, value and configuration types, the
//! phase-labeled error taxonomy, the port traits the infrastructure crates
//! implement, and the [`bootstrap::Bootstrapper`] that sequences a run.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; the `gitcli` and `sshtrust` crates define
//! *how* to supply it by driving the system git and OpenSSH binaries.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Validated newtypes (`RepoSlug`, `GitRef`, `BootstrapRunId`) |
//! | [`types`] | Value types (`Transport`, `SshTrustConfig`, `WorkspaceState`, `RunReport`) |
//! | [`errors`] | Phase taxonomy and terminal bootstrap errors |
//! | [`ports`] | `GitCli`, `HostKeyStore`, `WorkspaceFs` trait seams |
//! | [`bootstrap`] | The phase-ordered run orchestration |

pub mod bootstrap;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use bootstrap::Bootstrapper;
pub use errors::{BootstrapError, Phase, PortError};
pub use identifiers::{BootstrapRunId, GitRef, RepoSlug, GITHUB_HTTP_BASE, GITHUB_SSH_HOST};
pub use ports::{GitCli, HostKeyStore, WorkspaceFs};
pub use types::{
    CheckoutRequest, EphemeralToken, GitAuthContext, RunReport, SshTrustConfig, Timestamp,
    Transport, WorkspaceState,
};
