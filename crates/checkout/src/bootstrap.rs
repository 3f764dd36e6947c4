//! The phase-ordered bootstrap run.
//!
//! [`Bootstrapper`] sequences the five phases over the injected ports:
//!
//! 1. **Trust bootstrap** — refresh `github.com` host keys (SSH transport).
//! 2. **Workspace recovery** — classify the directory and bring it to a
//!    reusable repository state.
//! 3. **Auth config** — clear legacy HTTP auth residue, normalise `origin`.
//! 4. **Fetch & checkout** — targeted fetch, force-checkout with LFS smudge
//!    disabled.
//! 5. **LFS** — explicit large-file pull, isolated from the base checkout.
//!
//! Execution is strictly sequential; each sub-operation is awaited to
//! completion before the next begins, because correctness depends on the
//! ordering (trust before any SSH use, clean workspace before checkout,
//! checkout before LFS). Nothing is retried internally.

use tracing::{info, Instrument};

use crate::errors::{BootstrapError, PortError};
use crate::identifiers::{BootstrapRunId, GITHUB_HTTP_BASE};
use crate::ports::{GitCli, HostKeyStore, WorkspaceFs};
use crate::types::{
    CheckoutRequest, GitAuthContext, RunReport, SshTrustConfig, Timestamp, Transport,
    WorkspaceState,
};

/// Drives one bootstrap run over the injected port implementations.
///
/// Trust configuration is threaded in explicitly and handed to each
/// SSH-touching operation; the bootstrapper never mutates the process
/// environment.
pub struct Bootstrapper<G, H, F> {
    git: G,
    host_keys: H,
    fs: F,
    trust: SshTrustConfig,
}

impl<G: GitCli, H: HostKeyStore, F: WorkspaceFs> Bootstrapper<G, H, F> {
    /// Creates a bootstrapper from its collaborators.
    pub fn new(git: G, host_keys: H, fs: F, trust: SshTrustConfig) -> Self {
        Self {
            git,
            host_keys,
            fs,
            trust,
        }
    }

    /// Runs the full bootstrap sequence for `request`.
    ///
    /// On success the workspace is a valid, clean working tree at the
    /// requested ref with LFS content present and a credential-free `origin`.
    /// On failure the error names the phase; no partial state is reported as
    /// success.
    pub async fn run(&self, request: &CheckoutRequest) -> Result<RunReport, BootstrapError> {
        let run_id = BootstrapRunId::new_random();
        let span = tracing::info_span!(
            "bootstrap_run",
            %run_id,
            repository = %request.repository,
            git_ref = %request.git_ref,
            transport = request.transport.kind(),
        );
        self.run_inner(run_id, request).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: BootstrapRunId,
        request: &CheckoutRequest,
    ) -> Result<RunReport, BootstrapError> {
        let started_at = Timestamp::now();
        let workspace = request.workspace.as_path();

        // Phase 1 — trust bootstrap. Host keys are refreshed before any git
        // network operation; strict checking is only safe because of this.
        if matches!(request.transport, Transport::Ssh) {
            info!(host = %self.trust.host, "refreshing host keys");
            self.host_keys
                .refresh(&self.trust)
                .await
                .map_err(|source| BootstrapError::TrustBootstrap { source })?;
        }

        // Phase 2 — workspace recovery.
        let initial_state = self
            .classify(workspace)
            .await
            .map_err(|source| BootstrapError::WorkspaceRecovery { source })?;
        info!(state = %initial_state, "classified workspace");
        self.recover(workspace, initial_state)
            .await
            .map_err(|source| BootstrapError::WorkspaceRecovery { source })?;

        // Phase 3 — auth config. Stale tokens must not silently persist
        // across jobs on a reused runner.
        let legacy_auth_cleared = self
            .git
            .clear_http_extraheader(workspace, GITHUB_HTTP_BASE)
            .await
            .map_err(|source| BootstrapError::AuthConfig { source })?;
        if legacy_auth_cleared {
            info!("clearing legacy GitHub HTTPS auth headers");
        }
        let origin_url = match &request.transport {
            Transport::Ssh => request.repository.ssh_url(),
            Transport::HttpsEphemeral(_) => request.repository.https_url(),
        };
        self.git
            .set_origin_url(workspace, &origin_url)
            .await
            .map_err(|source| BootstrapError::AuthConfig { source })?;
        info!(origin = %origin_url, "normalised origin");

        // Phase 4 — fetch & checkout.
        let auth = self.auth_context(&request.transport);
        self.git
            .fetch_ref(workspace, &request.git_ref, &auth)
            .await
            .map_err(|source| BootstrapError::FetchCheckout { source })?;
        self.git
            .checkout_fetch_head(workspace)
            .await
            .map_err(|source| BootstrapError::FetchCheckout { source })?;
        info!("working tree at requested ref");

        // Phase 5 — LFS. Runs after the base checkout is durable so a slow or
        // misconfigured LFS backend cannot corrupt it.
        self.git
            .lfs_pull(workspace, &auth)
            .await
            .map_err(|source| BootstrapError::Lfs { source })?;

        let report = RunReport {
            run_id,
            repository: request.repository.clone(),
            git_ref: request.git_ref.clone(),
            workspace: request.workspace.clone(),
            transport: request.transport.kind().to_string(),
            initial_state,
            legacy_auth_cleared,
            started_at,
            finished_at: Timestamp::now(),
        };
        info!(initial_state = %report.initial_state, "bootstrap complete");
        Ok(report)
    }

    /// Classifies the workspace from a directory probe plus the authoritative
    /// work-tree check.
    async fn classify(&self, workspace: &std::path::Path) -> Result<WorkspaceState, PortError> {
        if !self.fs.exists(workspace).await? {
            return Ok(WorkspaceState::Absent);
        }
        if self.fs.is_empty_dir(workspace).await? {
            return Ok(WorkspaceState::Empty);
        }
        if self.git.is_inside_work_tree(workspace).await? {
            Ok(WorkspaceState::ValidRepo)
        } else {
            Ok(WorkspaceState::Corrupt)
        }
    }

    /// Brings the workspace to a reusable repository state.
    async fn recover(
        &self,
        workspace: &std::path::Path,
        state: WorkspaceState,
    ) -> Result<(), PortError> {
        match state {
            WorkspaceState::Absent => {
                self.fs.create_dir_all(workspace).await?;
                self.git.init(workspace).await?;
            }
            WorkspaceState::Empty => {
                self.git.init(workspace).await?;
            }
            WorkspaceState::Corrupt => {
                // Non-empty but no valid work tree: an untrusted partial
                // state cannot be safely reused.
                info!("workspace has content but no valid repository; cleaning workspace for recovery");
                self.fs.wipe_contents(workspace).await?;
                self.git.init(workspace).await?;
            }
            WorkspaceState::ValidRepo => {
                // Reuse in place. clean runs without -x so ignored files
                // (dependency and build caches) survive.
                self.git.reset_hard(workspace).await?;
                self.git.clean_untracked(workspace).await?;
            }
        }
        Ok(())
    }

    /// Per-invocation auth material for network git operations.
    fn auth_context(&self, transport: &Transport) -> GitAuthContext {
        match transport {
            Transport::Ssh => GitAuthContext {
                ssh_command: Some(self.trust.ssh_command()),
                bearer: None,
            },
            Transport::HttpsEphemeral(token) => GitAuthContext {
                ssh_command: None,
                bearer: Some((
                    format!("http.{GITHUB_HTTP_BASE}.extraheader"),
                    token.clone(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::errors::Phase;
    use crate::identifiers::{GitRef, RepoSlug};
    use crate::types::EphemeralToken;

    #[derive(Default)]
    struct FakeState {
        calls: Vec<String>,
        dir_exists: bool,
        dir_empty: bool,
        work_tree: bool,
        legacy_header: bool,
        fail_refresh: bool,
        origin: Option<String>,
    }

    /// One scripted fake implementing all three ports, cloned into each seam.
    #[derive(Clone, Default)]
    struct Fake {
        state: Arc<Mutex<FakeState>>,
    }

    impl Fake {
        fn with(f: impl FnOnce(&mut FakeState)) -> Self {
            let fake = Self::default();
            f(&mut fake.state.lock().unwrap());
            fake
        }

        fn record(&self, call: impl Into<String>) {
            self.state.lock().unwrap().calls.push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        fn origin(&self) -> Option<String> {
            self.state.lock().unwrap().origin.clone()
        }
    }

    #[async_trait]
    impl HostKeyStore for Fake {
        async fn refresh(&self, trust: &SshTrustConfig) -> Result<(), PortError> {
            self.record(format!("refresh:{}", trust.host));
            if self.state.lock().unwrap().fail_refresh {
                return Err(PortError::new("ssh-keyscan timed out"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl WorkspaceFs for Fake {
        async fn exists(&self, _workspace: &Path) -> Result<bool, PortError> {
            Ok(self.state.lock().unwrap().dir_exists)
        }

        async fn is_empty_dir(&self, _workspace: &Path) -> Result<bool, PortError> {
            Ok(self.state.lock().unwrap().dir_empty)
        }

        async fn create_dir_all(&self, _workspace: &Path) -> Result<(), PortError> {
            self.record("create_dir");
            let mut s = self.state.lock().unwrap();
            s.dir_exists = true;
            s.dir_empty = true;
            Ok(())
        }

        async fn wipe_contents(&self, _workspace: &Path) -> Result<(), PortError> {
            self.record("wipe");
            let mut s = self.state.lock().unwrap();
            s.dir_empty = true;
            s.work_tree = false;
            Ok(())
        }
    }

    #[async_trait]
    impl GitCli for Fake {
        async fn is_inside_work_tree(&self, _workspace: &Path) -> Result<bool, PortError> {
            Ok(self.state.lock().unwrap().work_tree)
        }

        async fn init(&self, _workspace: &Path) -> Result<(), PortError> {
            self.record("init");
            let mut s = self.state.lock().unwrap();
            s.work_tree = true;
            s.dir_empty = false;
            Ok(())
        }

        async fn clear_http_extraheader(
            &self,
            _workspace: &Path,
            url_base: &str,
        ) -> Result<bool, PortError> {
            self.record(format!("clear_header:{url_base}"));
            let mut s = self.state.lock().unwrap();
            let had = s.legacy_header;
            s.legacy_header = false;
            Ok(had)
        }

        async fn set_origin_url(&self, _workspace: &Path, url: &str) -> Result<(), PortError> {
            self.record(format!("set_origin:{url}"));
            self.state.lock().unwrap().origin = Some(url.to_string());
            Ok(())
        }

        async fn reset_hard(&self, _workspace: &Path) -> Result<(), PortError> {
            self.record("reset_hard");
            Ok(())
        }

        async fn clean_untracked(&self, _workspace: &Path) -> Result<(), PortError> {
            self.record("clean");
            Ok(())
        }

        async fn fetch_ref(
            &self,
            _workspace: &Path,
            git_ref: &GitRef,
            auth: &GitAuthContext,
        ) -> Result<(), PortError> {
            self.record(format!("fetch:{git_ref}:{}", auth_kind(auth)));
            Ok(())
        }

        async fn checkout_fetch_head(&self, _workspace: &Path) -> Result<(), PortError> {
            self.record("checkout");
            Ok(())
        }

        async fn lfs_pull(
            &self,
            _workspace: &Path,
            auth: &GitAuthContext,
        ) -> Result<(), PortError> {
            self.record(format!("lfs:{}", auth_kind(auth)));
            Ok(())
        }
    }

    fn auth_kind(auth: &GitAuthContext) -> &'static str {
        match (&auth.ssh_command, &auth.bearer) {
            (Some(_), None) => "ssh",
            (None, Some(_)) => "bearer",
            _ => "none",
        }
    }

    fn bootstrapper(fake: &Fake) -> Bootstrapper<Fake, Fake, Fake> {
        Bootstrapper::new(
            fake.clone(),
            fake.clone(),
            fake.clone(),
            SshTrustConfig::github(PathBuf::from("/tmp/known_hosts")),
        )
    }

    fn request(transport: Transport) -> CheckoutRequest {
        CheckoutRequest {
            repository: RepoSlug::new("octo/repo").unwrap(),
            git_ref: GitRef::new("main").unwrap(),
            workspace: PathBuf::from("/srv/runner/workspace"),
            transport,
        }
    }

    #[tokio::test]
    async fn absent_workspace_is_created_and_checked_out_over_ssh() {
        let fake = Fake::default();
        let report = bootstrapper(&fake)
            .run(&request(Transport::Ssh))
            .await
            .unwrap();

        assert_eq!(report.initial_state, WorkspaceState::Absent);
        assert!(!report.legacy_auth_cleared);
        assert_eq!(fake.origin().as_deref(), Some("git@github.com:octo/repo.git"));
        assert_eq!(
            fake.calls(),
            vec![
                "refresh:github.com",
                "create_dir",
                "init",
                "clear_header:https://github.com/",
                "set_origin:git@github.com:octo/repo.git",
                "fetch:main:ssh",
                "checkout",
                "lfs:ssh",
            ]
        );
    }

    #[tokio::test]
    async fn valid_repo_is_reset_and_cleaned_not_reinitialised() {
        let fake = Fake::with(|s| {
            s.dir_exists = true;
            s.work_tree = true;
        });
        let report = bootstrapper(&fake)
            .run(&request(Transport::Ssh))
            .await
            .unwrap();

        assert_eq!(report.initial_state, WorkspaceState::ValidRepo);
        let calls = fake.calls();
        assert!(calls.contains(&"reset_hard".to_string()));
        assert!(calls.contains(&"clean".to_string()));
        assert!(!calls.contains(&"init".to_string()));
        assert!(!calls.contains(&"wipe".to_string()));
    }

    #[tokio::test]
    async fn corrupt_workspace_is_wiped_and_reinitialised() {
        // Non-empty directory, but git does not recognise a work tree — e.g.
        // stray files or a `.git`-named plain file.
        let fake = Fake::with(|s| {
            s.dir_exists = true;
            s.work_tree = false;
        });
        let report = bootstrapper(&fake)
            .run(&request(Transport::Ssh))
            .await
            .unwrap();

        assert_eq!(report.initial_state, WorkspaceState::Corrupt);
        let calls = fake.calls();
        let wipe = calls.iter().position(|c| c == "wipe").unwrap();
        let init = calls.iter().position(|c| c == "init").unwrap();
        assert!(wipe < init, "wipe must precede reinitialisation");
    }

    #[tokio::test]
    async fn legacy_auth_residue_is_cleared_and_reported() {
        let fake = Fake::with(|s| {
            s.dir_exists = true;
            s.work_tree = true;
            s.legacy_header = true;
        });
        let report = bootstrapper(&fake)
            .run(&request(Transport::Ssh))
            .await
            .unwrap();

        assert!(report.legacy_auth_cleared);
        assert!(!fake.state.lock().unwrap().legacy_header);
        assert_eq!(fake.origin().as_deref(), Some("git@github.com:octo/repo.git"));
    }

    #[tokio::test]
    async fn failed_host_key_refresh_aborts_before_any_git_operation() {
        let fake = Fake::with(|s| s.fail_refresh = true);
        let err = bootstrapper(&fake)
            .run(&request(Transport::Ssh))
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::TrustBootstrap);
        assert_eq!(fake.calls(), vec!["refresh:github.com"]);
    }

    #[tokio::test]
    async fn ephemeral_https_transport_skips_keyscan_and_keeps_origin_credential_free() {
        let token = EphemeralToken::new("ghs_shortlived").unwrap();
        let fake = Fake::default();
        let report = bootstrapper(&fake)
            .run(&request(Transport::HttpsEphemeral(token)))
            .await
            .unwrap();

        assert_eq!(report.transport, "https-ephemeral");
        let calls = fake.calls();
        assert!(!calls.iter().any(|c| c.starts_with("refresh")));
        assert!(calls.contains(&"fetch:main:bearer".to_string()));

        let origin = fake.origin().unwrap();
        assert_eq!(origin, "https://github.com/octo/repo.git");
        assert!(!origin.contains("ghs_shortlived"));
        assert!(!origin.contains("x-access-token"));
        assert!(!origin.contains('@'));
    }

    #[tokio::test]
    async fn consecutive_runs_converge_to_the_same_terminal_sequence() {
        let fake = Fake::default();
        let b = bootstrapper(&fake);

        let first = b.run(&request(Transport::Ssh)).await.unwrap();
        assert_eq!(first.initial_state, WorkspaceState::Absent);

        let before_second = fake.calls().len();
        let second = b.run(&request(Transport::Ssh)).await.unwrap();
        assert_eq!(second.initial_state, WorkspaceState::ValidRepo);

        // Both runs end with the same fetch → checkout → lfs tail and the
        // same credential-free origin.
        let calls = fake.calls();
        let tail = &calls[calls.len() - 3..];
        assert_eq!(tail, ["fetch:main:ssh", "checkout", "lfs:ssh"]);
        assert_eq!(
            &calls[before_second - 3..before_second],
            ["fetch:main:ssh", "checkout", "lfs:ssh"]
        );
        assert_eq!(fake.origin().as_deref(), Some("git@github.com:octo/repo.git"));
    }
}
