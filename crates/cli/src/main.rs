//! RunnerWorks CLI entry point.
//!
//! This binary is the composition root for the checkout bootstrapper.
//! Responsibilities:
//!
//! 1. **Parse invocation inputs** — repository slug, target ref, workspace
//!    path, and the optional short-lived token supplied by the orchestrator.
//! 2. **Wire observability** — configure `tracing-subscriber` with a plain or
//!    JSON layer and an optional OpenTelemetry OTLP exporter. All `tracing`
//!    spans and structured events emitted by every crate in the workspace
//!    flow through this layer.
//! 3. **Construct infrastructure** — create the concrete adapters
//!    (`SystemGitCli`, `KnownHostsStore`, `LocalWorkspaceFs`) and inject them
//!    into [`checkout::Bootstrapper`].
//! 4. **Map the outcome** — exit zero on full success; on failure exit with a
//!    phase-distinct non-zero code and a phase-labeled diagnostic on stderr.
//!
//! Retry policy deliberately lives with the invoking orchestrator, not here:
//! a failed run exits; it is never partially reported as success.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info};

use checkout::{
    Bootstrapper, CheckoutRequest, EphemeralToken, GitRef, Phase, RepoSlug, RunReport,
    SshTrustConfig, Transport,
};
use gitcli::{LocalWorkspaceFs, SystemGitCli};
use sshtrust::KnownHostsStore;

mod telemetry;

/// Prepare a clean, authenticated, LFS-aware git workspace on a self-hosted
/// runner.
#[derive(Debug, Parser)]
#[command(name = "runner-checkout", version)]
struct Args {
    /// Repository to check out, as an `owner/name` slug.
    #[arg(long)]
    repo: String,

    /// Branch, tag, or commit SHA to bring the working tree to.
    #[arg(long = "ref")]
    git_ref: String,

    /// Workspace directory, exclusively owned by this job for the run.
    #[arg(long)]
    workspace: PathBuf,

    /// Short-lived OIDC-derived token. Supplying one selects the
    /// ephemeral-HTTPS transport (token carried as a per-invocation header,
    /// never in a URL); otherwise all network operations use SSH.
    #[arg(long, env = "RUNNER_CHECKOUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Pinned known-hosts file. Defaults to `$HOME/.ssh/known_hosts`.
    #[arg(long)]
    known_hosts: Option<PathBuf>,

    /// Write a JSON run report to this path on success.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long)]
    log_json: bool,

    /// OTLP endpoint for span export. Export is disabled when unset.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let telemetry = match telemetry::init(args.log_json, args.otlp_endpoint.as_deref()) {
        Ok(telemetry) => telemetry,
        Err(err) => {
            eprintln!("runner-checkout: failed to initialise telemetry: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = run(&args).await;
    telemetry.shutdown();
    code
}

async fn run(args: &Args) -> ExitCode {
    let (request, trust) = match assemble(args) {
        Ok(parts) => parts,
        Err(err) => {
            eprintln!("runner-checkout: {err:#}");
            return ExitCode::from(2);
        }
    };

    let bootstrapper = Bootstrapper::new(
        SystemGitCli::new(),
        KnownHostsStore::new(),
        LocalWorkspaceFs::new(),
        trust,
    );

    match bootstrapper.run(&request).await {
        Ok(report) => {
            info!(run_id = %report.run_id, "workspace ready");
            if let Some(path) = &args.report {
                if let Err(err) = write_report(path, &report) {
                    error!(%err, "failed to write run report");
                    eprintln!("runner-checkout: {err:#}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let phase = err.phase();
            error!(%phase, %err, "bootstrap failed");
            eprintln!("runner-checkout: [{phase}] {err}");
            ExitCode::from(phase_exit_code(phase))
        }
    }
}

/// Validate the invocation inputs into a request plus trust configuration.
fn assemble(args: &Args) -> Result<(CheckoutRequest, SshTrustConfig)> {
    let repository = RepoSlug::new(&args.repo)
        .ok_or_else(|| anyhow!("invalid repository slug {:?} (expected owner/name)", args.repo))?;
    let git_ref = GitRef::new(&args.git_ref)
        .ok_or_else(|| anyhow!("invalid ref {:?}", args.git_ref))?;

    // An empty token (common when a workflow forwards an unset secret) means
    // no token at all.
    let transport = match args.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => Transport::HttpsEphemeral(
            EphemeralToken::new(token).ok_or_else(|| anyhow!("invalid token"))?,
        ),
        None => Transport::Ssh,
    };

    let known_hosts = match &args.known_hosts {
        Some(path) => path.clone(),
        None => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| anyhow!("HOME is not set; pass --known-hosts"))?;
            PathBuf::from(home).join(".ssh").join("known_hosts")
        }
    };

    let request = CheckoutRequest {
        repository,
        git_ref,
        workspace: args.workspace.clone(),
        transport,
    };
    Ok((request, SshTrustConfig::github(known_hosts)))
}

fn write_report(path: &PathBuf, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialise run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write run report to {}", path.display()))
}

/// Distinct exit code per failing phase, so the orchestrator can tell a trust
/// failure from an LFS failure without parsing stderr.
fn phase_exit_code(phase: Phase) -> u8 {
    match phase {
        Phase::TrustBootstrap => 10,
        Phase::WorkspaceRecovery => 11,
        Phase::AuthConfig => 12,
        Phase::FetchCheckout => 13,
        Phase::Lfs => 14,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(repo: &str, git_ref: &str, token: Option<&str>) -> Args {
        Args {
            repo: repo.to_string(),
            git_ref: git_ref.to_string(),
            workspace: PathBuf::from("/srv/runner/ws"),
            token: token.map(str::to_string),
            known_hosts: Some(PathBuf::from("/srv/runner/.ssh/known_hosts")),
            report: None,
            log_json: false,
            otlp_endpoint: None,
        }
    }

    #[test]
    fn cli_arguments_parse_into_the_expected_shape() {
        let args = Args::try_parse_from([
            "runner-checkout",
            "--repo",
            "octo/repo",
            "--ref",
            "main",
            "--workspace",
            "/srv/runner/ws",
        ])
        .unwrap();
        assert_eq!(args.repo, "octo/repo");
        assert_eq!(args.git_ref, "main");
        assert!(args.token.is_none());
    }

    #[test]
    fn assemble_defaults_to_ssh_transport() {
        let (request, trust) = assemble(&args("octo/repo", "main", None)).unwrap();
        assert!(matches!(request.transport, Transport::Ssh));
        assert_eq!(trust.host, "github.com");
        assert_eq!(
            trust.known_hosts,
            PathBuf::from("/srv/runner/.ssh/known_hosts")
        );
    }

    #[test]
    fn assemble_selects_https_only_when_a_token_is_supplied() {
        let (request, _) =
            assemble(&args("octo/repo", "main", Some("ghs_oidc_exchange"))).unwrap();
        assert!(matches!(request.transport, Transport::HttpsEphemeral(_)));

        // Empty token (a workflow forwarding an unset secret) degrades to SSH
        // rather than an empty bearer header.
        let (request, _) = assemble(&args("octo/repo", "main", Some(""))).unwrap();
        assert!(matches!(request.transport, Transport::Ssh));
    }

    #[test]
    fn assemble_rejects_malformed_inputs() {
        assert!(assemble(&args("git@github.com:octo/repo", "main", None)).is_err());
        assert!(assemble(&args("octo/repo", "--mirror", None)).is_err());
    }

    #[test]
    fn every_phase_maps_to_a_distinct_nonzero_exit_code() {
        let phases = [
            Phase::TrustBootstrap,
            Phase::WorkspaceRecovery,
            Phase::AuthConfig,
            Phase::FetchCheckout,
            Phase::Lfs,
        ];
        let codes: Vec<u8> = phases.iter().map(|p| phase_exit_code(*p)).collect();
        let mut unique = codes.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
        assert!(codes.iter().all(|&c| c != 0));
    }
}
