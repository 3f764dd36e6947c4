//! RunnerWorks SSH trust adapter.
//!
//! Implements the [`checkout::HostKeyStore`] port: the pinned known-hosts
//! file has any stale entries for the host dropped (`ssh-keygen -R`), then
//! freshly scanned keys appended (`ssh-keyscan -T <secs> -H`), every run.
//!
//! Strict host-key checking downstream is only safe because of this refresh;
//! accordingly a failed or empty scan is a hard error here, never a fallback
//! to unchecked keys.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use checkout::{HostKeyStore, PortError, SshTrustConfig};

/// Extra wall-clock allowance on top of the per-connection `ssh-keyscan -T`
/// bound, so a wedged scan can never hang the run.
const SCAN_GRACE: Duration = Duration::from_secs(5);

/// [`HostKeyStore`] implementation over the OpenSSH client tools.
#[derive(Debug, Clone, Default)]
pub struct KnownHostsStore;

impl KnownHostsStore {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self
    }

    async fn remove_stale_entries(&self, trust: &SshTrustConfig) -> Result<()> {
        if !tokio::fs::try_exists(&trust.known_hosts)
            .await
            .with_context(|| format!("failed to stat {}", trust.known_hosts.display()))?
        {
            return Ok(());
        }

        let mut cmd = Command::new("ssh-keygen");
        cmd.arg("-R")
            .arg(&trust.host)
            .arg("-f")
            .arg(&trust.known_hosts);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .context("failed to spawn ssh-keygen -R")?;
        if !output.status.success() {
            bail!(
                "ssh-keygen -R {} failed: {}",
                trust.host,
                String::from_utf8_lossy(&output.stderr).trim(),
            );
        }

        // ssh-keygen leaves a `.old` backup next to the file; it may still
        // contain the stale entry, so it does not belong on disk.
        let backup = backup_path(&trust.known_hosts);
        if let Err(err) = tokio::fs::remove_file(&backup).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %backup.display(), %err, "could not remove known_hosts backup");
            }
        }
        Ok(())
    }

    async fn scan_and_append(&self, trust: &SshTrustConfig) -> Result<()> {
        let mut cmd = Command::new("ssh-keyscan");
        cmd.arg("-T")
            .arg(trust.scan_timeout.as_secs().to_string())
            .arg("-H")
            .arg(&trust.host);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = tokio::time::timeout(trust.scan_timeout + SCAN_GRACE, cmd.output())
            .await
            .with_context(|| format!("ssh-keyscan {} timed out", trust.host))?
            .context("failed to spawn ssh-keyscan")?;

        if !output.status.success() {
            bail!(
                "ssh-keyscan {} failed: {}",
                trust.host,
                String::from_utf8_lossy(&output.stderr).trim(),
            );
        }
        if output.stdout.iter().all(|b| b.is_ascii_whitespace()) {
            // Some ssh-keyscan builds exit zero even when every probe fails;
            // no keys means no trust.
            bail!("ssh-keyscan {} returned no host keys", trust.host);
        }

        append_restricted(&trust.known_hosts, &output.stdout)
            .await
            .with_context(|| format!("failed to update {}", trust.known_hosts.display()))?;
        debug!(
            host = %trust.host,
            known_hosts = %trust.known_hosts.display(),
            "host keys refreshed"
        );
        Ok(())
    }
}

fn backup_path(known_hosts: &Path) -> std::path::PathBuf {
    let mut name = known_hosts.as_os_str().to_os_string();
    name.push(".old");
    std::path::PathBuf::from(name)
}

/// Append `contents` to `path`, creating it with owner-only permissions.
async fn append_restricted(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.append(true).create(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl HostKeyStore for KnownHostsStore {
    #[instrument(skip(self), fields(host = %trust.host, known_hosts = %trust.known_hosts.display()))]
    async fn refresh(&self, trust: &SshTrustConfig) -> Result<(), PortError> {
        let refresh = async {
            if let Some(parent) = trust.known_hosts.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            self.remove_stale_entries(trust).await?;
            self.scan_and_append(trust).await?;
            Ok::<_, anyhow::Error>(())
        };
        refresh
            .await
            .map_err(|err| PortError::new(format!("{err:#}")))
    }
}
