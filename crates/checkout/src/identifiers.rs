//! Newtype domain identifiers.
//!
//! Every value that crosses the bootstrapper's boundary is represented as a
//! distinct newtype wrapping a primitive, with validation at the constructor.
//! This matters more here than in most domains: a repository slug or ref that
//! carries unexpected characters is not just a type error, it is a vector for
//! smuggling credentials into a remote URL or flags into a git invocation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The base HTTPS URL for the GitHub host, as git spells it in
/// `http.<base>.extraheader` configuration keys.
pub const GITHUB_HTTP_BASE: &str = "https://github.com/";

/// The SSH host that checkout traffic is pinned to.
pub const GITHUB_SSH_HOST: &str = "github.com";

// ---------------------------------------------------------------------------
// RepoSlug
// ---------------------------------------------------------------------------

/// Identifies a GitHub repository in `"owner/name"` form.
///
/// Validation is deliberately strict: exactly one `/`, and each segment is
/// limited to `[A-Za-z0-9._-]`. This guarantees that the derived remote URLs
/// can never contain an embedded credential (`@`, `:`) or an alternate host,
/// no matter what the orchestrator passes in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoSlug(String);

impl RepoSlug {
    /// Creates a slug, returning `None` if the value is not a well-formed
    /// `owner/name` pair.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        let mut parts = v.split('/');
        let (owner, name) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        if !segment_ok(owner) || !segment_ok(name) {
            return None;
        }
        Some(Self(v))
    }

    /// Returns the slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The SSH origin form for this repository: `git@github.com:<slug>.git`.
    ///
    /// This is the only URL shape the bootstrapper ever persists as `origin`
    /// when running over SSH.
    pub fn ssh_url(&self) -> String {
        format!("git@{}:{}.git", GITHUB_SSH_HOST, self.0)
    }

    /// The credential-free HTTPS form: `https://github.com/<slug>.git`.
    ///
    /// Used only when the caller explicitly selects the ephemeral-token
    /// transport; the token travels as a per-invocation header, never inside
    /// this URL.
    pub fn https_url(&self) -> String {
        format!("{}{}.git", GITHUB_HTTP_BASE, self.0)
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn segment_ok(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

// ---------------------------------------------------------------------------
// GitRef
// ---------------------------------------------------------------------------

/// A Git ref to check out: a branch name, tag, or commit SHA.
///
/// Must be non-empty, free of whitespace and control characters, and must not
/// begin with `-` so it can never be parsed as a flag by a git sub-command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitRef(String);

impl GitRef {
    /// Creates a ref, returning `None` if the value is empty or unsafe to
    /// pass as a git argument.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty()
            || v.starts_with('-')
            || v.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return None;
        }
        Some(Self(v))
    }

    /// Returns the ref as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BootstrapRunId
// ---------------------------------------------------------------------------

/// Identifies a single bootstrap run (one invocation of the binary).
///
/// Generated fresh for every invocation; propagated through spans and the run
/// report so all activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootstrapRunId(Uuid);

impl BootstrapRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for BootstrapRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_accepts_owner_name_pairs() {
        for ok in ["octo/repo", "octo-org/my.repo", "a_b/c-d"] {
            assert!(RepoSlug::new(ok).is_some(), "{ok} should be accepted");
        }
    }

    #[test]
    fn slug_rejects_url_smuggling_shapes() {
        for bad in [
            "",
            "norepo",
            "a/b/c",
            "git@github.com:org/repo",
            "org/repo.git extra",
            "https://github.com/org/repo",
            "user:pass/repo",
            "org/",
            "/repo",
        ] {
            assert!(RepoSlug::new(bad).is_none(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn slug_derives_credential_free_urls() {
        let slug = RepoSlug::new("octo/repo").unwrap();
        assert_eq!(slug.ssh_url(), "git@github.com:octo/repo.git");
        assert_eq!(slug.https_url(), "https://github.com/octo/repo.git");
    }

    #[test]
    fn git_ref_rejects_flag_like_values() {
        assert!(GitRef::new("-rf").is_none());
        assert!(GitRef::new("--mirror").is_none());
        assert!(GitRef::new("").is_none());
        assert!(GitRef::new("main branch").is_none());
        assert!(GitRef::new("main").is_some());
        assert!(GitRef::new("refs/heads/feature/x").is_some());
        assert!(GitRef::new("0123abc").is_some());
    }
}
