//! Mirror link inspection
//!
//! Decides whether a target-platform repository already mirrors a given
//! source-platform repository. Matching is a case-insensitive suffix test on
//! the mirror's remote URL: `<host>/<namespace>/<name>.git`. A mirror whose
//! URL has some other shape is reported as missing, never as present.

use std::fmt;

use tracing::debug;

use crate::error::MirrorError;
use crate::platform::{
    redact_credentials, MirrorDirection, MirrorLink, MirrorSpec, RepositoryHost, RepositoryRecord,
};

/// Check whether any of `mirrors` points at `<host>/<namespace>/<normalized_name>.git`.
pub fn mirror_points_to(
    mirrors: &[MirrorLink],
    normalized_name: &str,
    host: &str,
    namespace: &str,
) -> bool {
    let suffix = format!("{}/{}/{}.git", host, namespace, normalized_name).to_lowercase();

    mirrors.iter().any(|mirror| match mirror.remote_url.as_deref() {
        Some(url) if !url.is_empty() => url.to_lowercase().ends_with(&suffix),
        _ => false,
    })
}

/// The source side of every mirror: where mirrors pull from and with which
/// credentials.
#[derive(Clone)]
pub struct MirrorSource {
    /// Web host of the source platform (e.g. "github.com")
    pub host: String,
    /// User in mirror credentials, and the namespace of the user's own repositories
    pub namespace: String,
    /// Authenticated login, when it differs from `namespace`
    login: Option<String>,
    token: String,
}

impl MirrorSource {
    pub fn new(
        host: impl Into<String>,
        namespace: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            namespace: namespace.into(),
            login: None,
            token: token.into(),
        }
    }

    /// Record the authenticated login so its repositories use `namespace`
    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    /// Namespace the mirror of `source_repo` pulls from.
    ///
    /// Repositories of the authenticated user live under `namespace`; a
    /// repository owned by anyone else (an organisation named on the command
    /// line) keeps its own owner.
    pub fn owner_of<'r>(&'r self, source_repo: &'r RepositoryRecord) -> &'r str {
        let owner = source_repo.namespace.as_str();
        let is_own = owner.is_empty()
            || owner.eq_ignore_ascii_case(&self.namespace)
            || self
                .login
                .as_deref()
                .is_some_and(|login| owner.eq_ignore_ascii_case(login));

        if is_own {
            &self.namespace
        } else {
            owner
        }
    }

    /// Credentialed clone URL the target platform pulls from
    pub fn mirror_url(&self, owner: &str, normalized_name: &str) -> String {
        format!(
            "https://{user}:{token}@{host}/{owner}/{name}.git",
            user = self.namespace,
            token = self.token,
            host = self.host,
            owner = owner,
            name = normalized_name
        )
    }

    /// Mirror specification for the counterpart of `source_repo`
    pub fn mirror_spec(&self, source_repo: &RepositoryRecord) -> MirrorSpec {
        MirrorSpec {
            url: self.mirror_url(self.owner_of(source_repo), &source_repo.normalized_name),
            enabled: true,
            only_protected_branches: true,
        }
    }
}

impl fmt::Debug for MirrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorSource")
            .field("host", &self.host)
            .field("namespace", &self.namespace)
            .field("login", &self.login)
            .field("token", &"*****")
            .finish()
    }
}

/// Lists mirrors on target repositories and matches them against the source
pub struct MirrorInspector<'a> {
    target: &'a dyn RepositoryHost,
    source: &'a MirrorSource,
}

impl<'a> MirrorInspector<'a> {
    pub fn new(target: &'a dyn RepositoryHost, source: &'a MirrorSource) -> Self {
        Self { target, source }
    }

    /// Whether `target_repo` already has a mirror of `source_repo`
    pub async fn has_mirror_of(
        &self,
        target_repo: &RepositoryRecord,
        source_repo: &RepositoryRecord,
    ) -> Result<bool, MirrorError> {
        let mirrors = self.target.list_mirrors(target_repo).await?;

        for mirror in &mirrors {
            debug!(
                "{} mirror on {}: {} (enabled: {})",
                match mirror.direction {
                    MirrorDirection::Push => "push",
                    MirrorDirection::Pull => "pull",
                },
                target_repo.full_name(),
                mirror
                    .remote_url
                    .as_deref()
                    .map(redact_credentials)
                    .unwrap_or_else(|| "<no url>".to_string()),
                mirror.enabled
            );
        }

        Ok(mirror_points_to(
            &mirrors,
            &source_repo.normalized_name,
            &self.source.host,
            self.source.owner_of(source_repo),
        ))
    }
}
