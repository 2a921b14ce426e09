//! GitHub source inventory
//!
//! Lists the authenticated user's public, non-fork, non-archived
//! repositories through octocrab.

use async_trait::async_trait;
use octocrab::models::Repository;
use octocrab::Octocrab;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::error::MirrorError;
use crate::platform::{
    MirrorLink, MirrorSpec, NewRepository, RepoShorthand, RepositoryHost, RepositoryRecord,
    Visibility,
};

const PLATFORM: &str = "GitHub";

/// GitHub client wrapper bound to one authenticated user
pub struct GitHubClient {
    client: Octocrab,
    /// Login of the token's owner
    login: String,
    /// Namespace used in mirror URLs (login unless overridden)
    username: String,
    host: String,
}

#[derive(Serialize)]
struct CreateRepositoryBody<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    homepage: Option<&'a str>,
    private: bool,
    has_wiki: bool,
    has_projects: bool,
}

impl GitHubClient {
    /// Create a new GitHub client and resolve the authenticated user
    pub async fn new(config: &GitHubConfig, token: &str) -> Result<Self, MirrorError> {
        let client = Octocrab::builder()
            .base_uri(config.api_url.as_str())
            .map_err(|e| MirrorError::configuration(format!("invalid GitHub API URL: {}", e)))?
            .personal_token(token.to_string())
            .build()
            .map_err(|e| MirrorError::transport(PLATFORM, e.to_string()))?;

        // Get authenticated user information
        let user = client
            .current()
            .user()
            .await
            .map_err(|e| map_octocrab_error(e, "authenticated user"))?;

        let username = config
            .username
            .clone()
            .unwrap_or_else(|| user.login.clone());

        info!("Authenticated as GitHub user: {}", user.login);
        if username != user.login {
            info!("Using GitHub namespace {} for mirror URLs", username);
        }

        Ok(Self {
            client,
            login: user.login,
            username,
            host: config.host.clone(),
        })
    }

    /// Login of the token's owner
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Namespace used in mirror URLs
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Web host repositories are cloned from
    pub fn host(&self) -> &str {
        &self.host
    }

    /// List all repositories for the authenticated user
    async fn list_user_repositories(&self) -> Result<Vec<Repository>, MirrorError> {
        debug!("Fetching user repositories for: {}", self.login);

        let mut repositories = Vec::new();
        let mut page = 1u8;

        loop {
            let page_repos = self
                .client
                .current()
                .list_repos_for_authenticated_user()
                .per_page(100)
                .page(page)
                .send()
                .await
                .map_err(|e| map_octocrab_error(e, &format!("repositories page {}", page)))?;

            let items = page_repos.items;
            if items.is_empty() {
                break;
            }

            repositories.extend(items);

            // octocrab takes the page number as a u8; a non-empty last page
            // means the listing may be incomplete
            if page == u8::MAX {
                return Err(MirrorError::transport(
                    PLATFORM,
                    format!(
                        "repository listing has more than {} pages; refusing a partial inventory",
                        u8::MAX
                    ),
                ));
            }
            page += 1;
        }

        info!("Found {} user repositories", repositories.len());
        Ok(repositories)
    }

    /// Whether a repository belongs in the mirroring inventory
    fn is_mirrorable(&self, repo: &Repository) -> bool {
        let owned = repo
            .owner
            .as_ref()
            .is_some_and(|owner| owner.login.eq_ignore_ascii_case(&self.login));

        if !owned {
            debug!("Excluding repository not owned by {}: {}", self.login, repo.name);
            return false;
        }
        if repo.private == Some(true) {
            debug!("Excluding private repository: {}", repo.name);
            return false;
        }
        if repo.fork == Some(true) {
            debug!("Excluding fork repository: {}", repo.name);
            return false;
        }
        if repo.archived == Some(true) {
            debug!("Excluding archived repository: {}", repo.name);
            return false;
        }
        true
    }
}

/// Convert an octocrab Repository to our RepositoryRecord
fn to_record(repo: &Repository) -> RepositoryRecord {
    let owner = repo
        .owner
        .as_ref()
        .map(|o| o.login.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let mut record = RepositoryRecord::new(repo.id.to_string(), repo.name.clone(), owner);
    record.description = repo.description.clone().filter(|d| !d.is_empty());
    record.homepage_url = repo.homepage.clone().filter(|h| !h.is_empty());
    record.visibility = if repo.private == Some(true) {
        Visibility::Private
    } else {
        repo.visibility
            .as_deref()
            .and_then(Visibility::parse)
            .unwrap_or(Visibility::Public)
    };
    record
}

/// Map an octocrab error to our taxonomy
fn map_octocrab_error(error: octocrab::Error, resource: &str) -> MirrorError {
    match error {
        octocrab::Error::GitHub { source, .. } => {
            let status = source.status_code.as_u16();
            let details = source
                .errors
                .as_ref()
                .map(|errors| serde_json::to_string(errors).unwrap_or_default())
                .unwrap_or_default();

            if status == 404 {
                MirrorError::not_found(PLATFORM, resource)
            } else if status == 422
                && (source.message.contains("already exists") || details.contains("already exists"))
            {
                MirrorError::conflict(PLATFORM, resource)
            } else {
                MirrorError::transport(
                    PLATFORM,
                    format!("{} {} ({})", status, source.message, resource),
                )
            }
        }
        other => MirrorError::transport(PLATFORM, format!("{} ({})", other, resource)),
    }
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    fn platform_name(&self) -> &'static str {
        PLATFORM
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, MirrorError> {
        let repositories = self.list_user_repositories().await?;
        let total = repositories.len();

        let records: Vec<RepositoryRecord> = repositories
            .iter()
            .filter(|repo| self.is_mirrorable(repo))
            .map(to_record)
            .filter(|record| record.visibility == Visibility::Public)
            .collect();

        info!("Repositories after filtering: {} of {}", records.len(), total);
        Ok(records)
    }

    async fn find_repository(
        &self,
        shorthand: &RepoShorthand,
    ) -> Result<RepositoryRecord, MirrorError> {
        if shorthand.is_nested() {
            return Err(MirrorError::configuration(format!(
                "GitHub repositories have a single-level owner: {}",
                shorthand.full_name(&self.login)
            )));
        }

        let owner = shorthand.namespace.as_deref().unwrap_or(&self.login);
        let full_name = shorthand.full_name(&self.login);
        debug!("Fetching GitHub repository {}", full_name);

        let repo = self
            .client
            .repos(owner, &shorthand.name)
            .get()
            .await
            .map_err(|e| map_octocrab_error(e, &full_name))?;

        let record = to_record(&repo);
        if record.visibility != Visibility::Public {
            warn!(
                "{} is not public; its mirror will need credentials with access to it",
                full_name
            );
        }
        Ok(record)
    }

    async fn list_mirrors(&self, _repo: &RepositoryRecord) -> Result<Vec<MirrorLink>, MirrorError> {
        Err(MirrorError::Unsupported {
            platform: PLATFORM,
            operation: "repository mirrors",
        })
    }

    async fn create_repository(
        &self,
        request: &NewRepository,
    ) -> Result<RepositoryRecord, MirrorError> {
        let body = CreateRepositoryBody {
            name: &request.name,
            description: &request.description,
            homepage: request.homepage.as_deref(),
            private: false,
            has_wiki: false,
            has_projects: false,
        };

        let repo: Repository = self
            .client
            .post("/user/repos", Some(&body))
            .await
            .map_err(|e| map_octocrab_error(e, &format!("repository {:?}", request.name)))?;

        info!("Created GitHub repository {}", repo.name);
        Ok(to_record(&repo))
    }

    async fn create_mirror(
        &self,
        _repo: &RepositoryRecord,
        _spec: &MirrorSpec,
    ) -> Result<(), MirrorError> {
        Err(MirrorError::Unsupported {
            platform: PLATFORM,
            operation: "repository mirrors",
        })
    }
}
