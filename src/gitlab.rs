//! GitLab target platform
//!
//! Inventory, mirror listing and the write operations the executor needs,
//! over the GitLab REST API (v4) with reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GitLabConfig;
use crate::error::MirrorError;
use crate::platform::{
    MirrorDirection, MirrorLink, MirrorSpec, NewRepository, RepoShorthand, RepositoryHost,
    RepositoryRecord, Visibility,
};

const PLATFORM: &str = "GitLab";

/// GitLab project - fields we need from the API response
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    pub id: u64,
    pub name: String,
    /// Project path (slug), unique within its namespace
    pub path: String,
    pub path_with_namespace: String,
    pub description: Option<String>,
    /// Missing from responses for unauthenticated or limited tokens
    pub visibility: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub forked_from_project: Option<serde_json::Value>,
    /// Whether the project pulls from `import_url`
    pub mirror: Option<bool>,
    pub import_url: Option<String>,
    pub namespace: GitLabNamespace,
}

/// GitLab namespace (group or user)
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabNamespace {
    pub full_path: String,
}

/// Push mirror as returned by `/projects/:id/remote_mirrors`
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabRemoteMirror {
    pub url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GitLabUser {
    username: String,
}

#[derive(Serialize)]
struct CreateProjectBody<'a> {
    name: &'a str,
    path: &'a str,
    description: &'a str,
    visibility: &'static str,
}

#[derive(Serialize)]
struct PullMirrorBody<'a> {
    mirror: bool,
    import_url: &'a str,
    only_mirror_protected_branches: bool,
}

impl GitLabProject {
    fn to_record(&self) -> RepositoryRecord {
        let mut record = RepositoryRecord::new(
            self.id.to_string(),
            self.path.clone(),
            self.namespace.full_path.clone(),
        );
        record.description = self.description.clone().filter(|d| !d.is_empty());
        record.visibility = self
            .visibility
            .as_deref()
            .and_then(Visibility::parse)
            .unwrap_or(Visibility::Private);
        record
    }

    fn is_mirrorable(&self) -> bool {
        if self.archived {
            debug!("Excluding archived project: {}", self.path_with_namespace);
            return false;
        }
        if self.forked_from_project.is_some() {
            debug!("Excluding fork project: {}", self.path_with_namespace);
            return false;
        }
        if self.visibility.as_deref() != Some("public") {
            debug!("Excluding non-public project: {}", self.path_with_namespace);
            return false;
        }
        true
    }

    /// The project's pull mirror, if one is configured
    fn pull_mirror(&self) -> Option<MirrorLink> {
        if self.mirror != Some(true) {
            return None;
        }
        Some(MirrorLink {
            remote_url: self.import_url.clone(),
            enabled: true,
            direction: MirrorDirection::Pull,
        })
    }
}

/// Extract the `rel="next"` URL from a Link header.
///
/// GitLab Link headers look like:
/// `<https://gitlab.com/api/v4/projects?page=2&per_page=100>; rel="next", <...>; rel="last"`
pub fn next_page_url(link_header: &str) -> Option<&str> {
    for part in link_header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.trim().split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some("next")) = (url, rel) {
            return Some(url);
        }
    }

    None
}

fn next_page(headers: &HeaderMap) -> Option<Url> {
    let header = headers.get(LINK)?.to_str().ok()?;
    next_page_url(header).and_then(|url| Url::parse(url).ok())
}

/// GitLab API client bound to one authenticated user
pub struct GitLabClient {
    http: Client,
    api_base: Url,
    token: String,
    username: String,
}

impl GitLabClient {
    /// Create a new GitLab client and resolve the authenticated user
    pub async fn new(config: &GitLabConfig, token: &str) -> Result<Self, MirrorError> {
        let base = config.url.trim_end_matches('/');
        let api_base = Url::parse(&format!("{}/api/v4/", base)).map_err(|e| {
            MirrorError::configuration(format!("invalid GitLab URL {:?}: {}", config.url, e))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(concat!("mirrormaker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorError::transport(PLATFORM, e.to_string()))?;

        let mut client = Self {
            http,
            api_base,
            token: token.to_string(),
            username: String::new(),
        };

        let user: GitLabUser = client
            .get_json(client.endpoint(&["user"])?, "authenticated user")
            .await?;
        info!("Authenticated as GitLab user: {}", user.username);
        client.username = user.username;

        Ok(client)
    }

    /// Get the authenticated username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Build an API URL from path segments; each segment is percent-encoded,
    /// so `group/project` becomes a single `group%2Fproject` segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, MirrorError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                MirrorError::configuration(format!(
                    "GitLab URL cannot be a base: {}",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, MirrorError> {
        let response = request
            .send()
            .await
            .map_err(|e| MirrorError::transport(PLATFORM, format!("{} ({})", e, resource)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, resource))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &str,
    ) -> Result<T, MirrorError> {
        let response = self.send(self.request(Method::GET, url), resource).await?;
        decode(response, resource).await
    }

    /// GET every page of a list endpoint by following `rel="next"` links
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        first: Url,
        resource: &str,
    ) -> Result<Vec<T>, MirrorError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut page = 1;

        while let Some(url) = next {
            debug!("Fetching {} page {}", resource, page);
            let response = self.send(self.request(Method::GET, url), resource).await?;
            next = next_page(response.headers());

            let batch: Vec<T> = decode(response, &format!("{} page {}", resource, page)).await?;
            items.extend(batch);
            page += 1;
        }

        Ok(items)
    }

    async fn get_project(&self, identity: &str) -> Result<GitLabProject, MirrorError> {
        let url = self.endpoint(&["projects", identity])?;
        self.get_json(url, &format!("project {}", identity)).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response, resource: &str) -> Result<T, MirrorError> {
    response.json().await.map_err(|e| {
        MirrorError::transport(PLATFORM, format!("invalid response for {}: {}", resource, e))
    })
}

/// Classify a non-success response into our error taxonomy
fn classify_failure(status: StatusCode, body: &str, resource: &str) -> MirrorError {
    match status {
        StatusCode::NOT_FOUND => MirrorError::not_found(PLATFORM, resource),
        StatusCode::CONFLICT => MirrorError::conflict(PLATFORM, resource),
        StatusCode::BAD_REQUEST if body.contains("has already been taken") => {
            MirrorError::conflict(PLATFORM, resource)
        }
        _ => MirrorError::transport(PLATFORM, format!("{} {} ({})", status, body.trim(), resource)),
    }
}

#[async_trait]
impl RepositoryHost for GitLabClient {
    fn platform_name(&self) -> &'static str {
        PLATFORM
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, MirrorError> {
        let mut url = self.endpoint(&["projects"])?;
        url.query_pairs_mut()
            .append_pair("visibility", "public")
            .append_pair("owned", "true")
            .append_pair("archived", "false")
            .append_pair("per_page", "100");

        let projects: Vec<GitLabProject> = self.get_all_pages(url, "owned projects").await?;
        let total = projects.len();

        let records: Vec<RepositoryRecord> = projects
            .iter()
            .filter(|project| project.is_mirrorable())
            .map(GitLabProject::to_record)
            .collect();

        info!("Found {} GitLab projects ({} mirrorable)", total, records.len());
        Ok(records)
    }

    async fn find_repository(
        &self,
        shorthand: &RepoShorthand,
    ) -> Result<RepositoryRecord, MirrorError> {
        let full_name = shorthand.full_name(&self.username);
        let project = self.get_project(&full_name).await?;
        Ok(project.to_record())
    }

    async fn list_mirrors(&self, repo: &RepositoryRecord) -> Result<Vec<MirrorLink>, MirrorError> {
        let url = self.endpoint(&["projects", &repo.identity, "remote_mirrors"])?;
        let remote: Vec<GitLabRemoteMirror> = self
            .get_all_pages(url, &format!("mirrors of {}", repo.full_name()))
            .await?;

        let mut mirrors: Vec<MirrorLink> = remote
            .into_iter()
            .map(|m| MirrorLink {
                remote_url: m.url,
                enabled: m.enabled,
                direction: MirrorDirection::Push,
            })
            .collect();

        // pull mirrors only show up on the project itself
        let project = self.get_project(&repo.identity).await?;
        mirrors.extend(project.pull_mirror());

        Ok(mirrors)
    }

    async fn create_repository(
        &self,
        request: &NewRepository,
    ) -> Result<RepositoryRecord, MirrorError> {
        let body = CreateProjectBody {
            name: &request.name,
            path: &request.name,
            description: &request.description,
            visibility: "public",
        };
        if let Some(homepage) = &request.homepage {
            debug!("GitLab projects have no homepage field; not copying {}", homepage);
        }

        let resource = format!("project {:?}", request.name);
        let url = self.endpoint(&["projects"])?;
        let response = self
            .send(self.request(Method::POST, url).json(&body), &resource)
            .await?;
        let project: GitLabProject = decode(response, &resource).await?;

        info!("Created GitLab project {}", project.path_with_namespace);
        Ok(project.to_record())
    }

    async fn create_mirror(
        &self,
        repo: &RepositoryRecord,
        spec: &MirrorSpec,
    ) -> Result<(), MirrorError> {
        let body = PullMirrorBody {
            mirror: spec.enabled,
            import_url: &spec.url,
            only_mirror_protected_branches: spec.only_protected_branches,
        };

        let url = self.endpoint(&["projects", &repo.identity])?;
        self.send(
            self.request(Method::PUT, url).json(&body),
            &format!("pull mirror for {}", repo.full_name()),
        )
        .await?;

        info!("Configured pull mirror on {}", repo.full_name());
        Ok(())
    }
}
