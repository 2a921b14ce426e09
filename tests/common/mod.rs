//! Common test utilities and helpers for mirrormaker tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use mirrormaker::platform::{MirrorDirection, MirrorSpec, NewRepository};
use mirrormaker::{MirrorError, MirrorLink, RepoShorthand, RepositoryHost, RepositoryRecord};

pub const SOURCE_HOST: &str = "github.com";
pub const SOURCE_USER: &str = "octocat";
pub const TARGET_USER: &str = "octocat-lab";

/// Source repository owned by the test user
pub fn source_repo(id: u64, name: &str) -> RepositoryRecord {
    RepositoryRecord::new(id.to_string(), name, SOURCE_USER)
}

/// Pull mirror URL as the target platform would report it back
pub fn masked_mirror_url(name: &str) -> String {
    format!("https://*****:*****@{}/{}/{}.git", SOURCE_HOST, SOURCE_USER, name)
}

#[derive(Debug, Default)]
struct FakeState {
    repositories: Vec<RepositoryRecord>,
    mirrors: Vec<(String, MirrorLink)>,
    next_id: u64,
    create_repository_calls: Vec<String>,
    create_mirror_calls: Vec<String>,
}

/// In-memory target platform that remembers what it was asked to create
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<FakeState>,
    conflict_on_create: HashSet<String>,
    failing_mirrors: HashSet<String>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 1000,
                ..FakeState::default()
            }),
            ..Self::default()
        }
    }

    /// Add an existing repository, optionally already mirroring `mirror_url`
    pub fn with_repository(self, name: &str, mirror_url: Option<String>) -> Self {
        {
            let mut state = self.state.lock().expect("fake host lock");
            let record = RepositoryRecord::new(state.next_id.to_string(), name, TARGET_USER);
            state.next_id += 1;
            if let Some(url) = mirror_url {
                state.mirrors.push((
                    record.identity.clone(),
                    MirrorLink {
                        remote_url: Some(url),
                        enabled: true,
                        direction: MirrorDirection::Pull,
                    },
                ));
            }
            state.repositories.push(record);
        }
        self
    }

    /// Repository creation for `name` fails as if it already existed
    pub fn with_conflict_on_create(mut self, name: &str) -> Self {
        self.conflict_on_create.insert(name.to_string());
        self
    }

    /// Mirror creation on `name` fails with a transport error
    pub fn with_failing_mirror(mut self, name: &str) -> Self {
        self.failing_mirrors.insert(name.to_string());
        self
    }

    pub fn repositories(&self) -> Vec<RepositoryRecord> {
        self.state.lock().expect("fake host lock").repositories.clone()
    }

    pub fn create_repository_calls(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("fake host lock")
            .create_repository_calls
            .clone()
    }

    pub fn create_mirror_calls(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("fake host lock")
            .create_mirror_calls
            .clone()
    }

    pub fn mirror_urls(&self, name: &str) -> Vec<String> {
        let state = self.state.lock().expect("fake host lock");
        let Some(repo) = state.repositories.iter().find(|r| r.name == name) else {
            return Vec::new();
        };
        state
            .mirrors
            .iter()
            .filter(|(identity, _)| *identity == repo.identity)
            .filter_map(|(_, link)| link.remote_url.clone())
            .collect()
    }
}

#[async_trait]
impl RepositoryHost for FakeHost {
    fn platform_name(&self) -> &'static str {
        "FakeLab"
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, MirrorError> {
        Ok(self.repositories())
    }

    async fn find_repository(
        &self,
        shorthand: &RepoShorthand,
    ) -> Result<RepositoryRecord, MirrorError> {
        self.repositories()
            .into_iter()
            .find(|r| r.name == shorthand.name)
            .ok_or_else(|| MirrorError::not_found("FakeLab", shorthand.full_name(TARGET_USER)))
    }

    async fn list_mirrors(&self, repo: &RepositoryRecord) -> Result<Vec<MirrorLink>, MirrorError> {
        let state = self.state.lock().expect("fake host lock");
        Ok(state
            .mirrors
            .iter()
            .filter(|(identity, _)| *identity == repo.identity)
            .map(|(_, link)| link.clone())
            .collect())
    }

    async fn create_repository(
        &self,
        request: &NewRepository,
    ) -> Result<RepositoryRecord, MirrorError> {
        let mut state = self.state.lock().expect("fake host lock");
        state.create_repository_calls.push(request.name.clone());

        if self.conflict_on_create.contains(&request.name)
            || state.repositories.iter().any(|r| r.name == request.name)
        {
            return Err(MirrorError::conflict("FakeLab", format!("project {:?}", request.name)));
        }

        let record = RepositoryRecord::new(state.next_id.to_string(), &request.name, TARGET_USER)
            .with_description(request.description.as_str());
        state.next_id += 1;
        state.repositories.push(record.clone());
        Ok(record)
    }

    async fn create_mirror(
        &self,
        repo: &RepositoryRecord,
        spec: &MirrorSpec,
    ) -> Result<(), MirrorError> {
        let mut state = self.state.lock().expect("fake host lock");
        state.create_mirror_calls.push(repo.name.clone());

        if self.failing_mirrors.contains(&repo.name) {
            return Err(MirrorError::transport(
                "FakeLab",
                format!("500 Internal Server Error: could not import {}", spec.url),
            ));
        }
        if !state.repositories.iter().any(|r| r.identity == repo.identity) {
            return Err(MirrorError::not_found("FakeLab", repo.full_name()));
        }

        state.mirrors.push((
            repo.identity.clone(),
            MirrorLink {
                remote_url: Some(spec.url.clone()),
                enabled: spec.enabled,
                direction: MirrorDirection::Pull,
            },
        ));
        Ok(())
    }
}
