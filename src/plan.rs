//! Reconciliation Engine - computes the per-repository action plan
//!
//! The two inventories are joined on normalized name. Every source repository
//! yields exactly one [`Action`], in source order, saying whether its
//! counterpart repository and its mirror still have to be created.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::MirrorError;
use crate::mirror::{MirrorInspector, MirrorSource};
use crate::platform::{RepositoryHost, RepositoryRecord};

/// Which write step an action failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateRepository,
    CreateMirror,
}

/// What happened to an action when the plan was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Not applied yet (or dry run)
    Pending,
    /// Nothing had to be done
    UpToDate,
    /// All required writes succeeded
    Applied {
        created_repository: bool,
        created_mirror: bool,
    },
    /// The action could not run; no write was attempted for the skipped part
    Skipped { reason: String },
    /// A write failed; later steps of the same action were not attempted
    Failed { stage: Stage, error: MirrorError },
}

/// Planned work for one source repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub source_repo: RepositoryRecord,
    /// Counterpart on the target platform; `None` until it exists
    pub target_repo: Option<RepositoryRecord>,
    pub needs_target_repo_creation: bool,
    pub needs_mirror_creation: bool,
    pub outcome: ActionOutcome,
}

impl Action {
    /// Action for a source repository with no counterpart yet
    pub fn create(source_repo: RepositoryRecord) -> Self {
        Self {
            source_repo,
            target_repo: None,
            needs_target_repo_creation: true,
            needs_mirror_creation: true,
            outcome: ActionOutcome::Pending,
        }
    }

    /// Action for a source repository whose counterpart already exists
    pub fn existing(
        source_repo: RepositoryRecord,
        target_repo: RepositoryRecord,
        has_mirror: bool,
    ) -> Self {
        Self {
            source_repo,
            target_repo: Some(target_repo),
            needs_target_repo_creation: false,
            needs_mirror_creation: !has_mirror,
            outcome: ActionOutcome::Pending,
        }
    }

    /// Whether any write is required
    pub fn needs_work(&self) -> bool {
        self.needs_target_repo_creation || self.needs_mirror_creation
    }
}

/// Ordered list of actions for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    /// True when every source repository already has a mirrored counterpart
    pub fn is_converged(&self) -> bool {
        self.actions.iter().all(|action| !action.needs_work())
    }

    pub fn repositories_to_create(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.needs_target_repo_creation)
            .count()
    }

    pub fn mirrors_to_create(&self) -> usize {
        self.actions.iter().filter(|a| a.needs_mirror_creation).count()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Lookup from normalized name to target repository
#[derive(Debug)]
pub struct TargetIndex<'a> {
    by_name: HashMap<&'a str, &'a RepositoryRecord>,
    /// Normalized names shared by records whose raw names differ only in case
    ambiguous: Vec<String>,
}

impl<'a> TargetIndex<'a> {
    /// Index the target inventory by normalized name.
    ///
    /// Two records with the same raw name break the platform's own uniqueness
    /// rule and fail with [`MirrorError::DataIntegrity`]. Records whose names
    /// differ only in case are kept as an ambiguity and the first one wins.
    pub fn build(
        platform: &'static str,
        inventory: &'a [RepositoryRecord],
    ) -> Result<Self, MirrorError> {
        let mut by_name: HashMap<&'a str, &'a RepositoryRecord> = HashMap::new();
        let mut ambiguous = Vec::new();

        for record in inventory {
            match by_name.entry(record.normalized_name.as_str()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(existing) => {
                    let first = existing.get();
                    if first.name == record.name {
                        return Err(MirrorError::integrity(
                            platform,
                            format!(
                                "repository {:?} listed twice (ids {} and {})",
                                record.name, first.identity, record.identity
                            ),
                        ));
                    }
                    if !ambiguous.contains(&record.normalized_name) {
                        ambiguous.push(record.normalized_name.clone());
                    }
                }
            }
        }

        Ok(Self { by_name, ambiguous })
    }

    pub fn get(&self, normalized_name: &str) -> Option<&'a RepositoryRecord> {
        self.by_name.get(normalized_name).copied()
    }

    pub fn ambiguous_names(&self) -> &[String] {
        &self.ambiguous
    }
}

/// Builds action plans against one target platform
pub struct Reconciler<'a> {
    target: &'a dyn RepositoryHost,
    inspector: MirrorInspector<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(target: &'a dyn RepositoryHost, source: &'a MirrorSource) -> Self {
        Self {
            target,
            inspector: MirrorInspector::new(target, source),
        }
    }

    /// Compute one action per source repository, preserving source order.
    ///
    /// Fails if the target inventory is inconsistent or if the mirrors of an
    /// existing counterpart cannot be listed: a plan built on partial mirror
    /// information could schedule duplicate mirrors.
    pub async fn plan(
        &self,
        source_inventory: &[RepositoryRecord],
        target_inventory: &[RepositoryRecord],
    ) -> Result<Plan, MirrorError> {
        let index = TargetIndex::build(self.target.platform_name(), target_inventory)?;

        if !index.ambiguous_names().is_empty() {
            warn!(
                "{} has names that differ only in case ({}); using the first match",
                self.target.platform_name(),
                index.ambiguous_names().join(", ")
            );
        }

        let mut actions = Vec::with_capacity(source_inventory.len());

        for source_repo in source_inventory {
            let action = match index.get(&source_repo.normalized_name) {
                None => {
                    debug!(
                        "No {} counterpart for {}",
                        self.target.platform_name(),
                        source_repo.full_name()
                    );
                    Action::create(source_repo.clone())
                }
                Some(target_repo) => {
                    let has_mirror = self.inspector.has_mirror_of(target_repo, source_repo).await?;
                    debug!(
                        "{} counterpart {} for {} (mirror configured: {})",
                        self.target.platform_name(),
                        target_repo.full_name(),
                        source_repo.full_name(),
                        has_mirror
                    );
                    Action::existing(source_repo.clone(), target_repo.clone(), has_mirror)
                }
            };
            actions.push(action);
        }

        let plan = Plan { actions };

        info!(
            "Planned {} repositories: {} to create, {} mirrors to create",
            plan.len(),
            plan.repositories_to_create(),
            plan.mirrors_to_create()
        );

        Ok(plan)
    }
}
