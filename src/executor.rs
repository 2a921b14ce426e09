//! Action Executor - applies a plan against the target platform
//!
//! Actions run one at a time in plan order. A repository created for an
//! action is stored back on that action before its mirror is created, so the
//! mirror step always sees the fresh identity. Failures stay with the action
//! that caused them; nothing is retried.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::MirrorError;
use crate::mirror::MirrorSource;
use crate::plan::{Action, ActionOutcome, Plan, Stage};
use crate::platform::{redact_credentials, NewRepository, RepositoryHost};

/// Results from applying a complete plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total_actions: usize,
    pub applied: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl RunSummary {
    /// Compile a summary from the outcomes recorded on `plan`
    pub fn compile(plan: &Plan, duration: Duration) -> Self {
        let mut applied = 0;
        let mut up_to_date = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for action in &plan.actions {
            match action.outcome {
                ActionOutcome::Applied { .. } => applied += 1,
                ActionOutcome::UpToDate => up_to_date += 1,
                ActionOutcome::Skipped { .. } | ActionOutcome::Pending => skipped += 1,
                ActionOutcome::Failed { .. } => failed += 1,
            }
        }

        Self {
            total_actions: plan.len(),
            applied,
            up_to_date,
            skipped,
            failed,
            duration,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Whether a run writes to the target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Plan and report only
    DryRun,
    Apply,
}

/// Applies actions against the target platform's write API
pub struct Executor<'a> {
    target: &'a dyn RepositoryHost,
    source: &'a MirrorSource,
}

impl<'a> Executor<'a> {
    pub fn new(target: &'a dyn RepositoryHost, source: &'a MirrorSource) -> Self {
        Self { target, source }
    }

    /// Apply `plan` according to `mode`.
    ///
    /// Returns `None` without touching the target when this is a dry run or
    /// when every action is already up to date.
    pub async fn execute(&self, plan: &mut Plan, mode: RunMode) -> Option<RunSummary> {
        if mode == RunMode::DryRun {
            info!(
                "Dry run: {} repositories and {} mirrors would be created",
                plan.repositories_to_create(),
                plan.mirrors_to_create()
            );
            return None;
        }

        if plan.is_converged() {
            info!("All {} repositories are already mirrored", plan.len());
            return None;
        }

        Some(self.apply_all(plan).await)
    }

    /// Apply every action in plan order and summarise the outcomes
    pub async fn apply_all(&self, plan: &mut Plan) -> RunSummary {
        let start_time = Instant::now();

        info!("Applying {} planned actions", plan.len());

        for action in plan.actions.iter_mut() {
            self.apply(action).await;
        }

        let summary = RunSummary::compile(plan, start_time.elapsed());

        info!(
            "Apply completed in {:.2}s: {} applied, {} up to date, {} failed, {} skipped",
            summary.duration.as_secs_f64(),
            summary.applied,
            summary.up_to_date,
            summary.failed,
            summary.skipped
        );

        summary
    }

    /// Apply a single action, recording the outcome on it
    pub async fn apply(&self, action: &mut Action) {
        let platform = self.target.platform_name();
        let name = action.source_repo.full_name();

        if !action.needs_work() {
            debug!("{} is already mirrored on {}", name, platform);
            action.outcome = ActionOutcome::UpToDate;
            return;
        }

        let mut created_repository = false;

        if action.needs_target_repo_creation {
            let request = NewRepository::counterpart_of(&action.source_repo);
            info!("Creating {} repository {}", platform, request.name);

            match self.target.create_repository(&request).await {
                Ok(created) => {
                    debug!(
                        "Created {} repository {} (id {})",
                        platform,
                        created.full_name(),
                        created.identity
                    );
                    action.target_repo = Some(created);
                    created_repository = true;
                }
                Err(e) => {
                    if e.is_conflict() {
                        warn!(
                            "{} repository for {} appeared since inventory: {}",
                            platform, name, e
                        );
                    } else {
                        error!("Failed to create {} repository for {}: {}", platform, name, e);
                    }
                    action.outcome = ActionOutcome::Failed {
                        stage: Stage::CreateRepository,
                        error: e,
                    };
                    return;
                }
            }
        }

        if !action.needs_mirror_creation {
            action.outcome = ActionOutcome::Applied {
                created_repository,
                created_mirror: false,
            };
            return;
        }

        let Some(target_repo) = action.target_repo.as_ref() else {
            warn!("Skipping mirror for {}: no {} repository to attach it to", name, platform);
            action.outcome = ActionOutcome::Skipped {
                reason: format!("no {} repository to attach the mirror to", platform),
            };
            return;
        };

        let spec = self.source.mirror_spec(&action.source_repo);
        info!(
            "Creating {} mirror of {} on {}",
            platform,
            redact_credentials(&spec.url),
            target_repo.full_name()
        );

        action.outcome = match self.target.create_mirror(target_repo, &spec).await {
            Ok(()) => ActionOutcome::Applied {
                created_repository,
                created_mirror: true,
            },
            Err(e) => {
                error!("Failed to create {} mirror for {}: {}", platform, name, e);
                ActionOutcome::Failed {
                    stage: Stage::CreateMirror,
                    error: scrub_token(e, self.source),
                }
            }
        };
    }
}

/// Platforms may echo the mirror URL back in error bodies
fn scrub_token(error: MirrorError, source: &MirrorSource) -> MirrorError {
    let credentialed = source.mirror_url(&source.namespace, "");
    let Some(prefix_end) = credentialed.find('@') else {
        return error;
    };
    let secret = &credentialed[..prefix_end];
    match error {
        MirrorError::Transport { platform, message } if message.contains(secret) => {
            MirrorError::Transport {
                platform,
                message: message.replace(secret, "https://*****"),
            }
        }
        other => other,
    }
}
