//! mirrormaker - GitHub to GitLab mirror reconciliation
//!
//! Discovers a user's public GitHub repositories and their GitLab
//! counterparts, plans the repositories and pull mirrors that are missing,
//! and creates them. Running it again once everything exists is a no-op.
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`platform`]: Provider-agnostic records and the [`RepositoryHost`] trait
//! - [`github`]: GitHub source inventory
//! - [`gitlab`]: GitLab target inventory, mirrors and write operations
//! - [`mirror`]: Mirror link inspection
//! - [`plan`]: Reconciliation engine
//! - [`executor`]: Action executor

pub mod config;
pub mod error;
pub mod executor;
pub mod github;
pub mod gitlab;
pub mod mirror;
pub mod plan;
pub mod platform;

pub use config::Config;
pub use error::MirrorError;
pub use executor::{Executor, RunMode, RunSummary};
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use mirror::{MirrorInspector, MirrorSource};
pub use plan::{Action, ActionOutcome, Plan, Reconciler, Stage};
pub use platform::{MirrorLink, RepoShorthand, RepositoryHost, RepositoryRecord};
