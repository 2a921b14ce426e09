use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mirrormaker::config::Overrides;
use mirrormaker::error::short_error_message;
use mirrormaker::{
    ActionOutcome, Config, Executor, GitHubClient, GitLabClient, MirrorError, MirrorSource, Plan,
    Reconciler, RepoShorthand, RepositoryHost, RunMode, RunSummary, Stage,
};

/// Set up mirroring of repositories from GitHub to GitLab.
///
/// By default, mirrors for all public repositories owned by the user will be
/// set up. If REPO is given, a mirror will be set up for that repository only.
/// REPO can be either a simple project name ("myproject"), in which case its
/// namespace is assumed to be the current user, or the path of a project under
/// a specific namespace ("mynamespace/myproject").
#[derive(Parser)]
#[command(name = "mirrormaker")]
#[command(version)]
struct Cli {
    /// GitHub authentication token
    #[arg(long, env = "MIRRORMAKER_GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitLab authentication token
    #[arg(long, env = "MIRRORMAKER_GITLAB_TOKEN", hide_env_values = true)]
    gitlab_token: Option<String>,

    /// GitHub username used in mirror URLs (defaults to the authenticated GitHub user)
    #[arg(long, env = "MIRRORMAKER_GITHUB_USER")]
    github_user: Option<String>,

    /// Print the summary without creating any repositories or mirrors
    #[arg(long, env = "MIRRORMAKER_DRY_RUN")]
    dry_run: bool,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, env = "MIRRORMAKER_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Single repository to mirror: NAME or NAMESPACE/NAME
    repo: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level);
    info!("Starting mirrormaker v{}", env!("CARGO_PKG_VERSION"));

    config.apply_overrides(Overrides {
        github_token: cli.github_token,
        gitlab_token: cli.gitlab_token,
        github_user: cli.github_user,
    });

    // Everything that can be rejected without the network is rejected first
    let shorthand = cli
        .repo
        .as_deref()
        .map(str::parse::<RepoShorthand>)
        .transpose()?;
    if let Some(shorthand) = &shorthand {
        if shorthand.is_nested() {
            return Err(MirrorError::configuration(format!(
                "GitHub repositories have a single-level owner, got {:?}",
                cli.repo.as_deref().unwrap_or_default()
            ))
            .into());
        }
    }
    let credentials = config.credentials()?;

    let github = GitHubClient::new(&config.github, &credentials.github_token)
        .await
        .context("Failed to authenticate with GitHub")?;
    let gitlab = GitLabClient::new(&config.gitlab, &credentials.gitlab_token)
        .await
        .context("Failed to authenticate with GitLab")?;

    let github_repos = match &shorthand {
        Some(shorthand) => vec![github
            .find_repository(shorthand)
            .await
            .context("Failed to fetch the requested GitHub repository")?],
        None => {
            println!("Getting your public GitHub repositories");
            let repos = github
                .list_repositories()
                .await
                .context("Failed to list GitHub repositories")?;
            if repos.is_empty() {
                println!("There are no public repositories in your GitHub account.");
                return Ok(());
            }
            repos
        }
    };

    println!("Getting your public GitLab repositories");
    let gitlab_repos = gitlab
        .list_repositories()
        .await
        .context("Failed to list GitLab repositories")?;

    let source = MirrorSource::new(github.host(), github.username(), &credentials.github_token)
        .with_login(github.login());

    println!("Checking GitLab mirrors' status");
    let mut plan = Reconciler::new(&gitlab, &source)
        .plan(&github_repos, &gitlab_repos)
        .await
        .context("Failed to compute the mirroring plan")?;

    print_summary_table(&plan);

    let mode = if cli.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Apply
    };

    match Executor::new(&gitlab, &source).execute(&mut plan, mode).await {
        Some(summary) => {
            print_run_summary(&plan, &summary);
            println!("Done!");
        }
        None if cli.dry_run => {
            println!("Run without the --dry-run flag to create missing repositories and mirrors.");
        }
        None => println!("All repositories are already mirrored."),
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool, level: &str) {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Print a table summarizing whether repositories and mirrors exist
fn print_summary_table(plan: &Plan) {
    fn status_cell(missing: bool) -> &'static str {
        if missing {
            "\u{2718} missing"
        } else {
            "\u{2714} created"
        }
    }

    println!("Your mirrors status summary:\n");

    let headers = ["GitHub repo", "GitLab repo", "Mirror"];
    let rows: Vec<[&str; 3]> = plan
        .actions
        .iter()
        .map(|action| {
            [
                action.source_repo.normalized_name.as_str(),
                status_cell(action.needs_target_repo_creation),
                status_cell(action.needs_mirror_creation),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: &[&str; 3]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", format_row(&headers));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in &rows {
        println!("{}", format_row(row));
    }
    println!();
}

/// Print the outcome of applying the plan
fn print_run_summary(plan: &Plan, summary: &RunSummary) {
    println!();
    println!("   Total repositories: {}", summary.total_actions);
    println!("   Mirrored now: {}", summary.applied);
    println!("   Already mirrored: {}", summary.up_to_date);
    println!("   Failed: {}", summary.failed);
    println!("   Skipped: {}", summary.skipped);
    println!("   Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed + summary.skipped == 0 {
        return;
    }

    println!("\nRepositories that need attention:");
    for action in &plan.actions {
        let name = &action.source_repo.normalized_name;
        match &action.outcome {
            ActionOutcome::Failed { stage, error } => {
                let step = match stage {
                    Stage::CreateRepository => "creating the GitLab repository",
                    Stage::CreateMirror => "creating the mirror",
                };
                let note = if *stage == Stage::CreateRepository && action.needs_mirror_creation {
                    " (mirror not created)"
                } else {
                    ""
                };
                println!(
                    "   \u{2718} {}: failed {}: {}{}",
                    name,
                    step,
                    short_error_message(error),
                    note
                );
            }
            ActionOutcome::Skipped { reason } => {
                println!("   - {}: skipped: {}", name, reason);
            }
            _ => {}
        }
    }
}
