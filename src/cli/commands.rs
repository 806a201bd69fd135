//! CLI command definitions for yamon-ci.
//!
//! Every command assembles the same collaborators from the global flags:
//! a Docker executor, an optional GitHub client (statuses and releases) and
//! an optional latest channel.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::build::{BuildInvocation, BuildTask, Provenance, PublishIntent};
use crate::config::BuildConfig;
use crate::execution::DockerExecutor;
use crate::github::{GitHubClient, ReleasePublisher, StatusReporter};
use crate::latest::{HttpLatestChannel, LatestChannel};
use crate::matrix::Trigger;
use crate::platform::{Platform, Project};
use crate::router::{EventRouter, WebhookEvent};
use crate::scheduler::{RunnerConfig, TaskRunner};
use crate::server;
use crate::signature::WebhookSecret;

/// Default listen address for the webhook server.
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default time `route` and `serve` wait for spawned builds on exit.
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 1800;

/// CI orchestrator for yamon binaries.
#[derive(Parser)]
#[command(name = "yamon-ci")]
#[command(about = "Build, report and publish yamon binaries in Docker")]
#[command(version)]
#[command(
    long_about = "yamon-ci builds every yamon (project, platform) variant inside a Go toolchain container, reports per-artifact commit statuses, and publishes artifacts to the latest channel or a GitHub release.\n\nExample usage:\n  yamon-ci build --project agent --platform linux/arm64\n  YAMON_CI_WEBHOOK_SECRET=... yamon-ci serve --listen 0.0.0.0:8080"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file; built-in defaults when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Source checkout mounted into build containers.
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Directory finished artifacts are copied into.
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// GitHub token for commit statuses and releases.
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub github_token: Option<String>,

    /// Base URL of the latest channel.
    #[arg(long, env = "YAMON_CI_LATEST_URL", global = true)]
    pub latest_url: Option<String>,

    /// Bearer token for the latest channel.
    #[arg(long, env = "YAMON_CI_LATEST_TOKEN", global = true, hide_env_values = true)]
    pub latest_token: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Build one project for one platform.
    Build(BuildArgs),

    /// Build every matrix entry concurrently and wait for all of them.
    #[command(name = "build-all")]
    BuildAll(BuildAllArgs),

    /// Route a stored webhook delivery, then wait for the spawned builds.
    Route(RouteArgs),

    /// Run the webhook server.
    Serve(ServeArgs),

    /// Print the build matrix and artifact names.
    Matrix(MatrixArgs),
}

/// Arguments for `yamon-ci build`.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Project to build (agent, server).
    #[arg(short, long)]
    pub project: Project,

    /// Target platform as os/arch; the configured default when omitted.
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Publish the artifact to the latest channel.
    #[arg(long)]
    pub latest: bool,

    /// Attach the artifact to the existing release with this tag.
    #[arg(long)]
    pub release: Option<String>,

    /// Commit to report the build status on.
    #[arg(long)]
    pub commit: Option<String>,

    /// Output the outcome as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `yamon-ci build-all`.
#[derive(Parser, Debug)]
pub struct BuildAllArgs {
    /// Commit to report build statuses on.
    #[arg(long)]
    pub commit: Option<String>,

    /// Output the outcomes as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `yamon-ci route`.
#[derive(Parser, Debug)]
pub struct RouteArgs {
    /// Event kind, as sent in the X-GitHub-Event header (push, create, ...).
    #[arg(short, long)]
    pub event: String,

    /// File holding the JSON delivery payload.
    #[arg(short, long)]
    pub payload: PathBuf,

    /// Seconds to wait for spawned builds before giving up.
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout: u64,
}

/// Arguments for `yamon-ci serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Seconds to wait for spawned builds after shutdown is requested.
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout: u64,

    /// Secret deliveries are signed with (X-Hub-Signature-256).
    #[arg(long, env = "YAMON_CI_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,
}

/// Arguments for `yamon-ci matrix`.
#[derive(Parser, Debug)]
pub struct MatrixArgs {
    /// Output the matrix as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = Arc::new(load_config(&cli)?);

    match &cli.command {
        Commands::Build(args) => run_build_command(&cli, config, args).await,
        Commands::BuildAll(args) => run_build_all_command(&cli, config, args).await,
        Commands::Route(args) => run_route_command(&cli, config, args).await,
        Commands::Serve(args) => run_serve_command(&cli, config, args).await,
        Commands::Matrix(args) => run_matrix_command(&config, args),
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Collaborators shared by the build and routing commands.
struct Collaborators {
    github: Option<Arc<GitHubClient>>,
    latest: Option<Arc<dyn LatestChannel>>,
}

impl Collaborators {
    fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let github = match cli.github_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => Some(Arc::new(
                GitHubClient::new(token).context("Failed to create GitHub client")?,
            )),
            None => {
                warn!("No GitHub token; statuses and releases are disabled");
                None
            }
        };

        let latest = match cli.latest_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => {
                let channel = HttpLatestChannel::new(url, cli.latest_token.clone())
                    .context("Failed to create latest channel client")?;
                Some(Arc::new(channel) as Arc<dyn LatestChannel>)
            }
            None => None,
        };

        Ok(Self { github, latest })
    }

    fn releases(&self) -> Option<Arc<dyn ReleasePublisher>> {
        self.github
            .clone()
            .map(|github| github as Arc<dyn ReleasePublisher>)
    }

    fn build_task(&self, config: Arc<BuildConfig>) -> anyhow::Result<BuildTask> {
        let executor = DockerExecutor::new()
            .context("Failed to connect to Docker")?
            .with_run_timeout(config.run_timeout_secs.map(Duration::from_secs));

        let mut task = BuildTask::new(config, Arc::new(executor));
        if let Some(github) = &self.github {
            task = task
                .with_status_reporter(github.clone() as Arc<dyn StatusReporter>)
                .with_release_publisher(github.clone() as Arc<dyn ReleasePublisher>);
        }
        if let Some(latest) = &self.latest {
            task = task.with_latest_channel(latest.clone());
        }
        Ok(task)
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<BuildConfig> {
    let mut config = match &cli.config {
        Some(path) => BuildConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BuildConfig::default(),
    };

    if let Some(workspace) = &cli.workspace {
        config = config.with_workspace(workspace.clone());
    }
    if let Some(output) = &cli.output {
        config.artifact_dir = Some(output.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run_build_command(
    cli: &Cli,
    config: Arc<BuildConfig>,
    args: &BuildArgs,
) -> anyhow::Result<()> {
    let collaborators = Collaborators::from_cli(cli)?;

    let release = match &args.release {
        Some(tag) => {
            let releases = collaborators.releases().with_context(|| {
                format!("Release '{}' requested but no GitHub token is configured", tag)
            })?;
            let handle = releases
                .find_release(&config.repository, tag)
                .await
                .with_context(|| format!("Failed to look up release '{}'", tag))?
                .with_context(|| format!("No release tagged '{}' in {}", tag, config.repository))?;
            Some(handle)
        }
        None => None,
    };

    let mut invocation = BuildInvocation::new(args.project)
        .with_publish(PublishIntent::from_parts(args.latest, release));
    if let Some(platform) = args.platform {
        invocation = invocation.with_platform(platform);
    }
    if let Some(commit) = &args.commit {
        invocation = invocation.with_provenance(Provenance::new(commit));
    }

    let task = collaborators.build_task(config)?;
    let runner = TaskRunner::start(Arc::new(task), RunnerConfig::default());
    let outcome = runner.call(&invocation).await?;

    if args.json {
        print_json(&outcome)?;
    } else {
        println!(
            "{}  {}  {}",
            outcome.artifact,
            outcome.platform,
            crate::utils::format_bytes(outcome.size_bytes)
        );
    }
    Ok(())
}

async fn run_build_all_command(
    cli: &Cli,
    config: Arc<BuildConfig>,
    args: &BuildAllArgs,
) -> anyhow::Result<()> {
    let collaborators = Collaborators::from_cli(cli)?;

    let trigger = Trigger::new(
        PublishIntent::None,
        args.commit.as_deref().map(Provenance::new),
    );
    let invocations = config.matrix().expand(&trigger);
    info!(count = invocations.len(), "Building full matrix");

    let task = collaborators.build_task(config)?;
    let runner = TaskRunner::start(Arc::new(task), RunnerConfig::default());
    let outcomes = runner.call_all(&invocations).await?;

    if args.json {
        print_json(&outcomes)?;
    } else {
        for outcome in &outcomes {
            println!(
                "{}  {}",
                outcome.artifact,
                crate::utils::format_bytes(outcome.size_bytes)
            );
        }
    }
    Ok(())
}

async fn run_route_command(
    cli: &Cli,
    config: Arc<BuildConfig>,
    args: &RouteArgs,
) -> anyhow::Result<()> {
    let body = std::fs::read(&args.payload)
        .with_context(|| format!("Failed to read payload {}", args.payload.display()))?;
    let event = WebhookEvent::from_delivery(&args.event, &body)?;

    let collaborators = Collaborators::from_cli(cli)?;
    let task = collaborators.build_task(config.clone())?;
    let runner = Arc::new(TaskRunner::start(
        Arc::new(task),
        RunnerConfig::default().with_shutdown_timeout(Duration::from_secs(args.drain_timeout)),
    ));
    let router = EventRouter::new(config, runner.clone(), collaborators.releases());

    let outcome = router.route(&event).await?;
    print_json(&outcome)?;

    runner.shutdown().await?;
    let stats = runner.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        "Spawned builds finished"
    );
    if stats.failed > 0 {
        anyhow::bail!("{} of {} spawned builds failed", stats.failed, stats.spawned);
    }
    Ok(())
}

async fn run_serve_command(
    cli: &Cli,
    config: Arc<BuildConfig>,
    args: &ServeArgs,
) -> anyhow::Result<()> {
    if let Err(e) = crate::metrics::init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let collaborators = Collaborators::from_cli(cli)?;
    let task = collaborators.build_task(config.clone())?;
    let runner = Arc::new(TaskRunner::start(
        Arc::new(task),
        RunnerConfig::default().with_shutdown_timeout(Duration::from_secs(args.drain_timeout)),
    ));
    let router = Arc::new(EventRouter::new(
        config,
        runner.clone(),
        collaborators.releases(),
    ));

    if args.webhook_secret.is_empty() {
        anyhow::bail!("Webhook secret must not be empty");
    }
    let secret = WebhookSecret::new(args.webhook_secret.clone());
    let app = server::build_router(router, Some(secret));
    server::serve(args.listen, app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown requested");
    })
    .await?;

    runner.shutdown().await?;
    Ok(())
}

fn run_matrix_command(config: &BuildConfig, args: &MatrixArgs) -> anyhow::Result<()> {
    let rows: Vec<serde_json::Value> = config
        .matrix()
        .entries()
        .iter()
        .map(|entry| {
            serde_json::json!({
                "project": entry.project,
                "platform": entry.platform.to_string(),
                "artifact": config.artifact_name(entry.project, entry.platform),
            })
        })
        .collect();

    if args.json {
        return print_json(&rows);
    }

    for entry in config.matrix().entries() {
        println!(
            "{:<8} {:<14} {}",
            entry.project,
            entry.platform,
            config.artifact_name(entry.project, entry.platform)
        );
    }
    Ok(())
}
