use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ferry::config::{FerryConfig, RunOptions};
use ferry::console::{Console, StdConsole};
use ferry::error::FerryError;

/// Batch revision migration between git repositories
///
/// ferry replays revisions from an origin repository (git or a local
/// folder) into a destination repository (a git branch, a feature branch
/// for a pull request, or a Gerrit review), applying the transforms and
/// path filters a config file declares.
///
/// The last migrated revision is never stored outside git: destination
/// commits carry an origin-revision label in their trailer, and each run
/// recovers its baseline by scanning for it.
#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one workflow from a config file
    Migrate(MigrateArgs),

    /// Run one mirror job from a config file
    Mirror(MirrorArgs),

    /// Show the workflows and mirrors a config file defines
    Info {
        /// Path to ferry.toml
        config: PathBuf,
    },
}

#[derive(Args)]
struct MigrateArgs {
    /// Path to ferry.toml
    config: PathBuf,

    /// Workflow to run (defaults to the only one defined)
    workflow: Option<String>,

    /// Origin reference to migrate (defaults to the configured ref)
    source_ref: Option<String>,

    /// Initialize missing destination refs and downgrade destination
    /// rejections to warnings
    #[arg(long)]
    force: bool,

    /// Run every step except the final push
    #[arg(long)]
    dry_run: bool,

    /// Server push option, repeatable (git push --push-option)
    #[arg(long = "git-push-option", value_name = "OPTION")]
    git_push_options: Vec<String>,

    /// Explicit Gerrit Change-Id (I + 40 lowercase hex)
    #[arg(long, value_name = "CHANGE_ID")]
    gerrit_change_id: Option<String>,

    /// Gerrit topic for the uploaded change
    #[arg(long, value_name = "TOPIC")]
    gerrit_topic: Option<String>,

    /// Feature branch name for pull-request destinations
    #[arg(long, value_name = "BRANCH")]
    github_destination_pr_branch: Option<String>,

    /// Read the origin from this URL instead of the configured one
    #[arg(long, value_name = "URL")]
    origin_url_override: Option<String>,
}

#[derive(Args)]
struct MirrorArgs {
    /// Path to ferry.toml
    config: PathBuf,

    /// Mirror job to run (defaults to the only one defined)
    mirror: Option<String>,

    /// Record per-action failures and keep going
    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let console = StdConsole;
    match run(cli, &console) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            console.error(&format!("{err}"));
            let code = u8::try_from(err.kind().exit_code()).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli, console: &dyn Console) -> Result<(), FerryError> {
    match cli.command {
        Commands::Migrate(args) => migrate(args, console),
        Commands::Mirror(args) => mirror(args, console),
        Commands::Info { config } => info(&config, console),
    }
}

fn migrate(args: MigrateArgs, console: &dyn Console) -> Result<(), FerryError> {
    let config = FerryConfig::load(&args.config)?;
    let name = config.resolve_workflow_name(args.workflow.as_deref())?;
    let cache = config.open_cache()?;
    let opts = RunOptions {
        force: args.force,
        dry_run: args.dry_run,
        push_options: args.git_push_options,
        gerrit_change_id: args.gerrit_change_id,
        gerrit_topic: args.gerrit_topic,
        github_destination_pr_branch: args.github_destination_pr_branch,
        origin_url_override: args.origin_url_override,
    };
    let workflow = config.build_workflow(&name, cache, &opts)?;

    let effects = workflow.run(args.source_ref.as_deref(), console)?;
    for effect in &effects {
        console.info(&format!("{:?}: {}", effect.kind, effect.description));
    }
    Ok(())
}

fn mirror(args: MirrorArgs, console: &dyn Console) -> Result<(), FerryError> {
    let config = FerryConfig::load(&args.config)?;
    let name = config.resolve_mirror_name(args.mirror.as_deref())?;
    let cache = config.open_cache()?;
    let job = config.build_mirror(&name, cache, args.force)?;
    job.run(console)?;
    console.info(&format!("mirror '{name}' finished"));
    Ok(())
}

fn info(config_path: &Path, console: &dyn Console) -> Result<(), FerryError> {
    let config = FerryConfig::load(config_path)?;
    if config.workflow.is_empty() && config.mirror.is_empty() {
        console.warn("the config defines no workflows or mirrors");
        return Ok(());
    }
    for (name, wf) in &config.workflow {
        console.info(&format!(
            "workflow '{name}': mode {:?}, origin {:?} -> destination {:?}",
            wf.mode, wf.origin, wf.destination
        ));
    }
    for (name, m) in &config.mirror {
        console.info(&format!(
            "mirror '{name}': {} -> {} ({} refspec(s))",
            m.origin,
            m.destination,
            m.refspecs.len()
        ));
    }
    Ok(())
}
