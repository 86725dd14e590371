use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repomirror::sync::PlannedAction;
use repomirror::{
    Config, GitHubClient, GitLabClient, RepoOutcome, SourceProvider, SyncDecision, SyncEngine,
};

#[derive(Parser)]
#[command(name = "repomirror")]
#[command(about = "One-way GitLab to GitHub repository mirroring")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror all owned source repositories to the destination account
    Sync {
        /// Analyze and report without transferring anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List the source repositories that would be mirrored
    List {
        /// Show repository details
        #[arg(long)]
        details: bool,
    },

    /// Show authentication status for both platforms
    Auth,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    info!("Starting RepoMirror v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(cli.config)?;

    // Default to a full sync when no command is given
    match cli.command.unwrap_or(Commands::Sync { dry_run: false }) {
        Commands::Sync { dry_run } => cmd_sync(dry_run, config).await,
        Commands::List { details } => cmd_list(details, config).await,
        Commands::Auth => cmd_auth(config).await,
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Mirror repositories according to configuration
async fn cmd_sync(dry_run: bool, config: Config) -> Result<()> {
    let engine = SyncEngine::connect(config).await?;

    if dry_run {
        println!("🔍 Dry run mode - analyzing repository states");

        let plan = engine.plan().await?;

        for (name, action) in &plan {
            match action {
                PlannedAction::CreateAndSync { destination } => {
                    println!("   📥 Create + mirror: {} -> {}", name, destination);
                }
                PlannedAction::Sync {
                    destination,
                    decision,
                } => {
                    let why = match decision {
                        SyncDecision::VerificationFailedForceSync => "state unverifiable",
                        _ => "differences detected",
                    };
                    println!("   🔄 Transfer needed: {} -> {} ({})", name, destination, why);
                }
                PlannedAction::Nothing { destination } => {
                    println!("   ✅ Up to date: {} -> {}", name, destination);
                }
                PlannedAction::Skip { reason } => {
                    println!("   ⏭️  Skip: {} ({})", name, reason);
                }
            }
        }

        println!("\n📈 {} repositories analyzed", plan.len());
        return Ok(());
    }

    let summary = engine.run_sync().await?;

    println!("\n🎉 Mirroring complete!");
    println!("   📊 Total repositories: {}", summary.total_repositories);
    println!("   ✅ Synced: {}", summary.synced);
    println!("   💤 Already up to date: {}", summary.up_to_date);
    println!("   ⏭️  Skipped: {}", summary.skipped);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed > 0 {
        println!("\n🔍 Failed repositories:");
        for result in &summary.results {
            if let RepoOutcome::Failed { name, error } = result {
                println!("   ❌ {}: {}", name, error);
            }
        }
    }

    // Per-repository failures are not fatal; only setup errors change the
    // exit code, and those have already propagated above.
    Ok(())
}

/// List source repositories that would be mirrored
async fn cmd_list(details: bool, config: Config) -> Result<()> {
    let client = GitLabClient::new(&config).await?;

    let repositories = client.list_owned_repositories().await?;

    println!("Repositories ({}):", repositories.len());

    for repo in repositories {
        if details {
            println!("📁 {}", repo.name);
            if let Some(description) = &repo.description {
                println!("   📝 {}", description);
            }
            println!("   🔒 Visibility: {:?}", repo.visibility);
            println!("   🌿 Default branch: {}", repo.comparison_branch());
            println!("   🔗 {}", repo.http_url);
            println!();
        } else {
            println!("  📁 {}", repo.name);
        }
    }

    Ok(())
}

/// Show authentication status for both platforms
async fn cmd_auth(config: Config) -> Result<()> {
    match GitLabClient::new(&config).await {
        Ok(client) => {
            println!("✅ GitLab authentication successful");
            println!("   Username: {}", client.username());
        }
        Err(e) => {
            println!("❌ GitLab authentication failed: {:#}", e);
        }
    }

    match GitHubClient::new(&config).await {
        Ok(client) => {
            println!("✅ GitHub authentication successful");
            println!("   Username: {}", client.username());
        }
        Err(e) => {
            println!("❌ GitHub authentication failed: {:#}", e);
        }
    }

    Ok(())
}
