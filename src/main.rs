use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gh2lp::build::{BuildContext, BuildJob, BuildOutcome, SystemRunner};
use gh2lp::config::{Config, Overrides};
use gh2lp::notify;
use gh2lp::server::{AppState, build_router};
use gh2lp::types::{BuildRequest, DEFAULT_URGENCY, Secret};

#[derive(Parser)]
#[command(name = "gh2lp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GitHub push hook that builds Debian source packages for Launchpad PPAs", long_about = None)]
struct Cli {
    /// Configuration file; repeat to layer several, later files win
    #[arg(short, long = "config", value_name = "FILE", global = true)]
    config: Vec<PathBuf>,

    /// HTTP listen port (overrides the configuration files)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Build everything but skip the upload and keep workspaces;
    /// `--dry-run=false` turns it off again
    #[arg(
        long,
        global = true,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    dry_run: Option<bool>,

    /// Shared secret for webhook signatures
    #[arg(long, env = "HOOK_SECRET_KEY", hide_env_values = true, global = true)]
    hook_secret: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the webhook endpoint (default)
    Serve,

    /// Build one branch directly and exit
    Build(BuildArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Name of the commit pusher
    #[arg(long)]
    pusher: String,

    /// Address the build log is mailed to
    #[arg(long)]
    pusher_email: String,

    /// Repository owner (default: the configured GitHub owner)
    #[arg(long)]
    owner: Option<String>,

    /// Package and repository name
    #[arg(long)]
    name: String,

    /// Clone URL of the repository
    #[arg(long)]
    git_url: String,

    /// Branch to build
    #[arg(long, default_value = "master")]
    branch: String,

    /// Changelog urgency
    #[arg(long, default_value = DEFAULT_URGENCY)]
    urgency: String,
}

impl BuildArgs {
    fn into_request(self, default_owner: &str) -> BuildRequest {
        BuildRequest {
            pusher: self.pusher,
            pusher_email: Some(self.pusher_email),
            owner: self.owner.unwrap_or_else(|| default_owner.to_string()),
            name: self.name,
            git_url: self.git_url,
            branch: self.branch,
            urgency: self.urgency,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gh2lp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "gh2lp starting"
    );

    let overrides = Overrides {
        port: cli.port,
        dry_run: cli.dry_run,
    };
    let config = Config::load(cli.config.as_slice(), &overrides, cli.hook_secret.map(Secret::from))
        .context("failed to load configuration")?;
    let config = Arc::new(config);

    let notifier =
        notify::from_config(config.mail.as_ref()).context("invalid mail configuration")?;
    let ctx = BuildContext::new(Arc::clone(&config), Arc::new(SystemRunner), notifier);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(ctx).await,
        Commands::Build(args) => build_once(ctx, args).await,
    }
}

async fn serve(ctx: BuildContext) -> Result<()> {
    let config = Arc::clone(&ctx.config);
    if config.webhook_secret.is_none() {
        warn!("HOOK_SECRET_KEY not set, webhook signatures are not checked");
    }
    if config.mail.is_none() {
        info!("Mail not configured, build logs are only logged");
    }
    info!(
        port = config.port,
        dry_run = config.dry_run,
        upload_owner = %config.upload_owner,
        allowed_owner = %config.allowed_owner,
        allowed_url_prefix = %config.allowed_url_prefix,
        "Configuration loaded"
    );

    let signals = ShutdownSignals::install()?;
    let jobs = TaskTracker::new();
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(signals, shutdown.clone(), jobs.clone()));

    let app = build_router(AppState::new(ctx, jobs.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server error")?;

    jobs.close();
    if !jobs.is_empty() {
        info!(
            running = jobs.len(),
            "Waiting for running builds, signal again to exit now"
        );
        jobs.wait().await;
        info!("All builds finished");
    }

    info!("Shut down");
    Ok(())
}

/// Runs one build in the foreground and prints its transcript.
async fn build_once(ctx: BuildContext, args: BuildArgs) -> Result<()> {
    let request = args.into_request(&ctx.config.allowed_owner);
    info!(request = %request, "Direct build");

    let report = tokio::task::spawn_blocking(move || BuildJob::new(ctx, request).run())
        .await
        .context("build job panicked")?;

    print!("{}", report.transcript.as_str());
    match report.outcome {
        BuildOutcome::Succeeded => Ok(()),
        BuildOutcome::Failed { stage, cause, .. } => {
            anyhow::bail!("build failed before {stage}: {cause}")
        }
    }
}

/// SIGINT and SIGTERM listeners, registered once at startup so a signal
/// arriving between the first and second wait is still seen.
struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn install() -> Result<Self> {
        use signal::unix::{SignalKind, signal};

        Ok(ShutdownSignals {
            interrupt: signal(SignalKind::interrupt())
                .context("failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate())
                .context("failed to install SIGTERM handler")?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> Result<Self> {
        Ok(ShutdownSignals {})
    }

    /// Waits for the next SIGINT or SIGTERM.
    #[cfg(unix)]
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("received SIGINT"),
            _ = self.terminate.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C");
    }
}

/// First signal starts the graceful shutdown; a second one exits at once.
async fn watch_signals(mut signals: ShutdownSignals, shutdown: CancellationToken, jobs: TaskTracker) {
    signals.recv().await;
    info!("shutting down");
    shutdown.cancel();

    signals.recv().await;
    warn!(running = jobs.len(), "Exiting with builds still running");
    std::process::exit(1);
}
