//! Build jobs: one accepted request, one workspace, one transcript.
//!
//! A [`BuildJob`] validates and classifies its request, runs the pipeline
//! steps in order inside a private workspace, and always finishes by sending
//! the transcript and removing the workspace. A job never returns an error;
//! every failure ends up in its [`BuildReport`].
//!
//! ```text
//! Created → ParametersResolved → WorkspaceReady → SourceCloned → ArchiveStaged
//!         → ChangelogWritten → SourcePackageBuilt → Uploaded → Notified → CleanedUp
//! ```
//!
//! The first failing step moves the job to `Failed`; notification and cleanup
//! follow regardless.

pub mod command;
pub mod pipeline;
pub mod transcript;
pub mod workspace;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::classify::{BuildPlan, ClassifyError, classify};
use crate::config::Config;
use crate::notify::{Notification, Notifier};
use crate::types::{BuildRequest, RequestError};

pub use command::{CommandOutput, CommandRunner, StepCommand, SystemRunner};
pub use pipeline::{StepEnv, StepError};
pub use transcript::Transcript;
pub use workspace::BuildWorkspace;

/// Subject used when the job failed before a plan existed.
pub const UNEXPECTED_ERROR_SUBJECT: &str = "an unexpected error occurred while building";

/// Lifecycle states of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Created,
    ParametersResolved,
    WorkspaceReady,
    SourceCloned,
    ArchiveStaged,
    ChangelogWritten,
    SourcePackageBuilt,
    Uploaded,
    Notified,
    CleanedUp,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildState::Created => "created",
            BuildState::ParametersResolved => "parameters-resolved",
            BuildState::WorkspaceReady => "workspace-ready",
            BuildState::SourceCloned => "source-cloned",
            BuildState::ArchiveStaged => "archive-staged",
            BuildState::ChangelogWritten => "changelog-written",
            BuildState::SourcePackageBuilt => "source-package-built",
            BuildState::Uploaded => "uploaded",
            BuildState::Notified => "notified",
            BuildState::CleanedUp => "cleaned-up",
            BuildState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a job stopped early.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("cannot create workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error(transparent)]
    Step(#[from] StepError),
}

impl BuildError {
    /// Error category written to the transcript.
    pub fn category(&self) -> &'static str {
        match self {
            BuildError::Request(_) | BuildError::Classify(_) => "validation",
            BuildError::Workspace(_) => "io",
            BuildError::Step(e) => e.category(),
        }
    }
}

/// Final result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    /// `stage` is the state the job was trying to reach.
    Failed {
        stage: BuildState,
        cause: String,
        category: &'static str,
    },
}

/// Everything a finished job leaves behind.
#[derive(Debug)]
pub struct BuildReport {
    pub request: BuildRequest,
    pub plan: Option<BuildPlan>,
    /// Every state the job passed through, in order.
    pub states: Vec<BuildState>,
    pub outcome: BuildOutcome,
    pub transcript: Transcript,
    /// Set in dry-run mode, where the workspace survives the job.
    pub kept_workspace: Option<PathBuf>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.outcome == BuildOutcome::Succeeded
    }
}

/// Shared, read-only dependencies of every job.
#[derive(Clone)]
pub struct BuildContext {
    pub config: Arc<Config>,
    pub runner: Arc<dyn CommandRunner>,
    pub notifier: Arc<dyn Notifier>,
    /// Parent directory for workspaces; the system temp dir when `None`.
    pub workspace_root: Option<PathBuf>,
}

impl BuildContext {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        BuildContext {
            config,
            runner,
            notifier,
            workspace_root: None,
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    fn create_workspace(&self, repository: &str) -> io::Result<BuildWorkspace> {
        match &self.workspace_root {
            Some(root) => BuildWorkspace::create_in(root, repository),
            None => BuildWorkspace::create(repository),
        }
    }
}

/// Tags an error with the state its step was trying to reach.
trait AtState<T> {
    fn at(self, state: BuildState) -> Result<T, (BuildState, BuildError)>;
}

impl<T, E: Into<BuildError>> AtState<T> for Result<T, E> {
    fn at(self, state: BuildState) -> Result<T, (BuildState, BuildError)> {
        self.map_err(|e| (state, e.into()))
    }
}

/// A single build, from request to cleanup.
pub struct BuildJob {
    ctx: BuildContext,
    request: BuildRequest,
    states: Vec<BuildState>,
    transcript: Transcript,
    plan: Option<BuildPlan>,
    workspace: Option<BuildWorkspace>,
}

impl BuildJob {
    pub fn new(ctx: BuildContext, request: BuildRequest) -> Self {
        BuildJob {
            ctx,
            request,
            states: vec![BuildState::Created],
            transcript: Transcript::new(),
            plan: None,
            workspace: None,
        }
    }

    /// Runs the job to completion, timestamped with the current local time.
    ///
    /// Blocks the calling thread until every external command has finished.
    pub fn run(self) -> BuildReport {
        self.run_at(Local::now().naive_local())
    }

    /// Runs the job with a fixed build time.
    pub fn run_at(mut self, now: NaiveDateTime) -> BuildReport {
        let span = info_span!("build", repo = %self.request.name, branch = %self.request.branch);
        let _guard = span.enter();
        info!(pusher = %self.request.pusher, owner = %self.request.owner, "Build started");

        let outcome = match self.execute(now) {
            Ok(()) => {
                info!("Build succeeded");
                BuildOutcome::Succeeded
            }
            Err((stage, error)) => {
                let category = error.category();
                warn!(%stage, category, error = %error, "Build failed");
                self.transcript.line(error.to_string());
                self.transcript.field("category", category);
                self.advance(BuildState::Failed);
                BuildOutcome::Failed {
                    stage,
                    cause: error.to_string(),
                    category,
                }
            }
        };

        self.notify();
        self.advance(BuildState::Notified);
        let kept_workspace = self.clean_up();
        self.advance(BuildState::CleanedUp);

        BuildReport {
            request: self.request,
            plan: self.plan,
            states: self.states,
            outcome,
            transcript: self.transcript,
            kept_workspace,
        }
    }

    fn advance(&mut self, state: BuildState) {
        debug!(%state, "Build state");
        self.states.push(state);
    }

    fn execute(&mut self, now: NaiveDateTime) -> Result<(), (BuildState, BuildError)> {
        use BuildState::*;

        let config = Arc::clone(&self.ctx.config);
        let runner = Arc::clone(&self.ctx.runner);
        let request = self.request.clone();

        request.validate(&config).at(ParametersResolved)?;
        let plan = classify(&request, &config, now).at(ParametersResolved)?;
        pipeline::write_parameters(&request, &plan, &mut self.transcript);
        info!(
            stage = %plan.stage,
            section = %plan.section,
            release = %plan.release,
            target = %plan.upload_target,
            version = %plan.full_version(),
            "Parameters resolved"
        );
        self.plan = Some(plan.clone());
        self.advance(ParametersResolved);

        let workspace = self
            .ctx
            .create_workspace(&request.name)
            .map_err(BuildError::Workspace)
            .at(WorkspaceReady)?;
        let dir = workspace.path().to_path_buf();
        info!(path = %dir.display(), "Workspace created");
        self.workspace = Some(workspace);
        self.advance(WorkspaceReady);

        let env = StepEnv {
            config: &config,
            runner: runner.as_ref(),
            request: &request,
            plan: &plan,
            workspace: &dir,
        };

        let commit = pipeline::clone_source(&env, &mut self.transcript).at(SourceCloned)?;
        self.advance(SourceCloned);

        pipeline::stage_archive(&env, &mut self.transcript).at(ArchiveStaged)?;
        self.advance(ArchiveStaged);

        pipeline::write_changelog(&env, &commit, &mut self.transcript).at(ChangelogWritten)?;
        self.advance(ChangelogWritten);

        pipeline::build_source_package(&env, &mut self.transcript).at(SourcePackageBuilt)?;
        self.advance(SourcePackageBuilt);

        pipeline::upload(&env, &mut self.transcript).at(Uploaded)?;
        self.advance(Uploaded);

        Ok(())
    }

    /// Sends the transcript to the pusher. Failures are logged only.
    fn notify(&self) {
        let Some(to) = self.request.recipient() else {
            info!("No pusher email, build log not sent");
            return;
        };

        let subject = match &self.plan {
            Some(plan) => format!("Build-Log for {}", plan.source_dir),
            None => UNEXPECTED_ERROR_SUBJECT.to_string(),
        };
        let notification = Notification {
            to: to.to_string(),
            subject,
            body: self.transcript.as_str().to_string(),
        };

        if let Err(e) = self.ctx.notifier.notify(&notification) {
            warn!(to, error = %e, "Failed to send build log");
        }
    }

    /// Removes the workspace, or keeps it in dry-run mode.
    fn clean_up(&mut self) -> Option<PathBuf> {
        let workspace = self.workspace.take()?;
        match workspace.finish(self.ctx.config.dry_run) {
            Ok(Some(path)) => {
                info!(path = %path.display(), "Dry run, workspace kept");
                Some(path)
            }
            Ok(None) => {
                debug!("Workspace removed");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to remove workspace");
                None
            }
        }
    }
}
