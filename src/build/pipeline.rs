//! The fixed sequence of external commands that turns a branch into an
//! uploaded source package.
//!
//! Each step appends a heading and the command's combined output to the job
//! transcript. Commands run with their working directory set inside the job
//! workspace; nothing here changes the process-wide current directory or
//! environment.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::command::{CommandOutput, CommandRunner, StepCommand};
use super::transcript::Transcript;
use crate::classify::BuildPlan;
use crate::config::Config;
use crate::types::{BuildRequest, CommitId};

/// Errors from a single pipeline step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The program could not be started (missing binary, bad workdir).
    #[error("cannot run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` failed with {status}")]
    Failed { command: String, status: String },

    /// A file operation inside the workspace failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    pub fn category(&self) -> &'static str {
        match self {
            StepError::Spawn { .. } | StepError::Failed { .. } => "pipeline-step",
            StepError::Io { .. } => "io",
        }
    }
}

/// Everything a step needs to build its command.
#[derive(Clone, Copy)]
pub struct StepEnv<'a> {
    pub config: &'a Config,
    pub runner: &'a dyn CommandRunner,
    pub request: &'a BuildRequest,
    pub plan: &'a BuildPlan,
    /// Root of the job's workspace.
    pub workspace: &'a Path,
}

impl StepEnv<'_> {
    /// The cloned source tree, `<workspace>/<package>_<version>`.
    pub fn source_dir(&self) -> PathBuf {
        self.workspace.join(&self.plan.source_dir)
    }

    /// Applies the packager identity that `dch` and `debuild` read.
    fn with_packager(&self, command: StepCommand) -> StepCommand {
        command
            .env("DEBEMAIL", &self.config.packager.email)
            .env("DEBFULLNAME", &self.config.packager.name)
            .env("EDITOR", "true")
    }
}

/// Writes the resolved parameter block that opens every transcript.
pub fn write_parameters(request: &BuildRequest, plan: &BuildPlan, transcript: &mut Transcript) {
    transcript.field("repo", &request.name);
    transcript.field("branch", &request.branch);
    transcript.field("owner", &request.owner);
    transcript.field(
        "pusher",
        format_args!(
            "{} <{}>",
            request.pusher,
            request.pusher_email.as_deref().unwrap_or("")
        ),
    );
    transcript.field("git_url", &request.git_url);
    transcript.field("stage", &plan.stage);
    transcript.field("section", &plan.section);
    transcript.field("release", &plan.release);
    transcript.field("urgency", &plan.urgency);
    transcript.field("date", &plan.timestamp);
    transcript.field("lprepo", &plan.upload_repository);
    transcript.field("ppa", &plan.upload_target);
    transcript.field("version_suffix", &plan.version_suffix);
}

// ─── Commands ───

pub fn clone_command(env: &StepEnv<'_>) -> StepCommand {
    StepCommand::git(env.workspace).args([
        "clone",
        "--depth",
        "1",
        "-b",
        env.request.branch.as_str(),
        env.request.git_url.as_str(),
        env.plan.source_dir.as_str(),
    ])
}

pub fn rev_parse_command(env: &StepEnv<'_>) -> StepCommand {
    StepCommand::git(env.source_dir()).args(["rev-parse", "HEAD"])
}

pub fn archive_command(env: &StepEnv<'_>) -> StepCommand {
    StepCommand::new("tar", env.workspace).args([
        "czf",
        env.plan.orig_tarball.as_str(),
        "--exclude=.git",
        "--exclude=debian",
        env.plan.source_dir.as_str(),
    ])
}

pub fn changelog_command(env: &StepEnv<'_>, commit: &CommitId) -> StepCommand {
    let command = StepCommand::new("dch", env.source_dir())
        .args(["-v".to_string(), env.plan.full_version()])
        .arg(format!("Autobuild - {commit}"))
        .args([env.request.git_url.as_str(), "--create"])
        .arg(format!("--distribution={}", env.plan.release))
        .args(["-u", env.plan.urgency.as_str()])
        .args(["--package", env.plan.package.as_str()]);
    env.with_packager(command)
}

pub fn source_package_command(env: &StepEnv<'_>) -> StepCommand {
    let mut command = StepCommand::new("debuild", env.source_dir()).args(["-S", "-sa"]);
    if let Some(key) = &env.config.signing_key {
        command = command.arg(format!("-k{key}"));
    }
    env.with_packager(command)
}

pub fn upload_command(env: &StepEnv<'_>) -> StepCommand {
    StepCommand::new("dput", env.workspace).args([
        "-U",
        env.plan.upload_target.as_str(),
        env.plan.changes_file.as_str(),
    ])
}

// ─── Steps ───

/// Runs `command`, appends its output to the transcript and fails on a
/// non-zero exit.
fn run_logged(
    env: &StepEnv<'_>,
    command: &StepCommand,
    transcript: &mut Transcript,
) -> Result<CommandOutput, StepError> {
    let output = spawn(env, command)?;
    transcript.output(&output);
    check(command, output)
}

fn spawn(env: &StepEnv<'_>, command: &StepCommand) -> Result<CommandOutput, StepError> {
    debug!(command = %command, workdir = %command.workdir.display(), "Running step command");
    env.runner.run(command).map_err(|source| StepError::Spawn {
        command: command.to_string(),
        source,
    })
}

fn check(command: &StepCommand, output: CommandOutput) -> Result<CommandOutput, StepError> {
    if output.is_success() {
        Ok(output)
    } else {
        Err(StepError::Failed {
            command: command.to_string(),
            status: output.status_text(),
        })
    }
}

/// Shallow-clones the branch and reports the checked-out commit.
pub fn clone_source(
    env: &StepEnv<'_>,
    transcript: &mut Transcript,
) -> Result<CommitId, StepError> {
    transcript.heading("checkout sourcecode");
    run_logged(env, &clone_command(env), transcript)?;

    transcript.line("get commit_id");
    let command = rev_parse_command(env);
    let output = spawn(env, &command)?;
    if !output.is_success() {
        transcript.output(&output);
    }
    let output = check(&command, output)?;

    // The hash is the last line; anything before it is a warning.
    let text = String::from_utf8_lossy(&output.output);
    let commit = CommitId::new(text.lines().last().unwrap_or_default());
    transcript.field("commit_id", &commit);
    info!(commit = %commit.short(), "Source checked out");
    Ok(commit)
}

/// Packs the upstream tarball, leaving out VCS metadata and packaging.
pub fn stage_archive(env: &StepEnv<'_>, transcript: &mut Transcript) -> Result<(), StepError> {
    transcript.heading("package orig.tar.gz");
    run_logged(env, &archive_command(env), transcript)?;
    Ok(())
}

/// Replaces the packaged changelog with a single autobuild entry.
pub fn write_changelog(
    env: &StepEnv<'_>,
    commit: &CommitId,
    transcript: &mut Transcript,
) -> Result<(), StepError> {
    transcript.heading("remove old changelog");
    let changelog = env.source_dir().join("debian").join("changelog");
    match std::fs::remove_file(&changelog) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            transcript.line("no previous changelog");
        }
        Err(source) => {
            return Err(StepError::Io {
                path: changelog,
                source,
            });
        }
    }

    transcript.heading("call dch");
    run_logged(env, &changelog_command(env, commit), transcript)?;
    Ok(())
}

pub fn build_source_package(
    env: &StepEnv<'_>,
    transcript: &mut Transcript,
) -> Result<(), StepError> {
    transcript.heading("call debuild");
    run_logged(env, &source_package_command(env), transcript)?;
    Ok(())
}

/// Uploads the changes file. Skipped in dry-run mode.
pub fn upload(env: &StepEnv<'_>, transcript: &mut Transcript) -> Result<(), StepError> {
    transcript.heading("upload package");
    if env.config.dry_run {
        transcript.line("skipped (dry run)");
        info!("Dry run, upload skipped");
        return Ok(());
    }
    run_logged(env, &upload_command(env), transcript)?;
    info!(target = %env.plan.upload_target, "Package uploaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::test_utils::{RecordingRunner, request_for, test_time};
    use tempfile::tempdir;

    struct Fixture {
        config: Config,
        request: BuildRequest,
        plan: BuildPlan,
        runner: RecordingRunner,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(config: Config) -> Self {
            let request = request_for("vdr-plugin-foo", "stable-0.6");
            let plan = classify(&request, &config, test_time()).unwrap();
            Fixture {
                config,
                request,
                plan,
                runner: RecordingRunner::new(),
                dir: tempdir().unwrap(),
            }
        }

        fn env(&self) -> StepEnv<'_> {
            StepEnv {
                config: &self.config,
                runner: &self.runner,
                request: &self.request,
                plan: &self.plan,
                workspace: self.dir.path(),
            }
        }
    }

    #[test]
    fn clone_is_shallow_single_branch_into_source_dir() {
        let f = Fixture::new(Config::default());
        let cmd = clone_command(&f.env());

        assert_eq!(cmd.workdir, f.dir.path());
        assert_eq!(
            cmd.to_string(),
            "git clone --depth 1 -b stable-0.6 git://github.com/yavdr/vdr-plugin-foo.git \
             vdr-plugin-foo_20140315093000stable"
        );
    }

    #[test]
    fn archive_excludes_git_and_debian() {
        let f = Fixture::new(Config::default());
        assert_eq!(
            archive_command(&f.env()).args,
            [
                "czf",
                "vdr-plugin-foo_20140315093000stable.orig.tar.gz",
                "--exclude=.git",
                "--exclude=debian",
                "vdr-plugin-foo_20140315093000stable",
            ]
        );
    }

    #[test]
    fn changelog_entry_names_commit_and_distribution() {
        let f = Fixture::new(Config::default());
        let env = f.env();
        let cmd = changelog_command(&env, &CommitId::new("abc123\n"));

        assert_eq!(cmd.workdir, env.source_dir());
        assert_eq!(
            cmd.args,
            [
                "-v",
                "20140315093000stable-0yavdr0~trusty",
                "Autobuild - abc123",
                "git://github.com/yavdr/vdr-plugin-foo.git",
                "--create",
                "--distribution=trusty",
                "-u",
                "medium",
                "--package",
                "vdr-plugin-foo",
            ]
        );
        assert_eq!(cmd.env_value("DEBEMAIL"), Some("release@yavdr.org"));
        assert_eq!(cmd.env_value("DEBFULLNAME"), Some("yaVDR Release-Team"));
        assert_eq!(cmd.env_value("EDITOR"), Some("true"));
    }

    #[test]
    fn debuild_omits_key_flag_without_signing_key() {
        let f = Fixture::new(Config::default());
        let cmd = source_package_command(&f.env());
        assert_eq!(cmd.args, ["-S", "-sa"]);
        assert_eq!(cmd.env_value("DEBEMAIL"), Some("release@yavdr.org"));
    }

    #[test]
    fn debuild_passes_configured_key() {
        let f = Fixture::new(Config {
            signing_key: Some("0xDEADBEEF".to_string()),
            ..Config::default()
        });
        assert_eq!(
            source_package_command(&f.env()).args,
            ["-S", "-sa", "-k0xDEADBEEF"]
        );
    }

    #[test]
    fn upload_targets_ppa_with_changes_file() {
        let f = Fixture::new(Config::default());
        let cmd = upload_command(&f.env());
        assert_eq!(cmd.workdir, f.dir.path());
        assert_eq!(
            cmd.to_string(),
            "dput -U ppa:yavdr/stable-vdr \
             vdr-plugin-foo_20140315093000stable-0yavdr0~trusty_source.changes"
        );
    }

    #[test]
    fn parameter_block_matches_plan() {
        let f = Fixture::new(Config::default());
        let mut t = Transcript::new();
        write_parameters(&f.request, &f.plan, &mut t);

        let text = t.into_string();
        assert!(text.starts_with("repo:    vdr-plugin-foo\nbranch:  stable-0.6\n"));
        assert!(text.contains("pusher:  Jane Doe <jane@example.org>\n"));
        assert!(text.contains("date:    20140315093000\n"));
        assert!(text.contains("lprepo:  stable-vdr\n"));
        assert!(text.contains("ppa:     ppa:yavdr/stable-vdr\n"));
        assert!(text.ends_with("version_suffix: -0yavdr0~trusty\n"));
    }

    #[test]
    fn clone_source_reports_trimmed_commit() {
        let f = Fixture::new(Config::default());
        let mut t = Transcript::new();

        let commit = clone_source(&f.env(), &mut t).unwrap();

        assert_eq!(commit.as_str(), RecordingRunner::HEAD);
        assert!(t.as_str().contains(&format!("commit_id: {}\n", RecordingRunner::HEAD)));
    }

    #[test]
    fn write_changelog_removes_existing_file() {
        let f = Fixture::new(Config::default());
        let env = f.env();
        let changelog = env.source_dir().join("debian/changelog");
        std::fs::create_dir_all(changelog.parent().unwrap()).unwrap();
        std::fs::write(&changelog, "old entry").unwrap();

        let mut t = Transcript::new();
        write_changelog(&env, &CommitId::new("abc"), &mut t).unwrap();

        assert!(!changelog.exists());
        assert_eq!(f.runner.programs(), ["dch"]);
    }

    #[test]
    fn write_changelog_tolerates_missing_file() {
        let f = Fixture::new(Config::default());
        let mut t = Transcript::new();

        write_changelog(&f.env(), &CommitId::new("abc"), &mut t).unwrap();

        assert!(t.as_str().contains("no previous changelog"));
    }

    #[test]
    fn failing_command_is_a_step_error_with_output_logged() {
        let f = Fixture::new(Config::default());
        f.runner.fail_on("debuild");
        let mut t = Transcript::new();

        let err = build_source_package(&f.env(), &mut t).unwrap_err();

        assert!(matches!(err, StepError::Failed { .. }));
        assert_eq!(err.category(), "pipeline-step");
        assert!(err.to_string().contains("exit status 2"));
        assert!(t.as_str().contains("debuild: simulated failure"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let f = Fixture::new(Config::default());
        f.runner.missing("tar");
        let mut t = Transcript::new();

        let err = stage_archive(&f.env(), &mut t).unwrap_err();
        assert!(matches!(err, StepError::Spawn { .. }));
    }

    #[test]
    fn dry_run_upload_runs_nothing() {
        let f = Fixture::new(Config {
            dry_run: true,
            ..Config::default()
        });
        let mut t = Transcript::new();

        upload(&f.env(), &mut t).unwrap();

        assert!(f.runner.commands().is_empty());
        assert!(t.as_str().ends_with("upload package\nskipped (dry run)\n"));
    }
}
