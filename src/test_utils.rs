//! Shared test utilities: fixed inputs, recording test doubles and
//! generators for property-based testing.

use std::collections::HashSet;
use std::io;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use crate::build::{CommandOutput, CommandRunner, StepCommand};
use crate::notify::{Notification, Notifier, NotifyError, parse_mailbox};
use crate::types::{BuildRequest, DEFAULT_URGENCY};

/// A fixed build time, 2014-03-15 09:30:00.
pub fn test_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2014, 3, 15)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap()
}

/// A valid request for a repository of the default owner.
pub fn request_for(name: &str, branch: &str) -> BuildRequest {
    BuildRequest {
        pusher: "Jane Doe".to_string(),
        pusher_email: Some("jane@example.org".to_string()),
        owner: "yavdr".to_string(),
        name: name.to_string(),
        git_url: format!("git://github.com/yavdr/{name}.git"),
        branch: branch.to_string(),
        urgency: DEFAULT_URGENCY.to_string(),
    }
}

/// A minimal push payload for `name` at `git_ref`.
pub fn push_payload(name: &str, git_ref: &str) -> serde_json::Value {
    serde_json::json!({
        "ref": git_ref,
        "pusher": { "name": "Jane Doe", "email": "jane@example.org" },
        "repository": {
            "name": name,
            "owner": { "name": "yavdr", "email": "team@yavdr.org" },
            "git_url": format!("git://github.com/yavdr/{name}.git"),
        }
    })
}

pub fn arb_branch_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9./-]{0,50}".prop_map(String::from)
}

/// A [`CommandRunner`] that records every command instead of running it.
///
/// It mimics the side effects later steps depend on: `git clone` creates the
/// source tree with a `debian/changelog`, `git rev-parse` prints
/// [`RecordingRunner::HEAD`], and `tar` creates the archive file.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<StepCommand>>,
    failing: Mutex<HashSet<String>>,
    missing: Mutex<HashSet<String>>,
}

impl RecordingRunner {
    pub const HEAD: &'static str = "3f786850e387550fdab836ed7e6dc881de23001b";

    pub fn new() -> Self {
        RecordingRunner::default()
    }

    /// Makes every run of `program` exit with status 2.
    pub fn fail_on(&self, program: &str) {
        self.failing.lock().unwrap().insert(program.to_string());
    }

    /// Makes every run of `program` fail to spawn.
    pub fn missing(&self, program: &str) {
        self.missing.lock().unwrap().insert(program.to_string());
    }

    pub fn commands(&self) -> Vec<StepCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Programs run so far, in order.
    pub fn programs(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.program).collect()
    }

    fn simulate(&self, command: &StepCommand) -> io::Result<CommandOutput> {
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        match (command.program.as_str(), args.as_slice()) {
            ("git", ["clone", .., target]) => {
                let debian = command.workdir.join(target).join("debian");
                std::fs::create_dir_all(&debian)?;
                std::fs::write(debian.join("changelog"), "pkg (0.1) unstable; urgency=low\n")?;
                Ok(CommandOutput::success(format!("Cloning into '{target}'...\n")))
            }
            ("git", ["rev-parse", "HEAD"]) => {
                Ok(CommandOutput::success(format!("{}\n", Self::HEAD)))
            }
            ("tar", ["czf", archive, ..]) => {
                std::fs::write(command.workdir.join(archive), b"")?;
                Ok(CommandOutput::success(""))
            }
            (program, _) => Ok(CommandOutput::success(format!("{program} ok\n"))),
        }
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &StepCommand) -> io::Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.clone());

        if self.missing.lock().unwrap().contains(&command.program) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "program not found"));
        }
        if self.failing.lock().unwrap().contains(&command.program) {
            return Ok(CommandOutput::failure(
                2,
                format!("{}: simulated failure\n", command.program),
            ));
        }
        self.simulate(command)
    }
}

/// A [`Notifier`] that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier::default()
    }

    /// A notifier whose every delivery fails.
    pub fn failing() -> Self {
        RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            // Not an address, so this always yields a delivery error.
            return parse_mailbox("simulated outage").map(|_| ());
        }
        Ok(())
    }
}
