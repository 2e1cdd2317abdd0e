//! # Background Jobs
//!
//! Each user action that runs external processes gets its own worker
//! thread. The worker reports through a channel of [`JobEvent`]s which the
//! UI drains on every tick; the UI never blocks on process I/O.
//!
//! ```text
//! worker thread ──Status/Output/Started──▶ channel ──▶ App::poll_jobs
//!               ──Error | Finished (last)──▶
//! ```

use crate::process::{ProcessHandle, ProcessRunner, Termination};
use crate::project::{BuildTask, ProjectLayout};
use crate::vm::{describe, VmConfig, VmLauncher};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

/// How a job that got as far as running a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Stopped,
}

#[derive(Debug)]
pub enum JobEvent {
    /// Progress message for the status line and the activity log.
    Status(String),
    /// One line of process output for the console.
    Output(String),
    /// A process started; the UI keeps the handle so it can stop it.
    Started(ProcessHandle),
    /// The job could not start its work. Terminal event.
    Error(String),
    /// Terminal event.
    Finished { outcome: JobOutcome, message: String },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Error(_) | JobEvent::Finished { .. })
    }
}

/// Sending half; a receiver that went away is not an error for the worker.
#[derive(Debug, Clone)]
struct Reporter {
    tx: Sender<JobEvent>,
}

impl Reporter {
    fn send(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }

    fn status(&self, message: impl Into<String>) {
        self.send(JobEvent::Status(message.into()));
    }

    fn output(&self, line: impl Into<String>) {
        self.send(JobEvent::Output(line.into()));
    }
}

/// Stream a started process into the reporter and wait for it.
fn supervise(reporter: &Reporter, handle: &ProcessHandle) -> Termination {
    reporter.send(JobEvent::Started(handle.clone()));
    for event in handle.output() {
        reporter.output(event.line);
    }
    handle.wait()
}

/// Run `tasks` in order, stopping at the first one that does not succeed.
///
/// `[Build]` is a build, `[Clean]` a clean and `[Clean, Build]` a rebuild.
pub fn spawn_build_job(
    runner: ProcessRunner,
    layout: ProjectLayout,
    tasks: Vec<BuildTask>,
) -> Receiver<JobEvent> {
    let (tx, rx) = mpsc::channel();
    let reporter = Reporter { tx };
    thread::spawn(move || run_build_job(&runner, &layout, &tasks, &reporter));
    rx
}

fn run_build_job(
    runner: &ProcessRunner,
    layout: &ProjectLayout,
    tasks: &[BuildTask],
    reporter: &Reporter,
) {
    for task in tasks {
        let spec = match task.command(layout) {
            Ok(spec) => spec,
            Err(err) => {
                reporter.send(JobEvent::Error(format!("{err:#}")));
                return;
            }
        };

        reporter.status(progress_message(*task));
        let handle = match runner.start(&spec) {
            Ok(handle) => handle,
            Err(err) => {
                reporter.send(JobEvent::Error(format!("{task} failed to start: {err}")));
                return;
            }
        };

        let termination = supervise(reporter, &handle);
        if handle.cancel_requested() {
            reporter.send(JobEvent::Finished {
                outcome: JobOutcome::Stopped,
                message: format!("{task} stopped by user"),
            });
            return;
        }
        if !termination.success() {
            reporter.send(JobEvent::Finished {
                outcome: JobOutcome::Failed,
                message: format!("✗ {task} failed ({})", describe(termination)),
            });
            return;
        }
        reporter.status(format!("✓ {task} complete"));
    }

    let message = match tasks.last() {
        Some(task) => format!("✓ {task} complete"),
        None => "Nothing to do".to_string(),
    };
    reporter.send(JobEvent::Finished {
        outcome: JobOutcome::Succeeded,
        message,
    });
}

fn progress_message(task: BuildTask) -> &'static str {
    match task {
        BuildTask::Build => "Building...",
        BuildTask::Clean => "Cleaning...",
    }
}

/// Pre-flight, create the disk image if needed, then run the VM until it exits.
pub fn spawn_vm_job(launcher: VmLauncher, name: String, config: VmConfig) -> Receiver<JobEvent> {
    let (tx, rx) = mpsc::channel();
    let reporter = Reporter { tx };
    thread::spawn(move || run_vm_job(&launcher, &name, config, &reporter));
    rx
}

fn run_vm_job(launcher: &VmLauncher, name: &str, config: VmConfig, reporter: &Reporter) {
    reporter.status("Running pre-flight checks...");
    if let Err(err) = launcher.preflight() {
        reporter.send(JobEvent::Error(format!("{err:#}")));
        return;
    }

    let plan = match launcher.plan(name, config) {
        Ok(plan) => plan,
        Err(err) => {
            reporter.send(JobEvent::Error(format!("{err:#}")));
            return;
        }
    };
    for line in plan.summary_lines() {
        reporter.output(line);
    }

    if let Err(err) = launcher.ensure_disk(&plan, |line| reporter.status(line)) {
        reporter.send(JobEvent::Error(format!("{err:#}")));
        return;
    }

    reporter.status(format!("Launching {}...", plan.name));
    reporter.output(plan.command().display());
    let handle = match launcher.start(&plan) {
        Ok(handle) => handle,
        Err(err) => {
            reporter.send(JobEvent::Error(format!("{err:#}")));
            return;
        }
    };
    reporter.status(format!("VM running (PID: {})", handle.pid()));

    let termination = supervise(reporter, &handle);
    let (outcome, message) = if handle.cancel_requested() {
        (JobOutcome::Stopped, "VM stopped by user".to_string())
    } else if termination.success() {
        (JobOutcome::Succeeded, "VM exited".to_string())
    } else {
        (
            JobOutcome::Failed,
            format!("VM exited with error ({})", describe(termination)),
        )
    };
    reporter.send(JobEvent::Finished { outcome, message });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn project_with_scripts(build: &str, clean: &str) -> (TempDir, ProjectLayout) {
        let temp_dir = TempDir::new().unwrap();
        let layout = ProjectLayout::locate(Some(temp_dir.path())).unwrap();
        fs::create_dir_all(layout.scripts_dir()).unwrap();
        fs::write(layout.build_script(), build).unwrap();
        fs::write(layout.clean_script(), clean).unwrap();
        for script in [layout.build_script(), layout.clean_script()] {
            fs::set_permissions(script, fs::Permissions::from_mode(0o755)).unwrap();
        }
        (temp_dir, layout)
    }

    fn collect(rx: &Receiver<JobEvent>) -> Vec<JobEvent> {
        let mut events = Vec::new();
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(20))
                .expect("job should report");
            let done = event.is_terminal();
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn output_lines(events: &[JobEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Output(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_build_streams_and_succeeds() {
        let (_temp_dir, layout) = project_with_scripts(
            "#!/bin/sh\necho compiling\necho linking >&2\n",
            "#!/bin/sh\n",
        );
        let rx = spawn_build_job(ProcessRunner::new(), layout, vec![BuildTask::Build]);
        let events = collect(&rx);

        assert!(matches!(events.first(), Some(JobEvent::Status(s)) if s == "Building..."));
        assert_eq!(output_lines(&events), vec!["compiling", "linking"]);
        assert!(matches!(
            events.last(),
            Some(JobEvent::Finished { outcome: JobOutcome::Succeeded, message }) if message == "✓ Build complete"
        ));
    }

    #[test]
    fn test_rebuild_stops_after_failed_clean() {
        let (_temp_dir, layout) =
            project_with_scripts("#!/bin/sh\necho should-not-run\n", "#!/bin/sh\nexit 3\n");
        let rx = spawn_build_job(
            ProcessRunner::new(),
            layout,
            vec![BuildTask::Clean, BuildTask::Build],
        );
        let events = collect(&rx);

        assert!(output_lines(&events).is_empty());
        assert!(matches!(
            events.last(),
            Some(JobEvent::Finished { outcome: JobOutcome::Failed, message }) if message.contains("exit code: 3")
        ));
    }

    #[test]
    fn test_missing_script_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ProjectLayout::locate(Some(temp_dir.path())).unwrap();
        let rx = spawn_build_job(ProcessRunner::new(), layout, vec![BuildTask::Build]);
        let events = collect(&rx);
        assert!(matches!(
            events.last(),
            Some(JobEvent::Error(msg)) if msg.contains("Build script not found")
        ));
    }

    #[test]
    fn test_background_child_does_not_hold_job_open() {
        let (_temp_dir, layout) =
            project_with_scripts("#!/bin/sh\nsleep 6 &\necho x\n", "#!/bin/sh\n");
        let started = Instant::now();
        let rx = spawn_build_job(ProcessRunner::new(), layout, vec![BuildTask::Build]);
        let events = collect(&rx);

        assert!(
            started.elapsed() < Duration::from_secs(3),
            "job finished after {:?}",
            started.elapsed()
        );
        assert_eq!(output_lines(&events), vec!["x"]);
        assert!(matches!(
            events.last(),
            Some(JobEvent::Finished { outcome: JobOutcome::Succeeded, .. })
        ));
    }

    #[test]
    fn test_stopped_build_reports_stopped() {
        let (_temp_dir, layout) =
            project_with_scripts("#!/bin/sh\necho started\nsleep 30\n", "#!/bin/sh\n");
        let rx = spawn_build_job(ProcessRunner::new(), layout, vec![BuildTask::Build]);

        let handle = loop {
            match rx.recv_timeout(Duration::from_secs(10)).expect("event") {
                JobEvent::Started(handle) => break handle,
                event => assert!(!event.is_terminal()),
            }
        };
        handle.cancel(Duration::from_secs(2));

        let events = collect(&rx);
        assert!(matches!(
            events.last(),
            Some(JobEvent::Finished { outcome: JobOutcome::Stopped, .. })
        ));
    }
}
