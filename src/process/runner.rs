//! # Supervised Process Runner
//!
//! Starts an external command with stdout and stderr pointed at the same OS
//! pipe, streams the merged output line by line, and supervises the child
//! until it exits or is cancelled.
//!
//! ## Workers
//!
//! Every handle owns two background threads:
//!
//! - the **reader** drains the pipe and forwards each line into a channel,
//! - the **supervisor** owns the `Child`, reaps it, and executes signal
//!   requests coming from [`ProcessHandle::cancel`].
//!
//! Only the supervisor ever touches the child, so a signal can never reach
//! a recycled pid: the child is not reaped until the supervisor itself
//! observes its exit.
//!
//! ## Cancellation
//!
//! `cancel` sends SIGTERM to the child's process group, waits for the grace
//! timeout, then escalates to SIGKILL. Once the kill is requested the output
//! stream is silenced and the handle ends in [`ProcessState::Killed`].

use super::error::LaunchError;
use std::io::{self, BufRead, BufReader, PipeReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grace period between the termination request and the forced kill.
pub const DEFAULT_GRACE_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the supervisor checks the child while idle.
const SUPERVISOR_POLL: Duration = Duration::from_millis(20);

/// How often a blocked output stream re-checks the silenced flag.
const STREAM_POLL: Duration = Duration::from_millis(50);

/// Upper bound on how long a natural exit waits for the pipe to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Description of an external command to supervise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Space-joined command line for display purposes.
    pub fn display(&self) -> String {
        self.command_line().join(" ")
    }
}

/// One line of combined stdout/stderr output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub line: String,
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own (or after a graceful cancel). On unix a
    /// death by signal is reported as `128 + signal`.
    Exited(i32),
    /// The process was force-killed after ignoring the grace period.
    Killed,
}

impl Termination {
    pub fn success(self) -> bool {
        self == Termination::Exited(0)
    }

    pub fn code(self) -> Option<i32> {
        match self {
            Termination::Exited(code) => Some(code),
            Termination::Killed => None,
        }
    }
}

/// Lifecycle of a handle. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(i32),
    Killed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        self != ProcessState::Running
    }

    pub fn termination(self) -> Option<Termination> {
        match self {
            ProcessState::Running => None,
            ProcessState::Exited(code) => Some(Termination::Exited(code)),
            ProcessState::Killed => Some(Termination::Killed),
        }
    }
}

enum Control {
    Terminate,
    Kill,
}

/// State shared between the handle, the workers and any output streams.
struct Shared {
    state: Mutex<ProcessState>,
    changed: Condvar,
    /// Set before SIGKILL is sent; streams stop yielding once it is up.
    silenced: AtomicBool,
    /// Set when the child is gone but something it spawned still holds the
    /// pipe past the drain window. Streams end once their queue is empty.
    detached: AtomicBool,
    cancel_requested: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::Running),
            changed: Condvar::new(),
            silenced: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> ProcessState {
        *self.lock()
    }

    /// Commit the terminal state exactly once.
    fn finish(&self, terminal: ProcessState) {
        let mut state = self.lock();
        if !state.is_terminal() {
            *state = terminal;
        }
        self.changed.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) -> ProcessState {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| !state.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn wait(&self) -> Termination {
        let mut guard = self.lock();
        loop {
            if let Some(termination) = guard.termination() {
                return termination;
            }
            guard = self
                .changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn is_silenced(&self) -> bool {
        self.silenced.load(Ordering::Acquire)
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

/// Launches supervised processes.
///
/// The runner imposes no single-instance constraint: any number of handles
/// may be live at once. Callers that need "one build at a time" keep that
/// state themselves.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace_timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            grace_timeout: DEFAULT_GRACE_TIMEOUT,
        }
    }

    pub fn with_grace_timeout(mut self, grace_timeout: Duration) -> Self {
        self.grace_timeout = grace_timeout;
        self
    }

    pub fn grace_timeout(&self) -> Duration {
        self.grace_timeout
    }

    /// Launch `spec` and return immediately.
    ///
    /// stdout and stderr share one pipe so their relative order is exactly
    /// what the child wrote. stdin is closed.
    pub fn start(&self, spec: &CommandSpec) -> Result<ProcessHandle, LaunchError> {
        if let Some(dir) = &spec.working_dir {
            if !dir.is_dir() {
                return Err(LaunchError::MissingWorkingDir { path: dir.clone() });
            }
        }

        let (pipe_reader, pipe_writer) = io::pipe().map_err(LaunchError::Pipe)?;
        let stderr_writer = pipe_writer.try_clone().map_err(LaunchError::Pipe)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(pipe_writer)
            .stderr(stderr_writer);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so cancellation reaches the whole tree.
            command.process_group(0);
        }

        let spawned = command.spawn();
        // The command still holds the parent's write ends; the reader only
        // sees EOF once these are gone.
        drop(command);
        let child = spawned.map_err(|e| LaunchError::from_spawn(&spec.program, e))?;
        let pid = child.id();

        info!(pid, command = %spec.display(), "Started supervised process");

        let shared = Arc::new(Shared::new());
        let (event_tx, event_rx) = mpsc::channel();
        let (drained_tx, drained_rx) = mpsc::channel();
        let (control_tx, control_rx) = mpsc::channel();

        spawn_reader(pipe_reader, event_tx, drained_tx, Arc::clone(&shared), pid);
        let supervisor_shared = Arc::clone(&shared);
        thread::spawn(move || supervise(child, &control_rx, &drained_rx, &supervisor_shared));

        Ok(ProcessHandle {
            inner: Arc::new(Inner {
                command_line: spec.command_line(),
                working_dir: spec.working_dir.clone(),
                pid,
                grace_timeout: self.grace_timeout,
                shared,
                control: control_tx,
                output: Mutex::new(Some(event_rx)),
            }),
        })
    }
}

struct Inner {
    command_line: Vec<String>,
    working_dir: Option<PathBuf>,
    pid: u32,
    grace_timeout: Duration,
    shared: Arc<Shared>,
    control: Sender<Control>,
    output: Mutex<Option<Receiver<OutputEvent>>>,
}

/// Caller-side reference to one supervised process.
///
/// Cloning is cheap; all clones observe the same process.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.inner.pid)
            .field("command_line", &self.inner.command_line)
            .field("state", &self.state())
            .finish()
    }
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn command_line(&self) -> &[String] {
        &self.inner.command_line
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.inner.working_dir.as_deref()
    }

    pub fn state(&self) -> ProcessState {
        self.inner.shared.current()
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Termination status if the process has already ended.
    pub fn try_termination(&self) -> Option<Termination> {
        self.state().termination()
    }

    /// Whether `cancel` was ever called on this process.
    pub fn cancel_requested(&self) -> bool {
        self.inner.shared.cancel_requested.load(Ordering::Acquire)
    }

    /// Take the output stream.
    ///
    /// The first call receives every line; later calls get a stream that is
    /// already finished.
    pub fn output(&self) -> OutputStream {
        let receiver = self
            .inner
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        OutputStream {
            receiver,
            shared: Arc::clone(&self.inner.shared),
        }
    }

    /// Feed the output stream into `sink` on a dedicated thread.
    pub fn spawn_sink<F>(&self, mut sink: F) -> JoinHandle<()>
    where
        F: FnMut(OutputEvent) + Send + 'static,
    {
        let stream = self.output();
        thread::spawn(move || {
            for event in stream {
                sink(event);
            }
        })
    }

    /// Block the calling thread until the process has terminated.
    pub fn wait(&self) -> Termination {
        self.inner.shared.wait()
    }

    /// Request termination: SIGTERM, then SIGKILL after `grace`.
    ///
    /// Blocks for at most `grace` plus the OS teardown latency. Cancelling a
    /// handle that already terminated does nothing.
    pub fn cancel(&self, grace: Duration) {
        let shared = &self.inner.shared;
        if shared.current().is_terminal() {
            return;
        }

        shared.cancel_requested.store(true, Ordering::Release);
        debug!(pid = self.inner.pid, "Requesting graceful termination");
        // A closed control channel means the supervisor already reaped the child.
        let _ = self.inner.control.send(Control::Terminate);

        if shared.wait_timeout(grace).is_terminal() {
            return;
        }

        warn!(
            pid = self.inner.pid,
            grace_ms = grace.as_millis() as u64,
            "Process ignored termination request, killing"
        );
        shared.silenced.store(true, Ordering::Release);
        let _ = self.inner.control.send(Control::Kill);
        shared.wait();
    }

    /// `cancel` with the runner's configured grace timeout.
    pub fn stop(&self) {
        self.cancel(self.inner.grace_timeout);
    }
}

/// Lazy sequence of [`OutputEvent`]s for one handle.
///
/// Ends when the pipe reaches EOF, once the process has been force-killed,
/// or when the child exited and a leftover background process kept the pipe
/// open past the drain window.
pub struct OutputStream {
    receiver: Option<Receiver<OutputEvent>>,
    shared: Arc<Shared>,
}

impl OutputStream {
    fn close(&mut self) -> Option<OutputEvent> {
        self.receiver = None;
        None
    }
}

impl Iterator for OutputStream {
    type Item = OutputEvent;

    fn next(&mut self) -> Option<OutputEvent> {
        loop {
            let receiver = self.receiver.as_ref()?;
            if self.shared.is_silenced() {
                return self.close();
            }
            match receiver.recv_timeout(STREAM_POLL) {
                Ok(event) if !self.shared.is_silenced() => return Some(event),
                Ok(_) | Err(RecvTimeoutError::Disconnected) => return self.close(),
                Err(RecvTimeoutError::Timeout) if self.shared.is_detached() => {
                    return self.close();
                }
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }
    }
}

fn spawn_reader(
    pipe: PipeReader,
    events: Sender<OutputEvent>,
    drained: Sender<()>,
    shared: Arc<Shared>,
    pid: u32,
) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if shared.is_silenced() || shared.is_detached() {
                        continue;
                    }
                    // Keep draining even when nobody listens, so the child
                    // never blocks on a full pipe.
                    let _ = events.send(OutputEvent {
                        line: decode_line(&buf),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(pid, error = %e, "Output pipe closed with error");
                    break;
                }
            }
        }
        let _ = drained.send(());
    });
}

fn supervise(
    mut child: Child,
    control: &Receiver<Control>,
    drained: &Receiver<()>,
    shared: &Shared,
) {
    let pid = child.id();
    let mut kill_sent = false;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(e) => {
                warn!(pid, error = %e, "Failed to query process status");
                break None;
            }
        }
        match control.recv_timeout(SUPERVISOR_POLL) {
            Ok(Control::Terminate) => request_termination(&mut child),
            Ok(Control::Kill) => {
                force_kill(&mut child);
                kill_sent = true;
            }
            Err(RecvTimeoutError::Timeout) => {}
            // Every handle is gone; keep reaping so the child is not left a zombie.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(SUPERVISOR_POLL),
        }
    };

    if kill_sent {
        info!(pid, "Supervised process killed");
        shared.finish(ProcessState::Killed);
        return;
    }

    let terminal = ProcessState::Exited(status.map_or(-1, exit_code));
    // A natural exit holds `wait` until the output is queued; a cancelled
    // one reports right away and drains afterwards.
    let drained_in_time = if shared.cancel_requested.load(Ordering::Acquire) {
        info!(pid, state = ?terminal, "Supervised process terminated");
        shared.finish(terminal);
        drained.recv_timeout(DRAIN_TIMEOUT).is_ok()
    } else {
        let drained_in_time = drained.recv_timeout(DRAIN_TIMEOUT).is_ok();
        info!(pid, state = ?terminal, "Supervised process terminated");
        shared.finish(terminal);
        drained_in_time
    };

    if !drained_in_time {
        warn!(
            pid,
            "Output pipe still open after exit, a background process kept it; detaching"
        );
        shared.detached.store(true, Ordering::Release);
    }
}

fn decode_line(raw: &[u8]) -> String {
    let mut line = String::from_utf8_lossy(raw).into_owned();
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: nix::sys::signal::Signal) -> nix::Result<()> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).map_err(|_| nix::errno::Errno::ESRCH)?;
    killpg(Pid::from_raw(pgid), signal)
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::Signal;

    if let Err(e) = signal_group(child, Signal::SIGTERM) {
        debug!(pid = child.id(), error = %e, "SIGTERM to process group failed");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    // No cooperative signal available; the grace period still applies.
    if let Err(e) = child.kill() {
        debug!(pid = child.id(), error = %e, "Termination request failed");
    }
}

fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        if signal_group(child, Signal::SIGKILL).is_ok() {
            return;
        }
    }
    if let Err(e) = child.kill() {
        debug!(pid = child.id(), error = %e, "Kill failed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn lines(handle: &ProcessHandle) -> Vec<String> {
        handle.output().map(|e| e.line).collect()
    }

    #[test]
    fn test_output_preserves_emission_order() {
        let handle = ProcessRunner::new()
            .start(&sh("echo A; echo B"))
            .unwrap();
        assert_eq!(lines(&handle), vec!["A", "B"]);
        assert_eq!(handle.wait(), Termination::Exited(0));
    }

    #[test]
    fn test_stderr_is_merged_into_stream() {
        let handle = ProcessRunner::new()
            .start(&sh("echo out; echo err 1>&2; echo again"))
            .unwrap();
        assert_eq!(lines(&handle), vec!["out", "err", "again"]);
        assert!(handle.wait().success());
    }

    #[test]
    fn test_stream_finished_before_wait_returns() {
        let handle = ProcessRunner::new()
            .start(&sh("for i in 1 2 3 4 5; do echo line$i; done"))
            .unwrap();
        assert_eq!(handle.wait(), Termination::Exited(0));
        assert!(!handle.is_alive());

        let collected = lines(&handle);
        assert_eq!(collected.len(), 5);
        assert_eq!(collected[4], "line5");
    }

    #[test]
    fn test_nonzero_exit_is_data_not_error() {
        let handle = ProcessRunner::new().start(&sh("exit 3")).unwrap();
        let termination = handle.wait();
        assert_eq!(termination, Termination::Exited(3));
        assert_eq!(termination.code(), Some(3));
        assert!(!termination.success());
    }

    #[test]
    fn test_missing_executable_fails_to_launch() {
        let result = ProcessRunner::new().start(&CommandSpec::new("definitely-not-a-real-binary-xyz"));
        assert!(matches!(result, Err(LaunchError::NotFound { .. })));
    }

    #[test]
    fn test_missing_working_directory_fails_to_launch() {
        let temp_dir = TempDir::new().unwrap();
        let spec = sh("true").current_dir(temp_dir.path().join("absent"));
        let result = ProcessRunner::new().start(&spec);
        assert!(matches!(result, Err(LaunchError::MissingWorkingDir { .. })));
    }

    #[test]
    fn test_environment_and_working_directory_reach_child() {
        let temp_dir = TempDir::new().unwrap();
        let spec = sh("echo \"$CYBEROS_TEST_VALUE\"; pwd")
            .env("CYBEROS_TEST_VALUE", "hello")
            .current_dir(temp_dir.path());
        let handle = ProcessRunner::new().start(&spec).unwrap();
        let collected = lines(&handle);

        assert_eq!(collected[0], "hello");
        let expected = temp_dir.path().canonicalize().unwrap();
        let reported = PathBuf::from(&collected[1]).canonicalize().unwrap();
        assert_eq!(reported, expected);
        assert_eq!(handle.working_dir(), Some(temp_dir.path()));
    }

    #[test]
    fn test_unterminated_final_chunk_is_delivered() {
        let handle = ProcessRunner::new()
            .start(&sh("printf 'first\\r\\nlast'"))
            .unwrap();
        assert_eq!(lines(&handle), vec!["first", "last"]);
    }

    #[test]
    fn test_second_output_call_is_empty() {
        let handle = ProcessRunner::new().start(&sh("echo once")).unwrap();
        assert_eq!(lines(&handle), vec!["once"]);
        handle.wait();
        assert_eq!(handle.output().count(), 0);
    }

    #[test]
    fn test_cancel_escalates_to_kill_when_term_is_ignored() {
        let handle = ProcessRunner::new()
            .start(&sh("trap '' TERM; echo ready; while true; do sleep 0.1; done"))
            .unwrap();
        let mut stream = handle.output();
        assert_eq!(stream.next().map(|e| e.line).as_deref(), Some("ready"));

        let grace = Duration::from_millis(300);
        let started = Instant::now();
        handle.cancel(grace);
        let elapsed = started.elapsed();

        assert!(elapsed >= grace);
        assert!(elapsed < grace + Duration::from_secs(3), "took {elapsed:?}");
        assert!(!handle.is_alive());
        assert_eq!(handle.wait(), Termination::Killed);
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_graceful_cancel_reports_exit_and_flag() {
        let handle = ProcessRunner::new()
            .start(&sh("echo ready; exec sleep 30"))
            .unwrap();
        let mut stream = handle.output();
        assert_eq!(stream.next().map(|e| e.line).as_deref(), Some("ready"));

        handle.cancel(Duration::from_secs(5));

        assert!(handle.cancel_requested());
        // SIGTERM = 15
        assert_eq!(handle.wait(), Termination::Exited(143));
        assert_ne!(handle.state(), ProcessState::Killed);
    }

    #[test]
    fn test_cancel_after_exit_is_noop() {
        let handle = ProcessRunner::new().start(&sh("exit 0")).unwrap();
        assert_eq!(handle.wait(), Termination::Exited(0));

        let started = Instant::now();
        handle.cancel(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!handle.cancel_requested());
        assert_eq!(handle.state(), ProcessState::Exited(0));
    }

    #[test]
    fn test_stream_ends_when_background_child_keeps_pipe() {
        let handle = ProcessRunner::new()
            .start(&sh("sleep 6 & echo parent-done"))
            .unwrap();

        let started = Instant::now();
        let collected = lines(&handle);
        assert_eq!(collected, vec!["parent-done"]);
        assert!(
            started.elapsed() < DRAIN_TIMEOUT + Duration::from_secs(1),
            "stream blocked {:?} after exit",
            started.elapsed()
        );
        assert_eq!(handle.wait(), Termination::Exited(0));
    }

    #[test]
    fn test_liveness_is_monotonic_under_concurrent_readers() {
        let handle = ProcessRunner::new()
            .start(&sh("sleep 0.2; exit 0"))
            .unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let mut seen_terminated = false;
                    for _ in 0..2000 {
                        let state = handle.state();
                        if seen_terminated {
                            assert!(state.is_terminal());
                            assert!(!handle.is_alive());
                        }
                        if state.is_terminal() {
                            assert_eq!(state, ProcessState::Exited(0));
                            seen_terminated = true;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                })
            })
            .collect();

        handle.wait();
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_spawn_sink_delivers_all_lines() {
        let handle = ProcessRunner::new()
            .start(&sh("echo one; echo two; echo three"))
            .unwrap();
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink_target = Arc::clone(&collected);
        let worker = handle.spawn_sink(move |event| {
            sink_target.lock().unwrap().push(event.line);
        });

        handle.wait();
        worker.join().unwrap();
        assert_eq!(*collected.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_independent_handles_run_concurrently() {
        let runner = ProcessRunner::new();
        let first = runner.start(&sh("sleep 0.2; echo first")).unwrap();
        let second = runner.start(&sh("echo second")).unwrap();

        assert_eq!(lines(&second), vec!["second"]);
        assert!(first.is_alive() || first.try_termination().is_some());
        assert_eq!(lines(&first), vec!["first"]);
        assert_ne!(first.pid(), second.pid());
    }

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("qemu-img")
            .args(["create", "-f", "qcow2"])
            .arg("disk.qcow2");
        assert_eq!(spec.display(), "qemu-img create -f qcow2 disk.qcow2");
        assert_eq!(spec.command_line().len(), 5);
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b"\xffx\n"), "\u{fffd}x");
    }
}
