//! Process supervisor adapter.
//!
//! Grounded on the `pre_exec` usage in `frecar-beam/crates/server/src/
//! session.rs` (dropping privileges via `initgroups`/`setgid`/`setuid` in the
//! forked child before exec) and on the pre-exec / readiness contract in
//! `original_source/src/x-server-local.c`'s `x_server_local_run` (dup
//! `/dev/null` onto fd 0, ignore SIGUSR1) and `x_server_local_got_signal`.
//!
//! SIGUSR1 delivery uses the standard self-pipe trick: a process-wide signal
//! handler installed with `sigaction(SA_SIGINFO)` writes the signalling PID
//! into a pipe (the only async-signal-safe way to get data out of a
//! handler); a background thread reads the pipe and routes each PID to
//! whichever [`RealProcessSupervisor`] registered it, without blocking
//! inside the handler itself.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Read as _;
use std::os::fd::FromRawFd;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::unistd::Pid;

use xsup_protocol::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    GotSignal(i32),
    Stopped,
}

/// Log redirection mode for the child's stdout/stderr, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Append,
    BackupAndTruncate,
}

/// Collaborator seam wrapping the OS process. Real spawns go through
/// [`RealProcessSupervisor`]; controller tests use [`MockProcessSupervisor`]
/// so no Xorg binary needs to exist in the test environment.
pub trait ProcessSupervisor: Send {
    fn start(
        &mut self,
        argv: &[String],
        env: &[(String, String)],
        log_path: &Path,
        log_mode: LogMode,
        log_stdout: bool,
        on_event: Box<dyn FnMut(ProcessEvent) + Send>,
    ) -> Result<(), SupervisorError>;

    fn stop(&mut self);
}

/// Opens the log file per §6/§4.G: append, or rename the existing file to
/// `.old` and truncate.
fn open_log_file(log_path: &Path, mode: LogMode) -> std::io::Result<File> {
    if mode == LogMode::BackupAndTruncate && log_path.exists() {
        let backup = log_path.with_extension("old");
        std::fs::rename(log_path, backup).ok();
    }

    OpenOptions::new()
        .create(true)
        .append(matches!(mode, LogMode::Append))
        .truncate(matches!(mode, LogMode::BackupAndTruncate))
        .write(true)
        .open(log_path)
}

/// Real implementation: forks via `std::process::Command`, installs the
/// pre-exec hook, and registers the child's PID with the process-wide
/// SIGUSR1 dispatcher.
pub struct RealProcessSupervisor {
    pid: Option<i32>,
}

impl Default for RealProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl RealProcessSupervisor {
    pub fn new() -> Self {
        Self { pid: None }
    }
}

impl ProcessSupervisor for RealProcessSupervisor {
    fn start(
        &mut self,
        argv: &[String],
        env: &[(String, String)],
        log_path: &Path,
        log_mode: LogMode,
        log_stdout: bool,
        on_event: Box<dyn FnMut(ProcessEvent) + Send>,
    ) -> Result<(), SupervisorError> {
        let (program, args) = argv
            .split_first()
            .expect("argv always has at least the program name");

        let log_file = open_log_file(log_path, log_mode).map_err(|source| {
            tracing::warn!(path = %log_path.display(), error = %source, "failed to open X server log file");
            SupervisorError::SpawnFailed { source }
        })?;
        let stderr_file = log_file
            .try_clone()
            .map_err(|source| SupervisorError::SpawnFailed { source })?;

        let mut command = Command::new(program);
        command.args(args);
        command.env_clear();
        for (key, value) in env {
            command.env(key, value);
        }
        command.stdin(Stdio::null());
        if log_stdout {
            command.stdout(log_file);
        } else {
            command.stdout(Stdio::null());
        }
        command.stderr(stderr_file);

        unsafe {
            command.pre_exec(pre_exec_hook);
        }

        let mut child = command.spawn().map_err(|source| {
            tracing::warn!(error = %source, "failed to spawn X server process");
            SupervisorError::SpawnFailed { source }
        })?;

        let pid = child.id() as i32;
        tracing::debug!(pid, "spawned X server process");
        dispatcher().register(pid, on_event);

        std::thread::spawn(move || {
            let status = child.wait();
            tracing::debug!(pid, ?status, "X server process exited");
            dispatcher().deliver_stopped(pid);
        });

        self.pid = Some(pid);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(pid) = self.pid {
            let _ = nix::sys::signal::kill(Pid::from_raw(pid), Signal::SIGTERM);
        }
    }
}

/// Runs in the forked child between fork and exec. Must use only
/// async-signal-safe primitives: no allocation, no locking — `std::fs::File`
/// opens would allocate a `CString` for the path, which can deadlock if
/// another thread held the malloc arena lock at `fork` time. `libc::open`
/// with a static C string avoids that entirely, matching the raw `open()`/
/// `dup2()` the original uses in `x_server_local_run`.
fn pre_exec_hook() -> std::io::Result<()> {
    let fd = unsafe { libc::open(c"/dev/null".as_ptr(), libc::O_RDONLY) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let dup_result = unsafe { libc::dup2(fd, 0) };
    unsafe {
        libc::close(fd);
    }
    if dup_result < 0 {
        return Err(std::io::Error::last_os_error());
    }
    unsafe {
        libc::signal(libc::SIGUSR1, libc::SIG_IGN);
    }
    Ok(())
}

/// Process-wide SIGUSR1 dispatcher: one `sigaction` installation, a self-pipe
/// to get out of the signal handler safely, and a table mapping PID to the
/// event callback registered for that child.
struct Dispatcher {
    callbacks: Mutex<HashMap<i32, Box<dyn FnMut(ProcessEvent) + Send>>>,
}

static SELF_PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

impl Dispatcher {
    fn register(&self, pid: i32, callback: Box<dyn FnMut(ProcessEvent) + Send>) {
        self.callbacks.lock().unwrap().insert(pid, callback);
    }

    fn deliver_signal(&self, pid: i32, signum: i32) {
        if let Some(callback) = self.callbacks.lock().unwrap().get_mut(&pid) {
            callback(ProcessEvent::GotSignal(signum));
        }
    }

    fn deliver_stopped(&self, pid: i32) {
        if let Some(mut callback) = self.callbacks.lock().unwrap().remove(&pid) {
            callback(ProcessEvent::Stopped);
        }
    }
}

fn dispatcher() -> &'static Dispatcher {
    static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();
    DISPATCHER.get_or_init(|| {
        install_signal_handler();
        Dispatcher {
            callbacks: Mutex::new(HashMap::new()),
        }
    })
}

extern "C" fn handle_sigusr1(_signum: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    let pid = if info.is_null() {
        0
    } else {
        unsafe { (*info).si_pid() }
    };
    let fd = SELF_PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let bytes = pid.to_ne_bytes();
        unsafe {
            libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len());
        }
    }
}

fn install_signal_handler() {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        tracing::warn!("failed to create self-pipe for SIGUSR1 dispatch");
        return;
    }
    SELF_PIPE_WRITE_FD.store(fds[1], Ordering::Relaxed);

    let action = SigAction::new(
        SigHandler::SigAction(handle_sigusr1),
        SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGUSR1, &action).expect("failed to install SIGUSR1 handler");
    }

    std::thread::spawn(move || {
        let mut read_fd = unsafe { File::from_raw_fd(fds[0]) };
        let mut buf = [0u8; 4];
        loop {
            match read_fd.read_exact(&mut buf) {
                Ok(()) => {
                    let pid = i32::from_ne_bytes(buf);
                    dispatcher().deliver_signal(pid, libc::SIGUSR1);
                }
                Err(_) => break,
            }
        }
    });
}

/// In-memory mock for controller tests: records start/stop calls and lets
/// the test fire events on demand. Shares its recorded state through `Arc`
/// so a test can clone a handle before handing the original to a
/// [`crate::local::LocalXServer`], which takes ownership of it as a trait
/// object.
#[derive(Clone)]
pub struct MockProcessSupervisor {
    started_argv: Arc<Mutex<Option<Vec<String>>>>,
    stop_calls: Arc<Mutex<u32>>,
    on_event: Arc<Mutex<Option<Box<dyn FnMut(ProcessEvent) + Send>>>>,
}

impl Default for MockProcessSupervisor {
    fn default() -> Self {
        Self {
            started_argv: Arc::new(Mutex::new(None)),
            stop_calls: Arc::new(Mutex::new(0)),
            on_event: Arc::new(Mutex::new(None)),
        }
    }
}

impl MockProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started_argv(&self) -> Option<Vec<String>> {
        self.started_argv.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> u32 {
        *self.stop_calls.lock().unwrap()
    }

    /// Deliver an event as if the supervised process had produced it. A
    /// no-op before `start` has registered a handler.
    pub fn fire(&self, event: ProcessEvent) {
        if let Some(callback) = &mut *self.on_event.lock().unwrap() {
            callback(event);
        }
    }
}

impl ProcessSupervisor for MockProcessSupervisor {
    fn start(
        &mut self,
        argv: &[String],
        _env: &[(String, String)],
        _log_path: &Path,
        _log_mode: LogMode,
        _log_stdout: bool,
        on_event: Box<dyn FnMut(ProcessEvent) + Send>,
    ) -> Result<(), SupervisorError> {
        *self.started_argv.lock().unwrap() = Some(argv.to_vec());
        *self.on_event.lock().unwrap() = Some(on_event);
        Ok(())
    }

    fn stop(&mut self) {
        *self.stop_calls.lock().unwrap() += 1;
    }
}

/// A mock that always fails to start, exercising the `BinaryNotFound`/
/// `SpawnFailed` path from §7 without touching the filesystem.
pub struct FailingProcessSupervisor;

impl ProcessSupervisor for FailingProcessSupervisor {
    fn start(
        &mut self,
        _argv: &[String],
        _env: &[(String, String)],
        _log_path: &Path,
        _log_mode: LogMode,
        _log_stdout: bool,
        mut on_event: Box<dyn FnMut(ProcessEvent) + Send>,
    ) -> Result<(), SupervisorError> {
        on_event(ProcessEvent::Stopped);
        Err(SupervisorError::BinaryNotFound {
            command: "nonexistent-xyz".to_string(),
        })
    }

    fn stop(&mut self) {}
}
