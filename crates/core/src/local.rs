//! Local X-server controller: orchestrates display-number leasing, VT
//! reference, authority file, command building, version probing and process
//! supervision into one start/ready/stop/finalize lifecycle.
//!
//! Grounded on `x_server_local_start`/`x_server_local_stop`/
//! `x_server_local_got_signal`/`x_server_local_finalize` in
//! `original_source/src/x-server-local.c`, and on the env-whitelist /
//! `pre_exec` wiring pattern in `frecar-beam/crates/server/src/session.rs`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use xsup_protocol::{
    AuthorityWriteMode, AuthorityWriter, ConfigStore, SupervisorError, XAuthority,
};

use crate::command::{self, CommandSpec, XServerCommand};
use crate::process::{LogMode, ProcessEvent, ProcessSupervisor};
use crate::registry::DisplayNumberRegistry;
use crate::version::{self, XServerVersion};
use crate::vt::{VtAllocator, VtLease};

/// Configuration for a [`LocalXServer`]. All setters documented in §3 are
/// no-ops once the server has started; this is enforced by `LocalXServer`,
/// not by the config type itself, since the config is consumed at
/// construction time and owned thereafter by the controller.
#[derive(Debug, Clone)]
pub struct LocalXServerConfig {
    pub command: String,
    pub config_file: Option<String>,
    pub layout: Option<String>,
    pub xdg_seat: Option<String>,
    pub allow_tcp: bool,
    pub background: Option<String>,
    pub xdmcp_server: Option<String>,
    pub xdmcp_port: u32,
    pub xdmcp_key: Option<String>,
    pub vt: i32,
    pub add_args: Vec<String>,
    pub log_stdout: bool,
}

impl Default for LocalXServerConfig {
    fn default() -> Self {
        Self {
            command: "X".to_string(),
            config_file: None,
            layout: None,
            xdg_seat: None,
            allow_tcp: false,
            background: None,
            xdmcp_server: None,
            xdmcp_port: 0,
            xdmcp_key: None,
            vt: -1,
            add_args: Vec::new(),
            log_stdout: true,
        }
    }
}

impl LocalXServerConfig {
    /// Setting an XDMCP key means the XDMCP server supplies the session
    /// cookie, so any previously attached authority record no longer
    /// applies; the original clears its cached authority here for the same
    /// reason.
    pub fn set_xdmcp_key(&mut self, key: impl Into<String>, authority: &mut Option<XAuthority>) {
        self.xdmcp_key = Some(key.into());
        *authority = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    Starting,
    Ready,
    Stopped,
}

/// Aggregate entity per §3. Owns its leased display number, VT lease, and
/// authority artifact, and drives the process supervisor through the
/// start/ready/stop handshake.
pub struct LocalXServer {
    config: LocalXServerConfig,
    display_number: u32,
    authority_record: Option<XAuthority>,
    authority_path: Option<PathBuf>,
    vt_lease: Option<VtLease>,
    state: Arc<Mutex<State>>,
    supervisor: Box<dyn ProcessSupervisor>,
    authority_writer: Arc<dyn AuthorityWriter>,
    vt_allocator: Arc<dyn VtAllocator>,
    registry: Arc<DisplayNumberRegistry>,
    config_store: Arc<dyn ConfigStore>,
    on_started: Option<Box<dyn FnMut() + Send>>,
    on_stopped: Option<Box<dyn FnMut() + Send>>,
    events: Option<std::sync::mpsc::Receiver<ProcessEvent>>,
}

impl LocalXServer {
    /// Leases a display number and builds a not-yet-started controller.
    /// Mirrors the original's constructor, which takes its display number
    /// from the registry immediately rather than deferring to `start`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LocalXServerConfig,
        supervisor: Box<dyn ProcessSupervisor>,
        authority_writer: Arc<dyn AuthorityWriter>,
        vt_allocator: Arc<dyn VtAllocator>,
        registry: Arc<DisplayNumberRegistry>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        let display_number = registry.acquire(config_store.minimum_display_number());
        tracing::info!(display = display_number, "XServer {display_number}: created");
        Self {
            config,
            display_number,
            authority_record: None,
            authority_path: None,
            vt_lease: None,
            state: Arc::new(Mutex::new(State::NotStarted)),
            supervisor,
            authority_writer,
            vt_allocator,
            registry,
            config_store,
            on_started: None,
            on_stopped: None,
            events: None,
        }
    }

    pub fn display_number(&self) -> u32 {
        self.display_number
    }

    /// The VT currently held, if any, per the `get_vt` collaborator contract
    /// in §6's "Base display-server class" row.
    pub fn vt(&self) -> Option<u32> {
        self.vt_lease.as_ref().and_then(VtLease::vt)
    }

    pub fn address(&self) -> String {
        format!(":{}", self.display_number)
    }

    pub fn is_ready(&self) -> bool {
        *self.state.lock().unwrap() == State::Ready
    }

    pub fn is_stopped(&self) -> bool {
        *self.state.lock().unwrap() == State::Stopped
    }

    /// Attach an in-memory authority record. No-op after start, per §3.
    pub fn set_authority(&mut self, record: Option<XAuthority>) {
        if *self.state.lock().unwrap() == State::NotStarted {
            self.authority_record = record;
        }
    }

    pub fn set_xdmcp_key(&mut self, key: impl Into<String>) {
        if *self.state.lock().unwrap() == State::NotStarted {
            self.config.set_xdmcp_key(key, &mut self.authority_record);
        }
    }

    pub fn set_vt(&mut self, vt: i32) {
        if *self.state.lock().unwrap() != State::NotStarted {
            return;
        }
        self.config.vt = vt;
    }

    pub fn on_started(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_started = Some(Box::new(callback));
    }

    pub fn on_stopped(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_stopped = Some(Box::new(callback));
    }

    /// Start the server: resolve the binary, write the authority file,
    /// build argv, set up log redirection and environment, spawn. Per
    /// §4.G, a synthesized `stopped` event fires on `BinaryNotFound` or
    /// `SpawnFailed` so resources are released the same way a crash would
    /// release them.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != State::NotStarted {
                return Ok(());
            }
            *state = State::Starting;
        }

        if self.vt_lease.is_none() {
            self.vt_lease = Some(VtLease::acquire(self.vt_allocator.clone(), self.config.vt));
        }

        self.ensure_authority_written();

        let absolute = match command::resolve_absolute_command(&self.config.command) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(display = self.display_number, error = %err, "XServer {}: binary not found", self.display_number);
                self.deliver_stopped();
                return Err(err);
            }
        };

        let detected_version: Option<XServerVersion> = version::probe();
        let argv = self.build_argv(&absolute, detected_version.as_ref());

        let log_mode = if self.config_store.backup_logs() {
            LogMode::BackupAndTruncate
        } else {
            LogMode::Append
        };
        let log_path = Path::new(&self.config_store.log_directory())
            .join(format!("x-{}.log", self.display_number));

        let env = self.build_env();

        let (tx, rx) = std::sync::mpsc::channel::<ProcessEvent>();
        let callback: Box<dyn FnMut(ProcessEvent) + Send> = Box::new(move |event| {
            let _ = tx.send(event);
        });

        let spawn_result = self.supervisor.start(
            &argv.0,
            &env,
            &log_path,
            log_mode,
            self.config.log_stdout,
            callback,
        );
        self.events = Some(rx);

        // Drain any events the supervisor fired synchronously during
        // `start` itself (e.g. a mock firing `Stopped` on spawn failure),
        // matching §5's "stopped_cb may be invoked synchronously from
        // within start" requirement. Events arriving later (the real
        // SIGUSR1/exit notifications) are drained by `pump_events`, which
        // the owning event loop calls.
        self.pump_events();

        spawn_result
    }

    /// Drain and apply any events the process supervisor has queued since
    /// the last pump. The real `RealProcessSupervisor` delivers `GotSignal`
    /// and `Stopped` from background dispatch threads onto the channel
    /// created in `start`; this keeps all controller-state mutation on
    /// whichever thread calls `pump_events`, matching the single-threaded
    /// cooperative model the controller is written for.
    pub fn pump_events(&mut self) {
        let Some(rx) = &self.events else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event);
        }
    }

    fn build_argv(
        &self,
        absolute_command: &Path,
        version: Option<&XServerVersion>,
    ) -> XServerCommand {
        let spec = CommandSpec {
            command: &self.config.command,
            display_number: self.display_number,
            config_file: self.config.config_file.as_deref(),
            layout: self.config.layout.as_deref(),
            xdg_seat: self.config.xdg_seat.as_deref(),
            authority_path: self
                .authority_path
                .as_ref()
                .and_then(|p| p.to_str()),
            xdmcp_server: self.config.xdmcp_server.as_deref(),
            xdmcp_port: self.config.xdmcp_port,
            xdmcp_key: self.config.xdmcp_key.as_deref(),
            allow_tcp: self.config.allow_tcp,
            vt: self.config.vt,
            background: self.config.background.as_deref(),
            add_args: &self.config.add_args,
            version,
        };
        command::build_command(&spec, &absolute_command.to_string_lossy())
    }

    fn build_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        let mut had_display = false;
        if let Ok(display) = std::env::var("DISPLAY") {
            env.push(("DISPLAY".to_string(), display));
            had_display = true;
        }
        if let Ok(xauthority) = std::env::var("XAUTHORITY") {
            env.push(("XAUTHORITY".to_string(), xauthority));
        } else if had_display {
            if let Ok(home) = std::env::var("HOME") {
                env.push(("XAUTHORITY".to_string(), format!("{home}/.Xauthority")));
            }
        }
        for key in ["LD_PRELOAD", "LD_LIBRARY_PATH", "PATH", "LIGHTDM_TEST_ROOT"] {
            if let Ok(value) = std::env::var(key) {
                env.push((key.to_string(), value));
            }
        }
        env
    }

    fn ensure_authority_written(&mut self) {
        let Some(record) = self.authority_record.clone() else {
            return;
        };
        if self.authority_path.is_none() {
            let path = PathBuf::from(self.config_store.run_directory())
                .join("root")
                .join(self.address());
            self.authority_path = Some(path);
        }
        let path = self.authority_path.clone().unwrap();
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(display = self.display_number, path = %parent.display(), error = %err, "XServer {}: failed to create authority directory", self.display_number);
                self.authority_path = None;
                return;
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }
        if let Err(err) =
            self.authority_writer
                .write(&record, AuthorityWriteMode::Replace, &path)
        {
            tracing::warn!(display = self.display_number, path = %path.display(), error = %err, "XServer {}: failed to write authority file", self.display_number);
            self.authority_path = None;
        }
    }

    /// Handle one event delivered by the process supervisor.
    fn handle_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::GotSignal(signum) if signum == libc::SIGUSR1 => self.handle_ready(),
            ProcessEvent::GotSignal(_) => {}
            ProcessEvent::Stopped => self.deliver_stopped(),
        }
    }

    fn handle_ready(&mut self) {
        let mut state = self.state.lock().unwrap();
        if *state == State::Ready {
            return;
        }
        *state = State::Ready;
        drop(state);
        tracing::info!(display = self.display_number, "XServer {}: ready", self.display_number);
        if let Some(callback) = &mut self.on_started {
            callback();
        }
    }

    /// Request termination. The actual resource release happens when
    /// `stopped` is observed, not here — mirrors the original's separation
    /// between "asked to stop" and "confirmed stopped".
    pub fn stop(&mut self) {
        self.supervisor.stop();
    }

    fn deliver_stopped(&mut self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == State::Stopped {
                return;
            }
            *state = State::Stopped;
        }

        self.vt_lease = None;
        self.registry.release(self.display_number);
        if let (Some(path), Some(_)) = (self.authority_path.take(), self.authority_record.take()) {
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!(display = self.display_number, path = %path.display(), error = %err, "XServer {}: failed to remove authority file", self.display_number);
            }
        }

        tracing::info!(display = self.display_number, "XServer {}: stopped", self.display_number);
        if let Some(callback) = &mut self.on_stopped {
            callback();
        }
    }
}

impl Drop for LocalXServer {
    fn drop(&mut self) {
        if *self.state.lock().unwrap() != State::Stopped {
            self.registry.release(self.display_number);
        }
        self.vt_lease = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessSupervisor;
    use crate::vt::NullVtAllocator;
    use xsup_protocol::{PlainAuthorityWriter, SupervisorConfig};

    /// `true` is present on essentially every Unix `PATH` and exits
    /// immediately, making it a safe stand-in for the real `X` binary in
    /// tests that need `resolve_absolute_command` to succeed.
    fn started_server_with_mock() -> (LocalXServer, MockProcessSupervisor) {
        let registry = Arc::new(DisplayNumberRegistry::new());
        let config_store: Arc<dyn ConfigStore> = Arc::new(SupervisorConfig::default());
        let mock = MockProcessSupervisor::new();
        let mut config = LocalXServerConfig::default();
        config.command = "true".to_string();
        let mut server = LocalXServer::new(
            config,
            Box::new(mock.clone()),
            Arc::new(PlainAuthorityWriter),
            Arc::new(NullVtAllocator),
            registry,
            config_store,
        );
        server.start().expect("`true` is always resolvable on PATH");
        (server, mock)
    }

    #[test]
    fn start_failure_releases_display_number() {
        let registry = Arc::new(DisplayNumberRegistry::new());
        let config_store: Arc<dyn ConfigStore> = Arc::new(SupervisorConfig::default());
        let mut config = LocalXServerConfig::default();
        config.command = "nonexistent-xyz".to_string();
        let mut server = LocalXServer::new(
            config,
            Box::new(crate::process::FailingProcessSupervisor),
            Arc::new(PlainAuthorityWriter),
            Arc::new(NullVtAllocator),
            registry.clone(),
            config_store,
        );
        let result = server.start();
        assert!(result.is_err());
        assert!(server.is_stopped());
    }

    #[test]
    fn ready_is_idempotent() {
        let (mut server, mock) = started_server_with_mock();
        let started_count = Arc::new(Mutex::new(0));
        let counter = started_count.clone();
        server.on_started(move || {
            *counter.lock().unwrap() += 1;
        });
        mock.fire(ProcessEvent::GotSignal(libc::SIGUSR1));
        mock.fire(ProcessEvent::GotSignal(libc::SIGUSR1));
        mock.fire(ProcessEvent::GotSignal(libc::SIGUSR1));
        server.pump_events();
        assert_eq!(*started_count.lock().unwrap(), 1);
        assert!(server.is_ready());
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut server, mock) = started_server_with_mock();
        let stopped_count = Arc::new(Mutex::new(0));
        let counter = stopped_count.clone();
        server.on_stopped(move || {
            *counter.lock().unwrap() += 1;
        });
        mock.fire(ProcessEvent::Stopped);
        mock.fire(ProcessEvent::Stopped);
        server.pump_events();
        assert_eq!(*stopped_count.lock().unwrap(), 1);
    }

    #[test]
    fn stopped_releases_display_number_for_reuse() {
        let registry = Arc::new(DisplayNumberRegistry::new());
        let config_store: Arc<dyn ConfigStore> = Arc::new(SupervisorConfig::default());
        let mut server = LocalXServer::new(
            LocalXServerConfig::default(),
            Box::new(MockProcessSupervisor::new()),
            Arc::new(PlainAuthorityWriter),
            Arc::new(NullVtAllocator),
            registry.clone(),
            config_store,
        );
        let number = server.display_number();
        server.deliver_stopped();
        let reacquired = registry.acquire(number);
        assert_eq!(reacquired, number);
    }

    struct RecordingVtAllocator {
        acquired: Mutex<Vec<u32>>,
        released: Mutex<Vec<u32>>,
    }

    impl RecordingVtAllocator {
        fn new() -> Self {
            Self {
                acquired: Mutex::new(Vec::new()),
                released: Mutex::new(Vec::new()),
            }
        }
    }

    impl crate::vt::VtAllocator for RecordingVtAllocator {
        fn acquire(&self, vt: u32) {
            self.acquired.lock().unwrap().push(vt);
        }

        fn release(&self, vt: u32) {
            self.released.lock().unwrap().push(vt);
        }
    }

    #[test]
    fn start_acquires_the_configured_vt_and_stop_releases_it() {
        let registry = Arc::new(DisplayNumberRegistry::new());
        let config_store: Arc<dyn ConfigStore> = Arc::new(SupervisorConfig::default());
        let vt_allocator = Arc::new(RecordingVtAllocator::new());
        let mut config = LocalXServerConfig::default();
        config.command = "true".to_string();
        config.vt = 9;
        let mut server = LocalXServer::new(
            config,
            Box::new(MockProcessSupervisor::new()),
            Arc::new(PlainAuthorityWriter),
            vt_allocator.clone(),
            registry,
            config_store,
        );
        server.start().expect("`true` is always resolvable on PATH");
        assert_eq!(server.vt(), Some(9));
        assert_eq!(*vt_allocator.acquired.lock().unwrap(), vec![9]);

        server.deliver_stopped();
        assert_eq!(*vt_allocator.released.lock().unwrap(), vec![9]);
    }

    #[test]
    fn unassigned_vt_acquires_nothing() {
        let registry = Arc::new(DisplayNumberRegistry::new());
        let config_store: Arc<dyn ConfigStore> = Arc::new(SupervisorConfig::default());
        let vt_allocator = Arc::new(RecordingVtAllocator::new());
        let mut config = LocalXServerConfig::default();
        config.command = "true".to_string();
        let mut server = LocalXServer::new(
            config,
            Box::new(MockProcessSupervisor::new()),
            Arc::new(PlainAuthorityWriter),
            vt_allocator.clone(),
            registry,
            config_store,
        );
        server.start().expect("`true` is always resolvable on PATH");
        assert_eq!(server.vt(), None);
        assert!(vt_allocator.acquired.lock().unwrap().is_empty());
    }

    /// `ConfigStore` with a caller-chosen `run-directory`, so tests can point
    /// the authority path at a directory they control (or sabotage).
    struct FixedConfigStore {
        run_directory: String,
    }

    impl ConfigStore for FixedConfigStore {
        fn minimum_display_number(&self) -> u32 {
            0
        }

        fn run_directory(&self) -> String {
            self.run_directory.clone()
        }

        fn log_directory(&self) -> String {
            std::env::temp_dir().to_string_lossy().into_owned()
        }

        fn backup_logs(&self) -> bool {
            false
        }
    }

    struct FailingAuthorityWriter;

    impl AuthorityWriter for FailingAuthorityWriter {
        fn write(
            &self,
            _record: &XAuthority,
            _mode: AuthorityWriteMode,
            _path: &Path,
        ) -> std::io::Result<()> {
            Err(std::io::Error::other("simulated authority write failure"))
        }
    }

    fn authority_record() -> XAuthority {
        XAuthority::new_local("", 0, vec![1, 2, 3])
    }

    #[test]
    fn authority_dir_failure_omits_auth_flag_from_argv() {
        let dir = std::env::temp_dir().join(format!("xsup-dirfail-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        // Put a plain file where the authority writer needs to create a
        // directory (`<run-directory>/root`), so `create_dir_all` fails.
        std::fs::write(dir.join("root"), b"not a directory").unwrap();

        let registry = Arc::new(DisplayNumberRegistry::new());
        let config_store: Arc<dyn ConfigStore> = Arc::new(FixedConfigStore {
            run_directory: dir.to_string_lossy().into_owned(),
        });
        let mock = MockProcessSupervisor::new();
        let mut config = LocalXServerConfig::default();
        config.command = "true".to_string();
        let mut server = LocalXServer::new(
            config,
            Box::new(mock.clone()),
            Arc::new(PlainAuthorityWriter),
            Arc::new(NullVtAllocator),
            registry,
            config_store,
        );
        server.set_authority(Some(authority_record()));
        server.start().expect("`true` is always resolvable on PATH");

        let argv = mock.started_argv().expect("start reached the supervisor");
        assert!(!argv.iter().any(|arg| arg == "-auth"));
        assert!(server.authority_path.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn authority_write_failure_omits_auth_flag_from_argv() {
        let dir = std::env::temp_dir().join(format!("xsup-writefail-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let registry = Arc::new(DisplayNumberRegistry::new());
        let config_store: Arc<dyn ConfigStore> = Arc::new(FixedConfigStore {
            run_directory: dir.to_string_lossy().into_owned(),
        });
        let mock = MockProcessSupervisor::new();
        let mut config = LocalXServerConfig::default();
        config.command = "true".to_string();
        let mut server = LocalXServer::new(
            config,
            Box::new(mock.clone()),
            Arc::new(FailingAuthorityWriter),
            Arc::new(NullVtAllocator),
            registry,
            config_store,
        );
        server.set_authority(Some(authority_record()));
        server.start().expect("`true` is always resolvable on PATH");

        let argv = mock.started_argv().expect("start reached the supervisor");
        assert!(!argv.iter().any(|arg| arg == "-auth"));
        assert!(server.authority_path.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
