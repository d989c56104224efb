mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use tracing::info;
use xsup_core::{DisplayNumberRegistry, LocalXServer, LocalXServerConfig, RealProcessSupervisor};
use xsup_protocol::{ConfigStore, PlainAuthorityWriter, SupervisorConfig, load_config};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_term(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_shutdown_handler() {
    let action = SigAction::new(
        SigHandler::Handler(handle_term),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGINT, &action).expect("failed to install SIGINT handler");
        sigaction(Signal::SIGTERM, &action).expect("failed to install SIGTERM handler");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::parse_args()?;

    let config_store: Arc<dyn ConfigStore> = match load_config(&args.config_path) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::warn!(
                path = %args.config_path.display(),
                error = %err,
                "Failed to load config, falling back to defaults"
            );
            Arc::new(SupervisorConfig::default())
        }
    };

    let registry = Arc::new(DisplayNumberRegistry::new());

    let server_config = LocalXServerConfig {
        command: args.command,
        config_file: args.config_file,
        layout: args.layout,
        xdg_seat: args.xdg_seat,
        allow_tcp: args.allow_tcp,
        vt: args.vt,
        add_args: args.add_args,
        ..LocalXServerConfig::default()
    };

    let mut server = LocalXServer::new(
        server_config,
        Box::new(RealProcessSupervisor::new()),
        Arc::new(PlainAuthorityWriter),
        Arc::new(xsup_core::NullVtAllocator),
        registry,
        config_store,
    );

    let display_number = server.display_number();
    info!(display = display_number, "Starting X server on display {}", server.address());

    server
        .start()
        .with_context(|| format!("Failed to start X server on display {display_number}"))?;

    install_shutdown_handler();

    loop {
        server.pump_events();
        if server.is_stopped() {
            info!(display = display_number, "X server exited");
            break;
        }
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!(display = display_number, "Shutdown requested, stopping X server");
            server.stop();
            SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    Ok(())
}
