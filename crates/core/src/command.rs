//! X-server command-line builder.
//!
//! Grounded on the argv assembly in `original_source/src/x-server-local.c`'s
//! `x_server_local_get_run_function`/`x_server_local_get_command`-adjacent
//! code (the `g_string_append_printf` chain building the command string) and
//! on `get_absolute_command_with_path` there for `PATH` resolution. Builds a
//! `Vec<String>` argv instead of the original's single concatenated
//! `GString` — positional argument order still matters (`:N` must be first),
//! but a shell-quoting bug class that the original's string-building was
//! exposed to simply cannot occur here.

use std::fmt;
use std::path::PathBuf;
use std::process::Command as StdCommand;

use crate::version::XServerVersion;
use xsup_protocol::SupervisorError;

/// The inputs §4.D's table is a pure function of. Kept distinct from
/// `LocalXServerConfig` (which also carries controller-only state like the
/// leased display number before it's finalized) so this module has no
/// dependency on the controller.
pub struct CommandSpec<'a> {
    pub command: &'a str,
    pub display_number: u32,
    pub config_file: Option<&'a str>,
    pub layout: Option<&'a str>,
    pub xdg_seat: Option<&'a str>,
    pub authority_path: Option<&'a str>,
    pub xdmcp_server: Option<&'a str>,
    pub xdmcp_port: u32,
    pub xdmcp_key: Option<&'a str>,
    pub allow_tcp: bool,
    pub vt: i32,
    pub background: Option<&'a str>,
    pub add_args: &'a [String],
    pub version: Option<&'a XServerVersion>,
}

/// Argv for the child process. `Display` renders it space-joined for log
/// lines and for the command-string assertions in the controller's tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XServerCommand(pub Vec<String>);

impl fmt::Display for XServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Resolve the first word of `command` against `PATH`, the way
/// `get_absolute_command_with_path` does in the original, by shelling out to
/// `which` rather than reimplementing `$PATH` search — the same approach the
/// agent binary in this workspace's lineage uses for locating helper tools.
pub fn resolve_absolute_command(command: &str) -> Result<PathBuf, SupervisorError> {
    let mut parts = command.split_whitespace();
    let program = parts.next().unwrap_or(command);

    if program.starts_with('/') {
        return Ok(PathBuf::from(program));
    }

    let output = StdCommand::new("which")
        .arg(program)
        .output()
        .map_err(|_| SupervisorError::BinaryNotFound {
            command: program.to_string(),
        })?;

    if !output.status.success() {
        return Err(SupervisorError::BinaryNotFound {
            command: program.to_string(),
        });
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        return Err(SupervisorError::BinaryNotFound {
            command: program.to_string(),
        });
    }
    Ok(PathBuf::from(path))
}

/// Build the argv per §4.D's table. `absolute_command` is the already
/// resolved first word (callers typically get it from
/// [`resolve_absolute_command`]); the rest of `spec.command`'s words, if
/// any, are appended immediately after it.
pub fn build_command(spec: &CommandSpec, absolute_command: &str) -> XServerCommand {
    let mut argv = Vec::new();

    argv.push(absolute_command.to_string());
    let mut rest = spec.command.split_whitespace();
    rest.next();
    argv.extend(rest.map(str::to_string));

    argv.push(format!(":{}", spec.display_number));

    if let Some(config_file) = spec.config_file {
        argv.push("-config".to_string());
        argv.push(config_file.to_string());
    }
    if let Some(layout) = spec.layout {
        argv.push("-layout".to_string());
        argv.push(layout.to_string());
    }
    if let Some(xdg_seat) = spec.xdg_seat {
        argv.push("-seat".to_string());
        argv.push(xdg_seat.to_string());
    }
    if let Some(auth) = spec.authority_path {
        argv.push("-auth".to_string());
        argv.push(auth.to_string());
    }

    if let Some(xdmcp_server) = spec.xdmcp_server {
        if spec.xdmcp_port != 0 {
            argv.push("-port".to_string());
            argv.push(spec.xdmcp_port.to_string());
        }
        argv.push("-query".to_string());
        argv.push(xdmcp_server.to_string());
        if let Some(key) = spec.xdmcp_key {
            argv.push("-cookie".to_string());
            argv.push(key.to_string());
        }
    } else if spec.allow_tcp {
        let listens = spec
            .version
            .map(|v| v.compare(1, 17) >= 0)
            .unwrap_or(false);
        if listens {
            argv.push("-listen".to_string());
            argv.push("tcp".to_string());
        }
    } else {
        argv.push("-nolisten".to_string());
        argv.push("tcp".to_string());
    }

    if spec.vt >= 0 {
        argv.push(format!("vt{}", spec.vt));
        argv.push("-novtswitch".to_string());
    }

    if let Some(background) = spec.background {
        argv.push("-background".to_string());
        argv.push(background.to_string());
    }

    argv.extend(spec.add_args.iter().cloned());

    XServerCommand(argv)
}
