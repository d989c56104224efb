pub mod command;
pub mod display_server;
pub mod local;
pub mod process;
pub mod registry;
pub mod version;
pub mod vt;
pub mod xdmcp;

pub use command::{CommandSpec, XServerCommand, build_command, resolve_absolute_command};
pub use display_server::{AnyDisplayServer, DisplayServer};
pub use local::{LocalXServer, LocalXServerConfig};
pub use process::{LogMode, ProcessEvent, ProcessSupervisor, RealProcessSupervisor};
pub use registry::DisplayNumberRegistry;
pub use version::{XServerVersion, probe as probe_version};
pub use vt::{NullVtAllocator, VtAllocator, VtLease};
pub use xdmcp::{XdmcpSeat, XdmcpSession, XServerRemote};
