//! XDMCP-session seat adapter.
//!
//! Grounded on `seat_xdmcp_session_create_display_server` in
//! `original_source/src/seat-xdmcp-session.c`: a session type check, then a
//! once-per-seat construction of a remote X-server handle cached for the
//! seat's lifetime.

use std::sync::OnceLock;

use xsup_protocol::XAuthority;

/// Accessor seam for the XDMCP session collaborator (§6: "accessors for
/// host `InetAddress`, display number, and authority record"). The wire
/// session itself is out of scope.
pub trait XdmcpSession: Send + Sync {
    fn host(&self) -> String;
    fn display_number(&self) -> u32;
    fn authority(&self) -> Option<XAuthority>;
}

/// Minimal handle for a display server bound to a remote XDMCP host. The
/// X11/XDMCP wire protocol itself is out of scope; this only carries the
/// identifying fields a `DisplayServer` needs.
pub struct XServerRemote {
    pub host: String,
    pub display_number: u32,
    pub authority: Option<XAuthority>,
}

impl XServerRemote {
    fn new(host: String, display_number: u32, authority: Option<XAuthority>) -> Self {
        Self {
            host,
            display_number,
            authority,
        }
    }
}

/// A seat specialization that binds its one display server to an XDMCP
/// session rather than spawning a local X server directly.
pub struct XdmcpSeat {
    session: Box<dyn XdmcpSession>,
    remote_server: OnceLock<()>,
    cached: std::sync::Mutex<Option<std::sync::Arc<std::sync::Mutex<XServerRemote>>>>,
}

impl XdmcpSeat {
    pub fn new(session: Box<dyn XdmcpSession>) -> Self {
        Self {
            session,
            remote_server: OnceLock::new(),
            cached: std::sync::Mutex::new(None),
        }
    }

    /// Per §4.H: only applicable to `"x"` sessions, and at most one remote
    /// server is ever constructed for the seat's lifetime. Returns `None`
    /// on every call after the first successful one, mirroring the
    /// original's "not applicable" return for a session it already served.
    pub fn create_display_server(
        &self,
        session_type: &str,
    ) -> Option<std::sync::Arc<std::sync::Mutex<XServerRemote>>> {
        if session_type != "x" {
            return None;
        }

        let mut created = false;
        self.remote_server.get_or_init(|| {
            created = true;
        });
        if !created {
            return None;
        }

        let server = XServerRemote::new(
            self.session.host(),
            self.session.display_number(),
            self.session.authority(),
        );
        let handle = std::sync::Arc::new(std::sync::Mutex::new(server));
        *self.cached.lock().unwrap() = Some(handle.clone());
        Some(handle)
    }
}
