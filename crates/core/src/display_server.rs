//! Capability trait shared by local and remote X-server handles, and the
//! tagged union wrapping both.
//!
//! Grounded on the `DisplayServer`/`XServer`/`XServerLocal` class hierarchy
//! in `original_source/src/x-server-local.c`; modeled here as the DESIGN
//! NOTES describe — a small capability trait plus a plain enum over the two
//! concrete variants, rather than a class hierarchy.

use crate::local::LocalXServer;
use crate::xdmcp::XServerRemote;

pub trait DisplayServer {
    fn start(&mut self);
    fn stop(&mut self);
    fn get_vt(&self) -> Option<u32>;
    fn get_display_number(&self) -> u32;
    fn get_address(&self) -> String;
}

impl DisplayServer for LocalXServer {
    fn start(&mut self) {
        let _ = LocalXServer::start(self);
    }

    fn stop(&mut self) {
        LocalXServer::stop(self);
    }

    fn get_vt(&self) -> Option<u32> {
        LocalXServer::vt(self)
    }

    fn get_display_number(&self) -> u32 {
        self.display_number()
    }

    fn get_address(&self) -> String {
        self.address()
    }
}

impl DisplayServer for XServerRemote {
    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn get_vt(&self) -> Option<u32> {
        None
    }

    fn get_display_number(&self) -> u32 {
        self.display_number
    }

    fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.display_number)
    }
}

/// Tagged union over the two display-server variants this subsystem knows
/// about. A real daemon would have more variants (e.g. a VNC backend); only
/// the two in scope here are modeled.
pub enum AnyDisplayServer {
    Local(LocalXServer),
    Remote(XServerRemote),
}

impl DisplayServer for AnyDisplayServer {
    fn start(&mut self) {
        match self {
            AnyDisplayServer::Local(server) => DisplayServer::start(server),
            AnyDisplayServer::Remote(server) => DisplayServer::start(server),
        }
    }

    fn stop(&mut self) {
        match self {
            AnyDisplayServer::Local(server) => DisplayServer::stop(server),
            AnyDisplayServer::Remote(server) => DisplayServer::stop(server),
        }
    }

    fn get_vt(&self) -> Option<u32> {
        match self {
            AnyDisplayServer::Local(server) => server.get_vt(),
            AnyDisplayServer::Remote(server) => server.get_vt(),
        }
    }

    fn get_display_number(&self) -> u32 {
        match self {
            AnyDisplayServer::Local(server) => server.get_display_number(),
            AnyDisplayServer::Remote(server) => server.get_display_number(),
        }
    }

    fn get_address(&self) -> String {
        match self {
            AnyDisplayServer::Local(server) => server.get_address(),
            AnyDisplayServer::Remote(server) => server.get_address(),
        }
    }
}
