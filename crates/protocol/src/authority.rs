//! X authority record. The wire format used by `.Xauthority` (the Xauth
//! family/address/number/name/data quintuple) is out of scope — this is the
//! in-memory record the supervisor hands to the authority writer, and the
//! writer trait that knows how to serialize it.

use std::path::Path;

/// One Xauth entry: enough to authenticate a local client against a display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XAuthority {
    pub family: AuthorityFamily,
    pub address: Vec<u8>,
    pub number: String,
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityFamily {
    Local,
    Wild,
    Internet,
    Internet6,
}

impl XAuthority {
    /// Build a record for a local display using the given cookie bytes.
    pub fn new_local(hostname: &str, display_number: u32, data: Vec<u8>) -> Self {
        Self {
            family: AuthorityFamily::Local,
            address: hostname.as_bytes().to_vec(),
            number: display_number.to_string(),
            name: "MIT-MAGIC-COOKIE-1".to_string(),
            data,
        }
    }
}

/// Write mode for an authority file. `Replace` is the only mode the local
/// X-server supervisor uses; other modes exist in the real Xauth codec but
/// are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityWriteMode {
    Replace,
}

/// Serializes an [`XAuthority`] record to a file. The real Xauth binary
/// format is out of scope for this subsystem; this trait is the seam a full
/// daemon would plug its authority codec into.
pub trait AuthorityWriter: Send + Sync {
    fn write(
        &self,
        record: &XAuthority,
        mode: AuthorityWriteMode,
        path: &Path,
    ) -> std::io::Result<()>;
}

/// Writes a minimal, self-consistent binary encoding: enough for round-trip
/// tests and for exercising the supervisor's file lifecycle, without
/// claiming to be wire-compatible with Xlib's `XauWriteAuth`.
pub struct PlainAuthorityWriter;

impl AuthorityWriter for PlainAuthorityWriter {
    fn write(
        &self,
        record: &XAuthority,
        mode: AuthorityWriteMode,
        path: &Path,
    ) -> std::io::Result<()> {
        let AuthorityWriteMode::Replace = mode;

        let mut buf = Vec::with_capacity(32 + record.data.len());
        buf.extend_from_slice(&(record.address.len() as u16).to_be_bytes());
        buf.extend_from_slice(&record.address);
        buf.extend_from_slice(&(record.number.len() as u16).to_be_bytes());
        buf.extend_from_slice(record.number.as_bytes());
        buf.extend_from_slice(&(record.name.len() as u16).to_be_bytes());
        buf.extend_from_slice(record.name.as_bytes());
        buf.extend_from_slice(&(record.data.len() as u16).to_be_bytes());
        buf.extend_from_slice(&record.data);

        // Write to a sibling temp file and rename into place so a reader
        // (or the X server itself, via inotify) never observes a partial
        // write. Same directory guarantees the rename is within one
        // filesystem and therefore atomic.
        static TMP_COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
        let unique = TMP_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let tmp_name = format!(
            "{}.tmp-{}-{unique}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("auth"),
            std::process::id()
        );
        let tmp_path = path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, &buf)?;
        std::fs::rename(&tmp_path, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_bytes() {
        let dir = std::env::temp_dir().join(format!("xsup-authtest-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(":7");

        let record = XAuthority::new_local("", 7, vec![1, 2, 3, 4]);
        PlainAuthorityWriter
            .write(&record, AuthorityWriteMode::Replace, &path)
            .unwrap();

        assert!(path.exists());
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.ends_with(&[1, 2, 3, 4]));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn write_overwrites_existing_file() {
        let dir = std::env::temp_dir().join(format!("xsup-authtest2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(":8");

        let first = XAuthority::new_local("", 8, vec![9, 9]);
        PlainAuthorityWriter
            .write(&first, AuthorityWriteMode::Replace, &path)
            .unwrap();
        let second = XAuthority::new_local("", 8, vec![1]);
        PlainAuthorityWriter
            .write(&second, AuthorityWriteMode::Replace, &path)
            .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.ends_with(&[1]));

        std::fs::remove_dir_all(&dir).ok();
    }
}
