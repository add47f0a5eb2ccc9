//! Thin `fstatat`/`access` wrappers (§4.4 steps 1 and 3): kept in one small
//! module so the rest of the job logic stays portable and testable.

#[derive(Clone, Copy, Debug)]
pub struct RawStat {
    pub ino: u64,
    pub dev: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blocks: u64,
    pub nlink: u64,
    pub mtime: i64,
}

#[cfg(unix)]
mod imp {
    use super::RawStat;
    use std::ffi::CString;
    use std::fs::File;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    pub fn can_access(path: &Path) -> bool {
        let c_path = match CString::new(path.as_os_str().as_bytes()) {
            Ok(c) => c,
            Err(_) => return false,
        };
        unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::X_OK) == 0 }
    }

    /// `fstatat(dirfd, name, AT_SYMLINK_NOFOLLOW | AT_NO_AUTOMOUNT)` (§4.4
    /// step 3). `AT_NO_AUTOMOUNT` is only defined on Linux.
    pub fn fstatat(dir: &File, name: &std::ffi::OsStr) -> io::Result<RawStat> {
        let c_name = CString::new(name.as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "nul byte in filename"))?;
        let mut buf: libc::stat = unsafe { std::mem::zeroed() };

        let mut flags = libc::AT_SYMLINK_NOFOLLOW;
        #[cfg(target_os = "linux")]
        {
            flags |= libc::AT_NO_AUTOMOUNT;
        }

        let rc = unsafe { libc::fstatat(dir.as_raw_fd(), c_name.as_ptr(), &mut buf, flags) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(RawStat {
            ino: buf.st_ino as u64,
            dev: buf.st_dev as u64,
            mode: buf.st_mode as u32,
            uid: buf.st_uid as u32,
            gid: buf.st_gid as u32,
            size: buf.st_size as u64,
            blocks: buf.st_blocks as u64,
            nlink: buf.st_nlink as u64,
            mtime: buf.st_mtime as i64,
        })
    }
}

#[cfg(not(unix))]
mod imp {
    use super::RawStat;
    use std::fs::File;
    use std::io;
    use std::path::Path;

    pub fn can_access(path: &Path) -> bool {
        std::fs::metadata(path).is_ok()
    }

    /// Falls back to `symlink_metadata` off Unix (§4.4): this cannot tell a
    /// mount boundary apart from an ordinary directory by device number,
    /// so the mount-crossing policy degrades to "never cross" here.
    pub fn fstatat(_dir: &File, _name: &std::ffi::OsStr) -> io::Result<RawStat> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "fstatat is unix-only; caller should use symlink_metadata"))
    }
}

pub use imp::{can_access, fstatat};

/// Portable per-entry stat used off Unix, and as the uniform return type
/// the job loop consumes regardless of platform.
pub fn stat_entry(dir_path: &std::path::Path, dirfd: Option<&std::fs::File>, name: &std::ffi::OsStr) -> std::io::Result<RawStat> {
    if let Some(dirfd) = dirfd {
        if let Ok(st) = fstatat(dirfd, name) {
            return Ok(st);
        }
    }
    let full = dir_path.join(name);
    let meta = std::fs::symlink_metadata(&full)?;
    Ok(portable_stat(&meta))
}

#[cfg(unix)]
fn portable_stat(meta: &std::fs::Metadata) -> RawStat {
    use std::os::unix::fs::MetadataExt;
    RawStat {
        ino: meta.ino(),
        dev: meta.dev(),
        mode: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.size(),
        blocks: meta.blocks(),
        nlink: meta.nlink(),
        mtime: meta.mtime(),
    }
}

#[cfg(not(unix))]
fn portable_stat(meta: &std::fs::Metadata) -> RawStat {
    let mode = if meta.is_dir() { 0o040755 } else { 0o100644 };
    RawStat {
        ino: 0,
        dev: 0,
        mode,
        uid: 0,
        gid: 0,
        size: meta.len(),
        blocks: meta.len().div_ceil(512),
        nlink: 1,
        mtime: meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0),
    }
}
