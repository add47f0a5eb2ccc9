//! Mount-point enumeration and the filesystem-crossing policy (§4.4,
//! "Filesystem crossing"; §6.2).

use std::path::{Path, PathBuf};

/// One row of the system's mount table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountPointInfo {
    pub mount_point: PathBuf,
    pub device: String,
    pub fs_type: String,
    pub is_bind_mount: bool,
}

impl MountPointInfo {
    pub fn is_network(&self) -> bool {
        matches!(self.fs_type.as_str(), "nfs" | "nfs4" | "cifs" | "smb" | "smbfs" | "afs" | "sshfs")
    }

    pub fn is_btrfs(&self) -> bool {
        self.fs_type == "btrfs"
    }

    pub fn is_ntfs(&self) -> bool {
        matches!(self.fs_type.as_str(), "ntfs" | "ntfs3" | "fuseblk")
    }

    pub fn is_autofs(&self) -> bool {
        self.fs_type == "autofs"
    }

    pub fn is_snap(&self) -> bool {
        self.fs_type == "squashfs" && self.mount_point.starts_with("/snap")
    }
}

/// Prefixes that are never worth crossing into even with `cross_filesystems`
/// set, recovered from `SystemFileChecker`'s usage rather than
/// `MountPoints.h` literally (§4.4).
pub const SYSTEM_MOUNT_PREFIXES: &[&str] = &["/dev", "/proc", "/sys", "/run"];

pub fn is_system_mount(path: &Path) -> bool {
    let s = path.to_string_lossy();
    SYSTEM_MOUNT_PREFIXES.iter().any(|p| s == *p || s.starts_with(&format!("{p}/")))
}

pub trait MountPointTable {
    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Looks up the most specific mount entry covering `path`, i.e. the
    /// longest `mount_point` that is a prefix of `path`.
    fn find(&self, path: &Path) -> Option<MountPointInfo> {
        let path_str = path.to_string_lossy();
        self.mount_points()
            .into_iter()
            .filter(|m| {
                let mp = m.mount_point.to_string_lossy();
                path_str == mp || path_str.starts_with(&format!("{mp}/")) || mp == "/"
            })
            .max_by_key(|m| m.mount_point.as_os_str().len())
    }
}

/// Decides whether a read job should be enqueued for a subdirectory that is
/// itself a mount point (§4.4, "Filesystem crossing"): only when
/// `cross_filesystems` is set and the mount is not a system, bind, or
/// network mount.
pub fn should_cross(mount: &MountPointInfo, cross_filesystems: bool) -> bool {
    cross_filesystems
        && !is_system_mount(&mount.mount_point)
        && !mount.is_bind_mount
        && !mount.is_network()
        && !mount.is_autofs()
}

/// `/proc/mounts`-backed table, the default `MountPointTable` (§6.2): reads
/// the kernel's live mount table rather than shelling out to `mount(8)`.
pub struct ProcMountsTable {
    path: PathBuf,
}

impl ProcMountsTable {
    pub fn new() -> Self {
        ProcMountsTable { path: PathBuf::from("/proc/mounts") }
    }

    pub fn with_path(path: PathBuf) -> Self {
        ProcMountsTable { path }
    }

    fn parse(contents: &str) -> Vec<MountPointInfo> {
        let mut out = Vec::new();
        for line in contents.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                continue;
            }
            let device = unescape_octal(fields[0]);
            let mount_point = unescape_octal(fields[1]);
            let fs_type = fields[2].to_string();
            let opts = fields[3];
            let is_bind_mount = opts.split(',').any(|o| o == "bind")
                || out.iter().any(|m: &MountPointInfo| {
                    m.device == device && mount_point.starts_with(&format!("{}/", m.mount_point.display()))
                });
            out.push(MountPointInfo { mount_point: PathBuf::from(mount_point), device, fs_type, is_bind_mount });
        }
        out
    }
}

fn unescape_octal(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(|b| b.is_ascii_digit()) {
            if let Ok(v) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap(), 8) {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

impl Default for ProcMountsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountPointTable for ProcMountsTable {
    fn mount_points(&self) -> Vec<MountPointInfo> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) => {
                log::debug!("could not read mount table {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proc_mounts_format() {
        let sample = "/dev/sda1 / ext4 rw,relatime 0 0\n\
                       /dev/sda2 /home ext4 rw,relatime 0 0\n\
                       server:/export /mnt/nfs nfs rw 0 0\n";
        let mounts = ProcMountsTable::parse(sample);
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[1].mount_point, PathBuf::from("/home"));
        assert!(mounts[2].is_network());
    }

    #[test]
    fn system_mount_prefixes_are_detected() {
        assert!(is_system_mount(Path::new("/proc/self")));
        assert!(is_system_mount(Path::new("/dev")));
        assert!(!is_system_mount(Path::new("/home/user")));
    }

    #[test]
    fn should_cross_rejects_system_and_network_mounts() {
        let network = MountPointInfo {
            mount_point: PathBuf::from("/mnt/nfs"),
            device: "server:/export".into(),
            fs_type: "nfs".into(),
            is_bind_mount: false,
        };
        assert!(!should_cross(&network, true));

        let data = MountPointInfo {
            mount_point: PathBuf::from("/data"),
            device: "/dev/sdb1".into(),
            fs_type: "ext4".into(),
            is_bind_mount: false,
        };
        assert!(should_cross(&data, true));
        assert!(!should_cross(&data, false));
    }
}
