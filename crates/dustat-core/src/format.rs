//! View-facing formatting helpers (§6.5, §10.3): symbolic/octal permissions,
//! user/group name lookup, and the compact size notation the cache writer
//! also uses (§4.7).

/// `rwxr-xr-x`-style symbolic permission string from a raw `st_mode`.
pub fn symbolic_permissions(mode: u32) -> String {
    let file_type = match mode & 0o170000 {
        0o040000 => 'd',
        0o120000 => 'l',
        0o060000 => 'b',
        0o020000 => 'c',
        0o010000 => 'p',
        0o140000 => 's',
        _ => '-',
    };
    let mut s = String::with_capacity(10);
    s.push(file_type);
    for (shift, chars) in [(6, ['r', 'w', 'x']), (3, ['r', 'w', 'x']), (0, ['r', 'w', 'x'])] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { chars[0] } else { '-' });
        s.push(if bits & 0o2 != 0 { chars[1] } else { '-' });
        s.push(if bits & 0o1 != 0 { chars[2] } else { '-' });
    }
    s
}

pub fn octal_permissions(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

/// Compact size notation (`NN`, `NNK`, `NNM`, `NNG`, `NNT`) used by both the
/// cache writer and the CLI's human-readable column: a unit suffix is used
/// only when the value divides it exactly (§4.7).
pub fn compact_size(bytes: u64) -> String {
    const UNITS: [(u64, char); 4] = [(1u64 << 40, 'T'), (1u64 << 30, 'G'), (1u64 << 20, 'M'), (1u64 << 10, 'K')];
    for (unit, suffix) in UNITS {
        if bytes != 0 && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    bytes.to_string()
}

/// Human-readable (not necessarily exact) size, always rendered with one
/// decimal place above 1 KiB, for terminal display.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(unix)]
pub fn user_name(uid: u32) -> Option<String> {
    unsafe {
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            return None;
        }
        let name = std::ffi::CStr::from_ptr((*pw).pw_name);
        Some(name.to_string_lossy().into_owned())
    }
}

#[cfg(not(unix))]
pub fn user_name(_uid: u32) -> Option<String> {
    None
}

#[cfg(unix)]
pub fn group_name(gid: u32) -> Option<String> {
    unsafe {
        let gr = libc::getgrgid(gid);
        if gr.is_null() {
            return None;
        }
        let name = std::ffi::CStr::from_ptr((*gr).gr_name);
        Some(name.to_string_lossy().into_owned())
    }
}

#[cfg(not(unix))]
pub fn group_name(_gid: u32) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbolic_permissions_regular_file() {
        assert_eq!(symbolic_permissions(0o100644), "-rw-r--r--");
    }

    #[test]
    fn symbolic_permissions_directory() {
        assert_eq!(symbolic_permissions(0o040755), "drwxr-xr-x");
    }

    #[test]
    fn compact_size_prefers_largest_exact_unit() {
        assert_eq!(compact_size(1024), "1K");
        assert_eq!(compact_size(1536), "1536");
        assert_eq!(compact_size(1 << 20), "1M");
        assert_eq!(compact_size(0), "0");
    }
}
