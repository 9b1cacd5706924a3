//! Small helpers for log output and state-file housekeeping.

use std::fs;
use std::io;
use std::path::Path;

/// Truncate a string for logging purposes.
///
/// Used for response bodies that end up in warnings, such as a rejected
/// Telegram reply.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if it fits, otherwise the longest prefix of at most
/// `max` bytes that ends on a char boundary, with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("ééé", 3), "é…(+4 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Make sure the directory holding `state_path` exists.
///
/// Called before every state read and write so a first run against
/// `state/thingspeak.json` works without any setup.
///
/// # Arguments
///
/// * `state_path` - Path of the state file or database, not the directory
///
/// # Returns
///
/// `Ok(())` once the parent directory exists. A bare file name has no parent
/// to create and succeeds immediately.
pub fn ensure_state_dir(state_path: &Path) -> io::Result<()> {
    match state_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

/// Flush the directory entry of `state_path` so a rename is durable.
///
/// # Arguments
///
/// * `state_path` - The file that was just renamed into place
///
/// # Returns
///
/// The result of `fsync` on the parent directory. A no-op off unix.
#[cfg(unix)]
pub fn sync_dir(state_path: &Path) -> io::Result<()> {
    let dir = match state_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub fn sync_dir(_state_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("ééé", 3);
        assert_eq!(result, "é…(+4 bytes)");
    }

    #[test]
    fn test_ensure_state_dir_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/state.json");
        ensure_state_dir(&path).unwrap();
        assert!(dir.path().join("a/b").is_dir());
        ensure_state_dir(Path::new("state.json")).unwrap();
    }
}
