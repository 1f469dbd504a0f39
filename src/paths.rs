//! Sessions directory resolution and session-name validation.
//!
//! `$ZMX_DIR`, else `$XDG_RUNTIME_DIR/zmx`, else `$TMPDIR/zmx-{uid}`, else
//! `/tmp/zmx-{uid}`. Mode 0700. `logs/` is a sibling of the socket files,
//! not nested under them.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Resolve the sessions directory, creating it (mode 0700) if absent.
pub fn sessions_dir() -> Result<PathBuf, ConfigError> {
    let dir = sessions_dir_path();
    ensure_dir(&dir)?;
    Ok(dir)
}

fn sessions_dir_path() -> PathBuf {
    if let Ok(dir) = std::env::var("ZMX_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return Path::new(&runtime).join("zmx");
    }
    let uid = nix::unistd::Uid::current();
    if let Ok(tmp) = std::env::var("TMPDIR") {
        return Path::new(&tmp).join(format!("zmx-{uid}"));
    }
    PathBuf::from(format!("/tmp/zmx-{uid}"))
}

/// Log directory, a sibling of the sessions directory's socket files.
pub fn logs_dir(sessions_dir: &Path) -> Result<PathBuf, ConfigError> {
    let dir = sessions_dir.join("logs");
    ensure_dir(&dir)?;
    Ok(dir)
}

fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::SessionsDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(|source| {
        ConfigError::SessionsDir {
            path: dir.to_path_buf(),
            source,
        }
    })?;
    Ok(())
}

pub fn socket_path(sessions_dir: &Path, name: &str) -> PathBuf {
    sessions_dir.join(name)
}

pub fn session_log_path(logs_dir: &Path, name: &str) -> PathBuf {
    logs_dir.join(format!("{name}.log"))
}

pub fn dispatcher_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("zmx.log")
}

/// A session name must be non-empty and a valid single path component
/// (no `/`, no NUL).
pub fn validate_session_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::InvalidName {
            name: name.to_string(),
            reason: "must not be empty",
        });
    }
    if name.contains('/') {
        return Err(ConfigError::InvalidName {
            name: name.to_string(),
            reason: "must not contain '/'",
        });
    }
    if name.contains('\0') {
        return Err(ConfigError::InvalidName {
            name: name.to_string(),
            reason: "must not contain NUL",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_slashed_names() {
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("a/b").is_err());
        assert!(validate_session_name("demo").is_ok());
    }

    #[test]
    fn sessions_dir_honors_zmx_dir_override() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("ZMX_DIR", tmp.path());
        let dir = sessions_dir().unwrap();
        assert_eq!(dir, tmp.path());
        std::env::remove_var("ZMX_DIR");
    }
}
