//! Runtime tunables.
//!
//! The external interface (§6.2) is fully specified by environment
//! variables — there is no user-facing config file. This module only
//! resolves the handful of internal caps the spec's Open Questions leave
//! to the implementer (write-buffer backlog, default PTY geometry, probe
//! deadline), with the same env-var-then-file-then-default precedence the
//! rest of this lineage uses, scaled down to what's actually needed. The
//! frame length cap (`protocol::codec::MAX_PAYLOAD_LEN`) is a protocol
//! constant, not a per-deployment tunable, and is not configured here.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Tunables {
    /// Soft cap on a client's outbound `write_buf`, in bytes, before the
    /// client is dropped as unable to keep up (§9 Open Question).
    #[serde(default = "default_client_write_buf_cap")]
    pub client_write_buf_cap: usize,

    /// Fallback PTY size when no client has reported one yet (§4.5).
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    #[serde(default = "default_cols")]
    pub default_cols: u16,

    /// Probe readiness deadline in milliseconds (§4.8, §5).
    #[serde(default = "default_probe_deadline_ms")]
    pub probe_deadline_ms: u64,
}

fn default_client_write_buf_cap() -> usize {
    8 * 1024 * 1024
}
fn default_rows() -> u16 {
    24
}
fn default_cols() -> u16 {
    80
}
fn default_probe_deadline_ms() -> u64 {
    1000
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            client_write_buf_cap: default_client_write_buf_cap(),
            default_rows: default_rows(),
            default_cols: default_cols(),
            probe_deadline_ms: default_probe_deadline_ms(),
        }
    }
}

impl Tunables {
    /// Load tunables: optional `{sessions_dir}/zmx.toml`, falling back to
    /// compiled defaults. No environment-variable override currently
    /// exists for these internal caps; `ZMX_DIR` et al. govern paths, not
    /// tunables.
    pub fn load(sessions_dir: &Path) -> Self {
        let path = sessions_dir.join("zmx.toml");
        if let Ok(content) = std::fs::read_to_string(&path) {
            match toml::from_str(&content) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring malformed zmx.toml");
                }
            }
        }
        Tunables::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults_without_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let t = Tunables::load(tmp.path());
        assert_eq!(t.default_rows, 24);
        assert_eq!(t.default_cols, 80);
    }

    #[test]
    fn reads_overrides_from_zmx_toml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("zmx.toml"), "default_rows = 40\n").unwrap();
        let t = Tunables::load(tmp.path());
        assert_eq!(t.default_rows, 40);
        assert_eq!(t.default_cols, 80);
    }
}
