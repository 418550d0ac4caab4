//! Host configuration.

use std::path::{Path, PathBuf};

/// Directory under the install path where the host keeps its state.
pub const STATE_DIR: &str = "splice";

/// Default file name of the persisted module order.
pub const ORDER_FILE: &str = "modules.order";

/// Default file name of the crash recovery marker.
pub const MARKER_FILE: &str = "recovery.marker";

/// Where the host lives and which target version it runs against.
///
/// # Example
/// ```ignore
/// let config = HostConfig::new("/opt/game")
///     .with_host_version(42)
///     .with_order_file("/var/lib/game/order");
/// ```
#[derive(Debug, Clone)]
pub struct HostConfig {
    install_path: PathBuf,
    host_version: u32,
    order_file: Option<PathBuf>,
    marker_file: Option<PathBuf>,
}

impl HostConfig {
    /// Configuration for a target installed at `install_path`.
    pub fn new(install_path: impl Into<PathBuf>) -> Self {
        Self {
            install_path: install_path.into(),
            host_version: 0,
            order_file: None,
            marker_file: None,
        }
    }

    /// Set the target version passed to module hook queries.
    pub fn with_host_version(mut self, version: u32) -> Self {
        self.host_version = version;
        self
    }

    /// Store the module order somewhere other than the default.
    pub fn with_order_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.order_file = Some(path.into());
        self
    }

    /// Store the recovery marker somewhere other than the default.
    pub fn with_marker_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.marker_file = Some(path.into());
        self
    }

    /// Root of the target install.
    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    /// Target version.
    pub fn host_version(&self) -> u32 {
        self.host_version
    }

    /// Directory holding host state.
    pub fn state_dir(&self) -> PathBuf {
        self.install_path.join(STATE_DIR)
    }

    /// Path of the persisted module order.
    pub fn order_file(&self) -> PathBuf {
        self.order_file
            .clone()
            .unwrap_or_else(|| self.state_dir().join(ORDER_FILE))
    }

    /// Path of the crash recovery marker.
    pub fn marker_file(&self) -> PathBuf {
        self.marker_file
            .clone()
            .unwrap_or_else(|| self.state_dir().join(MARKER_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_the_state_dir() {
        let config = HostConfig::new("/opt/game");
        assert_eq!(config.order_file(), Path::new("/opt/game/splice/modules.order"));
        assert_eq!(config.marker_file(), Path::new("/opt/game/splice/recovery.marker"));
        assert_eq!(config.host_version(), 0);
    }

    #[test]
    fn overrides_win() {
        let config = HostConfig::new("/opt/game")
            .with_host_version(7)
            .with_order_file("/tmp/order")
            .with_marker_file("/tmp/marker");
        assert_eq!(config.order_file(), Path::new("/tmp/order"));
        assert_eq!(config.marker_file(), Path::new("/tmp/marker"));
        assert_eq!(config.host_version(), 7);
    }
}
