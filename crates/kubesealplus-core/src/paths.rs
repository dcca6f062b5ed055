//! Standard paths used by kubesealplus

use std::path::PathBuf;

/// Name of the per-user configuration directory under `$HOME`
pub const CONFIG_DIR_NAME: &str = ".kubesealplus";

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Standard kubesealplus paths
pub struct Paths {
    /// Config directory (~/.kubesealplus)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(CONFIG_DIR_NAME);

        Self { config }
    }

    /// Get the path of a file inside the config directory
    ///
    /// An empty name resolves to the default `config.yaml`.
    pub fn config_file(&self, name: &str) -> PathBuf {
        let name = if name.is_empty() { CONFIG_FILE_NAME } else { name };
        self.config.join(name)
    }
}
