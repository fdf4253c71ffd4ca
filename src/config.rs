use crate::core::detect::DetectionMode;
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Packet-filter binary; `FWCONVERGE_IPTABLES_COMMAND` takes precedence
    #[serde(default = "default_iptables_command")]
    pub iptables_command: PathBuf,
    /// How live rules are matched against compiled rules
    #[serde(default)]
    pub detection: DetectionMode,
    /// Record every mutation in the audit log
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            iptables_command: default_iptables_command(),
            detection: DetectionMode::default(),
            audit_log: true,
        }
    }
}

fn default_iptables_command() -> PathBuf {
    PathBuf::from("iptables")
}

fn default_true() -> bool {
    true
}

/// Default config location: `<config dir>/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Loads the config from `path`, or the default location when `None`.
///
/// A missing or unparsable file yields the defaults.
pub fn load_config(path: Option<&Path>) -> AppConfig {
    let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        return AppConfig::default();
    };

    match std::fs::read_to_string(&path) {
        Ok(json) => match serde_json::from_str::<AppConfig>(&json) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring invalid config {}: {e}", path.display());
                AppConfig::default()
            }
        },
        Err(e) => {
            debug!("No config at {}: {e}", path.display());
            AppConfig::default()
        }
    }
}
