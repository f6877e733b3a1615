//! Controller settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{FleetError, FleetResult};

/// Executable name of the engine's per-instance worker process
pub const DEFAULT_WORKER_PROCESS_NAME: &str = "Siemens.Simatic.Simulation.Runtime.Instance.x64";

/// Operator preferences for the fleet controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Process name used to discover worker processes
    pub worker_process_name: String,
    /// Core the round-robin pinning starts from
    pub first_affinity_core: usize,
    /// Ask the confirmation gate before bulk or destructive commands
    pub confirm_bulk_actions: bool,
    /// Enable debug logging
    pub debug_logging: bool,
    /// Use this core count instead of the one reported by the OS
    pub core_count_override: Option<usize>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            worker_process_name: DEFAULT_WORKER_PROCESS_NAME.to_string(),
            first_affinity_core: 1,
            confirm_bulk_actions: true,
            debug_logging: false,
            core_count_override: None,
        }
    }
}

impl FleetSettings {
    /// Default location of the settings file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("PLCsimFleet")
            .join("settings.json")
    }

    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> FleetResult<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Settings(format!("Failed to read {:?}: {}", path, e)))?;
        let mut settings: Self = serde_json::from_str(&raw)
            .map_err(|e| FleetError::Settings(format!("Failed to parse {:?}: {}", path, e)))?;
        settings.validate();

        info!("Settings loaded from {:?}", path);
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> FleetResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FleetError::Settings(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }

        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| FleetError::Settings(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, raw)
            .map_err(|e| FleetError::Settings(format!("Failed to write {:?}: {}", path, e)))?;

        debug!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        if self.worker_process_name.trim().is_empty() {
            self.worker_process_name = DEFAULT_WORKER_PROCESS_NAME.to_string();
        }
        if self.core_count_override == Some(0) {
            self.core_count_override = None;
        }
    }

    /// Filter directive for the tracing subscriber
    pub fn log_filter(&self) -> &'static str {
        if self.debug_logging {
            "plcsim_fleet=debug"
        } else {
            "plcsim_fleet=info"
        }
    }
}
