use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, trace};

// Tool configuration, every key is optional in the Json file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    // Path of the generated systemd template unit
    pub unit_path: PathBuf,
    // Template unit prefix, instances are "<unit_name>@<index>.service"
    pub unit_name: String,
    // Directory holding the per device parameter files
    pub params_dir: PathBuf,

    // Overclocking binary and the package providing it
    pub oc_binary: String,
    pub oc_package: String,
    // Package helpers in order of preference
    pub package_helpers: Vec<String>,

    // Seconds to wait after a restart before checking the instance
    pub settle_delay_secs: u64,
    // Value of RestartSec in the generated unit
    pub restart_delay_secs: u64,

    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit_path: PathBuf::from("/etc/systemd/system/nvidia-oc@.service"),
            unit_name: "nvidia-oc".to_string(),
            params_dir: PathBuf::from("/etc/nvidia-oc"),
            oc_binary: "nvidia_oc".to_string(),
            oc_package: "nvidia_oc".to_string(),
            package_helpers: vec!["paru".to_string(), "yay".to_string()],
            settle_delay_secs: 2,
            restart_delay_secs: 5,
            color: true,
        }
    }
}

impl Config {
    // Load the configuration file, or the defaults if no path was given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        let file = File::open(path).with_context(|| {
            format!("Failed to open configuration file \"{}\"", path.display())
        })?;

        let config: Config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| {
                format!("Failed to parse configuration file \"{}\"", path.display())
            })?;

        trace!("Loaded configuration: {:?}", config);

        Ok(config)
    }

    // Name of the service instance driving the given device
    pub fn instance_name(&self, index: u32) -> String {
        format!("{}@{}.service", self.unit_name, index)
    }

    // Parameter file path for the given device
    pub fn params_path(&self, index: u32) -> PathBuf {
        self.params_dir.join(format!("gpu{index}.conf"))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}
