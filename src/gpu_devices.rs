use anyhow::{Context, Result, anyhow};
use nvml_wrapper::Nvml;
use tracing::{debug, info, warn};

use crate::command::CommandRunner;

const SMI: &str = "nvidia-smi";

// Live summary of a GPU shown in the selection menu
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub index: u32,
    pub name: String,

    // Power usage and power limit, in watts
    pub power_draw: Option<f64>,
    pub power_limit: Option<f64>,
}

impl DeviceStatus {
    // One menu line, unknown readings are shown as "N/A"
    pub fn summary(&self) -> String {
        let watts = |v: Option<f64>| match v {
            Some(w) => format!("{w:.1} W"),
            None => "N/A".to_string(),
        };

        format!(
            "[{}] {}  power: {} / {}",
            self.index,
            self.name,
            watts(self.power_draw),
            watts(self.power_limit)
        )
    }
}

// Lists the GPUs visible on the system, through NVML when the library
// can be loaded and through nvidia-smi otherwise
pub struct DeviceLister {
    // NVML is optional, hosts without the library still get a listing
    nvml: Option<Nvml>,
}

impl DeviceLister {
    pub fn new() -> Self {
        // Attempt to initialize NVML
        let nvml = match Nvml::init() {
            Ok(nvml) => {
                info!("NVML successfully initialized");
                Some(nvml)
            }
            Err(e) => {
                debug!("NVML unavailable, falling back to {SMI}: {e}");
                None
            }
        };

        Self { nvml }
    }

    pub fn without_nvml() -> Self {
        Self { nvml: None }
    }

    pub async fn list<R: CommandRunner>(&self, runner: &R) -> Result<Vec<DeviceStatus>> {
        if let Some(nvml) = &self.nvml {
            match list_nvml(nvml) {
                Ok(devices) => return Ok(devices),
                Err(e) => {
                    warn!("NVML listing failed, falling back to {SMI}: {e}");
                }
            }
        }

        list_smi(runner).await
    }
}

impl Default for DeviceLister {
    fn default() -> Self {
        Self::new()
    }
}

fn list_nvml(nvml: &Nvml) -> Result<Vec<DeviceStatus>> {
    let count = nvml.device_count().context("Failed to count NVML devices")?;
    let mut devices = Vec::with_capacity(count as usize);

    for index in 0..count {
        let device = nvml
            .device_by_index(index)
            .with_context(|| format!("Failed to retrieve GPU device {index}"))?;

        // NVML reports milliwatts
        devices.push(DeviceStatus {
            index,
            name: device.name().unwrap_or_else(|_| "Unknown GPU".to_string()),
            power_draw: device.power_usage().ok().map(|mw| mw as f64 / 1000.),
            power_limit: device
                .enforced_power_limit()
                .ok()
                .map(|mw| mw as f64 / 1000.),
        });
    }

    Ok(devices)
}

async fn list_smi<R: CommandRunner>(runner: &R) -> Result<Vec<DeviceStatus>> {
    let args = [
        "--query-gpu=index,name,power.draw,power.limit".to_string(),
        "--format=csv,noheader,nounits".to_string(),
    ];

    let output = runner.output(SMI, &args).await?;

    if !output.success() {
        return Err(anyhow!("{SMI} failed: {}", output.stderr.trim()));
    }

    parse_smi(&output.stdout)
}

// Parse "index, name, draw, limit" csv lines
fn parse_smi(text: &str) -> Result<Vec<DeviceStatus>> {
    let reading = |v: &str| v.trim().parse::<f64>().ok();

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();

            // The name itself never contains commas, but be strict anyway
            let [index, name, draw, limit] = fields[..] else {
                return Err(anyhow!("Unexpected {SMI} line: \"{line}\""));
            };

            Ok(DeviceStatus {
                index: index
                    .parse()
                    .with_context(|| format!("Invalid GPU index \"{index}\""))?,
                name: name.to_string(),
                power_draw: reading(draw),
                power_limit: reading(limit),
            })
        })
        .collect()
}
