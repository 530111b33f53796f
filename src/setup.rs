use std::io::Write;

use anyhow::Result;
use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use crate::{
    command::CommandRunner,
    config::Config,
    console::Console,
    errors::SetupError,
    gpu_devices::{DeviceLister, DeviceStatus},
    oc_tool,
    param_file::{self, OcParams},
    service_manager::ServiceManager,
};

// Values requested for one device, None means ask the operator
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeviceRequest {
    pub index: u32,
    pub core_offset: Option<i32>,
    pub mem_offset: Option<i32>,
    pub power_watts: Option<u32>,

    // Ask before writing anything
    pub confirm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    // Parameters stored and the instance restarted
    Applied { params: OcParams, active: bool },
    // The operator did not confirm, nothing was changed
    Declined,
}

// Everything the configuration flow talks to
pub struct Setup<R, S> {
    pub config: Config,
    pub runner: R,
    pub services: S,
    pub lister: DeviceLister,
}

impl<R: CommandRunner, S: ServiceManager> Setup<R, S> {
    pub fn new(config: Config, runner: R, services: S, lister: DeviceLister) -> Self {
        Self {
            config,
            runner,
            services,
            lister,
        }
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceStatus>> {
        self.lister.list(&self.runner).await
    }

    // Configure a single device: show its state, resolve the parameters,
    // persist them and restart the instance driving it
    pub async fn configure_device<I, W>(
        &self,
        console: &mut Console<I, W>,
        request: &DeviceRequest,
    ) -> Result<Outcome>
    where
        I: AsyncBufRead + Unpin,
        W: Write,
    {
        let index = request.index;
        let params_path = self.config.params_path(index);
        let style = console.style();

        console.line(&style.header(&format!("== GPU {index} ==")));
        self.show_state(console, index);
        match oc_tool::query_state(&self.runner, &self.config.oc_binary, index).await {
            Ok(state) => console.line(&state),
            Err(e) => {
                debug!("State query failed: {e}");
                console.warning("Current state: not accessible");
            }
        }

        let core_offset = match request.core_offset {
            Some(v) => v,
            None => prompt_number(console, "Core clock offset (MHz)").await?,
        };
        let mem_offset = match request.mem_offset {
            Some(v) => v,
            None => prompt_number(console, "Memory clock offset (MHz)").await?,
        };
        let power_watts: u32 = match request.power_watts {
            Some(v) => v,
            None => prompt_number(console, "Power limit (W)").await?,
        };

        let params = OcParams {
            core_offset,
            mem_offset,
            power_limit_mw: watts_to_milliwatts(power_watts)?,
        };

        console.info(&format!(
            "Core offset: {} MHz, memory offset: {} MHz, power limit: {} mW",
            params.core_offset, params.mem_offset, params.power_limit_mw
        ));

        if request.confirm && !confirm(console).await? {
            info!("GPU {index}: configuration declined");
            console.line("Aborted, nothing was changed");
            return Ok(Outcome::Declined);
        }

        param_file::store(&params_path, &params).map_err(SetupError::from)?;
        info!("GPU {index}: parameters written to {}", params_path.display());

        let instance = self.config.instance_name(index);
        self.services
            .enable_and_restart(&instance)
            .await
            .map_err(|error| SetupError::ServiceManager {
                reason: format!("Failed to enable and restart {instance}"),
                error,
            })?;

        tokio::time::sleep(self.config.settle_delay()).await;

        let active = match self.services.is_active(&instance).await {
            Ok(active) => active,
            Err(e) => {
                warn!("Failed to query {instance}: {e:#}");
                false
            }
        };

        if active {
            console.success(&format!("{instance} is active"));
        } else {
            console.warning(&format!(
                "{instance} is not active, inspect it with \"systemctl status {instance}\" \
                 and \"journalctl -u {instance}\""
            ));
        }

        Ok(Outcome::Applied { params, active })
    }

    // Show the parameters stored by a previous run, if any
    fn show_state<I, W>(&self, console: &mut Console<I, W>, index: u32)
    where
        I: AsyncBufRead + Unpin,
        W: Write,
    {
        match param_file::load(&self.config.params_path(index)) {
            Ok(Some(p)) => console.line(&format!(
                "Stored: core {} MHz, memory {} MHz, power {} mW",
                p.core_offset, p.mem_offset, p.power_limit_mw
            )),
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }
    }
}

pub fn watts_to_milliwatts(watts: u32) -> Result<u32, SetupError> {
    watts
        .checked_mul(1000)
        .ok_or(SetupError::PowerOutOfRange(watts))
}

// Ask for a number until the answer parses, an empty answer means 0
async fn prompt_number<T, I, W>(console: &mut Console<I, W>, label: &str) -> Result<T>
where
    T: std::str::FromStr + Default,
    I: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        let Some(answer) = console.prompt(&format!("{label} [0]: ")).await? else {
            return Err(SetupError::InputClosed(label.to_string()).into());
        };

        if answer.is_empty() {
            return Ok(T::default());
        }

        match answer.parse() {
            Ok(v) => return Ok(v),
            Err(_) => console.error(&format!("\"{answer}\" is not a valid whole number")),
        }
    }
}

// Only an explicit y/Y confirms
async fn confirm<I, W>(console: &mut Console<I, W>) -> Result<bool>
where
    I: AsyncBufRead + Unpin,
    W: Write,
{
    let answer = console.prompt("Apply these settings? [y/N]: ").await?;
    Ok(matches!(answer.as_deref(), Some("y" | "Y")))
}
