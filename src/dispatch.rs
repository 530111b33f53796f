use std::io::Write;

use anyhow::Result;
use tokio::{io::AsyncBufRead, select};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    arg_parser::ArgsOptions,
    command::CommandRunner,
    console::Console,
    service_manager::ServiceManager,
    setup::{DeviceRequest, Setup},
};

const QUIT: &str = "q";

// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    // Single shot done or the operator quit the menu
    Finished,
    // The run was interrupted before finishing
    Interrupted,
}

// Pick the mode from the command line: an index means a single
// configuration pass, no index means the interactive menu
pub async fn run<R, S, I, W>(
    setup: &Setup<R, S>,
    console: &mut Console<I, W>,
    options: &ArgsOptions,
    token: &CancellationToken,
) -> Result<RunEnd>
where
    R: CommandRunner,
    S: ServiceManager,
    I: AsyncBufRead + Unpin,
    W: Write,
{
    match options.index {
        Some(index) => {
            // A fully specified command line is never interactive
            let all_values = options.core_offset.is_some()
                && options.mem_offset.is_some()
                && options.power_watts.is_some();

            let request = DeviceRequest {
                index,
                core_offset: options.core_offset,
                mem_offset: options.mem_offset,
                power_watts: options.power_watts,
                confirm: !options.yes && !all_values,
            };

            select! {
                biased;
                _ = token.cancelled() => Ok(RunEnd::Interrupted),
                outcome = setup.configure_device(console, &request) => {
                    info!("GPU {index}: {:?}", outcome?);
                    Ok(RunEnd::Finished)
                }
            }
        }
        None => menu(setup, console, token).await,
    }
}

// List the devices and configure the selected one until the operator quits
async fn menu<R, S, I, W>(
    setup: &Setup<R, S>,
    console: &mut Console<I, W>,
    token: &CancellationToken,
) -> Result<RunEnd>
where
    R: CommandRunner,
    S: ServiceManager,
    I: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        let end = select! {
            biased;
            _ = token.cancelled() => Some(RunEnd::Interrupted),
            end = menu_round(setup, console) => end?,
        };

        if let Some(end) = end {
            return Ok(end);
        }
    }
}

// One listing and selection, None means show the menu again
async fn menu_round<R, S, I, W>(
    setup: &Setup<R, S>,
    console: &mut Console<I, W>,
) -> Result<Option<RunEnd>>
where
    R: CommandRunner,
    S: ServiceManager,
    I: AsyncBufRead + Unpin,
    W: Write,
{
    show_devices(setup, console).await;

    let Some(answer) = console
        .prompt(&format!("GPU index to configure ({QUIT} to quit): "))
        .await?
    else {
        return Ok(Some(RunEnd::Finished));
    };

    if answer.is_empty() {
        return Ok(None);
    }

    if answer.eq_ignore_ascii_case(QUIT) {
        return Ok(Some(RunEnd::Finished));
    }

    let Ok(index) = answer.parse::<u32>() else {
        console.error(&format!("\"{answer}\" is not a GPU index"));
        return Ok(None);
    };

    let request = DeviceRequest {
        index,
        confirm: true,
        ..DeviceRequest::default()
    };

    // A failing device doesn't end the menu
    if let Err(e) = setup.configure_device(console, &request).await {
        error!("GPU {index}: {e:#}");
        console.error(&format!("Failed to configure GPU {index}: {e}"));
    }

    Ok(None)
}

async fn show_devices<R, S, I, W>(setup: &Setup<R, S>, console: &mut Console<I, W>)
where
    R: CommandRunner,
    S: ServiceManager,
    I: AsyncBufRead + Unpin,
    W: Write,
{
    let header = console.style().header("Available GPUs:");
    console.line(&header);

    match setup.list_devices().await {
        Ok(devices) if devices.is_empty() => console.warning("  no GPU found"),
        Ok(devices) => {
            for device in devices {
                console.line(&format!("  {}", device.summary()));
            }
        }
        Err(e) => {
            error!("Device listing failed: {e:#}");
            console.warning("  device list not accessible");
        }
    }
}
