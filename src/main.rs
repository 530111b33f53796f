use std::process::ExitCode;

use anyhow::Result;
use nvidia_oc_setup::{
    arg_parser::ArgsOptions,
    command::SystemRunner,
    config::Config,
    console::{Console, OutputStyle},
    dependency,
    dispatch::{self, RunEnd},
    gpu_devices::DeviceLister,
    logger, privilege,
    service_manager::Systemd,
    setup::Setup,
    unit_template,
};
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// Conventional status for a run ended by SIGINT
const INTERRUPTED_EXIT: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    logger::init_logging();

    // Root is needed for everything else, this either returns as root,
    // replaces the process or fails
    if let Err(err) = privilege::ensure_root() {
        error!("{err}");
        return ExitCode::FAILURE;
    }

    // Parse the command line arguments
    let args_options = match ArgsOptions::parse() {
        Ok(options) => options,
        Err(exit) => return ExitCode::from(exit.code() as u8),
    };

    match run(args_options).await {
        Ok(RunEnd::Finished) => ExitCode::SUCCESS,
        Ok(RunEnd::Interrupted) => {
            info!("Interrupted");

            // A pending terminal read would keep the runtime from shutting down
            std::process::exit(INTERRUPTED_EXIT);
        }
        Err(err) => {
            for e in err.chain() {
                error!("{e}");
            }

            ExitCode::FAILURE
        }
    }
}

async fn run(args_options: ArgsOptions) -> Result<RunEnd> {
    let config = Config::load(args_options.config_file_path.as_deref())?;
    let style = OutputStyle::detect(config.color);

    let services = Systemd::connect().await?;
    unit_template::install(&config, &services).await?;

    let account = dependency::invoking_account(
        std::env::var("SUDO_USER").ok(),
        std::env::var("USER").ok(),
    );
    dependency::ensure_installed(&config, &SystemRunner, &account).await?;

    // This token is cancelled on Ctrl-C to end the run cleanly
    let token = CancellationToken::new();
    {
        let token = token.clone();

        tokio::spawn(async move {
            if ctrl_c().await.is_ok() {
                token.cancel();
            }
        });
    }

    let setup = Setup::new(config, SystemRunner, services, DeviceLister::new());
    let mut console = Console::stdio(style);

    dispatch::run(&setup, &mut console, &args_options, &token).await
}
