use std::{
    ffi::OsString,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{info, warn};

use crate::{command::find_in_path, errors::SetupError};

// When set, the guard aborts instead of re-executing through sudo
pub const NO_ELEVATE_ENV: &str = "NVIDIA_OC_SETUP_NO_ELEVATE";

const ELEVATOR: &str = "sudo";

// What the guard decided to do for the current process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elevation {
    // Already root, carry on
    Privileged,
    // Replace the process with the elevator running the same command line
    Reexec { elevator: PathBuf },
}

// Decide how to obtain root, independent of the running process
pub fn plan(
    euid: u32,
    elevation_disabled: bool,
    elevator: Option<PathBuf>,
) -> Result<Elevation, SetupError> {
    if euid == 0 {
        return Ok(Elevation::Privileged);
    }

    if elevation_disabled {
        return Err(SetupError::ElevationDisabled);
    }

    match elevator {
        Some(elevator) => Ok(Elevation::Reexec { elevator }),
        None => Err(SetupError::NoElevation),
    }
}

pub fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() }
}

// Make sure the process runs as root, re-executing the whole command
// line through sudo if it doesn't. Only returns when already root
pub fn ensure_root() -> Result<(), SetupError> {
    let elevation = plan(
        effective_uid(),
        std::env::var_os(NO_ELEVATE_ENV).is_some(),
        find_in_path(ELEVATOR),
    )?;

    match elevation {
        Elevation::Privileged => Ok(()),
        Elevation::Reexec { elevator } => {
            let args: Vec<OsString> = std::env::args_os().collect();
            info!("Not running as root, re-executing through {}", elevator.display());

            // exec only returns on failure
            let error = reexec_command(&elevator, &args).exec();
            warn!("Re-execution failed: {error}");

            Err(SetupError::Reexec(error))
        }
    }
}

// The current executable is used rather than argv[0] so the elevated
// process runs the same binary even if PATH differs under sudo
fn reexec_command(elevator: &Path, args: &[OsString]) -> Command {
    let program = std::env::current_exe()
        .map(OsString::from)
        .unwrap_or_else(|_| args.first().cloned().unwrap_or_default());

    let mut command = Command::new(elevator);
    command.arg(program).args(args.iter().skip(1));
    command
}
