use std::path::PathBuf;

use thiserror::Error;

use crate::param_file::ParamFileError;

// Fatal conditions of the setup flow, each one ends the process
// with a non-zero status
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Not running as root and no elevation mechanism (\"sudo\") was found")]
    NoElevation,
    #[error("Not running as root and elevation is disabled")]
    ElevationDisabled,
    #[error("Failed to re-execute through sudo: {0}")]
    Reexec(#[source] std::io::Error),

    #[error("\"{binary}\" is missing and none of the package helpers {helpers:?} is installed")]
    NoPackageHelper { binary: String, helpers: Vec<String> },
    #[error("Refusing to install \"{package}\" as root, run the tool through sudo from a regular account")]
    RootInstall { package: String },
    #[error("Package helper \"{helper}\" failed with status {status}")]
    InstallFailed { helper: String, status: i32 },

    #[error("Power limit of {0} W is out of range")]
    PowerOutOfRange(u32),
    #[error("Input closed while waiting for \"{0}\"")]
    InputClosed(String),

    #[error("Failed to write \"{path}\"")]
    Write {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error(transparent)]
    ParamFile(#[from] ParamFileError),
    #[error("Service manager error: {reason}")]
    ServiceManager {
        reason: String,
        #[source]
        error: anyhow::Error,
    },
}
