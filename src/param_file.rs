use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

pub const CORE_OFFSET_KEY: &str = "NV_CORE_OFFSET";
pub const MEM_OFFSET_KEY: &str = "NV_MEM_OFFSET";
pub const POWER_LIMIT_KEY: &str = "NV_POWER_LIMIT";

type Result<T> = std::result::Result<T, ParamFileError>;

#[derive(Debug, Error)]
pub enum ParamFileError {
    #[error("Failed to access parameter file \"{path}\"")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Malformed parameter file \"{path}\"")]
    Parse {
        path: PathBuf,
        #[source]
        error: dotenvy::Error,
    },
    #[error("Invalid value \"{value}\" for {key} in \"{path}\"")]
    InvalidValue {
        path: PathBuf,
        key: String,
        value: String,
    },
    #[error("Missing {key} in \"{path}\"")]
    MissingKey { path: PathBuf, key: &'static str },
}

// Resolved overclocking parameters of one device
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OcParams {
    // Clock offsets in MHz
    pub core_offset: i32,
    pub mem_offset: i32,
    // Power limit in milliwatts
    pub power_limit_mw: u32,
}

impl OcParams {
    // Render as an environment file consumed by the service unit
    pub fn render(&self) -> String {
        format!(
            "{CORE_OFFSET_KEY}={}\n{MEM_OFFSET_KEY}={}\n{POWER_LIMIT_KEY}={}\n",
            self.core_offset, self.mem_offset, self.power_limit_mw
        )
    }

    // Parse an environment file held in memory
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        Self::from_pairs(path, dotenvy::from_read_iter(text.as_bytes()))
    }

    // Map the KEY=VALUE pairs read by dotenvy, unknown keys are ignored
    fn from_pairs<I>(path: &Path, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = dotenvy::Result<(String, String)>>,
    {
        let mut core = None;
        let mut mem = None;
        let mut power = None;

        for pair in pairs {
            let (key, value) = pair.map_err(|error| ParamFileError::Parse {
                path: path.to_path_buf(),
                error,
            })?;

            let invalid = || ParamFileError::InvalidValue {
                path: path.to_path_buf(),
                key: key.clone(),
                value: value.clone(),
            };

            match key.as_str() {
                CORE_OFFSET_KEY => core = Some(value.parse().map_err(|_| invalid())?),
                MEM_OFFSET_KEY => mem = Some(value.parse().map_err(|_| invalid())?),
                POWER_LIMIT_KEY => power = Some(value.parse().map_err(|_| invalid())?),
                _ => debug!("Unknown key {key} in {}", path.display()),
            }
        }

        let missing = |key| ParamFileError::MissingKey {
            path: path.to_path_buf(),
            key,
        };

        Ok(Self {
            core_offset: core.ok_or_else(|| missing(CORE_OFFSET_KEY))?,
            mem_offset: mem.ok_or_else(|| missing(MEM_OFFSET_KEY))?,
            power_limit_mw: power.ok_or_else(|| missing(POWER_LIMIT_KEY))?,
        })
    }
}

// Read the parameters persisted at path, None if the file doesn't exist
pub fn load(path: &Path) -> Result<Option<OcParams>> {
    match dotenvy::from_path_iter(path) {
        Ok(pairs) => OcParams::from_pairs(path, pairs).map(Some),
        Err(e) if e.not_found() => Ok(None),
        Err(dotenvy::Error::Io(error)) => Err(ParamFileError::Io {
            path: path.to_path_buf(),
            error,
        }),
        Err(error) => Err(ParamFileError::Parse {
            path: path.to_path_buf(),
            error,
        }),
    }
}

// Overwrite the file at path, creating the parent directory if needed
pub fn store(path: &Path, params: &OcParams) -> Result<()> {
    let io_err = |error| ParamFileError::Io {
        path: path.to_path_buf(),
        error,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    fs::write(path, params.render()).map_err(io_err)?;
    debug!("Stored {:?} in {}", params, path.display());

    Ok(())
}
