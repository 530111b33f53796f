use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::{config::Config, errors::SetupError, service_manager::ServiceManager};

// Render the systemd template unit. The instance token %i appears in the
// description, the environment file path and the start command only
pub fn render(config: &Config) -> String {
    let env_file = config.params_dir.join("gpu%i.conf");

    format!(
        "[Unit]
Description=NVIDIA overclocking for GPU %i
Wants=nvidia-persistenced.service
After=nvidia-persistenced.service multi-user.target

[Service]
Type=simple
EnvironmentFile={env_file}
ExecStartPre=/bin/sleep 1
ExecStart={binary} set --index %i --power-limit ${{NV_POWER_LIMIT}} --freq-offset ${{NV_CORE_OFFSET}} --mem-offset ${{NV_MEM_OFFSET}}
Restart=always
RestartSec={restart_delay}

[Install]
WantedBy=multi-user.target
",
        env_file = env_file.display(),
        binary = config.oc_binary,
        restart_delay = config.restart_delay_secs,
    )
}

// Write the template unit, overwriting any previous content,
// then ask the service manager to reload its definitions
pub async fn install<S: ServiceManager>(config: &Config, services: &S) -> Result<()> {
    let path = &config.unit_path;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create \"{}\"", parent.display()))?;
    }

    fs::write(path, render(config)).map_err(|error| SetupError::Write {
        path: path.clone(),
        error,
    })?;

    info!("Installed service template {}", path.display());

    services
        .reload()
        .await
        .map_err(|error| SetupError::ServiceManager {
            reason: "Failed to reload unit definitions".to_string(),
            error,
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[derive(Default)]
    struct CountingServices {
        reloads: Cell<u32>,
    }

    impl ServiceManager for CountingServices {
        async fn reload(&self) -> Result<()> {
            self.reloads.set(self.reloads.get() + 1);
            Ok(())
        }

        async fn enable_and_restart(&self, _unit: &str) -> Result<()> {
            unreachable!()
        }

        async fn is_active(&self, _unit: &str) -> Result<bool> {
            unreachable!()
        }
    }

    #[test]
    fn instance_token_appears_three_times() {
        let text = render(&Config::default());

        assert_eq!(text.matches("%i").count(), 3);
        assert!(text.contains("Description=NVIDIA overclocking for GPU %i\n"));
        assert!(text.contains("EnvironmentFile=/etc/nvidia-oc/gpu%i.conf\n"));
        assert!(text.contains("ExecStart=nvidia_oc set --index %i --power-limit ${NV_POWER_LIMIT}"));
        assert!(text.contains("Restart=always\nRestartSec=5\n"));
    }

    #[tokio::test]
    async fn reinstall_is_identical_and_reloads_once_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            unit_path: dir.path().join("nvidia-oc@.service"),
            ..Config::default()
        };
        let services = CountingServices::default();

        fs::write(&config.unit_path, "stale").unwrap();

        install(&config, &services).await.unwrap();
        let first = fs::read(&config.unit_path).unwrap();
        assert_eq!(services.reloads.get(), 1);

        install(&config, &services).await.unwrap();
        let second = fs::read(&config.unit_path).unwrap();
        assert_eq!(services.reloads.get(), 2);

        assert_eq!(first, second);
        assert_eq!(first, render(&config).into_bytes());
    }
}
