use anyhow::{Context, Result};
use tracing::{debug, trace};
use zbus::{Connection, proxy, zvariant::OwnedObjectPath};

// Operations needed from the host service manager
#[allow(async_fn_in_trait)]
pub trait ServiceManager {
    // Reload the unit definitions from disk
    async fn reload(&self) -> Result<()>;

    // Enable the unit and (re)start it
    async fn enable_and_restart(&self, unit: &str) -> Result<()>;

    // Return true if the unit is currently active
    async fn is_active(&self, unit: &str) -> Result<bool>;
}

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait Manager {
    fn reload(&self) -> zbus::Result<()>;

    fn enable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> zbus::Result<(bool, Vec<(String, String, String)>)>;

    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1"
)]
trait Unit {
    #[zbus(property)]
    fn active_state(&self) -> zbus::Result<String>;
}

// systemd driven over the system D-Bus
pub struct Systemd {
    connection: Connection,
}

impl Systemd {
    // Connect to the system bus
    pub async fn connect() -> Result<Self> {
        let connection = Connection::system()
            .await
            .context("Failed to establish connection with the system bus")?;

        trace!("DBus connection established");

        Ok(Self { connection })
    }

    async fn manager(&self) -> Result<ManagerProxy<'_>> {
        ManagerProxy::new(&self.connection)
            .await
            .context("Failed to create the systemd manager proxy")
    }
}

impl ServiceManager for Systemd {
    async fn reload(&self) -> Result<()> {
        self.manager()
            .await?
            .reload()
            .await
            .context("Failed to reload systemd unit files")?;

        debug!("systemd units reloaded");
        Ok(())
    }

    async fn enable_and_restart(&self, unit: &str) -> Result<()> {
        let manager = self.manager().await?;

        let (_, changes) = manager
            .enable_unit_files(&[unit], false, true)
            .await
            .with_context(|| format!("Failed to enable \"{unit}\""))?;
        trace!("Enable changes for {unit}: {changes:?}");

        // Pick up the symlinks created by the enable call
        manager.reload().await.context("Failed to reload systemd unit files")?;

        let job = manager
            .restart_unit(unit, "replace")
            .await
            .with_context(|| format!("Failed to restart \"{unit}\""))?;
        debug!("Restart of {unit} queued as {}", job.as_str());

        Ok(())
    }

    async fn is_active(&self, unit: &str) -> Result<bool> {
        let path = self
            .manager()
            .await?
            .load_unit(unit)
            .await
            .with_context(|| format!("Failed to load \"{unit}\""))?;

        let unit_proxy = UnitProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await
            .with_context(|| format!("Failed to create the proxy for \"{unit}\""))?;

        let state = unit_proxy
            .active_state()
            .await
            .with_context(|| format!("Failed to query the state of \"{unit}\""))?;

        trace!("{unit} is {state}");
        Ok(state == "active")
    }
}
