use anyhow::Result;
use tracing::{info, warn};

use crate::{command::CommandRunner, config::Config, errors::SetupError};

const SUPERUSER: &str = "root";

// The account that invoked sudo, or the current one when not run
// through sudo. Empty values count as unset
pub fn invoking_account(sudo_user: Option<String>, user: Option<String>) -> String {
    sudo_user
        .filter(|u| !u.is_empty())
        .or(user.filter(|u| !u.is_empty()))
        .unwrap_or_else(|| SUPERUSER.to_string())
}

// Make sure the overclocking binary is available, installing it
// through the first package helper found if it is not
pub async fn ensure_installed<R: CommandRunner>(
    config: &Config,
    runner: &R,
    account: &str,
) -> Result<()> {
    if runner.exists(&config.oc_binary) {
        info!("Found \"{}\"", config.oc_binary);
        return Ok(());
    }

    warn!("\"{}\" not found, installing \"{}\"", config.oc_binary, config.oc_package);

    if account == SUPERUSER {
        return Err(SetupError::RootInstall {
            package: config.oc_package.clone(),
        }
        .into());
    }

    let helper = config
        .package_helpers
        .iter()
        .find(|h| runner.exists(h))
        .ok_or_else(|| SetupError::NoPackageHelper {
            binary: config.oc_binary.clone(),
            helpers: config.package_helpers.clone(),
        })?;

    info!("Installing \"{}\" with {helper} as {account}", config.oc_package);

    // AUR helpers refuse to run as root, drop back to the invoking account
    let args: Vec<String> = [
        "-u",
        account,
        helper.as_str(),
        "-S",
        "--needed",
        "--noconfirm",
        config.oc_package.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let code = runner.status("sudo", &args).await?;

    if code != Some(0) {
        return Err(SetupError::InstallFailed {
            helper: helper.clone(),
            status: code.unwrap_or(-1),
        }
        .into());
    }

    info!("Installed \"{}\"", config.oc_package);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashSet};

    use super::*;
    use crate::command::CommandOutput;

    struct FakeSystem {
        installed: HashSet<&'static str>,
        exit_code: i32,
        runs: RefCell<Vec<(String, Vec<String>)>>,
    }

    impl FakeSystem {
        fn with(installed: &[&'static str]) -> Self {
            Self {
                installed: installed.iter().copied().collect(),
                exit_code: 0,
                runs: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for FakeSystem {
        fn exists(&self, program: &str) -> bool {
            self.installed.contains(program)
        }

        async fn output(&self, _program: &str, _args: &[String]) -> Result<CommandOutput> {
            unreachable!()
        }

        async fn status(&self, program: &str, args: &[String]) -> Result<Option<i32>> {
            self.runs
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));
            Ok(Some(self.exit_code))
        }
    }

    fn error_of(result: Result<()>) -> SetupError {
        result.unwrap_err().downcast::<SetupError>().unwrap()
    }

    #[test]
    fn account_resolution_order() {
        let some = |s: &str| Some(s.to_string());

        assert_eq!(invoking_account(some("alice"), some("root")), "alice");
        assert_eq!(invoking_account(some(""), some("bob")), "bob");
        assert_eq!(invoking_account(None, None), "root");
    }

    #[tokio::test]
    async fn present_binary_needs_nothing() {
        let system = FakeSystem::with(&["nvidia_oc"]);

        ensure_installed(&Config::default(), &system, "root").await.unwrap();
        assert!(system.runs.borrow().is_empty());
    }

    #[tokio::test]
    async fn installs_with_first_available_helper() {
        let system = FakeSystem::with(&["yay", "paru"]);

        ensure_installed(&Config::default(), &system, "alice").await.unwrap();

        let runs = system.runs.borrow();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "sudo");
        assert_eq!(
            runs[0].1,
            vec!["-u", "alice", "paru", "-S", "--needed", "--noconfirm", "nvidia_oc"]
        );
    }

    #[tokio::test]
    async fn falls_back_to_later_helper() {
        let system = FakeSystem::with(&["yay"]);

        ensure_installed(&Config::default(), &system, "alice").await.unwrap();
        assert_eq!(system.runs.borrow()[0].1[2], "yay");
    }

    #[tokio::test]
    async fn root_account_is_refused() {
        let system = FakeSystem::with(&["paru"]);

        let err = error_of(ensure_installed(&Config::default(), &system, "root").await);
        assert!(matches!(err, SetupError::RootInstall { .. }));
        assert!(system.runs.borrow().is_empty());
    }

    #[tokio::test]
    async fn no_helper_is_fatal() {
        let system = FakeSystem::with(&[]);

        let err = error_of(ensure_installed(&Config::default(), &system, "alice").await);
        assert!(matches!(err, SetupError::NoPackageHelper { .. }));
    }

    #[tokio::test]
    async fn failed_install_reports_status() {
        let mut system = FakeSystem::with(&["paru"]);
        system.exit_code = 1;

        let err = error_of(ensure_installed(&Config::default(), &system, "alice").await);
        assert!(matches!(err, SetupError::InstallFailed { status: 1, .. }));
    }
}
