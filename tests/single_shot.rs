use std::{cell::RefCell, fs, path::Path};

use anyhow::Result;
use nvidia_oc_setup::{
    arg_parser::ArgsOptions,
    command::{CommandOutput, CommandRunner},
    config::Config,
    console::{Console, OutputStyle},
    dependency,
    dispatch::{self, RunEnd},
    gpu_devices::DeviceLister,
    service_manager::ServiceManager,
    setup::Setup,
    unit_template,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingServices {
    calls: RefCell<Vec<String>>,
}

impl ServiceManager for RecordingServices {
    async fn reload(&self) -> Result<()> {
        self.calls.borrow_mut().push("reload".to_string());
        Ok(())
    }

    async fn enable_and_restart(&self, unit: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("enable+restart {unit}"));
        Ok(())
    }

    async fn is_active(&self, unit: &str) -> Result<bool> {
        self.calls.borrow_mut().push(format!("is-active {unit}"));
        Ok(true)
    }
}

// nvidia_oc is installed but its query fails
struct InstalledTool;

impl CommandRunner for InstalledTool {
    fn exists(&self, program: &str) -> bool {
        program == "nvidia_oc"
    }

    async fn output(&self, _program: &str, _args: &[String]) -> Result<CommandOutput> {
        Ok(CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "no permission".to_string(),
        })
    }

    async fn status(&self, program: &str, _args: &[String]) -> Result<Option<i32>> {
        panic!("nothing should be installed, got {program}");
    }
}

fn config_in(dir: &Path) -> Config {
    Config {
        unit_path: dir.join("systemd/nvidia-oc@.service"),
        params_dir: dir.join("nvidia-oc"),
        settle_delay_secs: 0,
        color: false,
        ..Config::default()
    }
}

fn parse(args: &[&str]) -> ArgsOptions {
    let mut argv = vec!["nvidia-oc-setup".to_string()];
    argv.extend(args.iter().map(|a| a.to_string()));

    ArgsOptions::parse_from(argv, &mut Vec::<u8>::new(), &mut Vec::<u8>::new()).unwrap()
}

#[tokio::test]
async fn full_flags_configure_one_device() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let options = parse(&["--index", "0", "--core", "100", "--mem", "200", "--power", "250", "-y"]);

    let services = RecordingServices::default();
    unit_template::install(&config, &services).await.unwrap();
    dependency::ensure_installed(&config, &InstalledTool, "root")
        .await
        .unwrap();

    let setup = Setup::new(config, InstalledTool, services, DeviceLister::without_nvml());
    let mut console = Console::new(&b""[..], Vec::new(), OutputStyle::default());

    let end = dispatch::run(&setup, &mut console, &options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(end, RunEnd::Finished);

    assert_eq!(
        fs::read_to_string(dir.path().join("nvidia-oc/gpu0.conf")).unwrap(),
        "NV_CORE_OFFSET=100\nNV_MEM_OFFSET=200\nNV_POWER_LIMIT=250000\n"
    );
    assert_eq!(
        *setup.services.calls.borrow(),
        vec![
            "reload",
            "enable+restart nvidia-oc@0.service",
            "is-active nvidia-oc@0.service"
        ]
    );

    let unit = fs::read_to_string(dir.path().join("systemd/nvidia-oc@.service")).unwrap();
    assert!(unit.contains(&format!(
        "EnvironmentFile={}\n",
        dir.path().join("nvidia-oc/gpu%i.conf").display()
    )));

    let output = String::from_utf8(console.into_output()).unwrap();
    assert!(output.contains("Current state: not accessible"));
    assert!(output.contains("nvidia-oc@0.service is active"));
}

#[tokio::test]
async fn yes_flag_does_not_matter_when_values_are_given() {
    let dir = tempfile::tempdir().unwrap();
    let options = parse(&["--index", "3", "--core=-50", "--mem", "0", "--power", "120"]);

    let setup = Setup::new(
        config_in(dir.path()),
        InstalledTool,
        RecordingServices::default(),
        DeviceLister::without_nvml(),
    );
    // Nothing to read, a prompt would fail the run
    let mut console = Console::new(&b""[..], Vec::new(), OutputStyle::default());

    let end = dispatch::run(&setup, &mut console, &options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, RunEnd::Finished);
    assert_eq!(
        fs::read_to_string(dir.path().join("nvidia-oc/gpu3.conf")).unwrap(),
        "NV_CORE_OFFSET=-50\nNV_MEM_OFFSET=0\nNV_POWER_LIMIT=120000\n"
    );
}
