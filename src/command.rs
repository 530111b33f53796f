use std::{
    env,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, trace};

// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    // None when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

// Execution of external programs, mocked in tests so no
// real system binary is ever invoked
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    // Return true if the program resolves on the execution path
    fn exists(&self, program: &str) -> bool;

    // Run the program and capture its output
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    // Run the program attached to the terminal and return its exit code
    async fn status(&self, program: &str, args: &[String]) -> Result<Option<i32>>;
}

// Runs programs for real through tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn exists(&self, program: &str) -> bool {
        find_in_path(program).is_some()
    }

    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        trace!("Running {program} {args:?}");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute \"{program}\""))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn status(&self, program: &str, args: &[String]) -> Result<Option<i32>> {
        debug!("Running {program} {args:?}");

        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .with_context(|| format!("Failed to execute \"{program}\""))?;

        Ok(status.code())
    }
}

// Resolve a program name against PATH, names containing
// a slash are checked as given
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return is_executable(path).then(|| path.to_path_buf());
    }

    let paths = env::var_os("PATH")?;

    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn finds_common_shell() {
        assert!(find_in_path("sh").is_some());
    }

    #[test]
    fn missing_program_is_none() {
        assert!(find_in_path("definitely-not-a-real-binary-4242").is_none());
    }

    #[test]
    fn explicit_path_needs_exec_bit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tool");
        fs::write(&file, "#!/bin/sh\n").unwrap();

        let name = file.to_str().unwrap();
        assert!(find_in_path(name).is_none());

        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_in_path(name), Some(file.clone()));
    }

    #[tokio::test]
    async fn system_runner_captures_output() {
        let output = SystemRunner
            .output("sh", &["-c".to_string(), "echo hi; exit 3".to_string()])
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "hi\n");
        assert!(!output.success());
    }
}
