use anyhow::{Result, anyhow};
use tracing::debug;

use crate::command::CommandRunner;

// Best effort read of the tunables the overclocking tool reports
// for a device. Any failure means the state is not accessible
pub async fn query_state<R: CommandRunner>(
    runner: &R,
    binary: &str,
    index: u32,
) -> Result<String> {
    if !runner.exists(binary) {
        return Err(anyhow!("\"{binary}\" is not installed"));
    }

    let args = ["get".to_string(), "--index".to_string(), index.to_string()];
    let output = runner.output(binary, &args).await?;

    if !output.success() {
        debug!("{binary} get failed: {}", output.stderr.trim());
        return Err(anyhow!(
            "\"{binary} get\" exited with {:?}",
            output.code
        ));
    }

    Ok(output.stdout.trim_end().to_string())
}
