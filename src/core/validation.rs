use anyhow::{bail, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Startup check for the dump utility binary
pub async fn validate_dump_utility(path: &Path) -> Result<()> {
    debug!("Validating dump utility: {}", path.display());

    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => bail!("Dump utility not found at {}: {}", path.display(), e),
    };

    if !metadata.is_file() {
        bail!("Dump utility path is not a file: {}", path.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            warn!("Dump utility is not executable: {}", path.display());
        }
    }

    Ok(())
}
