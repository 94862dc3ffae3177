// File: agent/src/services/commands.rs
use anyhow::{anyhow, Result};
use glob::glob;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

pub async fn execute_shell_command(command: &str) -> Result<String> {
    debug!("Executing command: {}", command);

    let output = AsyncCommand::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if output.status.success() {
        Ok(stdout)
    } else {
        let error_msg = if !stderr.is_empty() { stderr } else { stdout };
        Err(anyhow!("Command failed: {}", error_msg))
    }
}

/// Starts a long-running process (application server startup script) and
/// returns without waiting for it.
pub async fn spawn_detached(command: &str) -> Result<u32> {
    info!("Launching detached command: {}", command);

    let child = AsyncCommand::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn '{}': {}", command, e))?;

    child
        .id()
        .ok_or_else(|| anyhow!("Process '{}' exited before it could be tracked", command))
}

/// Empties every directory matching the glob patterns; the directories
/// themselves are kept. Returns the number of purged directories.
pub async fn purge_directories(patterns: &[String]) -> Result<usize> {
    let mut purged = 0;

    for pattern in patterns {
        let entries = glob(pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))?;
        for entry in entries {
            let dir = match entry {
                Ok(path) if path.is_dir() => path,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping unreadable cache entry: {}", e);
                    continue;
                }
            };

            let mut children = tokio::fs::read_dir(&dir).await?;
            while let Some(child) = children.next_entry().await? {
                let path = child.path();
                if child.file_type().await?.is_dir() {
                    tokio::fs::remove_dir_all(&path).await?;
                } else {
                    tokio::fs::remove_file(&path).await?;
                }
            }
            info!("Cache directory purged: {}", dir.display());
            purged += 1;
        }
    }

    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reports_failing_command_output() {
        assert_eq!(execute_shell_command("printf ok").await.unwrap(), "ok");

        let err = execute_shell_command("echo broken >&2; exit 3").await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn purges_matching_directories_but_keeps_them() {
        let dir = TempDir::new().unwrap();
        for name in ["work-1", "work-2"] {
            let d = dir.path().join(name);
            std::fs::create_dir_all(d.join("nested")).unwrap();
            std::fs::write(d.join("file.tmp"), "x").unwrap();
        }

        let pattern = format!("{}/work-*", dir.path().display());
        assert_eq!(purge_directories(&[pattern]).await.unwrap(), 2);

        assert!(dir.path().join("work-1").is_dir());
        assert_eq!(std::fs::read_dir(dir.path().join("work-1")).unwrap().count(), 0);
    }
}
