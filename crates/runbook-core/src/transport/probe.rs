use std::time::Duration;

use super::{CommandExecutor, CommandRequest, FilesystemProbe};
use crate::{error::Result, models::PathKind, recovery::shell_quote};

/// Probes the filesystem of this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl FilesystemProbe for LocalFilesystem {
    async fn exists(&self, path: &str, kind: PathKind) -> Result<bool> {
        Ok(match tokio::fs::metadata(path).await {
            Ok(meta) => match kind {
                PathKind::File => meta.is_file(),
                PathKind::Directory => meta.is_dir(),
            },
            Err(_) => false,
        })
    }
}

/// Probes through an executor with `test -f` / `test -d`, for targets whose
/// filesystem is only reachable through the command channel.
#[derive(Debug, Clone)]
pub struct CommandProbe<E> {
    executor: E,
    timeout: Duration,
}

impl<E: CommandExecutor> CommandProbe<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            timeout: Duration::from_secs(10),
        }
    }
}

impl<E: CommandExecutor> FilesystemProbe for CommandProbe<E> {
    async fn exists(&self, path: &str, kind: PathKind) -> Result<bool> {
        let flag = match kind {
            PathKind::File => "-f",
            PathKind::Directory => "-d",
        };
        let request = CommandRequest::new(format!("test {flag} {}", shell_quote(path)), self.timeout);
        let outcome = self.executor.run(&request).await?;
        Ok(outcome.succeeded())
    }
}
