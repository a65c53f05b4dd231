//! Builder for creating and configuring History instances.

use std::path::{Path, PathBuf};

use tokio::task;

use super::History;
use crate::{
    db::Database,
    error::{Result, RunbookError},
};

/// Builder for creating and configuring [`History`] instances.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuilder {
    database_path: Option<PathBuf>,
}

impl HistoryBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom database file path.
    ///
    /// If not specified, uses the XDG Base Directory specification:
    /// `$XDG_DATA_HOME/runbook/history.db` or
    /// `~/.local/share/runbook/history.db`
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.database_path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Builds the history store, creating the database if needed.
    ///
    /// # Errors
    ///
    /// Returns `RunbookError::FileSystem` if the parent directory cannot be
    /// created and `RunbookError::Database` if initialization fails.
    pub async fn build(self) -> Result<History> {
        let db_path = match self.database_path {
            Some(path) => path,
            None => Self::default_database_path()?,
        };

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RunbookError::FileSystem {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let db_path_clone = db_path.clone();
        task::spawn_blocking(move || {
            let _db = Database::new(&db_path_clone)?;
            Ok::<(), RunbookError>(())
        })
        .await
        .map_err(|e| RunbookError::Configuration {
            message: format!("Task join error: {e}"),
        })??;

        Ok(History::new(db_path))
    }

    /// Returns the default database path following the XDG Base Directory
    /// specification.
    fn default_database_path() -> Result<PathBuf> {
        xdg::BaseDirectories::with_prefix("runbook")
            .place_data_file("history.db")
            .map_err(|e| RunbookError::XdgDirectory(e.to_string()))
    }
}
