//! Errors raised while preparing and launching child processes.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// A child process could not be started. Fatal to setup.
#[derive(Debug, Clone, Error)]
pub enum SpawnError {
    /// The executable does not exist or is not on `PATH`.
    #[error("executable not found: {program}")]
    BinaryNotFound {
        /// Program that was looked up.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The operating system refused to start the process.
    #[error("failed to launch {name} ({program}): {source}")]
    Launch {
        /// Process name.
        name: String,
        /// Program that was launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A data directory could not be removed or created.
    #[error("failed to prepare data directory {path}: {source}")]
    DataDirectory {
        /// Directory path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Another tracked process already owns the directory.
    #[error("data directory {path} is already used by {owner}")]
    DataDirectoryInUse {
        /// Directory path.
        path: Utf8PathBuf,
        /// Name of the owning process.
        owner: String,
    },
    /// A configuration document could not be written.
    #[error("failed to write configuration {path}: {source}")]
    WriteConfig {
        /// File path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl SpawnError {
    pub(crate) fn data_directory(path: &camino::Utf8Path, source: io::Error) -> Self {
        Self::DataDirectory {
            path: path.to_owned(),
            source: Arc::new(source),
        }
    }
}
