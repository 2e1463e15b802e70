use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// New identities would not persist and would alert again next run.
    #[error("registry at {path} is not writable: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode registry entry: {0}")]
    Encode(#[from] serde_json::Error),
}
