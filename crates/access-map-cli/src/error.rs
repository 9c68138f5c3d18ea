use access_map_lib::MapError;
use std::path::PathBuf;

/// Errors surfaced by the command-line front-end
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
