use std::path::PathBuf;

use thiserror::Error;

/// Why a mesh failed to load.
///
/// Parsers propagate these internally; the public manager surface collapses
/// them to an invalid handle plus a [`MeshEvent::LoadFailed`] notification
/// carrying the rendered message. Texture decode problems never appear here:
/// they degrade to "no texture" inside the parsers.
///
/// [`MeshEvent::LoadFailed`]: crate::MeshEvent::LoadFailed
#[derive(Debug, Error)]
pub enum MeshLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl MeshLoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshLoadError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MeshLoadError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
