//! Post-transfer check that the promised file is really on disk.

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::error::VerificationError;

/// Confirms `path` exists, is a file and is non-empty. Returns its size.
///
/// # Errors
///
/// Returns `VerificationError::Missing` or `VerificationError::Empty`, or
/// `VerificationError::Io` when the metadata cannot be read.
pub async fn verify_output(path: &Path) -> Result<u64, VerificationError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(VerificationError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(VerificationError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_file() {
        return Err(VerificationError::Missing {
            path: path.to_path_buf(),
        });
    }
    if metadata.len() == 0 {
        return Err(VerificationError::Empty {
            path: path.to_path_buf(),
        });
    }

    debug!(path = %path.display(), bytes = metadata.len(), "output verified");
    Ok(metadata.len())
}
