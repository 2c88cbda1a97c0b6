//! The error tokens observable at the crate boundary (§6/§7 of the design doc).
//!
//! Internal call chains use `anyhow::Result` (matching the teacher crate's
//! existing style throughout `blockstore`); this enum is what a host
//! application (the FUSE adapter, the C ABI, a test) actually switches on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryfsError {
    #[error("config file does not exist")]
    ConfigFileDoesntExist,

    #[error("wrong password or corrupted config file")]
    DecryptionFailed,

    #[error("filesystem was created with incompatible version {found}, running version is {running}")]
    FilesystemIncompatibleVersion { found: String, running: String },

    #[error("filesystem is invalid: {0}")]
    FilesystemInvalid(String),

    #[error("integrity violation: {0}")]
    IntegrityError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CryfsError>;

/// Classifies an internal `anyhow::Error` into a public [CryfsError] by
/// looking at the `"<Kind>: message"` prefix convention used throughout the
/// crate's `bail!`/`ensure!` call sites (`IntegrityError:`, `FilesystemInvalid:`,
/// `DecryptionFailed:`, `FilesystemIncompatibleVersion:`). Anything else
/// becomes [CryfsError::Internal].
pub fn classify_internal_error(err: anyhow::Error) -> CryfsError {
    let message = err.to_string();
    if let Some(rest) = message.strip_prefix("IntegrityError:") {
        return CryfsError::IntegrityError(rest.trim().to_string());
    }
    if let Some(rest) = message.strip_prefix("FilesystemInvalid:") {
        return CryfsError::FilesystemInvalid(rest.trim().to_string());
    }
    if message.strip_prefix("DecryptionFailed:").is_some() {
        return CryfsError::DecryptionFailed;
    }
    if let Some(rest) = message.strip_prefix("FilesystemIncompatibleVersion:") {
        return CryfsError::FilesystemIncompatibleVersion {
            found: rest.trim().to_string(),
            running: env!("CARGO_PKG_VERSION").to_string(),
        };
    }
    CryfsError::Internal(err)
}
