//! On-disk, per-filesystem configuration: cipher choice, master key,
//! root-blob id, block size (§4.6). Distinct from [crate::RuntimeConfig],
//! which holds this crate's own tunables and is never persisted.

pub mod cipher_registry;
pub mod console;
pub mod cry_config;
pub mod cry_config_file;

pub use cry_config::{CryConfig, ROOT_BLOB_UNSET};
pub use cry_config_file::ScryptCost;
