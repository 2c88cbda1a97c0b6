//! Tunables that belong to this crate, not to any particular filesystem
//! (§2 "Configuration (of the crate itself, distinct from `CryConfig`)").
//! Threaded explicitly into constructors; never ambient/global state (§9).

use crate::config::ScryptCost;

#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Capacity of the block cache (`blockstore::caching::CachingBlockStore`), in blocks.
    pub cache_capacity: usize,
    /// Default block size used when creating a new filesystem.
    pub default_block_size_bytes: usize,
    /// scrypt cost used when sealing a config file for a *newly created*
    /// filesystem. Loading an existing config always uses whatever
    /// parameters are stored in that file.
    pub new_filesystem_kdf_cost: ScryptCost,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            default_block_size_bytes: 32 * 1024,
            new_filesystem_kdf_cost: ScryptCost::INTERACTIVE,
        }
    }
}
