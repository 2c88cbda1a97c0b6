//! Binds a loaded config to a concrete block-store stack and exposes the
//! mount-handle surface consumed by a host filesystem adapter (§4.7, §6
//! "Mount handle surface").

use std::path::Path;

use crate::blobstore::onblocks::BlobStoreOnBlocks;
use crate::blockstore::caching::CachingBlockStore;
use crate::blockstore::compressing::runlength::RunLengthEncoding;
use crate::blockstore::compressing::CompressingBlockStore;
use crate::blockstore::encrypted::EncryptedBlockStore;
use crate::blockstore::ondisk::OnDiskBlockStore;
use crate::blockstore::BlockId;
use crate::config::cipher_registry::{self, CipherId};
use crate::config::console::Console;
use crate::config::{cry_config_file, CryConfig, ROOT_BLOB_UNSET};
use crate::crypto::symmetric::DynCipher;
use crate::error::{classify_internal_error, CryfsError, Result};
use crate::runtime_config::RuntimeConfig;

/// The concrete block-store stack every mounted filesystem is built on
/// (§4.7): on-disk storage, wrapped in compression, wrapped in per-block
/// AEAD, wrapped in a write-back cache.
pub type CryBlockStore = CachingBlockStore<
    EncryptedBlockStore<Box<dyn DynCipher>, CompressingBlockStore<RunLengthEncoding, OnDiskBlockStore>>,
>;

pub struct CryDevice {
    config: CryConfig,
    blobstore: BlobStoreOnBlocks<CryBlockStore>,
    root_blob_id: BlockId,
}

impl CryDevice {
    /// Loads a filesystem: reads+decrypts the config (an external copy wins
    /// over the one inside `basedir` if given, §4.6), builds the block-store
    /// stack, and -- if no root blob exists yet -- creates one (§4.7).
    pub fn load(
        basedir: &Path,
        password: &str,
        external_config_path: Option<&Path>,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self> {
        let config = Self::_load_config(basedir, external_config_path, password)?;
        Self::_from_config(basedir, config, runtime_config)
    }

    /// Creates a brand-new filesystem: picks a cipher (via `console` if
    /// `cipher_name` is `None`), generates a key, seals a fresh config file,
    /// and creates the root blob.
    pub fn create(
        basedir: &Path,
        password: &str,
        cipher_name: Option<&str>,
        console: &dyn Console,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self> {
        let cipher_id = match cipher_name {
            Some(name) => CipherId::from_name(name).map_err(classify_internal_error)?,
            None => {
                let choice = console
                    .ask_cipher(cipher_registry::ALL_CIPHERS)
                    .map_err(classify_internal_error)?;
                if choice.is_weak() {
                    let confirmed = console
                        .confirm_weak_cipher(choice)
                        .map_err(classify_internal_error)?;
                    if !confirmed {
                        return Err(CryfsError::FilesystemInvalid(
                            "cipher selection was not confirmed".to_string(),
                        ));
                    }
                }
                choice
            }
        };

        let config = CryConfig {
            cipher: cipher_id.name().to_string(),
            encryption_key: cipher_id.generate_key_hex(),
            root_blob: ROOT_BLOB_UNSET.to_string(),
            block_size_bytes: runtime_config.default_block_size_bytes as u32,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        std::fs::create_dir_all(basedir).map_err(CryfsError::Io)?;
        let config_path = basedir.join("cryfs.config");
        let sealed = cry_config_file::seal(&config, password, runtime_config.new_filesystem_kdf_cost)
            .map_err(classify_internal_error)?;
        std::fs::write(&config_path, sealed).map_err(CryfsError::Io)?;

        let device = Self::_from_config(basedir, config, runtime_config)?;

        // `_from_config` just assigned the real root blob id (replacing
        // `ROOT_BLOB_UNSET`) in its in-memory copy of `config`; the file
        // written above still names `ROOT_BLOB_UNSET`, so re-seal and
        // rewrite it now that the final config is known (§4.7: `create()` is
        // the caller responsible for persisting it).
        let resealed = cry_config_file::seal(
            &device.config,
            password,
            runtime_config.new_filesystem_kdf_cost,
        )
        .map_err(classify_internal_error)?;
        std::fs::write(&config_path, resealed).map_err(CryfsError::Io)?;

        Ok(device)
    }

    fn _load_config(
        basedir: &Path,
        external_config_path: Option<&Path>,
        password: &str,
    ) -> Result<CryConfig> {
        let config_path = match external_config_path {
            Some(p) => p.to_path_buf(),
            None => basedir.join("cryfs.config"),
        };
        if !config_path.exists() {
            return Err(CryfsError::ConfigFileDoesntExist);
        }
        let data = std::fs::read(&config_path).map_err(CryfsError::Io)?;
        cry_config_file::open(&data, password).map_err(classify_internal_error)
    }

    fn _from_config(basedir: &Path, mut config: CryConfig, runtime_config: &RuntimeConfig) -> Result<Self> {
        let cipher = cipher_registry::build_cipher(&config.cipher, &config.encryption_key)
            .map_err(classify_internal_error)?;

        let ondisk = OnDiskBlockStore::new(basedir);
        let compressing: CompressingBlockStore<RunLengthEncoding, _> = CompressingBlockStore::new(ondisk);
        let encrypted = EncryptedBlockStore::new(compressing, cipher);
        let block_store = CachingBlockStore::with_capacity(encrypted, runtime_config.cache_capacity);

        let blobstore = BlobStoreOnBlocks::new(block_store, config.block_size_bytes as usize)
            .map_err(classify_internal_error)?;

        let root_blob_id = if config.root_blob == ROOT_BLOB_UNSET {
            let root_blob = blobstore.create().map_err(classify_internal_error)?;
            let id = root_blob.key();
            config.root_blob = id.as_hex();
            id
        } else {
            let id = BlockId::from_hex(&config.root_blob).map_err(classify_internal_error)?;
            if blobstore.load(id).map_err(classify_internal_error)?.is_none() {
                return Err(CryfsError::FilesystemInvalid(format!(
                    "root blob {} does not exist",
                    id
                )));
            }
            id
        };

        Ok(Self {
            config,
            blobstore,
            root_blob_id,
        })
    }

    pub fn cipher_name(&self) -> &str {
        &self.config.cipher
    }

    pub fn block_store(&self) -> &CryBlockStore {
        self.blobstore.nodestore().underlying_block_store()
    }

    pub fn blobstore(&self) -> &BlobStoreOnBlocks<CryBlockStore> {
        &self.blobstore
    }

    pub fn block_size_bytes(&self) -> usize {
        self.config.block_size_bytes as usize
    }

    pub fn root_blob_id(&self) -> BlockId {
        self.root_blob_id
    }

    /// Only updates the in-memory handle; the caller is responsible for
    /// re-sealing [Self::config] if this should survive process exit (§4.7).
    pub fn set_root_blob_id(&mut self, id: BlockId) {
        self.root_blob_id = id;
        self.config.root_blob = id.as_hex();
    }

    pub fn config(&self) -> &CryConfig {
        &self.config
    }

    /// Flushes the write-back cache, making every dirty block durable (§5
    /// "flush() is a barrier").
    pub fn flush(&self) -> Result<()> {
        self.block_store().flush().map_err(classify_internal_error)
    }
}
