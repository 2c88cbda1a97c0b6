//! Per-block authenticated encryption (§4.3). Every stored block is an
//! [envelope](super) of `format_version || ciphertext`, where the ciphertext
//! was produced with `block_id || format_version` as associated data — so an
//! attacker who swaps two ciphertext files on disk gets `IntegrityError`
//! rather than a silently-wrong decryption (§8, property 2).

use anyhow::{bail, Result};
use log::{debug, warn};

use super::block_data::IBlockData;
use super::{
    BlockId, BlockStoreDeleter, BlockStoreReader, OptimizedBlockStoreWriter, RemoveResult,
    TryCreateResult,
};
use crate::create_block_data_wrapper;
use crate::crypto::symmetric::DynCipher;
use crate::data::Data;

const FORMAT_VERSION_HEADER: &[u8; 2] = &1u16.to_ne_bytes();

pub struct EncryptedBlockStore<C: DynCipher, B> {
    underlying_block_store: B,
    cipher: C,
}

impl<C: DynCipher, B> EncryptedBlockStore<C, B> {
    pub fn new(underlying_block_store: B, cipher: C) -> Self {
        Self {
            underlying_block_store,
            cipher,
        }
    }

    fn _associated_data(id: &BlockId) -> Vec<u8> {
        let mut ad = Vec::with_capacity(super::BLOCKID_LEN + FORMAT_VERSION_HEADER.len());
        ad.extend_from_slice(id.data());
        ad.extend_from_slice(FORMAT_VERSION_HEADER);
        ad
    }

    fn _encrypt(&self, id: &BlockId, plaintext: &[u8]) -> Result<Data> {
        let ciphertext = self.cipher.encrypt(plaintext, &Self::_associated_data(id))?;
        Ok(_prepend_header(ciphertext))
    }

    fn _decrypt(&self, id: &BlockId, envelope: Data) -> Result<Data> {
        let ciphertext = _check_and_remove_header(envelope)?;
        self.cipher
            .decrypt(ciphertext.as_ref(), &Self::_associated_data(id))
    }
}

impl<C: DynCipher, B: BlockStoreReader> BlockStoreReader for EncryptedBlockStore<C, B> {
    fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        let loaded = self.underlying_block_store.load(id)?;
        match loaded {
            None => Ok(None),
            Some(data) => match self._decrypt(id, data) {
                Ok(plaintext) => {
                    debug!("decrypted block {}", id);
                    Ok(Some(plaintext))
                }
                Err(err) => {
                    warn!("block {} failed integrity check: {}", id, err);
                    Err(err)
                }
            },
        }
    }

    fn num_blocks(&self) -> Result<u64> {
        self.underlying_block_store.num_blocks()
    }

    fn estimate_num_free_bytes(&self) -> Result<u64> {
        self.underlying_block_store.estimate_num_free_bytes()
    }

    fn block_size_from_physical_block_size(&self, block_size: u64) -> Result<u64> {
        let physical = self
            .underlying_block_store
            .block_size_from_physical_block_size(block_size)?;
        let overhead = (FORMAT_VERSION_HEADER.len() + self.cipher.ciphertext_overhead()) as u64;
        physical.checked_sub(overhead).ok_or_else(|| {
            anyhow::anyhow!(
                "Physical block size of {} is too small to hold even the envelope header+overhead of {}.",
                block_size,
                overhead
            )
        })
    }

    fn all_blocks(&self) -> Result<Box<dyn Iterator<Item = BlockId>>> {
        self.underlying_block_store.all_blocks()
    }
}

impl<C: DynCipher, B: BlockStoreDeleter> BlockStoreDeleter for EncryptedBlockStore<C, B> {
    fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        self.underlying_block_store.remove(id)
    }
}

create_block_data_wrapper!(BlockData);

impl<C: DynCipher, B: OptimizedBlockStoreWriter> OptimizedBlockStoreWriter
    for EncryptedBlockStore<C, B>
{
    type BlockData = BlockData;

    fn allocate(size: usize) -> Self::BlockData {
        BlockData::new(Data::zeroes(0, size, 0))
    }

    fn try_create_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<TryCreateResult> {
        let ciphertext = self._encrypt(id, data.extract().as_ref())?;
        let mut buf = B::allocate(ciphertext.len());
        buf.as_mut().copy_from_slice(ciphertext.as_ref());
        self.underlying_block_store.try_create_optimized(id, buf)
    }

    fn store_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<()> {
        let ciphertext = self._encrypt(id, data.extract().as_ref())?;
        let mut buf = B::allocate(ciphertext.len());
        buf.as_mut().copy_from_slice(ciphertext.as_ref());
        self.underlying_block_store.store_optimized(id, buf)
    }
}

fn _check_and_remove_header(data: Data) -> Result<Data> {
    if !data.starts_with(FORMAT_VERSION_HEADER) {
        bail!(
            "IntegrityError: Couldn't parse encrypted block. Expected FORMAT_VERSION_HEADER of {:?} but found {:?}",
            FORMAT_VERSION_HEADER,
            &data.as_ref()[..FORMAT_VERSION_HEADER.len().min(data.len())]
        );
    }
    let len = data.len();
    Ok(data.into_subregion(FORMAT_VERSION_HEADER.len()..len))
}

fn _prepend_header(ciphertext: Data) -> Data {
    let mut result = Vec::with_capacity(FORMAT_VERSION_HEADER.len() + ciphertext.len());
    result.extend_from_slice(FORMAT_VERSION_HEADER);
    result.extend_from_slice(ciphertext.as_ref());
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::ondisk::OnDiskBlockStore;
    use crate::blockstore::BlockStore;
    use crate::crypto::symmetric::{Aes256Gcm, EncryptionKey};

    fn store(dir: &std::path::Path) -> EncryptedBlockStore<Aes256Gcm, OnDiskBlockStore> {
        let key = EncryptionKey::generate(&mut rand::thread_rng());
        EncryptedBlockStore::new(OnDiskBlockStore::new(dir), Aes256Gcm::new(key))
    }

    #[test]
    fn roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let id = store.create(b"some plaintext").unwrap();
        assert_eq!(
            Data::from(b"some plaintext".to_vec()),
            store.load(&id).unwrap().unwrap()
        );
    }

    #[test]
    fn tampering_a_stored_block_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let id = store.create(b"some plaintext").unwrap();
        let on_disk = OnDiskBlockStore::new(dir.path());
        let mut raw = on_disk.load(&id).unwrap().unwrap();
        let last = raw.len() - 1;
        raw.as_mut()[last] ^= 0xFF;
        on_disk.store(&id, raw.as_ref()).unwrap();
        assert!(store.load(&id).is_err());
    }

    #[test]
    fn swapping_two_blocks_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let id1 = store.create(b"block one").unwrap();
        let id2 = store.create(b"block two").unwrap();
        let on_disk = OnDiskBlockStore::new(dir.path());
        let raw1 = on_disk.load(&id1).unwrap().unwrap();
        let raw2 = on_disk.load(&id2).unwrap().unwrap();
        on_disk.store(&id1, raw2.as_ref()).unwrap();
        on_disk.store(&id2, raw1.as_ref()).unwrap();
        assert!(store.load(&id1).is_err());
        assert!(store.load(&id2).is_err());
    }
}
