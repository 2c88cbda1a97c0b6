//! Transparent compression wrapper over any inner block store (§4.2). The
//! algorithm is pluggable via [Compressor] and fixed at filesystem-creation
//! time; compression is never relied on for confidentiality, so an
//! incompressible ciphertext still round-trips correctly via the
//! "uncompressed" escape tag.

pub mod runlength;

use anyhow::{bail, Result};

use super::block_data::IBlockData;
use super::{
    BlockId, BlockStoreDeleter, BlockStoreReader, OptimizedBlockStoreWriter, RemoveResult,
    TryCreateResult,
};
use crate::create_block_data_wrapper;
use crate::data::Data;

pub use runlength::RunLengthEncoding;

const UNCOMPRESSED_TAG: u8 = 0;
const COMPRESSED_TAG: u8 = 1;

/// A pluggable, lossless compression algorithm for block payloads.
pub trait Compressor {
    fn compress(data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(data: &[u8]) -> Result<Vec<u8>>;
}

create_block_data_wrapper!(BlockData);

pub struct CompressingBlockStore<Comp: Compressor, B> {
    underlying_block_store: B,
    _compressor: std::marker::PhantomData<Comp>,
}

impl<Comp: Compressor, B> CompressingBlockStore<Comp, B> {
    pub fn new(underlying_block_store: B) -> Self {
        Self {
            underlying_block_store,
            _compressor: std::marker::PhantomData,
        }
    }

    fn _compress(data: &[u8]) -> Vec<u8> {
        match Comp::compress(data) {
            Ok(compressed) if compressed.len() < data.len() => {
                let mut result = Vec::with_capacity(compressed.len() + 1);
                result.push(COMPRESSED_TAG);
                result.extend_from_slice(&compressed);
                result
            }
            _ => {
                // Incompressible (or the compressor failed): store verbatim
                // behind a 1-byte "uncompressed" tag rather than pay a
                // negative compression ratio.
                let mut result = Vec::with_capacity(data.len() + 1);
                result.push(UNCOMPRESSED_TAG);
                result.extend_from_slice(data);
                result
            }
        }
    }

    fn _decompress(data: &[u8]) -> Result<Vec<u8>> {
        let (tag, payload) = data
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("compressed block is empty, missing tag byte"))?;
        match *tag {
            UNCOMPRESSED_TAG => Ok(payload.to_vec()),
            COMPRESSED_TAG => Comp::decompress(payload),
            other => bail!("unknown compression tag {}", other),
        }
    }
}

impl<Comp: Compressor, B: BlockStoreReader> BlockStoreReader for CompressingBlockStore<Comp, B> {
    fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        let loaded = self.underlying_block_store.load(id)?;
        match loaded {
            None => Ok(None),
            Some(data) => Ok(Some(Self::_decompress(data.as_ref())?.into())),
        }
    }

    fn num_blocks(&self) -> Result<u64> {
        self.underlying_block_store.num_blocks()
    }

    fn estimate_num_free_bytes(&self) -> Result<u64> {
        self.underlying_block_store.estimate_num_free_bytes()
    }

    fn block_size_from_physical_block_size(&self, block_size: u64) -> Result<u64> {
        // Compression ratio is data-dependent; we can't promise a fixed
        // logical size per physical byte. We report the worst case (no
        // compression achieved, minus the 1-byte tag), which is also what
        // `allocate` below sizes for.
        self.underlying_block_store
            .block_size_from_physical_block_size(block_size)?
            .checked_sub(1)
            .ok_or_else(|| anyhow::anyhow!("physical block size {} too small", block_size))
    }

    fn all_blocks(&self) -> Result<Box<dyn Iterator<Item = BlockId>>> {
        self.underlying_block_store.all_blocks()
    }
}

impl<Comp: Compressor, B: BlockStoreDeleter> BlockStoreDeleter for CompressingBlockStore<Comp, B> {
    fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        self.underlying_block_store.remove(id)
    }
}

impl<Comp: Compressor, B: OptimizedBlockStoreWriter> OptimizedBlockStoreWriter
    for CompressingBlockStore<Comp, B>
{
    type BlockData = BlockData;

    fn allocate(size: usize) -> Self::BlockData {
        BlockData::new(Data::zeroes(0, size, 0))
    }

    fn try_create_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<TryCreateResult> {
        let compressed = Self::_compress(data.extract().as_ref());
        let mut buf = B::allocate(compressed.len());
        buf.as_mut().copy_from_slice(&compressed);
        self.underlying_block_store.try_create_optimized(id, buf)
    }

    fn store_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<()> {
        let compressed = Self::_compress(data.extract().as_ref());
        let mut buf = B::allocate(compressed.len());
        buf.as_mut().copy_from_slice(&compressed);
        self.underlying_block_store.store_optimized(id, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::ondisk::OnDiskBlockStore;
    use crate::blockstore::BlockStore;

    #[test]
    fn roundtrips_through_runlength_compression() {
        let dir = tempfile::tempdir().unwrap();
        let store: CompressingBlockStore<RunLengthEncoding, _> =
            CompressingBlockStore::new(OnDiskBlockStore::new(dir.path()));
        let payload = vec![7u8; 10_000];
        let id = store.create(&payload).unwrap();
        assert_eq!(Data::from(payload), store.load(&id).unwrap().unwrap());
    }

    #[test]
    fn roundtrips_incompressible_data() {
        let dir = tempfile::tempdir().unwrap();
        let store: CompressingBlockStore<RunLengthEncoding, _> =
            CompressingBlockStore::new(OnDiskBlockStore::new(dir.path()));
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let id = store.create(&payload).unwrap();
        assert_eq!(Data::from(payload), store.load(&id).unwrap().unwrap());
    }
}
