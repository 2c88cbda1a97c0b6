//! The capability set every block-store layer implements (§9 "Polymorphism
//! across block-store layers"): `create`, `load`, `store`, `remove`,
//! `for_each_block`, `flush`. Layers compose by construction (generic
//! wrapping), never by inheritance.

pub mod block_data;
pub mod caching;
pub mod compressing;
pub mod encrypted;
pub mod ondisk;

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, ensure, Result};
use rand::RngCore;

use crate::data::Data;
use block_data::IBlockData;

pub const BLOCKID_LEN: usize = 16;

/// Opaque, uniformly random identifier naming a block. Immutable in identity:
/// overwriting the data stored at an id never changes the id itself.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId([u8; BLOCKID_LEN]);

impl BlockId {
    pub fn from_array(data: [u8; BLOCKID_LEN]) -> Self {
        Self(data)
    }

    pub fn new_random() -> Self {
        let mut data = [0u8; BLOCKID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut data);
        Self(data)
    }

    pub fn data(&self) -> &[u8; BLOCKID_LEN] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        ensure!(
            hex_str.len() == BLOCKID_LEN * 2,
            "BlockId hex string has wrong length: {}",
            hex_str.len()
        );
        let bytes = hex::decode(hex_str)?;
        let mut data = [0u8; BLOCKID_LEN];
        data.copy_from_slice(&bytes);
        Ok(Self(data))
    }

    /// The two-level on-disk path fragment: `<first-byte-hex>/<rest-hex>`.
    pub fn to_path_fragments(&self) -> (String, String) {
        let hex = self.as_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.as_hex())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl FromStr for BlockId {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// Outcome of [BlockStoreDeleter::remove]: whether a block actually existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveResult {
    SuccessfullyRemoved,
    NotFound,
}

/// Outcome of [OptimizedBlockStoreWriter::try_create_optimized]: whether the
/// id was free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryCreateResult {
    SuccessfullyCreated,
    NotCreatedBecauseBlockIdAlreadyExists,
}

pub trait BlockStoreReader {
    fn load(&self, id: &BlockId) -> Result<Option<Data>>;
    fn num_blocks(&self) -> Result<u64>;
    fn estimate_num_free_bytes(&self) -> Result<u64>;

    /// Given the store's on-disk block size, how many plaintext bytes does a
    /// caller actually get after this layer's (and every inner layer's)
    /// framing is subtracted?
    fn block_size_from_physical_block_size(&self, block_size: u64) -> Result<u64>;

    fn all_blocks(&self) -> Result<Box<dyn Iterator<Item = BlockId>>>;

    /// Convenience wrapper around [Self::all_blocks] matching §4.1's
    /// `forEachBlock` callback style.
    fn for_each_block(&self, mut callback: impl FnMut(&BlockId) -> Result<()>) -> Result<()> {
        for id in self.all_blocks()? {
            callback(&id)?;
        }
        Ok(())
    }
}

pub trait BlockStoreDeleter {
    fn remove(&self, id: &BlockId) -> Result<RemoveResult>;
}

/// Layers implement this instead of a naive `store(id, &[u8])` so that a
/// buffer allocated by [Self::allocate] can be handed all the way down the
/// stack, each layer prepending its header in the buffer's spare prefix
/// bytes, without any layer reallocating.
pub trait OptimizedBlockStoreWriter {
    type BlockData: IBlockData;

    fn allocate(size: usize) -> Self::BlockData;

    fn try_create_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<TryCreateResult>;

    fn store_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<()>;
}

/// Marker trait tying the reader/writer/deleter capabilities together plus
/// the higher-level, non-optimized convenience API used by callers that don't
/// care about the zero-copy header trick.
pub trait BlockStore: BlockStoreReader + BlockStoreDeleter + OptimizedBlockStoreWriter {
    fn create(&self, data: &[u8]) -> Result<BlockId> {
        loop {
            let id = BlockId::new_random();
            let mut buf = Self::allocate(data.len());
            buf.as_mut().copy_from_slice(data);
            match self.try_create_optimized(&id, buf)? {
                TryCreateResult::SuccessfullyCreated => return Ok(id),
                TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists => continue,
            }
        }
    }

    fn store(&self, id: &BlockId, data: &[u8]) -> Result<()> {
        let mut buf = Self::allocate(data.len());
        buf.as_mut().copy_from_slice(data);
        self.store_optimized(id, buf)
    }
}

impl<T: BlockStoreReader + BlockStoreDeleter + OptimizedBlockStoreWriter> BlockStore for T {}

pub(crate) fn integrity_error(msg: impl Into<String>) -> anyhow::Error {
    let msg = msg.into();
    anyhow::anyhow!("IntegrityError: {}", msg)
}

pub(crate) fn bail_integrity(msg: impl Into<String>) -> Result<std::convert::Infallible> {
    bail!("IntegrityError: {}", msg.into())
}
