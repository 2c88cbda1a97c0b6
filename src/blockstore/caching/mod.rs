//! A bounded, write-back LRU cache in front of the encrypted store (§4.4).
//! Reads consult the cache first; writes land in the cache and are only
//! pushed down to the inner store on eviction or an explicit [flush](Self::flush).
//! Only a single writer is assumed (§5), so the cache's mutex exists purely to
//! let request-handling threads within one mount serialize safely, not to
//! coordinate across processes.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use anyhow::Result;
use clru::CLruCache;
use log::{debug, trace};

use super::block_data::IBlockData;
use super::{
    BlockId, BlockStoreDeleter, BlockStoreReader, OptimizedBlockStoreWriter, RemoveResult,
    TryCreateResult,
};
use crate::create_block_data_wrapper;
use crate::data::Data;

const DEFAULT_CAPACITY: usize = 1000;

enum CacheEntry {
    Clean(Data),
    Dirty(Data),
}

impl CacheEntry {
    fn data(&self) -> &Data {
        match self {
            CacheEntry::Clean(d) => d,
            CacheEntry::Dirty(d) => d,
        }
    }
}

pub struct CachingBlockStore<B> {
    underlying_block_store: B,
    cache: Mutex<CLruCache<BlockId, CacheEntry>>,
}

create_block_data_wrapper!(BlockData);

impl<B> CachingBlockStore<B> {
    pub fn new(underlying_block_store: B) -> Self {
        Self::with_capacity(underlying_block_store, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(underlying_block_store: B, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            underlying_block_store,
            cache: Mutex::new(CLruCache::new(capacity)),
        }
    }
}

impl<B: OptimizedBlockStoreWriter> CachingBlockStore<B> {
    /// Evict-driven write-back: before inserting a new entry that would push
    /// the cache over capacity, pop the least-recently-used entry ourselves
    /// and persist it if it was dirty. `clru::CLruCache::put` only ever
    /// returns the previous value stored under the *same* key -- it never
    /// reports which entry (if any) capacity pressure evicted -- so eviction
    /// has to be driven from here, not from `put`'s return value.
    fn _make_room_for_insert(&self, cache: &mut CLruCache<BlockId, CacheEntry>) -> Result<()> {
        if cache.len() < cache.cap().get() {
            return Ok(());
        }
        if let Some((evicted_id, evicted_entry)) = cache.pop_lru() {
            if let CacheEntry::Dirty(data) = evicted_entry {
                trace!("evicting dirty block {}, writing through", evicted_id);
                self._write_through(&evicted_id, data)?;
            }
        }
        Ok(())
    }

    fn _write_through(&self, id: &BlockId, data: Data) -> Result<()> {
        let mut buf = B::allocate(data.len());
        buf.as_mut().copy_from_slice(data.as_ref());
        self.underlying_block_store.store_optimized(id, buf)
    }

    /// Synchronously drains every dirty entry to the inner store. Upon
    /// successful return, every dirty block is durable (§5 "flush() is a
    /// barrier").
    pub fn flush(&self) -> Result<()> {
        let mut cache = self.cache.lock().expect("cache mutex poisoned");
        let dirty_ids: Vec<BlockId> = cache
            .iter()
            .filter_map(|(id, entry)| matches!(entry, CacheEntry::Dirty(_)).then(|| *id))
            .collect();
        for id in dirty_ids {
            if let Some(entry) = cache.pop(&id) {
                let data = match entry {
                    CacheEntry::Dirty(data) => data,
                    CacheEntry::Clean(data) => data,
                };
                self._write_through(&id, data.clone())?;
                cache.put(id, CacheEntry::Clean(data));
            }
        }
        debug!("flush: cache fully clean");
        Ok(())
    }
}

impl<B: BlockStoreReader + OptimizedBlockStoreWriter> BlockStoreReader for CachingBlockStore<B> {
    fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        {
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            if let Some(entry) = cache.get(id) {
                return Ok(Some(entry.data().clone()));
            }
        }
        let loaded = self.underlying_block_store.load(id)?;
        if let Some(ref data) = loaded {
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            if !cache.contains(id) {
                self._make_room_for_insert(&mut cache)?;
            }
            cache.put(*id, CacheEntry::Clean(data.clone()));
        }
        Ok(loaded)
    }

    fn num_blocks(&self) -> Result<u64> {
        self.underlying_block_store.num_blocks()
    }

    fn estimate_num_free_bytes(&self) -> Result<u64> {
        self.underlying_block_store.estimate_num_free_bytes()
    }

    fn block_size_from_physical_block_size(&self, block_size: u64) -> Result<u64> {
        self.underlying_block_store
            .block_size_from_physical_block_size(block_size)
    }

    fn all_blocks(&self) -> Result<Box<dyn Iterator<Item = BlockId>>> {
        self.underlying_block_store.all_blocks()
    }
}

impl<B: BlockStoreReader + BlockStoreDeleter> BlockStoreDeleter for CachingBlockStore<B> {
    fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        let cached_existed = {
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            cache.pop(id).is_some()
        };
        let result = self.underlying_block_store.remove(id)?;
        if cached_existed && result == RemoveResult::NotFound {
            // The block only ever existed as a not-yet-flushed dirty cache
            // entry; removing it from the cache *is* the removal.
            return Ok(RemoveResult::SuccessfullyRemoved);
        }
        Ok(result)
    }
}

impl<B: BlockStoreReader + OptimizedBlockStoreWriter> OptimizedBlockStoreWriter
    for CachingBlockStore<B>
{
    type BlockData = BlockData;

    fn allocate(size: usize) -> Self::BlockData {
        BlockData::new(Data::zeroes(0, size, 0))
    }

    fn try_create_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<TryCreateResult> {
        {
            let cache = self.cache.lock().expect("cache mutex poisoned");
            if cache.contains(id) {
                return Ok(TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists);
            }
        }
        if self.underlying_block_store.load(id)?.is_some() {
            return Ok(TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists);
        }
        {
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            self._make_room_for_insert(&mut cache)?;
            cache.put(*id, CacheEntry::Dirty(data.extract()));
        }
        Ok(TryCreateResult::SuccessfullyCreated)
    }

    fn store_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<()> {
        let mut cache = self.cache.lock().expect("cache mutex poisoned");
        if !cache.contains(id) {
            self._make_room_for_insert(&mut cache)?;
        }
        cache.put(*id, CacheEntry::Dirty(data.extract()));
        Ok(())
    }
}

impl<B> Drop for CachingBlockStore<B> {
    fn drop(&mut self) {
        // Best-effort: callers should call `flush()` explicitly (Drop can't
        // report errors), matching §9 "scoped resources" drop-order guidance.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::ondisk::OnDiskBlockStore;
    use crate::blockstore::BlockStore;

    #[test]
    fn reads_see_uncommitted_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CachingBlockStore::new(OnDiskBlockStore::new(dir.path()));
        let id = store.create(b"hello").unwrap();
        assert_eq!(Data::from(b"hello".to_vec()), store.load(&id).unwrap().unwrap());
    }

    #[test]
    fn flush_writes_through_to_inner_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CachingBlockStore::new(OnDiskBlockStore::new(dir.path()));
        let id = store.create(b"hello").unwrap();
        store.flush().unwrap();
        let inner = OnDiskBlockStore::new(dir.path());
        assert_eq!(Data::from(b"hello".to_vec()), inner.load(&id).unwrap().unwrap());
    }

    #[test]
    fn eviction_flushes_dirty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = CachingBlockStore::with_capacity(OnDiskBlockStore::new(dir.path()), 1);
        let id1 = store.create(b"first").unwrap();
        let _id2 = store.create(b"second").unwrap();
        let inner = OnDiskBlockStore::new(dir.path());
        assert_eq!(Data::from(b"first".to_vec()), inner.load(&id1).unwrap().unwrap());
    }

    #[test]
    fn remove_removes_uncommitted_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CachingBlockStore::new(OnDiskBlockStore::new(dir.path()));
        let id = store.create(b"hello").unwrap();
        assert_eq!(RemoveResult::SuccessfullyRemoved, store.remove(&id).unwrap());
        assert_eq!(None, store.load(&id).unwrap());
    }
}
