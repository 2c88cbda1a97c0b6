pub mod blob;
pub mod datanodestore;
pub mod node;

use anyhow::Result;

use crate::blockstore::{BlockId, BlockStore};
use blob::Blob;
use datanodestore::DataNodeStore;

/// Variable-length blobs realized as balanced trees of fixed-size blocks
/// (§4.5, "the centerpiece"). One store wraps one block-store stack; its
/// geometry (`LEAF_MAX_BYTES`/`INNER_FANOUT`) is fixed for the store's
/// lifetime by the block size given at construction.
pub struct BlobStoreOnBlocks<B: BlockStore> {
    nodestore: DataNodeStore<B>,
}

impl<B: BlockStore> BlobStoreOnBlocks<B> {
    pub fn new(block_store: B, block_size_bytes: usize) -> Result<Self> {
        Ok(Self {
            nodestore: DataNodeStore::new(block_store, block_size_bytes)?,
        })
    }

    pub fn nodestore(&self) -> &DataNodeStore<B> {
        &self.nodestore
    }

    /// Allocates one empty leaf block and returns a new blob rooted there.
    pub fn create(&self) -> Result<Blob<'_, B>> {
        let root_id = self.nodestore.create_new_leaf_node(&[])?;
        Ok(Blob::new(&self.nodestore, root_id))
    }

    /// Fetches the root and returns a handle, or `None` if no blob with this
    /// id exists.
    pub fn load(&self, root_id: BlockId) -> Result<Option<Blob<'_, B>>> {
        if self.nodestore.load(&root_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(Blob::new(&self.nodestore, root_id)))
    }

    /// Deletes every block reachable from `blob`'s root, depth-first.
    pub fn remove(&self, blob: Blob<'_, B>) -> Result<()> {
        blob.remove_entirely()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::ondisk::OnDiskBlockStore;

    #[test]
    fn load_missing_blob_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let blobstore = BlobStoreOnBlocks::new(OnDiskBlockStore::new(dir.path()), 64).unwrap();
        assert!(blobstore.load(BlockId::new_random()).unwrap().is_none());
    }

    #[test]
    fn rejects_block_size_too_small_for_a_useful_fanout() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BlobStoreOnBlocks::new(OnDiskBlockStore::new(dir.path()), 20).is_err());
    }
}
