//! Derives `LEAF_MAX_BYTES`/`INNER_FANOUT` once from the configured block
//! size and caches them for the store's lifetime (§9 "Decided Open
//! Questions": these are never recomputed per-operation).

use anyhow::{ensure, Result};

use super::node::{InnerNode, LeafNode, Node, HEADER_BYTES};
use crate::blockstore::{BlockId, BlockStore, BLOCKID_LEN};

pub struct DataNodeStore<B: BlockStore> {
    store: B,
    leaf_max_bytes: usize,
    inner_fanout: usize,
}

impl<B: BlockStore> DataNodeStore<B> {
    pub fn new(store: B, block_size_bytes: usize) -> Result<Self> {
        ensure!(
            block_size_bytes > HEADER_BYTES + 2 * BLOCKID_LEN,
            "block size {} too small to hold a node header plus at least two child pointers",
            block_size_bytes
        );
        let payload = block_size_bytes - HEADER_BYTES;
        let inner_fanout = payload / BLOCKID_LEN;
        ensure!(
            inner_fanout >= 2,
            "block size {} gives an inner fanout of {} but at least 2 is required \
             (a fanout of 1 can never raise a subtree's capacity by growing depth)",
            block_size_bytes,
            inner_fanout
        );
        Ok(Self {
            store,
            leaf_max_bytes: payload,
            inner_fanout,
        })
    }

    pub fn leaf_max_bytes(&self) -> usize {
        self.leaf_max_bytes
    }

    pub fn inner_fanout(&self) -> usize {
        self.inner_fanout
    }

    pub fn underlying_block_store(&self) -> &B {
        &self.store
    }

    pub fn create_new_leaf_node(&self, data: &[u8]) -> Result<BlockId> {
        let node = LeafNode::new_with_data(data, self.leaf_max_bytes)?;
        self.store.create(node.serialize().as_ref())
    }

    pub fn create_new_inner_node(&self, depth: u8, children: &[BlockId]) -> Result<BlockId> {
        let node = InnerNode::new_with_children(depth, children, self.inner_fanout)?;
        self.store.create(node.serialize().as_ref())
    }

    /// Copies an already-parsed node's contents into a brand new block,
    /// under a fresh id. Used by the grow algorithm's root-id-stability
    /// trick (§4.5.3 step 1): the old root's bytes move to a new id while
    /// the root id itself is rewritten in place as the new parent.
    pub fn duplicate_into_new_block(&self, node: Node) -> Result<BlockId> {
        self.store.create(node.serialize().as_ref())
    }

    pub fn load(&self, id: &BlockId) -> Result<Option<Node>> {
        match self.store.load(id)? {
            None => Ok(None),
            Some(data) => Ok(Some(Node::parse(
                data,
                self.leaf_max_bytes,
                self.inner_fanout,
            )?)),
        }
    }

    pub fn load_required(&self, id: &BlockId) -> Result<Node> {
        self.load(id)?.ok_or_else(|| {
            anyhow::anyhow!("FilesystemInvalid: tree references missing block {}", id)
        })
    }

    pub fn store_node(&self, id: &BlockId, node: Node) -> Result<()> {
        self.store.store(id, node.serialize().as_ref())
    }

    pub fn remove(&self, id: &BlockId) -> Result<()> {
        self.store.remove(id)?;
        Ok(())
    }
}
