//! Tree navigation, growth and shrink for a single blob (§4.5). All
//! arithmetic here is `u64`; nothing about a blob's size, an offset, or a
//! byte count is ever truncated through a 32-bit intermediate (§4.5.6).

use anyhow::{ensure, Result};

use super::datanodestore::DataNodeStore;
use super::node::{InnerNode, LeafNode, Node};
use crate::blockstore::{BlockId, BlockStore};

/// A variable-length byte sequence realized as a balanced tree of blocks,
/// externally named by the id of its root block (§4.5). Borrows the node
/// store it was created or loaded from; the store in turn owns the
/// underlying block-store stack.
pub struct Blob<'s, B: BlockStore> {
    nodestore: &'s DataNodeStore<B>,
    root_id: BlockId,
}

impl<'s, B: BlockStore> Blob<'s, B> {
    pub(super) fn new(nodestore: &'s DataNodeStore<B>, root_id: BlockId) -> Self {
        Self { nodestore, root_id }
    }

    pub fn key(&self) -> BlockId {
        self.root_id
    }

    pub fn size(&self) -> Result<u64> {
        let root = self.nodestore.load_required(&self.root_id)?;
        self._size_of_subtree(&root)
    }

    fn _size_of_subtree(&self, node: &Node) -> Result<u64> {
        match node {
            Node::Leaf(leaf) => Ok(leaf.num_bytes() as u64),
            Node::Inner(inner) => {
                let num_children = inner.num_children() as u64;
                ensure!(
                    num_children >= 1,
                    "FilesystemInvalid: inner node with no children"
                );
                let child_full_size = self._full_subtree_size(inner.depth() - 1);
                let left_size = (num_children - 1) * child_full_size;
                let last_child = self.nodestore.load_required(&inner.last_child())?;
                let last_size = self._size_of_subtree(&last_child)?;
                Ok(left_size + last_size)
            }
        }
    }

    /// How many bytes a fully-packed subtree rooted at `depth` can hold.
    fn _full_subtree_size(&self, depth: u8) -> u64 {
        let k = self.nodestore.inner_fanout() as u64;
        let mut s = self.nodestore.leaf_max_bytes() as u64;
        for _ in 0..depth {
            s = s.saturating_mul(k);
        }
        s
    }

    /// Reads up to `dst.len()` bytes starting at `offset`. Returns the
    /// number of bytes actually read, which is short only at EOF.
    pub fn read(&self, dst: &mut [u8], offset: u64) -> Result<usize> {
        let size = self.size()?;
        if offset >= size {
            return Ok(0);
        }
        let to_read = std::cmp::min(dst.len() as u64, size - offset) as usize;
        let leaf_max = self.nodestore.leaf_max_bytes() as u64;
        let mut pos = offset;
        let mut written = 0usize;
        while written < to_read {
            let leaf_index = pos / leaf_max;
            let leaf_offset = (pos % leaf_max) as usize;
            let leaf_id = self._leaf_id_at(leaf_index)?;
            let leaf = self
                .nodestore
                .load_required(&leaf_id)?
                .into_leaf()?;
            let available = (leaf.num_bytes() as usize).saturating_sub(leaf_offset);
            let n = std::cmp::min(to_read - written, available);
            ensure!(n > 0, "FilesystemInvalid: blob size inconsistent with leaf contents");
            dst[written..written + n].copy_from_slice(&leaf.data()[leaf_offset..leaf_offset + n]);
            written += n;
            pos += n as u64;
        }
        Ok(written)
    }

    /// Writes `src` at `offset`, growing the blob first if this extends past
    /// the current size (§4.5.2).
    pub fn write(&mut self, src: &[u8], offset: u64) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        let end = offset
            .checked_add(src.len() as u64)
            .ok_or_else(|| anyhow::anyhow!("write offset+len overflows u64"))?;
        if end > self.size()? {
            self.resize(end)?;
        }
        let leaf_max = self.nodestore.leaf_max_bytes() as u64;
        let mut pos = offset;
        let mut written = 0usize;
        while written < src.len() {
            let leaf_index = pos / leaf_max;
            let leaf_offset = (pos % leaf_max) as usize;
            let leaf_id = self._leaf_id_at(leaf_index)?;
            let mut leaf = self.nodestore.load_required(&leaf_id)?.into_leaf()?;
            let n = std::cmp::min(src.len() - written, leaf.max_bytes() - leaf_offset);
            leaf.write(leaf_offset, &src[written..written + n]);
            self.nodestore.store_node(&leaf_id, Node::Leaf(leaf))?;
            written += n;
            pos += n as u64;
        }
        Ok(())
    }

    /// Shrinks or grows the blob to `new_size` (§4.5.3, §4.5.4).
    pub fn resize(&mut self, new_size: u64) -> Result<()> {
        let old_size = self.size()?;
        if new_size > old_size {
            self._grow(new_size)
        } else if new_size < old_size {
            self._shrink(new_size)
        } else {
            Ok(())
        }
    }

    /// `flush()` is a no-op at this layer: every [Self::write]/[Self::resize]
    /// call already pushes its node writes down into the node store; the
    /// durability barrier (§5 "flush() is a barrier") lives at the cache
    /// layer underneath (`CachingBlockStore::flush`).
    pub fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Deletes every block of this blob, depth-first, root last, so an
    /// interrupted remove never orphans blocks reachable from a still-valid
    /// root (§4.5.2).
    pub(super) fn remove_entirely(self) -> Result<()> {
        self._delete_subtree(&self.root_id)
    }

    fn _delete_subtree(&self, id: &BlockId) -> Result<()> {
        let node = self.nodestore.load_required(id)?;
        if let Node::Inner(inner) = &node {
            for child in inner.children() {
                self._delete_subtree(&child)?;
            }
        }
        self.nodestore.remove(id)
    }

    /// Finds the id of the leaf holding byte range `[leaf_index*B, (leaf_index+1)*B)`.
    fn _leaf_id_at(&self, leaf_index: u64) -> Result<BlockId> {
        let mut current_id = self.root_id;
        loop {
            let node = self.nodestore.load_required(&current_id)?;
            match node {
                Node::Leaf(_) => return Ok(current_id),
                Node::Inner(inner) => {
                    let depth = inner.depth() as u32;
                    let k = self.nodestore.inner_fanout() as u64;
                    let divisor = pow_u64(k, depth - 1);
                    let child_index = (leaf_index / divisor) % k;
                    ensure!(
                        child_index < inner.num_children() as u64,
                        "FilesystemInvalid: leaf index {} out of range for blob",
                        leaf_index
                    );
                    current_id = inner.child(child_index as u32);
                }
            }
        }
    }

    fn _grow(&mut self, new_size: u64) -> Result<()> {
        loop {
            let root = self.nodestore.load_required(&self.root_id)?;
            if self._full_subtree_size(root.depth()) >= new_size {
                break;
            }
            self._increase_depth(root)?;
        }
        let root = self.nodestore.load_required(&self.root_id)?;
        self._grow_subtree(&self.root_id, root, new_size)
    }

    /// Raises the tree by one level. The root's *contents* move to a freshly
    /// allocated block; the root *id* is rewritten in place to point at that
    /// new block, so the blob's external name never changes (§4.5.3 step 1,
    /// §9 "Root-id stability during depth change").
    fn _increase_depth(&mut self, root: Node) -> Result<()> {
        let old_depth = root.depth();
        let moved_id = self.nodestore.duplicate_into_new_block(root)?;
        let new_root = InnerNode::new_with_children(
            old_depth + 1,
            &[moved_id],
            self.nodestore.inner_fanout(),
        )?;
        self.nodestore.store_node(&self.root_id, Node::Inner(new_root))
    }

    /// Fills/extends the subtree rooted at `node_id` (currently holding
    /// `node`) so it represents exactly `target_size` bytes. `target_size`
    /// must not exceed `_full_subtree_size(node.depth())`.
    fn _grow_subtree(&self, node_id: &BlockId, node: Node, target_size: u64) -> Result<()> {
        match node {
            Node::Leaf(mut leaf) => {
                ensure!(target_size as usize <= leaf.max_bytes());
                leaf.set_num_bytes(target_size as u32);
                self.nodestore.store_node(node_id, Node::Leaf(leaf))
            }
            Node::Inner(mut inner) => {
                let depth = inner.depth();
                let child_full = self._full_subtree_size(depth - 1);
                let num_children = inner.num_children() as u64;
                let needed_children = div_ceil_at_least_one(target_size, child_full);
                ensure!(
                    needed_children >= num_children,
                    "grow target is smaller than current content"
                );
                if needed_children > num_children {
                    let old_last_index = (num_children - 1) as u32;
                    let old_last_id = inner.child(old_last_index);
                    let old_last_node = self.nodestore.load_required(&old_last_id)?;
                    self._grow_subtree(&old_last_id, old_last_node, child_full)?;

                    let mut current_count = num_children;
                    while current_count < needed_children {
                        let is_final = current_count == needed_children - 1;
                        let this_target = if is_final {
                            target_size - current_count * child_full
                        } else {
                            child_full
                        };
                        let new_child_id = self._create_subtree(depth - 1, this_target)?;
                        inner.add_child(new_child_id)?;
                        current_count += 1;
                    }
                } else {
                    let last_index = (num_children - 1) as u32;
                    let last_id = inner.child(last_index);
                    let last_node = self.nodestore.load_required(&last_id)?;
                    let this_target = target_size - last_index as u64 * child_full;
                    self._grow_subtree(&last_id, last_node, this_target)?;
                }
                self.nodestore.store_node(node_id, Node::Inner(inner))
            }
        }
    }

    /// Creates a brand-new subtree of the given depth, pre-filled (with
    /// zeroes) to `target_size` bytes.
    fn _create_subtree(&self, depth: u8, target_size: u64) -> Result<BlockId> {
        if depth == 0 {
            ensure!(target_size as usize <= self.nodestore.leaf_max_bytes());
            let mut leaf = LeafNode::new_empty(self.nodestore.leaf_max_bytes());
            leaf.set_num_bytes(target_size as u32);
            self.nodestore
                .underlying_block_store()
                .create(leaf.serialize().as_ref())
        } else {
            let child_full = self._full_subtree_size(depth - 1);
            let needed_children = div_ceil_at_least_one(target_size, child_full);
            let mut children = Vec::with_capacity(needed_children as usize);
            for i in 0..needed_children {
                let is_final = i == needed_children - 1;
                let this_target = if is_final {
                    target_size - i * child_full
                } else {
                    child_full
                };
                children.push(self._create_subtree(depth - 1, this_target)?);
            }
            self.nodestore.create_new_inner_node(depth, &children)
        }
    }

    fn _shrink(&mut self, new_size: u64) -> Result<()> {
        let root = self.nodestore.load_required(&self.root_id)?;
        self._shrink_subtree(&self.root_id, root, new_size)?;
        self._collapse_root_if_needed()
    }

    fn _shrink_subtree(&self, node_id: &BlockId, node: Node, target_size: u64) -> Result<()> {
        match node {
            Node::Leaf(mut leaf) => {
                ensure!(target_size as usize <= leaf.max_bytes());
                leaf.set_num_bytes(target_size as u32);
                self.nodestore.store_node(node_id, Node::Leaf(leaf))
            }
            Node::Inner(mut inner) => {
                let depth = inner.depth();
                let child_full = self._full_subtree_size(depth - 1);
                let needed_children = div_ceil_at_least_one(target_size, child_full);
                let current_children = inner.num_children() as u64;
                ensure!(
                    needed_children <= current_children,
                    "shrink target requires more children than exist"
                );
                while inner.num_children() as u64 > needed_children {
                    let removed_id = inner.pop_last_child()?;
                    self._delete_subtree(&removed_id)?;
                }
                let last_index = inner.num_children() - 1;
                let last_id = inner.child(last_index);
                let last_node = self.nodestore.load_required(&last_id)?;
                let last_target = target_size - last_index as u64 * child_full;
                self._shrink_subtree(&last_id, last_node, last_target)?;
                self.nodestore.store_node(node_id, Node::Inner(inner))
            }
        }
    }

    /// After a shrink, an inner node that sits on the root path may be left
    /// with exactly one child. Since the root's id can't change, the only
    /// way to drop a level is to copy the surviving child's content up into
    /// the root block and delete the (now-orphaned) child's block (§4.5.4
    /// step 2, §9 "Root-id stability during depth change").
    fn _collapse_root_if_needed(&mut self) -> Result<()> {
        loop {
            let root = self.nodestore.load_required(&self.root_id)?;
            match root {
                Node::Leaf(_) => break,
                Node::Inner(inner) => {
                    if inner.num_children() != 1 {
                        break;
                    }
                    let only_child_id = inner.child(0);
                    let only_child_node = self.nodestore.load_required(&only_child_id)?;
                    self.nodestore.store_node(&self.root_id, only_child_node)?;
                    self.nodestore.remove(&only_child_id)?;
                }
            }
        }
        Ok(())
    }
}

fn pow_u64(base: u64, exp: u32) -> u64 {
    let mut result = 1u64;
    for _ in 0..exp {
        result = result.saturating_mul(base);
    }
    result
}

/// `ceil(target / unit)`, but never less than 1 (an empty blob is still one
/// empty leaf).
fn div_ceil_at_least_one(target: u64, unit: u64) -> u64 {
    if target == 0 {
        1
    } else {
        (target + unit - 1) / unit
    }
}
