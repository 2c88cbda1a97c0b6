//! The on-disk layout of a single tree node, after the block store's
//! encryption envelope has already been peeled off (§4.5.1's "payload of a
//! block"). Deliberately `const` header sizes so the layout can't drift
//! silently between a reader and a writer built from different commits.

use anyhow::{bail, ensure, Result};

use crate::blockstore::BlockId;
use crate::data::Data;

pub const NODE_FORMAT_VERSION: u16 = 1;

const OFFSET_FORMAT_VERSION: usize = 0;
const OFFSET_DEPTH: usize = 2;
const OFFSET_SIZE: usize = 3;
pub const HEADER_BYTES: usize = 7;

/// A parsed node: either a leaf (depth 0, holding data) or an inner node
/// (depth > 0, holding child ids). Both variants carry the raw framed bytes
/// so serializing back out never has to reconstruct a header from scratch.
#[derive(Clone)]
pub enum Node {
    Leaf(LeafNode),
    Inner(InnerNode),
}

impl Node {
    pub fn parse(data: Data, leaf_max_bytes: usize, inner_fanout: usize) -> Result<Self> {
        ensure!(
            data.len() >= HEADER_BYTES,
            "FilesystemInvalid: node block shorter than header ({} < {})",
            data.len(),
            HEADER_BYTES
        );
        let format_version = u16::from_le_bytes([
            data[OFFSET_FORMAT_VERSION],
            data[OFFSET_FORMAT_VERSION + 1],
        ]);
        ensure!(
            format_version == NODE_FORMAT_VERSION,
            "FilesystemInvalid: unknown node_format_version {}",
            format_version
        );
        let depth = data[OFFSET_DEPTH];
        if depth == 0 {
            Ok(Node::Leaf(LeafNode::parse(data, leaf_max_bytes)?))
        } else {
            Ok(Node::Inner(InnerNode::parse(data, inner_fanout)?))
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            Node::Leaf(_) => 0,
            Node::Inner(inner) => inner.depth(),
        }
    }

    pub fn serialize(self) -> Data {
        match self {
            Node::Leaf(leaf) => leaf.serialize(),
            Node::Inner(inner) => inner.serialize(),
        }
    }

    pub fn into_leaf(self) -> Result<LeafNode> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Inner(_) => bail!("FilesystemInvalid: expected a leaf node but found an inner node"),
        }
    }

    pub fn into_inner(self) -> Result<InnerNode> {
        match self {
            Node::Inner(inner) => Ok(inner),
            Node::Leaf(_) => bail!("FilesystemInvalid: expected an inner node but found a leaf node"),
        }
    }
}

fn write_header(data: &mut Data, depth: u8, size: u32) {
    let buf = data.as_mut();
    buf[OFFSET_FORMAT_VERSION..OFFSET_FORMAT_VERSION + 2]
        .copy_from_slice(&NODE_FORMAT_VERSION.to_le_bytes());
    buf[OFFSET_DEPTH] = depth;
    buf[OFFSET_SIZE..OFFSET_SIZE + 4].copy_from_slice(&size.to_le_bytes());
}

fn read_size(data: &Data) -> u32 {
    let b = data.as_ref();
    u32::from_le_bytes([
        b[OFFSET_SIZE],
        b[OFFSET_SIZE + 1],
        b[OFFSET_SIZE + 2],
        b[OFFSET_SIZE + 3],
    ])
}

/// A leaf node: `size` bytes of payload, zero-padded up to `max_bytes` in the
/// underlying block (so every leaf occupies the same physical block size
/// regardless of how much of it is "used").
#[derive(Clone)]
pub struct LeafNode {
    data: Data,
    max_bytes: usize,
}

impl LeafNode {
    pub fn new_empty(max_bytes: usize) -> Self {
        let mut data = Data::zeroes(0, HEADER_BYTES + max_bytes, 0);
        write_header(&mut data, 0, 0);
        Self { data, max_bytes }
    }

    pub fn new_with_data(source: &[u8], max_bytes: usize) -> Result<Self> {
        ensure!(
            source.len() <= max_bytes,
            "leaf payload of {} bytes exceeds max_bytes {}",
            source.len(),
            max_bytes
        );
        let mut node = Self::new_empty(max_bytes);
        node.write(0, source);
        node.set_num_bytes(source.len() as u32);
        Ok(node)
    }

    fn parse(data: Data, max_bytes: usize) -> Result<Self> {
        let size = read_size(&data);
        ensure!(
            size as usize <= max_bytes,
            "FilesystemInvalid: leaf claims {} used bytes but max is {}",
            size,
            max_bytes
        );
        ensure!(
            data.len() >= HEADER_BYTES + max_bytes,
            "FilesystemInvalid: leaf block too short for configured block size"
        );
        Ok(Self { data, max_bytes })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn num_bytes(&self) -> u32 {
        read_size(&self.data)
    }

    pub fn set_num_bytes(&mut self, new_size: u32) {
        assert!(new_size as usize <= self.max_bytes);
        let depth = 0;
        write_header(&mut self.data, depth, new_size);
    }

    pub fn data(&self) -> &[u8] {
        let used = self.num_bytes() as usize;
        &self.data.as_ref()[HEADER_BYTES..HEADER_BYTES + used]
    }

    /// Overwrites `[offset, offset+source.len())`, zero-filling any newly
    /// exposed bytes between the old used-length and `offset` if this call
    /// also grows `num_bytes` (the grow algorithm is responsible for calling
    /// [Self::set_num_bytes] separately; this only ever writes bytes that are
    /// already within `max_bytes`).
    pub fn write(&mut self, offset: usize, source: &[u8]) {
        assert!(offset + source.len() <= self.max_bytes);
        let start = HEADER_BYTES + offset;
        self.data.as_mut()[start..start + source.len()].copy_from_slice(source);
    }

    pub fn serialize(self) -> Data {
        self.data
    }
}

/// An inner node: `num_children` child block ids, each [BlockId] bytes.
#[derive(Clone)]
pub struct InnerNode {
    data: Data,
    max_children: usize,
}

impl InnerNode {
    pub fn new_with_children(depth: u8, children: &[BlockId], max_children: usize) -> Result<Self> {
        ensure!(depth > 0, "inner node must have depth > 0");
        ensure!(!children.is_empty(), "inner node must have at least one child");
        ensure!(
            children.len() <= max_children,
            "tried to create an inner node with {} children but fanout is {}",
            children.len(),
            max_children
        );
        let mut data = Data::zeroes(
            0,
            HEADER_BYTES + max_children * crate::blockstore::BLOCKID_LEN,
            0,
        );
        write_header(&mut data, depth, children.len() as u32);
        let mut node = Self { data, max_children };
        for (i, child) in children.iter().enumerate() {
            node.set_child(i as u32, *child);
        }
        Ok(node)
    }

    fn parse(data: Data, max_children: usize) -> Result<Self> {
        let size = read_size(&data);
        ensure!(
            size >= 1 && size as usize <= max_children,
            "FilesystemInvalid: inner node claims {} children but fanout is {}",
            size,
            max_children
        );
        ensure!(
            data.len() >= HEADER_BYTES + max_children * crate::blockstore::BLOCKID_LEN,
            "FilesystemInvalid: inner node block too short for configured block size"
        );
        Ok(Self { data, max_children })
    }

    pub fn depth(&self) -> u8 {
        self.data.as_ref()[OFFSET_DEPTH]
    }

    pub fn num_children(&self) -> u32 {
        read_size(&self.data)
    }

    pub fn max_children(&self) -> usize {
        self.max_children
    }

    pub fn child(&self, index: u32) -> BlockId {
        assert!(index < self.num_children());
        let start = HEADER_BYTES + index as usize * crate::blockstore::BLOCKID_LEN;
        let mut bytes = [0u8; crate::blockstore::BLOCKID_LEN];
        bytes.copy_from_slice(&self.data.as_ref()[start..start + crate::blockstore::BLOCKID_LEN]);
        BlockId::from_array(bytes)
    }

    pub fn last_child(&self) -> BlockId {
        self.child(self.num_children() - 1)
    }

    pub fn children(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.num_children()).map(move |i| self.child(i))
    }

    fn set_child(&mut self, index: u32, id: BlockId) {
        let start = HEADER_BYTES + index as usize * crate::blockstore::BLOCKID_LEN;
        self.data.as_mut()[start..start + crate::blockstore::BLOCKID_LEN].copy_from_slice(id.data());
    }

    pub fn add_child(&mut self, id: BlockId) -> Result<()> {
        let n = self.num_children();
        ensure!(
            (n as usize) < self.max_children,
            "FilesystemInvalid: inner node already at max fanout {}",
            self.max_children
        );
        self.set_child(n, id);
        let depth = self.depth();
        write_header(&mut self.data, depth, n + 1);
        Ok(())
    }

    /// Drops the last child, returning its id so the caller can remove the
    /// block it points to.
    pub fn pop_last_child(&mut self) -> Result<BlockId> {
        let n = self.num_children();
        ensure!(n >= 1, "cannot pop from an inner node with no children");
        let id = self.child(n - 1);
        let depth = self.depth();
        write_header(&mut self.data, depth, n - 1);
        Ok(id)
    }

    pub fn serialize(self) -> Data {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_roundtrips_through_serialize_and_parse() {
        let leaf = LeafNode::new_with_data(b"hello", 100).unwrap();
        let data = leaf.serialize();
        let parsed = Node::parse(data, 100, 10).unwrap().into_leaf().unwrap();
        assert_eq!(b"hello", parsed.data());
    }

    #[test]
    fn inner_roundtrips_through_serialize_and_parse() {
        let children = vec![BlockId::new_random(), BlockId::new_random()];
        let inner = InnerNode::new_with_children(1, &children, 10).unwrap();
        let data = inner.serialize();
        let parsed = Node::parse(data, 100, 10).unwrap().into_inner().unwrap();
        assert_eq!(2, parsed.num_children());
        assert_eq!(children[0], parsed.child(0));
        assert_eq!(children[1], parsed.child(1));
    }

    #[test]
    fn inner_add_and_pop_child() {
        let first = BlockId::new_random();
        let mut inner = InnerNode::new_with_children(1, &[first], 10).unwrap();
        let second = BlockId::new_random();
        inner.add_child(second).unwrap();
        assert_eq!(2, inner.num_children());
        assert_eq!(second, inner.pop_last_child().unwrap());
        assert_eq!(1, inner.num_children());
    }

    #[test]
    fn leaf_rejects_oversized_payload() {
        assert!(LeafNode::new_with_data(&[0u8; 10], 5).is_err());
    }
}
