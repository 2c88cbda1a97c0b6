//! Variable-length blobs synthesized from fixed-size blocks (§4.5). The only
//! implementation is [onblocks], the balanced-tree scheme; the module is
//! still split out from `blockstore` because nothing above this layer cares
//! how a blob's bytes map onto blocks.

pub mod onblocks;
