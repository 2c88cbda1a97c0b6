//! Newtype wrapper boilerplate for the "optimized" write path.
//!
//! Each layer of the block store stack (on-disk, compressing, encrypted,
//! caching) wants to hand the caller a buffer with exactly the right amount of
//! prefix space pre-reserved for *its own* header, so that the next layer down
//! can prepend its header in place instead of reallocating. [IBlockData] is
//! the capability every such wrapper exposes; [create_block_data_wrapper]
//! generates the boilerplate newtype so each layer doesn't repeat it by hand.

use crate::data::Data;

pub trait IBlockData: AsRef<[u8]> + AsMut<[u8]> {
    fn new(data: Data) -> Self;
    fn extract(self) -> Data;
}

#[macro_export]
macro_rules! create_block_data_wrapper {
    ($name:ident) => {
        pub struct $name($crate::data::Data);

        impl $crate::blockstore::block_data::IBlockData for $name {
            fn new(data: $crate::data::Data) -> Self {
                Self(data)
            }

            fn extract(self) -> $crate::data::Data {
                self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }

        impl AsMut<[u8]> for $name {
            fn as_mut(&mut self) -> &mut [u8] {
                self.0.as_mut()
            }
        }
    };
}

pub use create_block_data_wrapper;
