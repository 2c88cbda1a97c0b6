//! A byte buffer that remembers how much unused prefix/suffix capacity it has,
//! so headers can be prepended without a reallocation and copy.
//!
//! This plays the role of `cpputils::Data` in the original C++ implementation:
//! block-store layers wrap each other's payload in place, growing a region at
//! the front (to prepend a header) or shrinking it (to peel one off) without
//! ever touching the underlying allocation unless they have to.

use std::ops::{Deref, DerefMut, Range};

use anyhow::{ensure, Result};

/// A `Vec<u8>`-backed buffer with a "logical window" `[start, end)` that can grow
/// into unused prefix/suffix bytes or shrink without reallocating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Data {
    storage: Vec<u8>,
    start: usize,
    end: usize,
}

impl Data {
    pub fn from_vec(storage: Vec<u8>) -> Self {
        let end = storage.len();
        Self {
            storage,
            start: 0,
            end,
        }
    }

    /// A zero-filled buffer with `prefix_bytes` unused bytes before the logical
    /// window and `suffix_bytes` unused bytes after it.
    pub fn zeroes(prefix_bytes: usize, size: usize, suffix_bytes: usize) -> Self {
        let storage = vec![0u8; prefix_bytes + size + suffix_bytes];
        Self {
            storage,
            start: prefix_bytes,
            end: prefix_bytes + size,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn available_prefix_bytes(&self) -> usize {
        self.start
    }

    pub fn available_suffix_bytes(&self) -> usize {
        self.storage.len() - self.end
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.as_ref().starts_with(prefix)
    }

    /// Shrinks the logical window to `range`, interpreted relative to the
    /// current window. Never reallocates.
    pub fn into_subregion(mut self, range: Range<usize>) -> Self {
        self.shrink_to_subregion(range);
        self
    }

    pub fn shrink_to_subregion(&mut self, range: Range<usize>) {
        assert!(
            range.end <= self.len(),
            "tried to shrink a {}-byte region to {}..{}",
            self.len(),
            range.start,
            range.end
        );
        let new_end = self.start + range.end;
        let new_start = self.start + range.start;
        self.end = new_end;
        self.start = new_start;
    }

    /// Grows the logical window by `add_prefix`/`add_suffix` bytes, reallocating
    /// (and copying) only if there isn't enough spare capacity already.
    pub fn grow_region(&mut self, add_prefix: usize, add_suffix: usize) {
        if self.available_prefix_bytes() >= add_prefix && self.available_suffix_bytes() >= add_suffix
        {
            self.start -= add_prefix;
            self.end += add_suffix;
            return;
        }
        let len = self.len();
        let mut new_storage = vec![0u8; add_prefix + len + add_suffix];
        new_storage[add_prefix..add_prefix + len].copy_from_slice(self.as_ref());
        self.storage = new_storage;
        self.start = add_prefix;
        self.end = add_prefix + len;
    }

    /// Like [Self::grow_region] but returns an error instead of reallocating.
    /// Used on hot paths (per-block header prepend) where a reallocation would
    /// indicate a sizing bug upstream.
    pub fn grow_region_fail_if_reallocation_necessary(
        &mut self,
        add_prefix: usize,
        add_suffix: usize,
    ) -> Result<()> {
        ensure!(
            self.available_prefix_bytes() >= add_prefix,
            "Tried to grow prefix by {} bytes but only {} available",
            add_prefix,
            self.available_prefix_bytes()
        );
        ensure!(
            self.available_suffix_bytes() >= add_suffix,
            "Tried to grow suffix by {} bytes but only {} available",
            add_suffix,
            self.available_suffix_bytes()
        );
        self.start -= add_prefix;
        self.end += add_suffix;
        Ok(())
    }
}

impl From<Vec<u8>> for Data {
    fn from(storage: Vec<u8>) -> Self {
        Self::from_vec(storage)
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.storage[self.start..self.end]
    }
}

impl AsMut<[u8]> for Data {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.start..self.end]
    }
}

impl Deref for Data {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

impl DerefMut for Data {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_plain_vec() {
        let data: Data = vec![1, 2, 3, 4].into();
        assert_eq!(data.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(0, data.available_prefix_bytes());
        assert_eq!(0, data.available_suffix_bytes());
    }

    #[test]
    fn shrinks_without_reallocating() {
        let data = Data::zeroes(5, 10, 3);
        let sub = data.into_subregion(2..8);
        assert_eq!(6, sub.len());
        assert_eq!(7, sub.available_prefix_bytes());
        assert_eq!(5, sub.available_suffix_bytes());
    }

    #[test]
    fn grows_back_into_freed_prefix() {
        let data = Data::zeroes(5, 10, 3);
        let mut sub = data.into_subregion(2..10);
        sub.grow_region_fail_if_reallocation_necessary(2, 0)
            .unwrap();
        assert_eq!(10, sub.len());
        assert_eq!(1, sub.available_prefix_bytes());
    }

    #[test]
    fn fails_to_grow_past_available_prefix() {
        let data = Data::zeroes(1, 10, 0);
        let mut sub = data.into_subregion(0..10);
        assert!(sub
            .grow_region_fail_if_reallocation_necessary(2, 0)
            .is_err());
    }

    #[test]
    fn grow_region_reallocates_when_necessary() {
        let data: Data = vec![1, 2, 3].into();
        let mut data = data;
        data.grow_region(2, 1);
        assert_eq!(&[0, 0, 1, 2, 3, 0], data.as_ref());
    }
}
