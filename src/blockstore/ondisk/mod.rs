//! Persists blocks as individual files in a sharded directory tree:
//! `basedir/<first-byte-hex>/<remaining-hex>` (§4.1, §6). The two-level
//! fanout keeps any single directory's entry count bounded even with millions
//! of blocks.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};

use super::block_data::IBlockData;
use super::{BlockId, BlockStoreDeleter, BlockStoreReader, OptimizedBlockStoreWriter, RemoveResult, TryCreateResult};
use crate::create_block_data_wrapper;
use crate::data::Data;

create_block_data_wrapper!(BlockData);

pub struct OnDiskBlockStore {
    basedir: PathBuf,
}

impl OnDiskBlockStore {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
        }
    }

    fn path_for(&self, id: &BlockId) -> PathBuf {
        let (dir, file) = id.to_path_fragments();
        self.basedir.join(dir).join(file)
    }

    fn shard_dir_for(&self, id: &BlockId) -> PathBuf {
        let (dir, _file) = id.to_path_fragments();
        self.basedir.join(dir)
    }

    fn write_atomically(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path
            .parent()
            .context("block path unexpectedly has no parent directory")?;
        fs::create_dir_all(dir)?;
        let tmp_path = dir.join(format!(".{}.tmp", uuid_like_suffix()));
        {
            let mut tmp_file = fs::File::create(&tmp_path)?;
            tmp_file.write_all(data)?;
            tmp_file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn uuid_like_suffix() -> String {
    let id = BlockId::new_random();
    id.as_hex()
}

impl BlockStoreReader for OnDiskBlockStore {
    fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        let path = self.path_for(id);
        match fs::read(&path) {
            Ok(content) => {
                debug!("loaded block {} ({} bytes)", id, content.len());
                Ok(Some(content.into()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn num_blocks(&self) -> Result<u64> {
        Ok(self.all_blocks()?.count() as u64)
    }

    fn estimate_num_free_bytes(&self) -> Result<u64> {
        estimate_free_bytes(&self.basedir)
    }

    fn block_size_from_physical_block_size(&self, block_size: u64) -> Result<u64> {
        // The on-disk store adds no framing of its own; the physical size on
        // disk equals the logical size handed to it.
        Ok(block_size)
    }

    fn all_blocks(&self) -> Result<Box<dyn Iterator<Item = BlockId>>> {
        let mut result = Vec::new();
        if !self.basedir.exists() {
            return Ok(Box::new(result.into_iter()));
        }
        for shard_entry in fs::read_dir(&self.basedir)? {
            let shard_entry = shard_entry?;
            if !shard_entry.file_type()?.is_dir() {
                continue;
            }
            let shard_name = shard_entry.file_name();
            let shard_name = shard_name.to_string_lossy();
            if shard_name.len() != 2 {
                continue;
            }
            for block_entry in fs::read_dir(shard_entry.path())? {
                let block_entry = block_entry?;
                if !block_entry.file_type()?.is_file() {
                    continue;
                }
                let file_name = block_entry.file_name();
                let file_name = file_name.to_string_lossy();
                let full_hex = format!("{}{}", shard_name, file_name);
                match BlockId::from_hex(&full_hex) {
                    Ok(id) => result.push(id),
                    Err(_) => warn!("ignoring non-block file in basedir: {}", full_hex),
                }
            }
        }
        Ok(Box::new(result.into_iter()))
    }
}

impl BlockStoreDeleter for OnDiskBlockStore {
    fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(RemoveResult::SuccessfullyRemoved),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RemoveResult::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

impl OptimizedBlockStoreWriter for OnDiskBlockStore {
    type BlockData = BlockData;

    fn allocate(size: usize) -> Self::BlockData {
        BlockData::new(Data::zeroes(0, size, 0))
    }

    fn try_create_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<TryCreateResult> {
        let path = self.path_for(id);
        if path.exists() {
            return Ok(TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists);
        }
        fs::create_dir_all(self.shard_dir_for(id))?;
        // O_CREAT|O_EXCL via OpenOptions::create_new: atomically fails if the
        // id was raced into existence between the check above and here.
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(data.as_ref())?;
                file.sync_all()?;
                Ok(TryCreateResult::SuccessfullyCreated)
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn store_optimized(&self, id: &BlockId, data: Self::BlockData) -> Result<()> {
        let path = self.path_for(id);
        self.write_atomically(&path, data.as_ref())
    }
}

#[cfg(unix)]
fn estimate_free_bytes(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    fs::create_dir_all(path)?;
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        // Best-effort only (§4.1): callers only use this number advisorily.
        return Ok(0);
    }
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
fn estimate_free_bytes(_path: &Path) -> Result<u64> {
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let store = OnDiskBlockStore::new(dir.path());
        let id = store.create(b"hello world").unwrap();
        assert_eq!(Some(Data::from(b"hello world".to_vec())), store.load(&id).ok().flatten());
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = OnDiskBlockStore::new(dir.path());
        let id = BlockId::new_random();
        assert_eq!(None, store.load(&id).unwrap());
    }

    #[test]
    fn store_overwrites_existing_contents() {
        let dir = tempdir().unwrap();
        let store = OnDiskBlockStore::new(dir.path());
        let id = store.create(b"first").unwrap();
        store.store(&id, b"second").unwrap();
        assert_eq!(Data::from(b"second".to_vec()), store.load(&id).unwrap().unwrap());
    }

    #[test]
    fn remove_reports_not_found_for_missing_block() {
        let dir = tempdir().unwrap();
        let store = OnDiskBlockStore::new(dir.path());
        let id = BlockId::new_random();
        assert_eq!(RemoveResult::NotFound, store.remove(&id).unwrap());
    }

    #[test]
    fn remove_deletes_block() {
        let dir = tempdir().unwrap();
        let store = OnDiskBlockStore::new(dir.path());
        let id = store.create(b"data").unwrap();
        assert_eq!(RemoveResult::SuccessfullyRemoved, store.remove(&id).unwrap());
        assert_eq!(None, store.load(&id).unwrap());
    }

    #[test]
    fn all_blocks_lists_every_stored_block() {
        let dir = tempdir().unwrap();
        let store = OnDiskBlockStore::new(dir.path());
        let id1 = store.create(b"a").unwrap();
        let id2 = store.create(b"b").unwrap();
        let mut found: Vec<_> = store.all_blocks().unwrap().collect();
        found.sort();
        let mut expected = vec![id1, id2];
        expected.sort();
        assert_eq!(expected, found);
    }

    #[test]
    fn shards_by_first_hex_byte() {
        let dir = tempdir().unwrap();
        let store = OnDiskBlockStore::new(dir.path());
        let id = store.create(b"x").unwrap();
        let (shard, _) = id.to_path_fragments();
        assert!(dir.path().join(shard).is_dir());
    }
}
