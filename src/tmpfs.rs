//! TmpFS - In-memory filesystem
//!
//! A simple RAM-based filesystem for temporary files and directories

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use alloc::sync::Arc;
use alloc::collections::BTreeMap;
use spin::Mutex;

use crate::config::RAMFS_MIN_CAPACITY;
use crate::vfs::{Inode, FileType, VfsError};

/// TmpFS inode - can be a file or directory
pub struct TmpFsInode {
    inner: Mutex<TmpFsInodeInner>,
}

struct TmpFsInodeInner {
    file_type: FileType,
    data: Vec<u8>,
    children: BTreeMap<String, Arc<TmpFsInode>>,
}

impl TmpFsInode {
    /// Create a new file inode
    pub fn new_file() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(TmpFsInodeInner {
                file_type: FileType::Regular,
                data: Vec::new(),
                children: BTreeMap::new(),
            }),
        })
    }

    /// Create a new directory inode
    pub fn new_directory() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(TmpFsInodeInner {
                file_type: FileType::Directory,
                data: Vec::new(),
                children: BTreeMap::new(),
            }),
        })
    }
}

impl Inode for TmpFsInode {
    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<usize, VfsError> {
        let inner = self.inner.lock();

        if inner.file_type != FileType::Regular {
            return Err(VfsError::IsADirectory);
        }

        if offset >= inner.data.len() {
            return Ok(0);
        }

        let available = inner.data.len() - offset;
        let to_read = buffer.len().min(available);

        buffer[..to_read].copy_from_slice(&inner.data[offset..offset + to_read]);
        Ok(to_read)
    }

    fn write(&self, offset: usize, buffer: &[u8]) -> Result<usize, VfsError> {
        let mut inner = self.inner.lock();

        if inner.file_type != FileType::Regular {
            return Err(VfsError::IsADirectory);
        }

        // Extend the data vector if necessary, doubling capacity (from a
        // floor of RAMFS_MIN_CAPACITY) rather than growing to the exact
        // size needed, to keep repeated small writes off the O(n^2) path.
        let required_size = offset + buffer.len();
        if required_size > inner.data.len() {
            if required_size > inner.data.capacity() {
                let mut new_cap = inner.data.capacity().max(RAMFS_MIN_CAPACITY);
                while new_cap < required_size {
                    new_cap *= 2;
                }
                let additional = new_cap - inner.data.len();
                inner.data.reserve(additional);
            }
            inner.data.resize(required_size, 0);
        }

        // Write the data
        inner.data[offset..offset + buffer.len()].copy_from_slice(buffer);
        Ok(buffer.len())
    }

    fn file_type(&self) -> FileType {
        self.inner.lock().file_type
    }

    fn size(&self) -> usize {
        self.inner.lock().data.len()
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Inode>, VfsError> {
        let inner = self.inner.lock();

        if inner.file_type != FileType::Directory {
            return Err(VfsError::NotADirectory);
        }

        inner
            .children
            .get(name)
            .cloned()
            .map(|inode| inode as Arc<dyn Inode>)
            .ok_or(VfsError::NotFound)
    }

    fn create(&self, name: &str, file_type: FileType) -> Result<Arc<dyn Inode>, VfsError> {
        let mut inner = self.inner.lock();

        if inner.file_type != FileType::Directory {
            return Err(VfsError::NotADirectory);
        }

        if inner.children.contains_key(name) {
            return Err(VfsError::AlreadyExists);
        }

        let new_inode = match file_type {
            FileType::Regular => TmpFsInode::new_file(),
            FileType::Directory => TmpFsInode::new_directory(),
            _ => return Err(VfsError::NotImplemented),
        };

        inner.children.insert(name.to_string(), new_inode.clone());
        Ok(new_inode)
    }

    fn unlink(&self, name: &str) -> Result<(), VfsError> {
        let mut inner = self.inner.lock();

        if inner.file_type != FileType::Directory {
            return Err(VfsError::NotADirectory);
        }

        inner.children.remove(name).map(|_| ()).ok_or(VfsError::NotFound)
    }

    fn list(&self) -> Result<Vec<String>, VfsError> {
        let inner = self.inner.lock();

        if inner.file_type != FileType::Directory {
            return Err(VfsError::NotADirectory);
        }

        Ok(inner.children.keys().cloned().collect())
    }

    fn truncate(&self, size: usize) -> Result<(), VfsError> {
        let mut inner = self.inner.lock();

        if inner.file_type != FileType::Regular {
            return Err(VfsError::IsADirectory);
        }

        inner.data.resize(size, 0);
        Ok(())
    }
}

/// TmpFS filesystem
pub struct TmpFs {
    root: Arc<TmpFsInode>,
}

impl TmpFs {
    /// Create a new TmpFS filesystem
    pub fn new() -> Self {
        Self {
            root: TmpFsInode::new_directory(),
        }
    }

    /// Get the root inode
    pub fn root(&self) -> Arc<dyn Inode> {
        self.root.clone()
    }
}

impl Default for TmpFs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_past_end_extends_file() {
        let file = TmpFsInode::new_file();
        file.write(0, b"hello").unwrap();
        assert_eq!(file.size(), 5);
        file.write(10, b"world").unwrap();
        assert_eq!(file.size(), 15);
        let mut buf = [0u8; 15];
        file.read(0, &mut buf).unwrap();
        assert_eq!(&buf[0..5], b"hello");
        assert_eq!(&buf[10..15], b"world");
    }

    #[test]
    fn small_writes_grow_capacity_geometrically() {
        let file = TmpFsInode::new_file();
        file.write(0, b"x").unwrap();
        for i in 1..300 {
            file.write(i, b"y").unwrap();
        }
        assert_eq!(file.size(), 300);
    }

    #[test]
    fn create_then_lookup_then_unlink() {
        let dir = TmpFsInode::new_directory();
        dir.create("a.txt", FileType::Regular).unwrap();
        assert!(dir.lookup("a.txt").is_ok());
        assert_eq!(dir.list().unwrap(), alloc::vec![String::from("a.txt")]);

        dir.unlink("a.txt").unwrap();
        assert!(matches!(dir.lookup("a.txt"), Err(VfsError::NotFound)));
        assert!(matches!(dir.unlink("a.txt"), Err(VfsError::NotFound)));
    }

    #[test]
    fn create_duplicate_name_fails() {
        let dir = TmpFsInode::new_directory();
        dir.create("x", FileType::Directory).unwrap();
        assert!(matches!(dir.create("x", FileType::Regular), Err(VfsError::AlreadyExists)));
    }
}
