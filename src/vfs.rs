//! Virtual Filesystem (VFS) layer
//!
//! Provides a unified interface for all filesystems through inode abstraction

use alloc::string::String;
use alloc::vec::Vec;
use alloc::sync::Arc;
use core::fmt;
use spin::Mutex;

/// File types supported by the VFS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum FileType {
    Regular,
    Directory,
    Device,
    Symlink,
}

/// File open flags
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    #[allow(dead_code)]
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
        }
    }

    #[allow(dead_code)]
    pub const fn write_only() -> Self {
        Self {
            read: false,
            write: true,
            append: false,
            create: false,
            truncate: false,
        }
    }

    pub const fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            append: false,
            create: false,
            truncate: false,
        }
    }
}

/// Inode - represents a file or directory in the filesystem.
///
/// Expressed as a capability table: every operation a vnode doesn't
/// support (a character device has no children to `lookup`, a directory
/// has no bytes to `read`) just keeps the default `NotImplemented` body
/// instead of every backend hand-writing the same stub.
#[allow(dead_code)]
pub trait Inode: Send + Sync {
    /// Read data from the inode at the given offset
    fn read(&self, _offset: usize, _buffer: &mut [u8]) -> Result<usize, VfsError> {
        Err(VfsError::NotImplemented)
    }

    /// Write data to the inode at the given offset
    fn write(&self, _offset: usize, _buffer: &[u8]) -> Result<usize, VfsError> {
        Err(VfsError::NotImplemented)
    }

    /// Get the file type
    fn file_type(&self) -> FileType;

    /// Get the file size in bytes
    fn size(&self) -> usize {
        0
    }

    /// Lookup a child entry by name (for directories)
    fn lookup(&self, _name: &str) -> Result<Arc<dyn Inode>, VfsError> {
        Err(VfsError::NotADirectory)
    }

    /// Create a new file or directory
    fn create(&self, _name: &str, _file_type: FileType) -> Result<Arc<dyn Inode>, VfsError> {
        Err(VfsError::NotADirectory)
    }

    /// Remove a child entry by name (for directories)
    fn unlink(&self, _name: &str) -> Result<(), VfsError> {
        Err(VfsError::NotADirectory)
    }

    /// List directory entries (for directories)
    fn list(&self) -> Result<Vec<String>, VfsError> {
        Err(VfsError::NotADirectory)
    }

    /// Truncate the file to the given size
    fn truncate(&self, _size: usize) -> Result<(), VfsError> {
        Err(VfsError::NotImplemented)
    }
}

/// Errors that can occur in the VFS layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum VfsError {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    PermissionDenied,
    InvalidArgument,
    IoError,
    NotImplemented,
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VfsError::NotFound => write!(f, "File or directory not found"),
            VfsError::AlreadyExists => write!(f, "File or directory already exists"),
            VfsError::NotADirectory => write!(f, "Not a directory"),
            VfsError::IsADirectory => write!(f, "Is a directory"),
            VfsError::PermissionDenied => write!(f, "Permission denied"),
            VfsError::InvalidArgument => write!(f, "Invalid argument"),
            VfsError::IoError => write!(f, "I/O error"),
            VfsError::NotImplemented => write!(f, "Not implemented"),
        }
    }
}

/// File descriptor - represents an open file
pub struct FileDescriptor {
    inode: Arc<dyn Inode>,
    offset: Mutex<usize>,
    flags: OpenFlags,
}

#[allow(dead_code)]
impl FileDescriptor {
    pub fn new(inode: Arc<dyn Inode>, flags: OpenFlags) -> Self {
        Self {
            inode,
            offset: Mutex::new(0),
            flags,
        }
    }

    /// Read from the file at the current offset
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, VfsError> {
        if !self.flags.read {
            return Err(VfsError::PermissionDenied);
        }

        let mut offset = self.offset.lock();
        let bytes_read = self.inode.read(*offset, buffer)?;
        *offset += bytes_read;
        Ok(bytes_read)
    }

    /// Write to the file at the current offset
    pub fn write(&self, buffer: &[u8]) -> Result<usize, VfsError> {
        if !self.flags.write {
            return Err(VfsError::PermissionDenied);
        }

        let mut offset = self.offset.lock();
        let bytes_written = self.inode.write(*offset, buffer)?;
        *offset += bytes_written;
        Ok(bytes_written)
    }

    /// Seek to a new position in the file
    pub fn seek(&self, position: usize) -> Result<(), VfsError> {
        *self.offset.lock() = position;
        Ok(())
    }

    /// Get the current file offset
    pub fn tell(&self) -> usize {
        *self.offset.lock()
    }

    /// Get the underlying inode
    pub fn inode(&self) -> &Arc<dyn Inode> {
        &self.inode
    }
}

/// File descriptor table for a process
pub struct FileDescriptorTable {
    descriptors: Mutex<Vec<Option<Arc<FileDescriptor>>>>,
}

#[allow(dead_code)]
impl FileDescriptorTable {
    /// Create a new file descriptor table
    pub fn new() -> Self {
        Self {
            descriptors: Mutex::new(Vec::new()),
        }
    }

    /// Allocate a new file descriptor
    pub fn allocate(&self, fd: Arc<FileDescriptor>) -> Result<usize, VfsError> {
        let mut descriptors = self.descriptors.lock();

        // Try to find an empty slot
        for (i, slot) in descriptors.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(fd);
                return Ok(i);
            }
        }

        // No empty slot, append to the end
        let fd_num = descriptors.len();
        descriptors.push(Some(fd));
        Ok(fd_num)
    }

    /// Get a file descriptor by number
    pub fn get(&self, fd: usize) -> Result<Arc<FileDescriptor>, VfsError> {
        let descriptors = self.descriptors.lock();
        descriptors
            .get(fd)
            .and_then(|slot| slot.clone())
            .ok_or(VfsError::InvalidArgument)
    }

    /// Close a file descriptor
    pub fn close(&self, fd: usize) -> Result<(), VfsError> {
        let mut descriptors = self.descriptors.lock();
        if fd < descriptors.len() {
            descriptors[fd] = None;
            Ok(())
        } else {
            Err(VfsError::InvalidArgument)
        }
    }

    /// Duplicate a file descriptor
    pub fn dup(&self, old_fd: usize) -> Result<usize, VfsError> {
        let fd = self.get(old_fd)?;
        self.allocate(fd)
    }
}

impl Default for FileDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One filesystem grafted onto the vnode tree at `path`.
struct Mount {
    path: String,
    root: Arc<dyn Inode>,
}

/// The mount table plus path resolution: splits a `/`-delimited path,
/// picks the mount with the longest matching prefix, then walks `lookup`
/// through the remaining components relative to that mount's root.
pub struct MountTable {
    mounts: Mutex<Vec<Mount>>,
}

impl MountTable {
    pub const fn new() -> Self {
        MountTable { mounts: Mutex::new(Vec::new()) }
    }

    /// Graft `root` onto the tree at `path` (e.g. `"/"`, `"/dev"`). Replaces
    /// an existing mount at the same path.
    pub fn mount(&self, path: &str, root: Arc<dyn Inode>) {
        let mut mounts = self.mounts.lock();
        mounts.retain(|m| m.path != path);
        mounts.push(Mount { path: String::from(path), root });
        // Longest prefix first so resolution always finds the most specific mount.
        mounts.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
    }

    fn find_mount(&self, path: &str) -> Option<(usize, Arc<dyn Inode>)> {
        let mounts = self.mounts.lock();
        for m in mounts.iter() {
            if m.path == "/" {
                return Some((1, m.root.clone()));
            }
            if path == m.path {
                return Some((m.path.len(), m.root.clone()));
            }
            if path.starts_with(m.path.as_str()) && path.as_bytes().get(m.path.len()) == Some(&b'/') {
                return Some((m.path.len(), m.root.clone()));
            }
        }
        None
    }

    /// Resolve an absolute path to the vnode it names.
    pub fn lookup(&self, path: &str) -> Result<Arc<dyn Inode>, VfsError> {
        if !path.starts_with('/') {
            return Err(VfsError::InvalidArgument);
        }
        let (prefix_len, mut node) = self.find_mount(path).ok_or(VfsError::NotFound)?;
        let remainder = &path[prefix_len.min(path.len())..];

        let mut depth = 0;
        for component in remainder.split('/').filter(|c| !c.is_empty()) {
            depth += 1;
            if depth > crate::config::VFS_MAX_PATH_DEPTH {
                return Err(VfsError::InvalidArgument);
            }
            node = node.lookup(component)?;
        }
        Ok(node)
    }

    /// Resolve the parent directory and final component name of a path,
    /// for operations (`create`, `unlink`) that act on a directory entry.
    fn split_parent<'a>(&self, path: &'a str) -> Result<(Arc<dyn Inode>, &'a str), VfsError> {
        let trimmed = path.trim_end_matches('/');
        let idx = trimmed.rfind('/').ok_or(VfsError::InvalidArgument)?;
        let (parent_path, name) = trimmed.split_at(idx);
        let name = &name[1..];
        if name.is_empty() {
            return Err(VfsError::InvalidArgument);
        }
        let parent_path = if parent_path.is_empty() { "/" } else { parent_path };
        Ok((self.lookup(parent_path)?, name))
    }

    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<FileDescriptor, VfsError> {
        let inode = match self.lookup(path) {
            Ok(inode) => inode,
            Err(VfsError::NotFound) if flags.create => {
                let (parent, name) = self.split_parent(path)?;
                parent.create(name, FileType::Regular)?
            }
            Err(e) => return Err(e),
        };
        if flags.truncate {
            inode.truncate(0)?;
        }
        Ok(FileDescriptor::new(inode, flags))
    }

    pub fn unlink(&self, path: &str) -> Result<(), VfsError> {
        let (parent, name) = self.split_parent(path)?;
        parent.unlink(name)
    }

    pub fn create(&self, path: &str, file_type: FileType) -> Result<Arc<dyn Inode>, VfsError> {
        let (parent, name) = self.split_parent(path)?;
        parent.create(name, file_type)
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

pub static ROOT: MountTable = MountTable::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::TmpFsInode;

    #[test]
    fn lookup_resolves_nested_path_within_a_mount() {
        let table = MountTable::new();
        let root = TmpFsInode::new_directory();
        root.create("etc", FileType::Directory).unwrap();
        let etc = root.lookup("etc").unwrap();
        etc.create("hostname", FileType::Regular).unwrap();
        table.mount("/", root);

        let node = table.lookup("/etc/hostname").unwrap();
        assert_eq!(node.file_type(), FileType::Regular);
    }

    #[test]
    fn longest_prefix_mount_wins() {
        let table = MountTable::new();
        table.mount("/", TmpFsInode::new_directory());
        let dev_root = TmpFsInode::new_directory();
        dev_root.create("console", FileType::Regular).unwrap();
        table.mount("/dev", dev_root);

        // Both "/" and "/dev" are mounted; resolving "/dev/console" must walk
        // from the "/dev" mount's root, not re-walk "/dev" within "/"'s tree.
        let node = table.lookup("/dev/console").unwrap();
        assert_eq!(node.file_type(), FileType::Regular);
    }

    #[test]
    fn open_with_create_makes_a_new_file() {
        let table = MountTable::new();
        table.mount("/", TmpFsInode::new_directory());

        let fd = table.open("/new.txt", OpenFlags { create: true, ..OpenFlags::read_write() }).unwrap();
        fd.write(b"hi").unwrap();
        assert!(table.lookup("/new.txt").is_ok());
    }

    #[test]
    fn open_missing_file_without_create_fails() {
        let table = MountTable::new();
        table.mount("/", TmpFsInode::new_directory());
        assert!(matches!(table.open("/missing", OpenFlags::read_only()), Err(VfsError::NotFound)));
    }

    #[test]
    fn unlink_removes_entry() {
        let table = MountTable::new();
        table.mount("/", TmpFsInode::new_directory());
        table.create("/a.txt", FileType::Regular).unwrap();
        assert!(table.lookup("/a.txt").is_ok());
        table.unlink("/a.txt").unwrap();
        assert!(matches!(table.lookup("/a.txt"), Err(VfsError::NotFound)));
    }

    #[test]
    fn excessive_path_depth_is_rejected() {
        let table = MountTable::new();
        let root = TmpFsInode::new_directory();
        let mut current: Arc<dyn Inode> = root.clone();
        let mut path = String::from("/");
        for i in 0..crate::config::VFS_MAX_PATH_DEPTH + 5 {
            let name = alloc::format!("d{i}");
            current.create(&name, FileType::Directory).unwrap();
            current = current.lookup(&name).unwrap();
            path.push_str(&name);
            path.push('/');
        }
        table.mount("/", root);
        assert!(matches!(table.lookup(path.trim_end_matches('/')), Err(VfsError::InvalidArgument)));
    }
}
