//! Device filesystem (devfs): `/dev/null`, `/dev/zero`, `/dev/console`
//! (aliased as `/dev/tty`), plus whatever block/character devices the
//! drivers register (`/dev/ata0`, ...).
//!
//! `DevFs` is itself a directory [`Inode`] so the generic mount table can
//! graft it at `/dev` like any other filesystem; individual device nodes
//! are leaves and lean on the trait's default `NotImplemented`/`NotADirectory`
//! bodies for every operation they don't support.

use crate::vfs::{FileType, Inode, VfsError};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// Discards all writes, returns EOF on reads.
    Null,
    /// Infinite stream of zero bytes.
    Zero,
    /// Keyboard input / VGA+serial output.
    Console,
}

pub struct DeviceNode {
    dev_type: DeviceType,
}

impl DeviceNode {
    pub fn new(dev_type: DeviceType) -> Arc<Self> {
        Arc::new(Self { dev_type })
    }
}

impl Inode for DeviceNode {
    fn read(&self, _offset: usize, buffer: &mut [u8]) -> Result<usize, VfsError> {
        match self.dev_type {
            DeviceType::Null => Ok(0),
            DeviceType::Zero => {
                for byte in buffer.iter_mut() {
                    *byte = 0;
                }
                Ok(buffer.len())
            }
            DeviceType::Console => crate::keyboard::read(buffer),
        }
    }

    fn write(&self, _offset: usize, buffer: &[u8]) -> Result<usize, VfsError> {
        match self.dev_type {
            DeviceType::Null => Ok(buffer.len()),
            DeviceType::Zero => Err(VfsError::PermissionDenied),
            DeviceType::Console => {
                use crate::{print, serial_print};
                if let Ok(s) = core::str::from_utf8(buffer) {
                    print!("{}", s);
                    serial_print!("{}", s);
                    Ok(buffer.len())
                } else {
                    Err(VfsError::InvalidArgument)
                }
            }
        }
    }

    fn file_type(&self) -> FileType {
        FileType::Device
    }
}

/// A registered block device, backed by a driver's `read_sector`/`write_sector`.
pub trait BlockDevice: Send + Sync {
    fn read_sector(&self, lba: u32, buf: &mut [u8; 512]) -> Result<(), VfsError>;
    fn write_sector(&self, lba: u32, buf: &[u8; 512]) -> Result<(), VfsError>;
    fn sector_count(&self) -> u32;
}

pub struct BlockDeviceNode {
    device: Arc<dyn BlockDevice>,
}

impl BlockDeviceNode {
    pub fn new(device: Arc<dyn BlockDevice>) -> Arc<Self> {
        Arc::new(Self { device })
    }
}

impl Inode for BlockDeviceNode {
    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<usize, VfsError> {
        if offset % 512 != 0 || buffer.len() < 512 {
            return Err(VfsError::InvalidArgument);
        }
        let lba = (offset / 512) as u32;
        let mut sector = [0u8; 512];
        self.device.read_sector(lba, &mut sector)?;
        buffer[..512].copy_from_slice(&sector);
        Ok(512)
    }

    fn write(&self, offset: usize, buffer: &[u8]) -> Result<usize, VfsError> {
        if offset % 512 != 0 || buffer.len() < 512 {
            return Err(VfsError::InvalidArgument);
        }
        let lba = (offset / 512) as u32;
        let mut sector = [0u8; 512];
        sector.copy_from_slice(&buffer[..512]);
        self.device.write_sector(lba, &sector)?;
        Ok(512)
    }

    fn size(&self) -> usize {
        self.device.sector_count() as usize * 512
    }

    fn file_type(&self) -> FileType {
        FileType::Device
    }
}

pub struct DevFs {
    devices: Mutex<Vec<(String, Arc<dyn Inode>)>>,
}

impl DevFs {
    pub fn new() -> Arc<Self> {
        let devfs = Arc::new(Self {
            devices: Mutex::new(Vec::new()),
        });
        devfs.register("null", DeviceNode::new(DeviceType::Null));
        devfs.register("zero", DeviceNode::new(DeviceType::Zero));
        devfs.register("console", DeviceNode::new(DeviceType::Console));
        devfs.register("tty", DeviceNode::new(DeviceType::Console));
        devfs
    }

    pub fn register(&self, name: &str, node: Arc<dyn Inode>) {
        let mut devices = self.devices.lock();
        devices.retain(|(n, _)| n != name);
        devices.push((String::from(name), node));
    }
}

impl Inode for DevFs {
    fn file_type(&self) -> FileType {
        FileType::Directory
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Inode>, VfsError> {
        let devices = self.devices.lock();
        devices
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node.clone())
            .ok_or(VfsError::NotFound)
    }

    fn list(&self) -> Result<Vec<String>, VfsError> {
        Ok(self.devices.lock().iter().map(|(n, _)| n.clone()).collect())
    }

    fn create(&self, _name: &str, _file_type: FileType) -> Result<Arc<dyn Inode>, VfsError> {
        Err(VfsError::PermissionDenied)
    }

    fn unlink(&self, _name: &str) -> Result<(), VfsError> {
        Err(VfsError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reads_eof_and_discards_writes() {
        let node = DeviceNode::new(DeviceType::Null);
        let mut buf = [1u8; 8];
        assert_eq!(node.read(0, &mut buf).unwrap(), 0);
        assert_eq!(node.write(0, b"ignored").unwrap(), 7);
    }

    #[test]
    fn zero_fills_buffer_and_rejects_writes() {
        let node = DeviceNode::new(DeviceType::Zero);
        let mut buf = [0xFFu8; 8];
        assert_eq!(node.read(0, &mut buf).unwrap(), 8);
        assert!(buf.iter().all(|&b| b == 0));
        assert!(matches!(node.write(0, b"x"), Err(VfsError::PermissionDenied)));
    }

    #[test]
    fn devfs_lists_standard_nodes() {
        let devfs = DevFs::new();
        let names = devfs.list().unwrap();
        assert!(names.contains(&String::from("null")));
        assert!(names.contains(&String::from("zero")));
        assert!(names.contains(&String::from("console")));
        assert!(names.contains(&String::from("tty")));
    }

    #[test]
    fn devfs_create_is_rejected() {
        let devfs = DevFs::new();
        assert!(matches!(devfs.create("bogus", FileType::Regular), Err(VfsError::PermissionDenied)));
    }

    struct FakeBlock {
        sectors: Mutex<Vec<[u8; 512]>>,
    }

    impl BlockDevice for FakeBlock {
        fn read_sector(&self, lba: u32, buf: &mut [u8; 512]) -> Result<(), VfsError> {
            *buf = *self.sectors.lock().get(lba as usize).ok_or(VfsError::InvalidArgument)?;
            Ok(())
        }
        fn write_sector(&self, lba: u32, buf: &[u8; 512]) -> Result<(), VfsError> {
            let mut sectors = self.sectors.lock();
            let slot = sectors.get_mut(lba as usize).ok_or(VfsError::InvalidArgument)?;
            *slot = *buf;
            Ok(())
        }
        fn sector_count(&self) -> u32 {
            self.sectors.lock().len() as u32
        }
    }

    #[test]
    fn block_device_node_round_trips_a_sector() {
        let fake = Arc::new(FakeBlock { sectors: Mutex::new(alloc::vec![[0u8; 512]; 4]) });
        let node = BlockDeviceNode::new(fake);
        let mut data = [0xABu8; 512];
        node.write(512, &data).unwrap();
        data = [0u8; 512];
        node.read(512, &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0xAB));
    }
}
