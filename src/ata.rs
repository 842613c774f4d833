//! ATA PIO polling driver for the primary/secondary IDE channels.
//!
//! Polls the status register rather than using the IRQ (`ATA_PRIMARY_VECTOR`
//! is wired up by the interrupt controller but this driver doesn't wait on
//! it) -- simplest correct thing for a PIO driver, matching how the
//! interrupt-driven keyboard driver differs from this synchronous one.

use crate::error::{KernelError, KernelResult};
use x86_64::instructions::port::Port;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaChannel {
    Primary,
    Secondary,
}

impl AtaChannel {
    fn data_port(self) -> u16 {
        match self {
            AtaChannel::Primary => 0x1F0,
            AtaChannel::Secondary => 0x170,
        }
    }
    fn sector_count_port(self) -> u16 {
        self.data_port() + 2
    }
    fn lba_low_port(self) -> u16 {
        self.data_port() + 3
    }
    fn lba_mid_port(self) -> u16 {
        self.data_port() + 4
    }
    fn lba_high_port(self) -> u16 {
        self.data_port() + 5
    }
    fn drive_select_port(self) -> u16 {
        self.data_port() + 6
    }
    fn command_port(self) -> u16 {
        self.data_port() + 7
    }
    fn status_port(self) -> u16 {
        self.command_port()
    }
}

const CMD_IDENTIFY: u8 = 0xEC;
const CMD_READ_SECTORS: u8 = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;

const STATUS_BSY: u8 = 1 << 7;
const STATUS_DRQ: u8 = 1 << 3;
const STATUS_ERR: u8 = 1 << 0;

const DRIVE_SELECT_LBA: u8 = 0xE0; // LBA mode, bit 5/7 always set per spec

fn wait_while_busy(status: &mut Port<u8>) -> KernelResult<u8> {
    // Bounded spin: a PIO drive that never clears BSY is a fault, not a
    // hang-forever condition the kernel should get stuck in.
    for _ in 0..1_000_000u32 {
        let s = unsafe { status.read() };
        if s & STATUS_BSY == 0 {
            return Ok(s);
        }
    }
    Err(KernelError::IoError)
}

fn wait_for_drq(channel: AtaChannel) -> KernelResult<()> {
    let mut status = Port::new(channel.status_port());
    let s = wait_while_busy(&mut status)?;
    if s & STATUS_ERR != 0 {
        return Err(KernelError::IoError);
    }
    for _ in 0..1_000_000u32 {
        let s = unsafe { status.read() };
        if s & STATUS_ERR != 0 {
            return Err(KernelError::IoError);
        }
        if s & STATUS_DRQ != 0 {
            return Ok(());
        }
    }
    Err(KernelError::IoError)
}

fn select_lba28(channel: AtaChannel, is_slave: bool, lba: u32) {
    unsafe {
        Port::new(channel.drive_select_port())
            .write(DRIVE_SELECT_LBA | if is_slave { 0x10 } else { 0 } | (((lba >> 24) & 0x0F) as u8));
        Port::new(channel.lba_low_port()).write((lba & 0xFF) as u8);
        Port::new(channel.lba_mid_port()).write(((lba >> 8) & 0xFF) as u8);
        Port::new(channel.lba_high_port()).write(((lba >> 16) & 0xFF) as u8);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IdentifyInfo {
    pub total_sectors_lba28: u32,
    pub model: [u8; 40],
    pub serial: [u8; 20],
}

/// ATA-string fields store two characters per word, byte-swapped. Unpacks
/// `words` into `out`, restoring natural reading order.
fn unpack_ata_string(words: &[u16], out: &mut [u8]) {
    for (i, w) in words.iter().enumerate() {
        let hi = (w >> 8) as u8;
        let lo = (*w & 0xFF) as u8;
        if i * 2 < out.len() {
            out[i * 2] = hi;
        }
        if i * 2 + 1 < out.len() {
            out[i * 2 + 1] = lo;
        }
    }
}

/// Send IDENTIFY DEVICE and parse the 256-word response.
pub fn identify(channel: AtaChannel, is_slave: bool) -> KernelResult<IdentifyInfo> {
    unsafe {
        Port::new(channel.drive_select_port()).write(DRIVE_SELECT_LBA | if is_slave { 0x10 } else { 0 });
        Port::new(channel.sector_count_port()).write(0u8);
        Port::new(channel.lba_low_port()).write(0u8);
        Port::new(channel.lba_mid_port()).write(0u8);
        Port::new(channel.lba_high_port()).write(0u8);
        Port::new(channel.command_port()).write(CMD_IDENTIFY);
    }

    let status: u8 = unsafe { Port::new(channel.status_port()).read() };
    if status == 0 {
        return Err(KernelError::NotFound); // no drive on this channel/position
    }

    wait_for_drq(channel)?;

    let mut words = [0u16; 256];
    let mut data: Port<u16> = Port::new(channel.data_port());
    for w in words.iter_mut() {
        *w = unsafe { data.read() };
    }

    let total_sectors_lba28 = (words[60] as u32) | ((words[61] as u32) << 16);
    let mut model = [0u8; 40];
    unpack_ata_string(&words[27..47], &mut model);
    let mut serial = [0u8; 20];
    unpack_ata_string(&words[10..20], &mut serial);

    Ok(IdentifyInfo { total_sectors_lba28, model, serial })
}

pub fn read_sector(channel: AtaChannel, is_slave: bool, lba: u32, buf: &mut [u8; 512]) -> KernelResult<()> {
    select_lba28(channel, is_slave, lba);
    unsafe {
        Port::new(channel.sector_count_port()).write(1u8);
        Port::new(channel.command_port()).write(CMD_READ_SECTORS);
    }
    wait_for_drq(channel)?;

    let mut data: Port<u16> = Port::new(channel.data_port());
    for i in 0..256 {
        let word = unsafe { data.read() };
        buf[i * 2] = (word & 0xFF) as u8;
        buf[i * 2 + 1] = (word >> 8) as u8;
    }
    Ok(())
}

pub fn write_sector(channel: AtaChannel, is_slave: bool, lba: u32, buf: &[u8; 512]) -> KernelResult<()> {
    select_lba28(channel, is_slave, lba);
    unsafe {
        Port::new(channel.sector_count_port()).write(1u8);
        Port::new(channel.command_port()).write(CMD_WRITE_SECTORS);
    }
    wait_for_drq(channel)?;

    let mut data: Port<u16> = Port::new(channel.data_port());
    for i in 0..256 {
        let word = (buf[i * 2] as u16) | ((buf[i * 2 + 1] as u16) << 8);
        unsafe { data.write(word) };
    }

    let mut status = Port::new(channel.status_port());
    wait_while_busy(&mut status)?;
    Ok(())
}

/// Devfs-facing wrapper implementing [`crate::devfs::BlockDevice`].
pub struct AtaDevice {
    channel: AtaChannel,
    is_slave: bool,
    sectors: u32,
}

impl AtaDevice {
    pub fn probe(channel: AtaChannel, is_slave: bool) -> Option<Self> {
        let info = identify(channel, is_slave).ok()?;
        Some(AtaDevice { channel, is_slave, sectors: info.total_sectors_lba28 })
    }
}

impl crate::devfs::BlockDevice for AtaDevice {
    fn read_sector(&self, lba: u32, buf: &mut [u8; 512]) -> Result<(), crate::vfs::VfsError> {
        read_sector(self.channel, self.is_slave, lba, buf).map_err(|_| crate::vfs::VfsError::IoError)
    }

    fn write_sector(&self, lba: u32, buf: &[u8; 512]) -> Result<(), crate::vfs::VfsError> {
        write_sector(self.channel, self.is_slave, lba, buf).map_err(|_| crate::vfs::VfsError::IoError)
    }

    fn sector_count(&self) -> u32 {
        self.sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_ata_string_restores_byte_order() {
        // "AB" stored as one word with 'A' in the high byte, 'B' in the low.
        let words = [0x4142u16];
        let mut out = [0u8; 2];
        unpack_ata_string(&words, &mut out);
        assert_eq!(&out, b"AB");
    }

    #[test]
    fn total_sectors_combines_two_words_little_endian() {
        let words = [0x0034u16, 0x0012u16];
        let total = (words[0] as u32) | ((words[1] as u32) << 16);
        assert_eq!(total, 0x0012_0034);
    }
}
