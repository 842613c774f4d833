//! Legacy 8259 PIC pair, remapped off the CPU exception range.
//!
//! Two cascaded 8259s: master on 0x20/0x21, slave on 0xA0/0xA1, slave wired
//! to master IRQ2. Remapped so IRQ0-15 land on vectors 0x20-0x2F.

use x86_64::instructions::port::Port;

pub const PIC1_COMMAND: u16 = 0x20;
pub const PIC1_DATA: u16 = 0x21;
pub const PIC2_COMMAND: u16 = 0xA0;
pub const PIC2_DATA: u16 = 0xA1;

pub const PIC1_VECTOR_OFFSET: u8 = 0x20;
pub const PIC2_VECTOR_OFFSET: u8 = 0x28;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;
const CMD_EOI: u8 = 0x20;
const CMD_READ_ISR: u8 = 0x0B;

pub struct Pic8259 {
    master_cmd: Port<u8>,
    master_data: Port<u8>,
    slave_cmd: Port<u8>,
    slave_data: Port<u8>,
}

impl Pic8259 {
    pub const fn new() -> Self {
        Pic8259 {
            master_cmd: Port::new(PIC1_COMMAND),
            master_data: Port::new(PIC1_DATA),
            slave_cmd: Port::new(PIC2_COMMAND),
            slave_data: Port::new(PIC2_DATA),
        }
    }

    /// Remap both PICs so their vectors land at `offset1`/`offset2`, then
    /// mask every line. Callers unmask the lines they actually service.
    pub unsafe fn initialize(&mut self) {
        let mask1 = self.master_data.read();
        let mask2 = self.slave_data.read();

        self.master_cmd.write(ICW1_INIT | ICW1_ICW4);
        io_wait();
        self.slave_cmd.write(ICW1_INIT | ICW1_ICW4);
        io_wait();

        self.master_data.write(PIC1_VECTOR_OFFSET);
        io_wait();
        self.slave_data.write(PIC2_VECTOR_OFFSET);
        io_wait();

        self.master_data.write(4); // tell master: slave on IRQ2
        io_wait();
        self.slave_data.write(2); // tell slave: its cascade identity
        io_wait();

        self.master_data.write(ICW4_8086);
        io_wait();
        self.slave_data.write(ICW4_8086);
        io_wait();

        self.master_data.write(mask1);
        self.slave_data.write(mask2);
    }

    /// Mask every line on both PICs. Used when switching to APIC/IOAPIC.
    pub unsafe fn disable(&mut self) {
        self.master_data.write(0xFF);
        self.slave_data.write(0xFF);
    }

    pub unsafe fn mask(&mut self, irq: u8) {
        if irq < 8 {
            let v = self.master_data.read();
            self.master_data.write(v | (1 << irq));
        } else {
            let v = self.slave_data.read();
            self.slave_data.write(v | (1 << (irq - 8)));
        }
    }

    pub unsafe fn unmask(&mut self, irq: u8) {
        if irq < 8 {
            let v = self.master_data.read();
            self.master_data.write(v & !(1 << irq));
        } else {
            let v = self.slave_data.read();
            self.slave_data.write(v & !(1 << (irq - 8)));
        }
    }

    /// Read the in-service register of the given PIC (master if `slave` is false).
    unsafe fn read_isr(&mut self, slave: bool) -> u8 {
        if slave {
            self.slave_cmd.write(CMD_READ_ISR);
            self.slave_cmd.read()
        } else {
            self.master_cmd.write(CMD_READ_ISR);
            self.master_cmd.read()
        }
    }

    /// Send end-of-interrupt, observing the spurious-IRQ discipline: before
    /// EOI'ing IRQ7 or IRQ15, check the ISR bit is actually set. If it is
    /// not, the interrupt was spurious and EOI is suppressed (for a spurious
    /// slave IRQ, only the master still gets its EOI, since the slave never
    /// actually raised anything).
    pub unsafe fn send_eoi(&mut self, irq: u8) {
        if irq == 7 {
            if self.read_isr(false) & 0x80 == 0 {
                return;
            }
        } else if irq == 15 {
            if self.read_isr(true) & 0x80 == 0 {
                self.master_cmd.write(CMD_EOI);
                return;
            }
        }

        if irq >= 8 {
            self.slave_cmd.write(CMD_EOI);
        }
        self.master_cmd.write(CMD_EOI);
    }
}

impl Default for Pic8259 {
    fn default() -> Self {
        Self::new()
    }
}

/// Give the PIC a moment to process a command, by writing to an unused port.
unsafe fn io_wait() {
    let mut p: Port<u8> = Port::new(0x80);
    p.write(0);
}
