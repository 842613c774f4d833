//! Hardware interrupt controller: strategy over 8259 PIC / APIC+IOAPIC /
//! x2APIC+IOAPIC, exposed as a tagged-variant dispatch rather than a class
//! hierarchy with a singleton base pointer.

use crate::apic::{cpu_has_apic, cpu_has_x2apic, LocalApic};
use crate::config::TIMER_FREQUENCY_HZ;
use crate::ioapic::IoApic;
use crate::pic::Pic8259;
use spin::Mutex;

pub const TIMER_VECTOR: u8 = 0x20;
pub const KEYBOARD_VECTOR: u8 = 0x21;
pub const ATA_PRIMARY_VECTOR: u8 = 0x2E;

enum Controller {
    Pic(Pic8259),
    Apic { lapic: LocalApic, ioapic: IoApic },
}

pub struct InterruptController {
    inner: Controller,
}

impl InterruptController {
    const fn uninitialized() -> Self {
        InterruptController {
            inner: Controller::Pic(Pic8259::new()),
        }
    }

    /// Selection policy: x2APIC+IOAPIC, else APIC+IOAPIC, else legacy PIC.
    /// `memory_ready` gates APIC selection because enabling xAPIC requires
    /// the VMM to be able to identity-map its MMIO window.
    pub unsafe fn initialize(&mut self, memory_ready: bool) {
        if memory_ready && cpu_has_apic() {
            let mut pic = Pic8259::new();
            pic.initialize();
            pic.disable();

            let mut lapic = LocalApic::new();
            lapic.initialize(cpu_has_x2apic());
            lapic.calibrate(10);
            lapic.set_periodic(TIMER_VECTOR, TIMER_FREQUENCY_HZ);

            let mut ioapic = IoApic::new();
            ioapic.initialize();
            ioapic.remap_irq(1, KEYBOARD_VECTOR, lapic.id() as u8);
            ioapic.remap_irq(14, ATA_PRIMARY_VECTOR, lapic.id() as u8);
            ioapic.unmask(1);
            ioapic.unmask(14);

            self.inner = Controller::Apic { lapic, ioapic };
        } else {
            let mut pic = Pic8259::new();
            pic.initialize();
            pic.mask(0);
            pic.mask(1);
            pic.unmask(0);
            pic.unmask(1);
            pic.unmask(14);
            self.inner = Controller::Pic(pic);
        }
    }

    pub fn mask(&mut self, irq: u8) {
        match &mut self.inner {
            Controller::Pic(p) => unsafe { p.mask(irq) },
            Controller::Apic { ioapic, .. } => ioapic.mask(irq),
        }
    }

    pub fn unmask(&mut self, irq: u8) {
        match &mut self.inner {
            Controller::Pic(p) => unsafe { p.unmask(irq) },
            Controller::Apic { ioapic, .. } => ioapic.unmask(irq),
        }
    }

    pub fn send_eoi(&mut self, irq: u8) {
        match &mut self.inner {
            Controller::Pic(p) => unsafe { p.send_eoi(irq) },
            Controller::Apic { lapic, .. } => lapic.send_eoi(),
        }
    }

    pub fn is_apic(&self) -> bool {
        matches!(self.inner, Controller::Apic { .. })
    }
}

pub static CONTROLLER: Mutex<InterruptController> = Mutex::new(InterruptController::uninitialized());

/// Select and bring up the active hardware interrupt controller.
pub unsafe fn initialize(memory_ready: bool) {
    CONTROLLER.lock().initialize(memory_ready);
}

pub fn send_eoi(irq: u8) {
    CONTROLLER.lock().send_eoi(irq);
}

pub fn mask(irq: u8) {
    CONTROLLER.lock().mask(irq);
}

pub fn unmask(irq: u8) {
    CONTROLLER.lock().unmask(irq);
}

pub fn is_apic() -> bool {
    CONTROLLER.lock().is_apic()
}
