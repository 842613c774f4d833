//! Hand-rolled 256-entry Interrupt Descriptor Table.
//!
//! Each gate's offset points at one of the generated stubs in
//! [`crate::idt_stubs`]; the stub pushes the canonical [`CpuState`] and
//! calls [`interrupt_dispatch`], which indexes a per-vector Rust handler
//! table populated here.

use crate::cpu_state::CpuState;
use crate::gdt::{DOUBLE_FAULT_IST_INDEX, KERNEL_CODE_SELECTOR, MACHINE_CHECK_IST_INDEX, NMI_IST_INDEX};
use crate::idt_stubs::isr_stub_table;
use core::mem::size_of;
use spin::Mutex;

const GATE_PRESENT: u8 = 1 << 7;
const GATE_TYPE_INTERRUPT: u8 = 0xE; // 64-bit interrupt gate, IF cleared on entry
const GATE_TYPE_TRAP: u8 = 0xF; // 64-bit trap gate, IF preserved

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            ist: 0,
            type_attr: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    fn set(&mut self, handler: u64, ist: u8, gate_type: u8) {
        self.offset_low = handler as u16;
        self.offset_mid = (handler >> 16) as u16;
        self.offset_high = (handler >> 32) as u32;
        self.selector = KERNEL_CODE_SELECTOR;
        self.ist = ist;
        self.type_attr = GATE_PRESENT | gate_type;
        self.reserved = 0;
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u64,
}

static mut IDT: [IdtEntry; 256] = [IdtEntry::missing(); 256];
static mut IDT_PTR: IdtPointer = IdtPointer { limit: 0, base: 0 };

pub type HandlerFn = fn(&mut CpuState);

const VECTOR_NMI: usize = 2;
const VECTOR_DOUBLE_FAULT: usize = 8;
const VECTOR_MACHINE_CHECK: usize = 18;
const VECTOR_GP: usize = 13;
const VECTOR_PAGE_FAULT: usize = 14;
pub const VECTOR_IRQ_BASE: usize = 0x20;

static HANDLERS: Mutex<[Option<HandlerFn>; 256]> = Mutex::new([None; 256]);

/// Build and load the IDT. Every entry is an interrupt gate pointing at its
/// generated stub; NMI/#DF/#MC use their dedicated IST stacks so a
/// corrupted kernel stack can never take those handlers down with it.
///
/// # Safety
/// Must run after [`crate::gdt::init_gdt`] and only once.
pub unsafe fn init_idt() {
    for vector in 0..256 {
        let handler_addr = isr_stub_table[vector];
        let ist = match vector {
            VECTOR_NMI => NMI_IST_INDEX as u8,
            VECTOR_DOUBLE_FAULT => DOUBLE_FAULT_IST_INDEX as u8,
            VECTOR_MACHINE_CHECK => MACHINE_CHECK_IST_INDEX as u8,
            _ => 0,
        };
        let gate_type = if vector == 3 { GATE_TYPE_TRAP } else { GATE_TYPE_INTERRUPT };
        IDT[vector].set(handler_addr, ist, gate_type);
    }

    install_default_handlers();

    IDT_PTR.limit = (size_of::<[IdtEntry; 256]>() - 1) as u16;
    IDT_PTR.base = &raw const IDT as u64;

    core::arch::asm!(
        "lidt [{}]",
        in(reg) &raw const IDT_PTR,
        options(nostack, preserves_flags)
    );
}

fn install_default_handlers() {
    let mut handlers = HANDLERS.lock();
    for i in 0..32 {
        handlers[i] = Some(diagnostic_fault);
    }
    handlers[VECTOR_GP] = Some(general_protection_fault);
    handlers[VECTOR_PAGE_FAULT] = Some(page_fault);
    handlers[VECTOR_DOUBLE_FAULT] = Some(double_fault);
}

/// Register the Rust-level handler for `vector`. IRQ vectors additionally
/// get an EOI sent after the handler returns (see [`interrupt_dispatch`]).
pub fn register_handler(vector: u8, handler: HandlerFn) {
    HANDLERS.lock()[vector as usize] = Some(handler);
}

fn diagnostic_fault(frame: &mut CpuState) {
    frame.log("unhandled exception");
    crate::panic_fatal(frame);
}

fn general_protection_fault(frame: &mut CpuState) {
    frame.log("general protection fault");
    crate::panic_fatal(frame);
}

fn page_fault(frame: &mut CpuState) {
    let fault_addr: u64;
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) fault_addr, options(nomem, nostack, preserves_flags));
    }
    crate::log_error!(
        "page fault at {:#x} (present={} write={} user={})",
        fault_addr,
        frame.error_code & 1 != 0,
        frame.error_code & 2 != 0,
        frame.error_code & 4 != 0
    );
    frame.log("page fault");
    crate::panic_fatal(frame);
}

fn double_fault(frame: &mut CpuState) {
    frame.log("double fault");
    crate::panic_fatal(frame);
}

/// Single dispatcher every stub calls. Reads the vector out of the frame,
/// looks up the registered handler, runs it, and for IRQ vectors signals
/// end-of-interrupt to the active hardware interrupt controller only after
/// the handler has acknowledged whatever device state caused the IRQ.
#[no_mangle]
extern "C" fn interrupt_dispatch(frame: &mut CpuState) {
    let vector = frame.interrupt_id as usize;

    let handler = HANDLERS.lock()[vector];
    if let Some(handler) = handler {
        handler(frame);
    }

    if vector >= VECTOR_IRQ_BASE && vector < VECTOR_IRQ_BASE + 16 {
        crate::interrupt_controller::send_eoi((vector - VECTOR_IRQ_BASE) as u8);
    }
}
