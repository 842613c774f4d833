//! The canonical on-stack CPU state frame produced by every interrupt stub.
//!
//! Every exception and IRQ vector, whether or not the CPU itself pushes an
//! error code, ends up producing this exact 22-field layout before the
//! dispatcher is called. The scheduler's context switch reads and writes the
//! same layout, so a task's saved context and "the frame an interrupt just
//! produced" are the same shape.

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct CpuState {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub interrupt_id: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl CpuState {
    pub const fn zeroed() -> Self {
        CpuState {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            interrupt_id: 0,
            error_code: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }

    /// Build a fresh frame for a brand-new kernel task: runs with interrupts
    /// enabled (RFLAGS bit 9), ring-0 selectors, entry point in RIP.
    pub fn new_task(entry: u64, stack_top: u64, cs: u16, ss: u16) -> Self {
        let mut s = Self::zeroed();
        s.rip = entry;
        s.rsp = stack_top;
        s.cs = cs as u64;
        s.ss = ss as u64;
        s.rflags = 0x202; // IF set, reserved bit 1 set
        s
    }

    pub fn log(&self, tag: &str) {
        crate::log_error!(
            "{}: vec={} err={:#x} rip={:#x} cs={:#x} rflags={:#x} rsp={:#x} ss={:#x}",
            tag,
            self.interrupt_id,
            self.error_code,
            self.rip,
            self.cs,
            self.rflags,
            self.rsp,
            self.ss
        );
        crate::log_error!(
            "  rax={:#x} rbx={:#x} rcx={:#x} rdx={:#x} rsi={:#x} rdi={:#x} rbp={:#x}",
            self.rax,
            self.rbx,
            self.rcx,
            self.rdx,
            self.rsi,
            self.rdi,
            self.rbp
        );
        crate::log_error!(
            "  r8={:#x} r9={:#x} r10={:#x} r11={:#x} r12={:#x} r13={:#x} r14={:#x} r15={:#x}",
            self.r8,
            self.r9,
            self.r10,
            self.r11,
            self.r12,
            self.r13,
            self.r14,
            self.r15
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_22_fields_of_u64() {
        assert_eq!(core::mem::size_of::<CpuState>(), 22 * 8);
    }

    #[test]
    fn new_task_sets_expected_fields() {
        let s = CpuState::new_task(0x1000, 0x9000, 0x08, 0x10);
        assert_eq!(s.rip, 0x1000);
        assert_eq!(s.rsp, 0x9000);
        assert_eq!(s.cs, 0x08);
        assert_eq!(s.ss, 0x10);
        assert_eq!(s.rflags & 0x200, 0x200);
    }
}
