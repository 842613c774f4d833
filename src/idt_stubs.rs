//! Generated assembly interrupt stubs.
//!
//! One stub per vector (0..=255), built from two templates: vectors the CPU
//! itself pushes an error code for skip the synthetic push, every other
//! vector pushes a synthetic zero so the frame layout is uniform. Rather
//! than hand-writing 256 near-identical blocks, both the stubs and the
//! lookup table of their addresses are emitted by a single assembler-level
//! loop (`.rept`/`.altmacro`), the same "stub set is part of the build"
//! idea as a generated match arm, just expressed in the assembler.

use core::arch::global_asm;

global_asm!(
    r#"
.altmacro
.macro isr_gen vec
.align 8
.global isr_stub_\vec
isr_stub_\vec:
.if (\vec == 8) || (\vec == 10) || (\vec == 11) || (\vec == 12) || (\vec == 13) || (\vec == 14) || (\vec == 17) || (\vec == 21) || (\vec == 29) || (\vec == 30)
.else
    push 0
.endif
    push \vec
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    mov rdi, rsp
    call interrupt_dispatch
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax
    add rsp, 16
    iretq
.endm

.set ivec, 0
.rept 256
isr_gen %ivec
.set ivec, ivec+1
.endr

.section .rodata
.align 8
.global isr_stub_table
isr_stub_table:
.macro isr_tab_entry vec
.quad isr_stub_\vec
.endm
.set ivec, 0
.rept 256
isr_tab_entry %ivec
.set ivec, ivec+1
.endr
"#
);

extern "C" {
    /// 256 8-byte entries: the address of each generated stub, in vector order.
    pub static isr_stub_table: [u64; 256];
}
