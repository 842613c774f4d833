//! Programmable Interval Timer.
//!
//! Used two ways: as the periodic IRQ0 tick source when the legacy PIC is
//! active, and as a known-good reference clock the APIC timer calibrates
//! itself against (one-shot mode) regardless of which controller ends up
//! driving the periodic tick.

use crate::config::{PIT_BASE_FREQUENCY_HZ, TIMER_FREQUENCY_HZ};
use core::sync::atomic::{AtomicU64, Ordering};
use x86_64::instructions::port::Port;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

const CMD_CHANNEL0_RATE_GENERATOR: u8 = 0x34;
const CMD_CHANNEL0_ONE_SHOT: u8 = 0x30;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Program channel 0 in rate-generator mode at [`TIMER_FREQUENCY_HZ`]. Used
/// only when the legacy PIC ended up as the active controller; the APIC
/// path drives the same vector off the local APIC timer instead. Either way
/// [`register_tick_handler`] wires the one Rust handler that advances the
/// tick counter and runs the scheduler.
pub unsafe fn init_periodic() {
    let divisor = (PIT_BASE_FREQUENCY_HZ / TIMER_FREQUENCY_HZ) as u16;
    let mut command: Port<u8> = Port::new(PIT_COMMAND);
    let mut data: Port<u8> = Port::new(PIT_CHANNEL0);

    command.write(CMD_CHANNEL0_RATE_GENERATOR);
    data.write((divisor & 0xFF) as u8);
    data.write((divisor >> 8) as u8);
}

/// Register the timer vector's Rust handler. Called exactly once during
/// boot regardless of which hardware interrupt controller ends up active.
pub fn register_tick_handler() {
    crate::idt::register_handler(crate::interrupt_controller::TIMER_VECTOR, timer_handler);
}

fn timer_handler(frame: &mut crate::cpu_state::CpuState) {
    tick();
    crate::scheduler::on_tick(frame);
}

pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Busy-wait for approximately `ms` milliseconds using a PIT one-shot count,
/// independent of whatever is driving the periodic tick. Used by the APIC
/// timer calibration routine.
pub fn one_shot_wait_ms(ms: u32) {
    let divisor = ((PIT_BASE_FREQUENCY_HZ as u64) * ms as u64 / 1000).min(0xFFFF) as u16;
    unsafe {
        let mut command: Port<u8> = Port::new(PIT_COMMAND);
        let mut data: Port<u8> = Port::new(PIT_CHANNEL0);
        command.write(CMD_CHANNEL0_ONE_SHOT);
        data.write((divisor & 0xFF) as u8);
        data.write((divisor >> 8) as u8);

        loop {
            command.write(0xE2); // read-back: latch status for channel 0
            let status: u8 = data.read();
            if status & 0x80 != 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_counter_advances() {
        let before = ticks();
        tick();
        assert_eq!(ticks(), before + 1);
    }
}
