//! Kernel boot sequence.
//!
//! Brings up GDT/IDT, physical and heap memory, the active hardware
//! interrupt controller, the initial VFS mounts, and the scheduler's idle
//! task, in the order each stage's assumptions require the previous one to
//! already hold. Never returns: once interrupts are enabled the timer tick
//! drives the scheduler and control passes permanently to whichever task
//! it picks first.

use crate::ata::{AtaChannel, AtaDevice};
use crate::devfs::{BlockDeviceNode, DevFs};
use crate::task::Priority;
use crate::tmpfs::TmpFs;
use crate::vfs::ROOT;
use alloc::sync::Arc;
use bootloader_api::BootInfo;

pub fn run(boot_info: &'static mut BootInfo) -> ! {
    unsafe {
        crate::gdt::init_gdt();
        crate::idt::init_idt();
    }

    crate::vga::WRITER.lock().clear_screen();
    crate::println!("kernel booting...");
    crate::log_info!("gdt and idt initialized");

    init_memory(boot_info);

    unsafe {
        crate::interrupt_controller::initialize(true);
    }
    if !crate::interrupt_controller::is_apic() {
        unsafe { crate::pit::init_periodic() };
    }
    crate::pit::register_tick_handler();
    crate::keyboard::init_keyboard();
    crate::log_info!(
        "interrupt controller ready ({})",
        if crate::interrupt_controller::is_apic() { "apic" } else { "pic" }
    );

    mount_filesystems();

    crate::scheduler::set_idle(idle_task);
    crate::scheduler::spawn(heartbeat_task, Priority::Low);
    crate::log_info!("scheduler ready, enabling interrupts");

    x86_64::instructions::interrupts::enable();
    loop {
        x86_64::instructions::hlt();
    }
}

fn init_memory(boot_info: &'static BootInfo) {
    let (regions, n) = crate::boot::collect(&boot_info.memory_regions);
    crate::physical_memory::init(&regions[..n]);
    crate::log_info!(
        "physical memory: {} KiB total, {} KiB free",
        crate::physical_memory::total_bytes() / 1024,
        crate::physical_memory::free_bytes() / 1024
    );

    unsafe { crate::heap::init_heap() };
    crate::log_info!("heap ready: {} KiB free", crate::heap::remaining() / 1024);
}

fn mount_filesystems() {
    let tmpfs = TmpFs::new();
    ROOT.mount("/", tmpfs.root());

    let devfs = DevFs::new();
    for (channel, is_slave, name) in [
        (AtaChannel::Primary, false, "ata0"),
        (AtaChannel::Primary, true, "ata1"),
        (AtaChannel::Secondary, false, "ata2"),
        (AtaChannel::Secondary, true, "ata3"),
    ] {
        if let Some(device) = AtaDevice::probe(channel, is_slave) {
            devfs.register(name, BlockDeviceNode::new(Arc::new(device)));
        }
    }
    ROOT.mount("/dev", devfs);
    crate::log_info!("mounted tmpfs at / and devfs at /dev");
}

extern "C" fn idle_task() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

/// A minimal always-present kernel task so the scheduler has more than the
/// idle task to round-robin between at boot.
extern "C" fn heartbeat_task() -> ! {
    loop {
        crate::pit::one_shot_wait_ms(1000);
        crate::log_debug!("heartbeat: {} ticks", crate::pit::ticks());
    }
}
