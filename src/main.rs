#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
extern crate alloc;
#[cfg(target_os = "none")]
extern crate rlibc;

#[cfg(target_os = "none")]
mod machine;
#[cfg(target_os = "none")]
mod serial;

#[cfg(target_os = "none")]
mod boot {
    use core::panic::PanicInfo;

    use bootloader_api::config::{BootloaderConfig, Mapping};
    use bootloader_api::{entry_point, BootInfo};
    use linked_list_allocator::LockedHeap;
    use spin::Once;
    use x86_64::instructions::{hlt, interrupts};
    use x86_64::VirtAddr;

    use rustos_kernel::config::{KERNEL_HEAP_SIZE, KERNEL_STACK_SIZE, PAGE_SIZE};
    use rustos_kernel::interrupts::gdt::{TaskState, DOUBLE_FAULT_IST_INDEX};
    use rustos_kernel::interrupts::{entry, pic, trap, DescriptorTables, TrapFrame};
    use rustos_kernel::kernel::status::get_all_statuses;
    use rustos_kernel::kernel::{init_kernel, Phase};
    use rustos_kernel::memory::vma::{Region, VmFlags};
    use rustos_kernel::memory::frame;

    use crate::machine::{BootKernel, KernelCell};
    use crate::{println, serial};

    pub static BOOTLOADER_CONFIG: BootloaderConfig = {
        let mut config = BootloaderConfig::new_default();
        config.mappings.physical_memory = Some(Mapping::Dynamic);
        config.kernel_stack_size = 64 * 1024;
        config
    };

    entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

    #[global_allocator]
    static ALLOCATOR: LockedHeap = LockedHeap::empty();

    #[repr(align(4096))]
    struct HeapBuffer([u8; KERNEL_HEAP_SIZE]);
    static mut HEAP: HeapBuffer = HeapBuffer([0; KERNEL_HEAP_SIZE]);

    #[repr(align(16))]
    struct Stack([u8; KERNEL_STACK_SIZE]);
    static mut TRAP_STACK: Stack = Stack([0; KERNEL_STACK_SIZE]);
    static mut DOUBLE_FAULT_STACK: Stack = Stack([0; KERNEL_STACK_SIZE]);

    static TSS: TaskState = TaskState::new();
    static TABLES: Once<DescriptorTables> = Once::new();
    static KERNEL: KernelCell = KernelCell::empty();

    /// Far from anything the bootloader maps for us.
    const SELF_CHECK_ADDR: u64 = 0x0000_6000_0000_0000;

    static mut BOOT_INFO: Option<&'static mut BootInfo> = None;

    const PHASES: [Phase; 4] = [
        Phase::new("Frame Allocator", init_frames),
        Phase::new("Descriptor Tables", init_tables),
        Phase::new("Interrupt Controller", init_interrupts),
        Phase::new("Page Fault Check", check_page_fault),
    ];

    fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
        unsafe {
            let bottom = core::ptr::addr_of_mut!(HEAP) as *mut u8;
            ALLOCATOR.lock().init(bottom, KERNEL_HEAP_SIZE);
            BOOT_INFO = Some(boot_info);
        }
        if let Err(e) = serial::init() {
            println!("serial logger: {}", e);
        }

        let result = init_kernel(&PHASES);
        for component in get_all_statuses() {
            if component.is_failed() {
                log::error!("  {:<22} {}", component.name, component.status);
            } else {
                log::info!("  {:<22} {}", component.name, component.status);
            }
        }
        if let Err(e) = result {
            panic!("kernel initialization failed: {}", e);
        }

        loop {
            hlt();
        }
    }

    fn init_frames() -> Result<(), &'static str> {
        let boot_info = unsafe { (*core::ptr::addr_of_mut!(BOOT_INFO)).as_mut() }.ok_or("no boot info")?;
        let phys_offset = boot_info
            .physical_memory_offset
            .into_option()
            .ok_or("physical memory is not mapped")?;
        unsafe {
            frame::init(&boot_info.memory_regions)?;
            KERNEL.install(BootKernel::new(VirtAddr::new(phys_offset)));
        }
        Ok(())
    }

    fn stack_top(stack: *mut Stack) -> VirtAddr {
        VirtAddr::from_ptr(stack) + KERNEL_STACK_SIZE as u64
    }

    fn init_tables() -> Result<(), &'static str> {
        TSS.set_kernel_stack(stack_top(core::ptr::addr_of_mut!(TRAP_STACK)));
        TSS.set_interrupt_stack(DOUBLE_FAULT_IST_INDEX, stack_top(core::ptr::addr_of_mut!(DOUBLE_FAULT_STACK)));

        let tables = TABLES.call_once(|| DescriptorTables::build(&TSS, entry::vector_address));
        entry::register(handle_trap);
        unsafe { tables.install() };
        Ok(())
    }

    fn init_interrupts() -> Result<(), &'static str> {
        pic::init();
        interrupts::enable();
        Ok(())
    }

    /// Touches an unmapped page inside a fresh region and expects the
    /// fault path to back it with a zeroed frame.
    fn check_page_fault() -> Result<(), &'static str> {
        let kernel = unsafe { KERNEL.get() }.ok_or("machine state missing")?;
        let mm = kernel.address_space();
        let start = VirtAddr::new(SELF_CHECK_ADDR);
        if mm.page_table().and_then(|pgdir| pgdir.lookup(start)).is_some() {
            log::warn!("self check page {:#x} already mapped, skipping", SELF_CHECK_ADDR);
            return Ok(());
        }
        let region = Region::with_flags(start, start + PAGE_SIZE, VmFlags::READ | VmFlags::WRITE)
            .map_err(|_| "bad self check region")?;
        mm.insert(region);

        let word = SELF_CHECK_ADDR as *mut u64;
        unsafe {
            if core::ptr::read_volatile(word) != 0 {
                return Err("demand-mapped page is not zeroed");
            }
            core::ptr::write_volatile(word, 0x5a5a);
            if core::ptr::read_volatile(word) != 0x5a5a {
                return Err("demand-mapped page lost a write");
            }
        }
        log::info!("page fault check passed, {} frames free", frame::free_frames());
        Ok(())
    }

    fn handle_trap(tf: &mut TrapFrame) {
        match unsafe { KERNEL.get() } {
            Some(kernel) => trap(kernel, tf),
            None => panic!("trap {} before the machine was set up\n{}", tf.vector(), tf),
        }
        if let Some(byte) = unsafe { KERNEL.get() }.and_then(|kernel| kernel.stdin_pop()) {
            serial::putc(byte);
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        interrupts::disable();
        log::error!("kernel panic: {}", info);
        loop {
            hlt();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
