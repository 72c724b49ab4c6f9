//! Host-side stand-ins for the page table, processes and kernel services.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::ptr::NonNull;
use std::rc::Rc;

use x86_64::structures::paging::{Page, PageTableFlags, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

use crate::interrupts::timer::Ticks;
use crate::interrupts::trapframe::TrapFrame;
use crate::memory::mm::AddressSpace;
use crate::memory::paging::{PageTable, PagingError};
use crate::process::{InputDevice, Kernel, Pid, Process};
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};

type Entries = Rc<RefCell<BTreeMap<u64, PageTableFlags>>>;

/// Page table backed by a map from page address to leaf flags, with a fixed
/// budget of frames.
pub struct MockPageTable {
    entries: Entries,
    frames_left: usize,
}

impl MockPageTable {
    pub fn new(frames: usize) -> Self {
        Self {
            entries: Rc::default(),
            frames_left: frames,
        }
    }

    /// Handle that keeps observing the entries after the table is boxed
    /// into an address space.
    pub fn watch(&self) -> TableWatch {
        TableWatch(Rc::clone(&self.entries))
    }
}

pub struct TableWatch(Entries);

impl TableWatch {
    pub fn mapped(&self) -> usize {
        self.0.borrow().len()
    }
}

impl PageTable for MockPageTable {
    fn root(&self) -> PhysAddr {
        PhysAddr::new(0x1000)
    }

    fn lookup(&self, addr: VirtAddr) -> Option<PageTableFlags> {
        let page = addr.align_down(4096u64).as_u64();
        self.entries.borrow().get(&page).copied()
    }

    fn map_zeroed(&mut self, page: Page<Size4KiB>, flags: PageTableFlags) -> Result<(), PagingError> {
        let key = page.start_address().as_u64();
        if self.entries.borrow().contains_key(&key) {
            return Err(PagingError::AlreadyMapped);
        }
        if self.frames_left == 0 {
            return Err(PagingError::OutOfMemory);
        }
        self.frames_left -= 1;
        self.entries.borrow_mut().insert(key, flags);
        Ok(())
    }

    fn set_flags(&mut self, page: Page<Size4KiB>, flags: PageTableFlags) -> Result<(), PagingError> {
        let key = page.start_address().as_u64();
        match self.entries.borrow_mut().get_mut(&key) {
            Some(entry) => {
                *entry = flags;
                Ok(())
            }
            None => Err(PagingError::NotMapped),
        }
    }

    fn unmap(&mut self, page: Page<Size4KiB>) -> Result<(), PagingError> {
        let key = page.start_address().as_u64();
        self.entries
            .borrow_mut()
            .remove(&key)
            .map(|_| ())
            .ok_or(PagingError::NotMapped)
    }
}

pub struct MockProcess {
    pub pid: Pid,
    pub name: &'static str,
    pub tf: Option<NonNull<TrapFrame>>,
    pub killed: bool,
    pub need_resched: bool,
    /// Timer list asks for a reschedule on every tick.
    pub resched_after_timer: bool,
    pub mm: Option<AddressSpace>,
}

impl MockProcess {
    pub fn new(pid: Pid, name: &'static str) -> Self {
        Self {
            pid,
            name,
            tf: None,
            killed: false,
            need_resched: false,
            resched_after_timer: false,
            mm: None,
        }
    }
}

impl Process for MockProcess {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn name(&self) -> &str {
        self.name
    }

    fn trap_frame(&self) -> Option<NonNull<TrapFrame>> {
        self.tf
    }

    fn set_trap_frame(&mut self, tf: Option<NonNull<TrapFrame>>) {
        self.tf = tf;
    }

    fn need_resched(&self) -> bool {
        self.need_resched
    }

    fn is_killed(&self) -> bool {
        self.killed
    }

    fn address_space(&mut self) -> Option<&mut AddressSpace> {
        self.mm.as_mut()
    }
}

/// Records every service call the trap path makes.
pub struct MockKernel {
    pub process: Option<MockProcess>,
    pub ticks: Ticks,
    pub cr2: VirtAddr,
    pub eois: Vec<u8>,
    pub serial_input: VecDeque<u8>,
    pub keyboard_input: VecDeque<u8>,
    pub stdin: Vec<u8>,
    pub console: Vec<u8>,
    pub timer_runs: usize,
    pub frames_seen_by_timer: Vec<Option<NonNull<TrapFrame>>>,
    pub schedules: usize,
    pub exits: Vec<i32>,
    pub forks: Vec<(u32, u64)>,
    pub kills: Vec<Pid>,
    pub sleeps: Vec<u32>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            process: None,
            ticks: Ticks::new(),
            cr2: VirtAddr::zero(),
            eois: Vec::new(),
            serial_input: VecDeque::new(),
            keyboard_input: VecDeque::new(),
            stdin: Vec::new(),
            console: Vec::new(),
            timer_runs: 0,
            frames_seen_by_timer: Vec::new(),
            schedules: 0,
            exits: Vec::new(),
            forks: Vec::new(),
            kills: Vec::new(),
            sleeps: Vec::new(),
        }
    }

    pub fn with_process(process: MockProcess) -> Self {
        Self {
            process: Some(process),
            ..Self::new()
        }
    }
}

impl Kernel for MockKernel {
    fn current(&mut self) -> Option<&mut dyn Process> {
        self.process.as_mut().map(|p| p as &mut dyn Process)
    }

    fn ticks(&self) -> &Ticks {
        &self.ticks
    }

    fn fault_address(&self) -> VirtAddr {
        self.cr2
    }

    fn end_of_interrupt(&mut self, vector: u8) {
        self.eois.push(vector);
    }

    fn read_input(&mut self, device: InputDevice) -> Option<u8> {
        match device {
            InputDevice::Serial => self.serial_input.pop_front(),
            InputDevice::Keyboard => self.keyboard_input.pop_front(),
        }
    }

    fn stdin_write(&mut self, byte: u8) {
        self.stdin.push(byte);
    }

    fn console_putc(&mut self, byte: u8) {
        self.console.push(byte);
    }

    fn run_timer_list(&mut self) {
        self.timer_runs += 1;
        let frame = self.process.as_ref().and_then(|p| p.tf);
        self.frames_seen_by_timer.push(frame);
        if let Some(process) = self.process.as_mut() {
            if process.resched_after_timer {
                process.need_resched = true;
            }
        }
    }

    fn schedule(&mut self) {
        self.schedules += 1;
        if let Some(process) = self.process.as_mut() {
            process.need_resched = false;
        }
    }

    fn exit(&mut self, status: i32) -> SyscallResult {
        self.exits.push(status);
        Ok(0)
    }

    fn fork(&mut self, clone_flags: u32, stack: u64, _tf: &TrapFrame) -> SyscallResult {
        self.forks.push((clone_flags, stack));
        Ok(self.forks.len() + 1)
    }

    fn wait(&mut self, _pid: Pid, _status_store: u64) -> SyscallResult {
        Err(SyscallError::NoChild)
    }

    fn exec(&mut self, _name: u64, _len: u64, _binary: u64, _size: u64) -> SyscallResult {
        Ok(0)
    }

    fn exit_thread(&mut self, status: i32) -> SyscallResult {
        self.exits.push(status);
        Ok(0)
    }

    fn yield_now(&mut self) -> SyscallResult {
        if let Some(process) = self.process.as_mut() {
            process.need_resched = true;
        }
        Ok(0)
    }

    fn sleep(&mut self, ticks: u32) -> SyscallResult {
        self.sleeps.push(ticks);
        Ok(0)
    }

    fn kill(&mut self, pid: Pid) -> SyscallResult {
        match self.process.as_mut() {
            Some(process) if process.pid == pid => {
                process.killed = true;
                self.kills.push(pid);
                Ok(0)
            }
            _ => Err(SyscallError::NoProcess),
        }
    }
}
