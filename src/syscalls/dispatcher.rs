use core::fmt;

use crate::interrupts::trapframe::TrapFrame;
use crate::memory::vma::VmError;
use crate::process::Kernel;
use crate::syscalls::handlers;
use crate::syscalls::numbers::SyscallNumber;

/// System call result type
pub type SyscallResult = Result<usize, SyscallError>;

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidArgument,
    PermissionDenied,
    NotImplemented,
    NoMemory,
    IoError,
    NoProcess,
    NoChild,
}

impl SyscallError {
    pub fn as_errno(self) -> isize {
        match self {
            Self::NoProcess => -3,         // ESRCH
            Self::IoError => -5,           // EIO
            Self::NoChild => -10,          // ECHILD
            Self::NoMemory => -12,         // ENOMEM
            Self::PermissionDenied => -13, // EACCES
            Self::InvalidArgument => -22,  // EINVAL
            Self::NotImplemented => -38,   // ENOSYS
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_errno())
    }
}

impl From<VmError> for SyscallError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::NoSpace | VmError::OutOfMemory => Self::NoMemory,
            VmError::InvalidArgument | VmError::Overlap | VmError::NotFound => Self::InvalidArgument,
        }
    }
}

/// The six argument registers of a system call, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallArgs(pub [u64; 6]);

impl SyscallArgs {
    /// `rdi`, `rsi`, `rdx`, `rcx`, `r8`, `r9`.
    pub fn from_frame(tf: &TrapFrame) -> Self {
        let r = &tf.regs;
        Self([r.rdi, r.rsi, r.rdx, r.rcx, r.r8, r.r9])
    }

    pub fn get(&self, index: usize) -> u64 {
        self.0[index]
    }
}

/// Value left in `rax` for the caller: the result, or the negative errno.
pub fn encode_result(result: SyscallResult) -> u64 {
    match result {
        Ok(value) => value as u64,
        Err(err) => err.as_errno() as u64,
    }
}

/// Runs one decoded call against the kernel.
pub fn dispatch_syscall<K: Kernel + ?Sized>(
    kernel: &mut K,
    call: SyscallNumber,
    args: &SyscallArgs,
    tf: &TrapFrame,
) -> SyscallResult {
    #[cfg(feature = "trace-syscall")]
    log::trace!("syscall {:?}{:x?}", call, args.0);

    let [a0, a1, a2, a3, _, _] = args.0;
    match call {
        SyscallNumber::Exit => handlers::process::sys_exit(kernel, a0 as i32),
        SyscallNumber::Fork => handlers::process::sys_fork(kernel, tf),
        SyscallNumber::Wait => handlers::process::sys_wait(kernel, a0 as i32, a1),
        SyscallNumber::Exec => handlers::process::sys_exec(kernel, a0, a1, a2, a3),
        SyscallNumber::Clone => handlers::process::sys_clone(kernel, a0 as u32, a1, tf),
        SyscallNumber::ExitThread => handlers::process::sys_exit_thread(kernel, a0 as i32),
        SyscallNumber::Yield => handlers::process::sys_yield(kernel),
        SyscallNumber::Sleep => handlers::time::sys_sleep(kernel, a0 as u32),
        SyscallNumber::Kill => handlers::process::sys_kill(kernel, a0 as i32),
        SyscallNumber::GetTime => handlers::time::sys_gettime(kernel),
        SyscallNumber::GetPid => handlers::process::sys_getpid(kernel),
        SyscallNumber::Brk => handlers::memory::sys_brk(kernel, a0),
        SyscallNumber::Mmap => handlers::memory::sys_mmap(kernel, a0, a1, a2 as u32),
        SyscallNumber::Munmap => handlers::memory::sys_munmap(kernel, a0, a1),
        SyscallNumber::Shmem => handlers::memory::sys_shmem(kernel, a0, a1, a2 as u32),
        SyscallNumber::Putc => handlers::io::sys_putc(kernel, a0 as u8),
        SyscallNumber::Pgdir => handlers::io::sys_pgdir(kernel),
    }
}

/// Entry from the trap dispatcher: decode `rax`, run the call, write the
/// result back into `rax`. An undefined number is fatal.
pub fn syscall<K: Kernel + ?Sized>(kernel: &mut K, tf: &mut TrapFrame) {
    let raw = tf.regs.rax as usize;
    let call = match SyscallNumber::try_from(raw) {
        Ok(call) => call,
        Err(num) => {
            log::error!("{}", tf);
            let (pid, name) = match kernel.current() {
                Some(process) => (process.pid(), process.name()),
                None => (-1, "(none)"),
            };
            panic!("undefined syscall {}, pid = {}, name = {}.", num, pid, name);
        }
    };

    let args = SyscallArgs::from_frame(tf);
    let result = dispatch_syscall(kernel, call, &args, tf);
    if let Err(err) = result {
        log::debug!("syscall {:?} failed: {}", call, err);
    }
    tf.regs.rax = encode_result(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USER_BASE;
    use crate::interrupts::gdt::{USER_CS, USER_DS};
    use crate::interrupts::idt::T_SYSCALL;
    use crate::memory::AddressSpace;
    use crate::testutil::{MockKernel, MockProcess};
    use x86_64::VirtAddr;

    fn call(number: SyscallNumber, args: [u64; 6]) -> TrapFrame {
        let mut tf = TrapFrame::new(T_SYSCALL, USER_CS, USER_DS);
        tf.regs.rax = number as u64;
        tf.regs.rdi = args[0];
        tf.regs.rsi = args[1];
        tf.regs.rdx = args[2];
        tf.regs.rcx = args[3];
        tf.regs.r8 = args[4];
        tf.regs.r9 = args[5];
        tf.rsp = 0x7fff_0000;
        tf
    }

    #[test]
    fn arguments_come_from_the_six_argument_registers() {
        let tf = call(SyscallNumber::Putc, [1, 2, 3, 4, 5, 6]);
        assert_eq!(SyscallArgs::from_frame(&tf), SyscallArgs([1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn errors_are_returned_as_negative_errno() {
        assert_eq!(encode_result(Ok(42)), 42);
        assert_eq!(encode_result(Err(SyscallError::InvalidArgument)) as i64, -22);
    }

    #[test]
    fn getpid_returns_current_pid_in_rax() {
        let mut kernel = MockKernel::with_process(MockProcess::new(7, "init"));
        let mut tf = call(SyscallNumber::GetPid, [0; 6]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(tf.regs.rax, 7);
    }

    #[test]
    fn fork_passes_the_interrupted_stack() {
        let mut kernel = MockKernel::with_process(MockProcess::new(1, "sh"));
        let mut tf = call(SyscallNumber::Fork, [0; 6]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(kernel.forks, [(0, 0x7fff_0000)]);
        assert_eq!(tf.regs.rax, 2);
    }

    #[test]
    fn clone_falls_back_to_the_interrupted_stack() {
        let mut kernel = MockKernel::with_process(MockProcess::new(1, "sh"));
        let mut tf = call(SyscallNumber::Clone, [0x100, 0, 0, 0, 0, 0]);
        syscall(&mut kernel, &mut tf);
        let mut tf = call(SyscallNumber::Clone, [0x100, 0x5000, 0, 0, 0, 0]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(kernel.forks, [(0x100, 0x7fff_0000), (0x100, 0x5000)]);
    }

    #[test]
    fn gettime_reports_ticks() {
        let mut kernel = MockKernel::with_process(MockProcess::new(1, "sh"));
        kernel.ticks.increment();
        kernel.ticks.increment();
        let mut tf = call(SyscallNumber::GetTime, [0; 6]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(tf.regs.rax, 2);
    }

    #[test]
    fn putc_reaches_the_console() {
        let mut kernel = MockKernel::with_process(MockProcess::new(1, "sh"));
        for byte in b"ok" {
            let mut tf = call(SyscallNumber::Putc, [u64::from(*byte), 0, 0, 0, 0, 0]);
            syscall(&mut kernel, &mut tf);
            assert_eq!(tf.regs.rax, 0);
        }
        assert_eq!(kernel.console, b"ok");
    }

    #[test]
    fn lifecycle_calls_reach_the_kernel() {
        let mut kernel = MockKernel::with_process(MockProcess::new(4, "sh"));
        for (number, arg) in [
            (SyscallNumber::Sleep, 25),
            (SyscallNumber::Kill, 4),
            (SyscallNumber::Exit, 3),
        ] {
            let mut tf = call(number, [arg, 0, 0, 0, 0, 0]);
            syscall(&mut kernel, &mut tf);
            assert_eq!(tf.regs.rax, 0);
        }
        assert_eq!(kernel.sleeps, [25]);
        assert_eq!(kernel.kills, [4]);
        assert_eq!(kernel.exits, [3]);
        assert!(kernel.process.as_ref().is_some_and(|p| p.killed));

        let mut tf = call(SyscallNumber::Wait, [0; 6]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(tf.regs.rax as i64, -10);

        let mut tf = call(SyscallNumber::Exec, [0, 0, 0, 0, 0, 0]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(tf.regs.rax as i64, -22);
    }

    #[test]
    fn mapping_calls_return_the_address_in_rax() {
        let mut process = MockProcess::new(1, "sh");
        let mut mm = AddressSpace::new();
        mm.set_heap_start(VirtAddr::new(0x100_0000));
        process.mm = Some(mm);
        let mut kernel = MockKernel::with_process(process);

        let mut tf = call(SyscallNumber::Mmap, [0, 0x2000, 2, 0, 0, 0]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(tf.regs.rax, USER_BASE);
        assert_eq!(tf.regs.rdi, 0);

        let mut tf = call(SyscallNumber::Brk, [0, 0, 0, 0, 0, 0]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(tf.regs.rax, 0x100_0000);
    }

    #[test]
    fn getpid_without_a_process_is_an_error() {
        let mut kernel = MockKernel::new();
        let mut tf = call(SyscallNumber::GetPid, [0; 6]);
        syscall(&mut kernel, &mut tf);
        assert_eq!(tf.regs.rax as i64, SyscallError::NoProcess.as_errno() as i64);
    }

    #[test]
    #[should_panic(expected = "undefined syscall 99, pid = 3, name = bad")]
    fn undefined_number_is_fatal() {
        let mut kernel = MockKernel::with_process(MockProcess::new(3, "bad"));
        let mut tf = call(SyscallNumber::GetPid, [0; 6]);
        tf.regs.rax = 99;
        syscall(&mut kernel, &mut tf);
    }
}
