//! System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SyscallNumber {
    // Process lifecycle
    Exit = 1,
    Fork = 2,
    Wait = 3,
    Exec = 4,
    Clone = 5,
    ExitThread = 9,
    Yield = 10,
    Sleep = 11,
    Kill = 12,

    // Queries
    GetTime = 17,
    GetPid = 18,

    // Memory
    Brk = 19,
    Mmap = 20,
    Munmap = 21,
    Shmem = 22,

    // Console and debugging
    Putc = 30,
    Pgdir = 31,
}

impl TryFrom<usize> for SyscallNumber {
    type Error = usize;

    fn try_from(num: usize) -> Result<Self, Self::Error> {
        Ok(match num {
            1 => Self::Exit,
            2 => Self::Fork,
            3 => Self::Wait,
            4 => Self::Exec,
            5 => Self::Clone,
            9 => Self::ExitThread,
            10 => Self::Yield,
            11 => Self::Sleep,
            12 => Self::Kill,
            17 => Self::GetTime,
            18 => Self::GetPid,
            19 => Self::Brk,
            20 => Self::Mmap,
            21 => Self::Munmap,
            22 => Self::Shmem,
            30 => Self::Putc,
            31 => Self::Pgdir,
            other => return Err(other),
        })
    }
}
