//! System call interface, reached through the `int 0x80` trap gate.

pub mod dispatcher;
pub mod handlers;
pub mod numbers;

pub use dispatcher::{syscall, SyscallError, SyscallResult};
pub use numbers::SyscallNumber;
