//! # Trap Entry Stubs
//!
//! One 16-byte stub per vector, laid out back to back from
//! `__trap_vectors`. Stubs for vectors where the CPU pushes no error code
//! push a zero so every frame has the same shape, then push the vector and
//! jump to `__alltraps`, which saves the rest of [`TrapFrame`], switches to
//! the kernel data segment and calls the registered handler with a pointer
//! to the frame. `__trapret` unwinds the frame and `iretq`s, so whatever
//! the handler wrote into the frame is what the CPU resumes with.

use core::arch::global_asm;

use spin::Once;

use crate::interrupts::gdt::KERNEL_DS;
use crate::interrupts::trapframe::TrapFrame;

const STUB_SIZE: u64 = 16;

global_asm!(
    r#"
    .section .text
    .code64

    .macro trap_stub_noerr
        .balign 16
        pushq $0
        pushq $vecnum
        jmp __alltraps
        .set vecnum, vecnum + 1
    .endm

    .macro trap_stub_err
        .balign 16
        pushq $vecnum
        jmp __alltraps
        .set vecnum, vecnum + 1
    .endm

    .balign 16
    .global __trap_vectors
__trap_vectors:
    .set vecnum, 0
    .rept 8
        trap_stub_noerr
    .endr
    trap_stub_err
    trap_stub_noerr
    .rept 5
        trap_stub_err
    .endr
    .rept 2
        trap_stub_noerr
    .endr
    trap_stub_err
    .rept 3
        trap_stub_noerr
    .endr
    trap_stub_err
    .rept 7
        trap_stub_noerr
    .endr
    .rept 2
        trap_stub_err
    .endr
    .rept 225
        trap_stub_noerr
    .endr

    .global __alltraps
__alltraps:
    pushq %r15
    pushq %r14
    pushq %r13
    pushq %r12
    pushq %rbp
    pushq %rbx
    pushq %r11
    pushq %r10
    pushq %r9
    pushq %r8
    pushq %rax
    pushq %rcx
    pushq %rdx
    pushq %rsi
    pushq %rdi

    xorl %eax, %eax
    movw %ds, %ax
    pushq %rax
    movw %es, %ax
    pushq %rax

    movw ${kernel_ds}, %ax
    movw %ax, %ds
    movw %ax, %es

    movq %rsp, %rdi
    call {trap}

__trapret:
    popq %rax
    movw %ax, %es
    popq %rax
    movw %ax, %ds

    popq %rdi
    popq %rsi
    popq %rdx
    popq %rcx
    popq %rax
    popq %r8
    popq %r9
    popq %r10
    popq %r11
    popq %rbx
    popq %rbp
    popq %r12
    popq %r13
    popq %r14
    popq %r15

    # vector and error code
    addq $16, %rsp
    iretq
    "#,
    kernel_ds = const KERNEL_DS.0,
    trap = sym trap_entry,
    options(att_syntax)
);

extern "C" {
    static __trap_vectors: u8;
}

static TRAP_HANDLER: Once<fn(&mut TrapFrame)> = Once::new();

/// Sets the function every stub ends up in. Only the first call wins.
pub fn register(handler: fn(&mut TrapFrame)) {
    TRAP_HANDLER.call_once(|| handler);
}

/// Address of the stub for `vector`, for the vector table.
pub fn vector_address(vector: u8) -> u64 {
    let base = unsafe { core::ptr::addr_of!(__trap_vectors) } as u64;
    base + STUB_SIZE * u64::from(vector)
}

extern "C" fn trap_entry(tf: &mut TrapFrame) {
    match TRAP_HANDLER.get() {
        Some(handler) => handler(tf),
        None => panic!("trap {} before a handler was registered\n{}", tf.vector(), tf),
    }
}
