//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │────▶│  (Slave)    │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! IRQ 0-15 are remapped past the CPU exceptions:
//!
//! | IRQ | Vector | Device      |
//! |-----|--------|-------------|
//! | 0   | 32     | Timer       |
//! | 1   | 33     | Keyboard    |
//! | 4   | 36     | COM1        |
//! | 14  | 46     | IDE primary |
//! | 15  | 47     | IDE second. |

use pic8259::ChainedPics;
use spin::Mutex;

pub const IRQ_OFFSET: u8 = 32;
pub const PIC_1_OFFSET: u8 = IRQ_OFFSET;
pub const PIC_2_OFFSET: u8 = IRQ_OFFSET + 8;

pub const IRQ_TIMER: u8 = 0;
pub const IRQ_KBD: u8 = 1;
pub const IRQ_COM1: u8 = 4;
pub const IRQ_IDE1: u8 = 14;
pub const IRQ_IDE2: u8 = 15;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

// Interrupt indices - these are the actual vector numbers the CPU sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = IRQ_OFFSET + IRQ_TIMER,
    Keyboard = IRQ_OFFSET + IRQ_KBD,
    Com1 = IRQ_OFFSET + IRQ_COM1,
    Ide1 = IRQ_OFFSET + IRQ_IDE1,
    Ide2 = IRQ_OFFSET + IRQ_IDE2,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn irq(self) -> u8 {
        self.as_u8() - IRQ_OFFSET
    }

    pub fn from_vector(vector: u8) -> Option<Self> {
        [Self::Timer, Self::Keyboard, Self::Com1, Self::Ide1, Self::Ide2]
            .into_iter()
            .find(|index| index.as_u8() == vector)
    }
}

/// Remaps both chips and unmasks the lines the trap dispatcher serves.
#[cfg(target_os = "none")]
pub fn init() {
    unsafe { PICS.lock().initialize() };
    for index in [InterruptIndex::Timer, InterruptIndex::Keyboard, InterruptIndex::Com1] {
        unmask(index.irq());
    }
}

#[cfg(target_os = "none")]
pub fn unmask(irq: u8) {
    use x86_64::instructions::port::Port;

    let (port, bit) = if irq < 8 { (0x21, irq) } else { (0xA1, irq - 8) };
    unsafe {
        let mut pic_mask_port = Port::<u8>::new(port);
        let mask = pic_mask_port.read();
        pic_mask_port.write(mask & !(1 << bit));
        if irq >= 8 {
            // cascade line
            let mut master = Port::<u8>::new(0x21);
            let mask = master.read();
            master.write(mask & !(1 << 2));
        }
    }
}

#[cfg(target_os = "none")]
pub fn end_of_interrupt(vector: u8) {
    unsafe { PICS.lock().notify_end_of_interrupt(vector) };
}
