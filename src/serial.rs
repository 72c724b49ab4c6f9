//! COM1 console and the `log` backend writing to it.

use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::interrupts::without_interrupts;
use x86_64::instructions::port::Port;

pub const COM1: u16 = 0x3F8;
const LINE_STATUS: u16 = COM1 + 5;
const DATA_READY: u8 = 0x01;

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1) });

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        x86_64::instructions::interrupts::without_interrupts(|| {
            let mut serial = $crate::serial::SERIAL.lock();
            let _ = writeln!(serial, $($arg)*);
        });
    }};
}

pub fn putc(byte: u8) {
    without_interrupts(|| SERIAL.lock().send(byte));
}

/// Next received byte, if the UART has one.
pub fn try_receive() -> Option<u8> {
    let mut status = Port::<u8>::new(LINE_STATUS);
    let mut data = Port::<u8>::new(COM1);
    unsafe { (status.read() & DATA_READY != 0).then(|| data.read()) }
}

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            println!("[{:<5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

pub fn init() -> Result<(), &'static str> {
    without_interrupts(|| SERIAL.lock().init());
    log::set_logger(&LOGGER).map_err(|_| "logger already installed")?;
    log::set_max_level(rustos_kernel::config::LOG_LEVEL);
    Ok(())
}
