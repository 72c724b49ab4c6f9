//! Scancode set 1 to ASCII, for bytes the keyboard vector forwards to
//! stdin.

pub const DATA_PORT: u16 = 0x60;
pub const STATUS_PORT: u16 = 0x64;
/// Output buffer full.
pub const STATUS_OUTPUT_FULL: u8 = 0x01;

const EXTENDED: u8 = 0xE0;
const RELEASE: u8 = 0x80;

const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;
const CTRL: u8 = 0x1D;
const ALT: u8 = 0x38;

/// Codes 0x00..0x3A, unshifted then shifted. 0 means no character.
const NORMAL: &[u8; 0x3A] = b"\0\x1b1234567890-=\x08\tqwertyuiop[]\n\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";
const SHIFTED: &[u8; 0x3A] = b"\0\x1b!@#$%^&*()_+\x08\tQWERTYUIOP{}\n\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

#[derive(Debug, Default)]
pub struct ScancodeDecoder {
    extended: bool,
    shift: bool,
    ctrl: bool,
    alt: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            extended: false,
            shift: false,
            ctrl: false,
            alt: false,
        }
    }

    /// Feeds one scancode. Returns a byte on key press, `None` for
    /// releases, modifiers and keys without an ASCII form.
    pub fn process(&mut self, scancode: u8) -> Option<u8> {
        if scancode == EXTENDED {
            self.extended = true;
            return None;
        }

        let released = scancode & RELEASE != 0;
        let code = scancode & !RELEASE;
        let extended = core::mem::take(&mut self.extended);

        match code {
            LEFT_SHIFT | RIGHT_SHIFT => {
                self.shift = !released;
                return None;
            }
            CTRL => {
                self.ctrl = !released;
                return None;
            }
            ALT => {
                self.alt = !released;
                return None;
            }
            _ => {}
        }
        // arrows and the keypad block have no ASCII form
        if released || extended || self.alt {
            return None;
        }

        let table = if self.shift { SHIFTED } else { NORMAL };
        let byte = *table.get(usize::from(code))?;
        match byte {
            0 => None,
            b'a'..=b'z' | b'A'..=b'Z' if self.ctrl => Some(byte & 0x1f),
            _ => Some(byte),
        }
    }
}
