/// ## Access width of a memory operation
///
/// The width alone decides how many bytes move and how the value
/// wraps: bytes are unsigned, words sign-extend at 16 bits and
/// dwords are plain 32-bit two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    pub fn bytes(self) -> u16 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 4,
        }
    }

    pub fn normalize(self, value: i32) -> i32 {
        match self {
            Width::Byte => value & 0xFF,
            Width::Word => value as i16 as i32,
            Width::Dword => value,
        }
    }

    fn code(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 3,
        }
    }

    fn from_code(code: u32) -> Width {
        match code & 0b11 {
            2 => Width::Word,
            3 => Width::Dword,
            _ => Width::Byte,
        }
    }
}

impl std::fmt::Display for Width {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Width::Byte => write!(f, "B"),
            Width::Word => write!(f, "W"),
            Width::Dword => write!(f, "D"),
        }
    }
}

const WIDTH_SHIFT: u32 = 16;
const RELATIVE_BIT: u32 = 1 << 23;

/// ## Address handle
///
/// Compiled code pushes a handle wherever C would use an lvalue.
/// The 32-bit encoding is:
///
/// ```text
/// bit 23      relative: add the base register before use
/// bits 16-17  width code: 1 byte, 2 word, 3 dword
/// bits 0-15   address or base offset
/// ```
///
/// Nothing else in the crate may know this layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub addr: u16,
    pub width: Width,
    pub relative: bool,
}

impl Handle {
    pub fn new(addr: u16, width: Width, relative: bool) -> Handle {
        Handle {
            addr,
            width,
            relative,
        }
    }

    pub fn absolute(addr: u16, width: Width) -> Handle {
        Handle::new(addr, width, false)
    }

    pub fn encode(self) -> i32 {
        let mut bits = u32::from(self.addr) | (self.width.code() << WIDTH_SHIFT);
        if self.relative {
            bits |= RELATIVE_BIT;
        }
        bits as i32
    }

    pub fn decode(value: i32) -> Handle {
        let bits = value as u32;
        Handle {
            addr: (bits & 0xFFFF) as u16,
            width: Width::from_code(bits >> WIDTH_SHIFT),
            relative: bits & RELATIVE_BIT != 0,
        }
    }

    /// Absolute address after applying `base` when relative.
    pub fn resolve(self, base: u16) -> u16 {
        if self.relative {
            self.addr.wrapping_add(base)
        } else {
            self.addr
        }
    }

    /// Combine the upper (width and mode) bits of `template` with a new address.
    /// Only the string search syscalls use this.
    pub fn rebase(template: i32, addr: u16) -> i32 {
        ((template as u32 & 0xFFFF_0000) | u32::from(addr)) as i32
    }
}
