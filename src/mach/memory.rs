use super::{Handle, Width};

/// ## Program memory
///
/// One flat 64K region. Every program-visible address lands in here,
/// including the frame headers written by `CALL`.

pub const MEMORY_SIZE: usize = 0x1_0000;

pub const TEXT_START: u16 = 0x0000;
pub const TEXT_END: u16 = 0x0400;
pub const STRING_START: u16 = 0x0400;
pub const STRING_END: u16 = 0x1000;
pub const GRAPH_START: u16 = 0x1000;
pub const BACK_START: u16 = 0x1800;
pub const RASTER_SIZE: u16 = 0x0800;
pub const DATA_START: u16 = 0x2000;
pub const HEAP_START: u16 = 0xE000;

/// Size of the frame header written by `CALL`: 3 bytes PC, 2 bytes base.
pub const FRAME_HEADER: u16 = 5;
/// Every parameter slot holds a full dword.
pub const PARAM_SLOT: u16 = 4;

pub struct Memory {
    bytes: Box<[u8]>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Memory {{ {} bytes }}", self.bytes.len())
    }
}

impl Default for Memory {
    fn default() -> Memory {
        Memory {
            bytes: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
        }
    }
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }

    pub fn clear(&mut self) {
        for byte in self.bytes.iter_mut() {
            *byte = 0;
        }
    }

    pub fn byte(&self, addr: u16) -> u8 {
        self.bytes[usize::from(addr)]
    }

    pub fn set_byte(&mut self, addr: u16, value: u8) {
        self.bytes[usize::from(addr)] = value;
    }

    /// Little-endian read of `len` bytes; addresses wrap at 64K.
    pub fn read_le(&self, addr: u16, len: u16) -> u32 {
        let mut value = 0u32;
        for i in (0..len).rev() {
            value = (value << 8) | u32::from(self.byte(addr.wrapping_add(i)));
        }
        value
    }

    pub fn write_le(&mut self, addr: u16, len: u16, value: u32) {
        for i in 0..len {
            self.set_byte(addr.wrapping_add(i), (value >> (8 * i)) as u8);
        }
    }

    pub fn read(&self, addr: u16, width: Width) -> i32 {
        width.normalize(self.read_le(addr, width.bytes()) as i32)
    }

    /// Stores the truncated value and returns what a later read would see.
    pub fn write(&mut self, addr: u16, width: Width, value: i32) -> i32 {
        self.write_le(addr, width.bytes(), value as u32);
        width.normalize(value)
    }

    pub fn load(&self, handle: Handle, base: u16) -> i32 {
        self.read(handle.resolve(base), handle.width)
    }

    pub fn store(&mut self, handle: Handle, base: u16, value: i32) -> i32 {
        self.write(handle.resolve(base), handle.width, value)
    }

    /// NUL-terminated string at `addr`, without the terminator.
    pub fn cstr(&self, addr: u16) -> Vec<u8> {
        let mut s = vec![];
        let mut at = addr;
        loop {
            let byte = self.byte(at);
            if byte == 0 || s.len() >= MEMORY_SIZE {
                return s;
            }
            s.push(byte);
            at = at.wrapping_add(1);
        }
    }

    pub fn slice(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.byte(addr.wrapping_add(i as u16)))
            .collect()
    }

    pub fn copy_in(&mut self, addr: u16, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.set_byte(addr.wrapping_add(i as u16), *byte);
        }
    }

    pub fn region(&self, start: u16, len: u16) -> &[u8] {
        let start = usize::from(start);
        &self.bytes[start..start + usize::from(len)]
    }

    pub fn region_mut(&mut self, start: u16, len: u16) -> &mut [u8] {
        let start = usize::from(start);
        &mut self.bytes[start..start + usize::from(len)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_round_trip() {
        let mut mem = Memory::new();
        mem.write_le(0x2000, 3, 0x123456);
        assert_eq!(mem.byte(0x2000), 0x56);
        assert_eq!(mem.byte(0x2002), 0x12);
        assert_eq!(mem.read_le(0x2000, 3), 0x123456);
    }

    #[test]
    fn test_write_reports_truncated_value() {
        let mut mem = Memory::new();
        assert_eq!(mem.write(0x2000, Width::Byte, 300), 44);
        assert_eq!(mem.write(0x2002, Width::Word, 0x18000), -32768);
        assert_eq!(mem.read(0x2002, Width::Word), -32768);
    }

    #[test]
    fn test_dword_wraps_at_top_of_memory() {
        let mut mem = Memory::new();
        mem.write(0xFFFE, Width::Dword, 0x01020304);
        assert_eq!(mem.byte(0x0000), 0x02);
        assert_eq!(mem.read(0xFFFE, Width::Dword), 0x01020304);
    }

    #[test]
    fn test_cstr() {
        let mut mem = Memory::new();
        mem.copy_in(STRING_START, b"hi\0there");
        assert_eq!(mem.cstr(STRING_START), b"hi".to_vec());
    }
}
