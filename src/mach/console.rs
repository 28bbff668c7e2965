use super::memory::{Memory, TEXT_END, TEXT_START};
use crate::host::FontSize;

/// ## Text console
///
/// A character grid stored in the text buffer at the bottom of memory,
/// sized by the screen and the current font. Everything written is
/// also queued for the host to drain, and the most recent output is
/// kept as a transcript.

#[derive(Debug)]
pub struct Console {
    font: FontSize,
    width: u16,
    height: u16,
    row: u16,
    col: u16,
    transcript: Vec<u8>,
    pending: Vec<u8>,
}

/// The transcript keeps at least this many of the latest bytes.
pub const TRANSCRIPT_LIMIT: usize = 0x1000;

/// Length of a UTF-8 sequence cut short at the end of `bytes`.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0xC0 != 0x80 {
            let need = match b {
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => 1,
            };
            return if need > back { back } else { 0 };
        }
    }
    0
}

impl Console {
    pub fn new(width: u16, height: u16) -> Console {
        Console {
            font: FontSize::Large,
            width,
            height,
            row: 0,
            col: 0,
            transcript: vec![],
            pending: vec![],
        }
    }

    pub fn font(&self) -> FontSize {
        self.font
    }

    /// Grid size in characters.
    pub fn columns(&self) -> u16 {
        (self.width / self.font.cell().0).max(1)
    }

    pub fn rows(&self) -> u16 {
        let rows = (self.height / self.font.cell().1).max(1);
        rows.min((TEXT_END - TEXT_START) / self.columns())
    }

    pub fn cursor(&self) -> (u16, u16) {
        (self.row, self.col)
    }

    pub fn set_font(&mut self, memory: &mut Memory, font: FontSize) {
        self.font = font;
        self.clear(memory);
    }

    pub fn clear(&mut self, memory: &mut Memory) {
        let len = self.columns() * self.rows();
        for b in memory.region_mut(TEXT_START, len) {
            *b = 0;
        }
        self.row = 0;
        self.col = 0;
    }

    pub fn locate(&mut self, row: i32, col: i32) {
        self.row = row.max(0).min(i32::from(self.rows()) - 1) as u16;
        self.col = col.max(0).min(i32::from(self.columns()) - 1) as u16;
    }

    pub fn put(&mut self, memory: &mut Memory, byte: u8) {
        self.transcript.push(byte);
        if self.transcript.len() >= 2 * TRANSCRIPT_LIMIT {
            let excess = self.transcript.len() - TRANSCRIPT_LIMIT;
            self.transcript.drain(..excess);
        }
        self.pending.push(byte);
        match byte {
            b'\n' => self.newline(memory),
            b'\r' => self.col = 0,
            _ => {
                let at = TEXT_START + self.row * self.columns() + self.col;
                memory.set_byte(at, byte);
                self.col += 1;
                if self.col >= self.columns() {
                    self.newline(memory);
                }
            }
        }
    }

    pub fn write(&mut self, memory: &mut Memory, bytes: &[u8]) {
        for &b in bytes {
            self.put(memory, b);
        }
    }

    fn newline(&mut self, memory: &mut Memory) {
        self.col = 0;
        if self.row + 1 < self.rows() {
            self.row += 1;
            return;
        }
        let cols = usize::from(self.columns());
        let grid = memory.region_mut(TEXT_START, self.columns() * self.rows());
        grid.copy_within(cols.., 0);
        let last = grid.len() - cols;
        for b in grid[last..].iter_mut() {
            *b = 0;
        }
    }

    /// Grid contents, one string per row, trailing blanks trimmed.
    pub fn lines(&self, memory: &Memory) -> Vec<String> {
        let cols = self.columns();
        (0..self.rows())
            .map(|row| {
                let text = memory.region(TEXT_START + row * cols, cols);
                let end = text.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                text[..end]
                    .iter()
                    .map(|&b| if b == 0 { ' ' } else { char::from(b) })
                    .collect()
            })
            .collect()
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Output not yet returned by a previous call. A character split
    /// across writes waits for its remaining bytes.
    pub fn take_output(&mut self) -> String {
        let end = self.pending.len() - incomplete_tail(&self.pending);
        let s = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.drain(..end);
        s
    }

    /// Everything still queued, complete or not.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let s = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(s)
    }

    pub fn has_output(&self) -> bool {
        self.pending.len() > incomplete_tail(&self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_sizes() {
        let mut memory = Memory::new();
        let mut console = Console::new(160, 80);
        assert_eq!((console.columns(), console.rows()), (20, 5));
        console.set_font(&mut memory, FontSize::Small);
        assert_eq!((console.columns(), console.rows()), (26, 6));
    }

    #[test]
    fn test_wrap_and_scroll() {
        let mut memory = Memory::new();
        let mut console = Console::new(160, 80);
        for i in 0..6 {
            console.write(&mut memory, format!("line{}\n", i).as_bytes());
        }
        let lines = console.lines(&memory);
        assert_eq!(lines[0], "line2");
        assert_eq!(lines[3], "line5");
        assert_eq!(lines[4], "");
        console.write(&mut memory, &[b'x'; 21]);
        assert_eq!(console.cursor(), (4, 1));
    }

    #[test]
    fn test_take_output_drains_once() {
        let mut memory = Memory::new();
        let mut console = Console::new(160, 80);
        console.write(&mut memory, b"hi");
        assert_eq!(console.take_output(), "hi");
        assert!(!console.has_output());
        assert_eq!(console.take_output(), "");
        assert_eq!(console.transcript(), b"hi");
    }

    #[test]
    fn test_split_character_waits() {
        let mut memory = Memory::new();
        let mut console = Console::new(160, 80);
        let euro = "\u{20AC}".as_bytes();
        console.write(&mut memory, b"a");
        console.write(&mut memory, &euro[..2]);
        assert_eq!(console.take_output(), "a");
        assert!(!console.has_output());
        console.write(&mut memory, &euro[2..]);
        assert_eq!(console.take_output(), "\u{20AC}");
        console.write(&mut memory, &[0xE2]);
        assert_eq!(console.flush(), Some("\u{FFFD}".to_string()));
        assert_eq!(console.flush(), None);
    }

    #[test]
    fn test_output_does_not_accumulate() {
        let mut memory = Memory::new();
        let mut console = Console::new(160, 80);
        for _ in 0..10 * TRANSCRIPT_LIMIT {
            console.put(&mut memory, b'x');
            console.take_output();
        }
        assert!(console.transcript().len() < 2 * TRANSCRIPT_LIMIT);
        assert!(console.transcript().len() >= TRANSCRIPT_LIMIT);
        assert!(console.pending.is_empty());
    }
}
