#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSize {
    Large,
    Small,
}

impl FontSize {
    /// Cell size in pixels of a single-byte character.
    pub fn cell(self) -> (u16, u16) {
        match self {
            FontSize::Large => (8, 16),
            FontSize::Small => (6, 12),
        }
    }
}

/// Packed glyph bitmap, rows most significant bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    pub width: u16,
    pub height: u16,
    pub bits: Vec<u8>,
}

/// ## Font collaborator
///
/// Codes below 0x100 are single-byte Latin characters; larger codes are
/// double-byte characters, twice as wide.
pub trait Font {
    fn glyph(&self, code: u16, size: FontSize) -> Option<Glyph>;
}

/// A font with no glyphs. Text still reaches the console.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFont;

impl Font for NoFont {
    fn glyph(&self, _code: u16, _size: FontSize) -> Option<Glyph> {
        None
    }
}
