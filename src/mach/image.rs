use super::LoadError;

/// ## LAV image header
///
/// ```text
/// 0..3    magic "LAV"
/// 3       format version
/// 5       string mask, XORed into every PUSH_STR payload byte
/// 8..11   entry point (24-bit LE), or screen geometry when byte 8 is 0
/// 16..    code
/// ```

pub const MAGIC: [u8; 3] = *b"LAV";
pub const VERSION: u8 = 0x12;
pub const HEADER_LEN: usize = 16;
pub const DEFAULT_ENTRY: u32 = HEADER_LEN as u32;
pub const DEFAULT_WIDTH: u16 = 160;
pub const DEFAULT_HEIGHT: u16 = 80;
pub const FRAMEBUFFER_LIMIT: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub mask: u8,
    pub entry: u32,
    pub width: u16,
    pub height: u16,
}

impl Default for Header {
    fn default() -> Header {
        Header {
            version: VERSION,
            mask: 0,
            entry: DEFAULT_ENTRY,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl Header {
    pub fn new(mask: u8, width: u16, height: u16) -> Header {
        Header {
            mask,
            width,
            height,
            ..Header::default()
        }
    }

    pub fn parse(image: &[u8]) -> Result<Header, LoadError> {
        if image.len() < HEADER_LEN {
            return Err(LoadError::TooShort(image.len()));
        }
        if image[0..3] != MAGIC {
            return Err(LoadError::BadMagic);
        }
        let mut header = Header {
            version: image[3],
            mask: image[5],
            ..Header::default()
        };
        if image[8] == 0 && (image[9] != 0 || image[10] != 0) {
            header.width = u16::from(image[9]) * 16;
            header.height = u16::from(image[10]) * 16;
        } else if image[8..11] != [0, 0, 0] {
            header.entry =
                u32::from(image[8]) | u32::from(image[9]) << 8 | u32::from(image[10]) << 16;
        }
        if !header.geometry_fits() {
            return Err(LoadError::Geometry(header.width, header.height));
        }
        if header.entry < DEFAULT_ENTRY || header.entry as usize >= image.len() {
            return Err(LoadError::Entry(header.entry));
        }
        Ok(header)
    }

    pub fn geometry_fits(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.width % 8 == 0
            && usize::from(self.width) * usize::from(self.height) / 8 <= FRAMEBUFFER_LIMIT
    }

    /// Geometry is stored in units of 16 pixels.
    pub fn geometry_encodable(&self) -> bool {
        self.width % 16 == 0
            && self.height % 16 == 0
            && self.width / 16 <= 0xFF
            && self.height / 16 <= 0xFF
            && self.geometry_fits()
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..3].copy_from_slice(&MAGIC);
        bytes[3] = self.version;
        bytes[5] = self.mask;
        if self.entry != DEFAULT_ENTRY {
            bytes[8] = self.entry as u8;
            bytes[9] = (self.entry >> 8) as u8;
            bytes[10] = (self.entry >> 16) as u8;
        } else if (self.width, self.height) != (DEFAULT_WIDTH, DEFAULT_HEIGHT) {
            bytes[9] = (self.width / 16) as u8;
            bytes[10] = (self.height / 16) as u8;
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(header: [u8; HEADER_LEN], code: &[u8]) -> Vec<u8> {
        let mut v = header.to_vec();
        v.extend_from_slice(code);
        v
    }

    #[test]
    fn test_short_file_rejected() {
        assert_eq!(Header::parse(&[0x4C; 15]), Err(LoadError::TooShort(15)));
    }

    #[test]
    fn test_geometry_round_trips() {
        let header = Header::new(0, 128, 64);
        assert!(header.geometry_encodable());
        let parsed = Header::parse(&image(header.to_bytes(), &[0x3A])).unwrap();
        assert_eq!((parsed.width, parsed.height), (128, 64));
        assert!(!Header::new(0, 160, 72).geometry_encodable());
        assert!(!Header::new(0, 4096, 16).geometry_encodable());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = Header::default().to_bytes();
        bytes[2] = b'X';
        assert_eq!(Header::parse(&image(bytes, &[0x3A])), Err(LoadError::BadMagic));
    }

    #[test]
    fn test_defaults() {
        let bytes = Header::default().to_bytes();
        assert_eq!(bytes[8..11], [0, 0, 0]);
        let header = Header::parse(&image(bytes, &[0x3A])).unwrap();
        assert_eq!(header, Header::default());
    }

    #[test]
    fn test_geometry_bytes() {
        let bytes = Header::new(0x55, 128, 64).to_bytes();
        assert_eq!(bytes[8..11], [0, 8, 4]);
        let header = Header::parse(&image(bytes, &[0x3A])).unwrap();
        assert_eq!((header.width, header.height, header.mask), (128, 64, 0x55));
        assert_eq!(header.entry, DEFAULT_ENTRY);
    }

    #[test]
    fn test_oversized_screen_rejected() {
        let bytes = Header::new(0, 256, 128).to_bytes();
        assert_eq!(
            Header::parse(&image(bytes, &[0x3A])),
            Err(LoadError::Geometry(256, 128))
        );
    }

    #[test]
    fn test_entry_must_be_inside_image() {
        let mut bytes = Header::default().to_bytes();
        bytes[8] = 0x40;
        assert_eq!(
            Header::parse(&image(bytes, &[0x3A])),
            Err(LoadError::Entry(0x40))
        );
        bytes[8] = 0x11;
        assert_eq!(Header::parse(&image(bytes, &[0x00, 0x3A])).unwrap().entry, 0x11);
    }
}
