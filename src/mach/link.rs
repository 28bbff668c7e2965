use super::{AsmError, AsmErrorKind};
use std::collections::HashMap;

type Result<T> = std::result::Result<T, AsmError>;

/// A jump or call operand waiting for its label's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    /// Offset of the operand within the image.
    pub position: usize,
    pub label: String,
    /// Operand width in bytes.
    pub width: usize,
    pub line: usize,
}

/// ## Label table
///
/// Labels hold code-relative offsets. Patched operands hold the
/// header-relative address the machine jumps to, so `bias` is added
/// on the way out.

#[derive(Debug, Default)]
pub struct Link {
    bias: u32,
    labels: HashMap<String, u32>,
    fixups: Vec<Fixup>,
}

impl Link {
    pub fn new(bias: u32) -> Link {
        Link {
            bias,
            ..Link::default()
        }
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        self.fixups.clear();
    }

    pub fn define(&mut self, label: &str, offset: u32, line: usize) -> Result<()> {
        if self.labels.insert(label.to_string(), offset).is_some() {
            return Err(AsmError::new(
                line,
                AsmErrorKind::DuplicateLabel(label.to_string()),
            ));
        }
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.labels.get(label).copied()
    }

    pub fn link_position_to_label(&mut self, fixup: Fixup) {
        self.fixups.push(fixup);
    }

    pub fn link(&mut self, code: &mut [u8]) -> Result<()> {
        for fixup in std::mem::take(&mut self.fixups) {
            let offset = match self.labels.get(&fixup.label) {
                Some(offset) => *offset,
                None => {
                    return Err(AsmError::new(
                        fixup.line,
                        AsmErrorKind::UndefinedLabel(fixup.label),
                    ))
                }
            };
            let target = offset + self.bias;
            for i in 0..fixup.width {
                code[fixup.position + i] = (target >> (8 * i)) as u8;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patches_with_bias() {
        let mut link = Link::new(16);
        let mut code = vec![0u8; 8];
        link.define("top", 0x0102, 1).unwrap();
        link.link_position_to_label(Fixup {
            position: 1,
            label: "top".into(),
            width: 3,
            line: 2,
        });
        link.link(&mut code).unwrap();
        assert_eq!(code[1..4], [0x12, 0x01, 0x00]);
    }

    #[test]
    fn test_undefined_label() {
        let mut link = Link::new(16);
        let mut code = vec![0u8; 4];
        link.link_position_to_label(Fixup {
            position: 1,
            label: "nowhere".into(),
            width: 3,
            line: 7,
        });
        let err = link.link(&mut code).unwrap_err();
        assert_eq!(err.line, 7);
        assert_eq!(err.kind, AsmErrorKind::UndefinedLabel("nowhere".into()));
    }

    #[test]
    fn test_duplicate_label() {
        let mut link = Link::new(16);
        link.define("a", 0, 1).unwrap();
        assert!(link.define("a", 4, 3).is_err());
    }
}
