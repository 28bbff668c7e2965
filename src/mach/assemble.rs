use super::image::{Header, HEADER_LEN};
use super::link::{Fixup, Link};
use super::syscall;
use super::{AsmError, AsmErrorKind, Opcode, Operands};

type Result<T> = std::result::Result<T, AsmError>;

/// Header fields the assembler writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsmOptions {
    pub mask: u8,
    pub width: u16,
    pub height: u16,
}

impl Default for AsmOptions {
    fn default() -> AsmOptions {
        let header = Header::default();
        AsmOptions {
            mask: header.mask,
            width: header.width,
            height: header.height,
        }
    }
}

/// ## Assembler
///
/// Mnemonic text to LAV image. One instruction per line, `label:` lines,
/// `;` comments. Core mnemonics are upper case, syscalls are called by
/// their lower case name (or `SYS code`), and `DB` emits raw bytes.
///
/// Pass 1 sizes every instruction to place labels. Pass 2 emits bytes,
/// recording a fixup for every jump operand, then links.
pub fn assemble(source: &str, options: &AsmOptions) -> Result<Vec<u8>> {
    let header = Header::new(options.mask, options.width, options.height);
    if !header.geometry_encodable() {
        return Err(AsmError::new(
            0,
            AsmErrorKind::Geometry(options.width, options.height),
        ));
    }
    let lines = parse(source)?;

    tracing::trace!("starting pass 1");
    let mut link = Link::new(HEADER_LEN as u32);
    let mut offset = 0usize;
    for line in &lines {
        if let Some(label) = &line.label {
            link.define(label, offset as u32, line.number)?;
        }
        if let Some(instr) = &line.instr {
            offset += instr.len();
        }
    }
    if HEADER_LEN + offset > 0xFF_FFFF {
        return Err(AsmError::new(0, AsmErrorKind::ImageTooLarge));
    }

    tracing::trace!("starting pass 2");
    let mut image = Vec::with_capacity(HEADER_LEN + offset);
    image.extend_from_slice(&header.to_bytes());
    for line in &lines {
        if let Some(instr) = &line.instr {
            instr.emit(&mut image, &mut link, header.mask, line.number)?;
        }
    }
    debug_assert_eq!(image.len(), HEADER_LEN + offset);

    tracing::trace!("linking");
    link.link(&mut image)?;
    Ok(image)
}

/// A string operand up to its first NUL. The machine reads the payload
/// only that far.
fn payload(s: &[u8]) -> &[u8] {
    match s.iter().position(|&b| b == 0) {
        Some(end) => &s[..end],
        None => s,
    }
}

#[derive(Debug)]
struct Line {
    number: usize,
    label: Option<String>,
    instr: Option<Instr>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Int(i64),
    Name(String),
    Str(Vec<u8>),
}

#[derive(Debug)]
enum Instr {
    Op(Opcode, Vec<Operand>),
    Sys(u8),
    Bytes(Vec<u8>),
}

impl Instr {
    fn len(&self) -> usize {
        match self {
            Instr::Op(op, operands) => {
                let operand_len = match op.operands() {
                    Operands::Str => match operands.first() {
                        Some(Operand::Str(s)) => payload(s).len() + 1,
                        _ => 1,
                    },
                    Operands::Data => 4 + operands.len().saturating_sub(1),
                    layout => layout.fixed_len().unwrap_or(0),
                };
                1 + operand_len
            }
            Instr::Sys(_) => 1,
            Instr::Bytes(bytes) => bytes.len(),
        }
    }

    fn emit(&self, out: &mut Vec<u8>, link: &mut Link, mask: u8, line: usize) -> Result<()> {
        let (op, operands) = match self {
            Instr::Sys(code) => {
                out.push(*code);
                return Ok(());
            }
            Instr::Bytes(bytes) => {
                out.extend_from_slice(bytes);
                return Ok(());
            }
            Instr::Op(op, operands) => (*op, operands),
        };
        out.push(op as u8);
        let arg = |i: usize| -> Result<&Operand> {
            operands
                .get(i)
                .ok_or_else(|| AsmError::new(line, AsmErrorKind::MissingOperand))
        };
        let int = |i: usize, min: i64, max: i64| -> Result<i64> {
            match arg(i)? {
                Operand::Int(n) if *n >= min && *n <= max => Ok(*n),
                other => Err(bad_operand(line, other)),
            }
        };
        let expected = match op.operands() {
            Operands::None => 0,
            Operands::U8 => {
                out.push(int(0, -128, 255)? as u8);
                1
            }
            Operands::I16 => {
                push_le(out, int(0, -32768, 65535)? as u32, 2);
                1
            }
            Operands::I32 => {
                push_le(out, int(0, i64::from(i32::MIN), i64::from(u32::MAX))? as u32, 4);
                1
            }
            Operands::Addr | Operands::Size => {
                push_le(out, int(0, 0, 65535)? as u32, 2);
                1
            }
            Operands::Target => {
                match arg(0)? {
                    Operand::Name(label) => {
                        link.link_position_to_label(Fixup {
                            position: out.len(),
                            label: label.clone(),
                            width: 3,
                            line,
                        });
                        push_le(out, 0, 3);
                    }
                    Operand::Int(n) if *n >= 0 && *n <= 0xFF_FFFF - HEADER_LEN as i64 => {
                        push_le(out, (*n as u32) + HEADER_LEN as u32, 3);
                    }
                    other => return Err(bad_operand(line, other)),
                }
                1
            }
            Operands::Frame => {
                push_le(out, int(0, 0, 65535)? as u32, 2);
                out.push(int(1, 0, 255)? as u8);
                2
            }
            Operands::Str => {
                match arg(0)? {
                    Operand::Str(s) => {
                        out.extend(payload(s).iter().map(|b| b ^ mask));
                        out.push(mask);
                    }
                    other => return Err(bad_operand(line, other)),
                }
                1
            }
            Operands::Data => {
                push_le(out, int(0, 0, 65535)? as u32, 2);
                let len = operands.len().saturating_sub(1);
                if len > 0xFFFF {
                    return Err(AsmError::new(line, AsmErrorKind::ImageTooLarge));
                }
                push_le(out, len as u32, 2);
                for i in 1..operands.len() {
                    out.push(int(i, -128, 255)? as u8);
                }
                operands.len().max(1)
            }
        };
        if operands.len() > expected {
            return Err(bad_operand(line, &operands[expected]));
        }
        Ok(())
    }
}

fn push_le(out: &mut Vec<u8>, value: u32, len: usize) {
    for i in 0..len {
        out.push((value >> (8 * i)) as u8);
    }
}

fn bad_operand(line: usize, operand: &Operand) -> AsmError {
    let text = match operand {
        Operand::Int(n) => n.to_string(),
        Operand::Name(s) => s.clone(),
        Operand::Str(s) => quote(s),
    };
    AsmError::new(line, AsmErrorKind::BadOperand(text))
}

fn parse(source: &str) -> Result<Vec<Line>> {
    let mut lines = vec![];
    for (index, text) in source.lines().enumerate() {
        let number = index + 1;
        let mut words = split(text, number)?;
        if words.is_empty() {
            continue;
        }
        let mut label = None;
        if !words[0].starts_with('"') && words[0].ends_with(':') {
            let word = words.remove(0);
            let name = &word[..word.len() - 1];
            if name.is_empty() {
                return Err(AsmError::new(number, AsmErrorKind::BadOperand(word)));
            }
            label = Some(name.to_string());
        }
        let instr = if words.is_empty() {
            None
        } else {
            Some(instruction(&words, number)?)
        };
        lines.push(Line {
            number,
            label,
            instr,
        });
    }
    Ok(lines)
}

fn instruction(words: &[String], line: usize) -> Result<Instr> {
    let mnemonic = words[0].as_str();
    let operands = words[1..]
        .iter()
        .map(|w| operand(w, line))
        .collect::<Result<Vec<_>>>()?;
    if let Some(op) = Opcode::from_mnemonic(mnemonic) {
        return Ok(Instr::Op(op, operands));
    }
    if let Some(call) = syscall::by_name(mnemonic) {
        if !operands.is_empty() {
            return Err(bad_operand(line, &operands[0]));
        }
        return Ok(Instr::Sys(call.code));
    }
    let byte = |operand: &Operand| match operand {
        Operand::Int(n) if *n >= -128 && *n <= 255 => Ok(*n as u8),
        other => Err(bad_operand(line, other)),
    };
    match mnemonic {
        "SYS" => match operands.as_slice() {
            [Operand::Int(n)] if *n >= 0x80 && *n <= 0xFF => Ok(Instr::Sys(*n as u8)),
            [other] => Err(bad_operand(line, other)),
            _ => Err(AsmError::new(line, AsmErrorKind::MissingOperand)),
        },
        "DB" => Ok(Instr::Bytes(
            operands.iter().map(byte).collect::<Result<Vec<u8>>>()?,
        )),
        _ => Err(AsmError::new(
            line,
            AsmErrorKind::UnknownMnemonic(mnemonic.to_string()),
        )),
    }
}

fn operand(word: &str, line: usize) -> Result<Operand> {
    if word.starts_with('"') {
        return match unquote(word) {
            Some(bytes) => Ok(Operand::Str(bytes)),
            None => Err(AsmError::new(
                line,
                AsmErrorKind::BadOperand(word.to_string()),
            )),
        };
    }
    if let Some(n) = parse_int(word) {
        return Ok(Operand::Int(n));
    }
    Ok(Operand::Name(word.to_string()))
}

fn parse_int(word: &str) -> Option<i64> {
    let (negative, digits) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.chars().next().map_or(false, |c| c.is_ascii_digit()) {
        digits.parse::<i64>().ok()?
    } else {
        return None;
    };
    Some(if negative { -value } else { value })
}

/// Split a line into words on whitespace and commas, keeping quoted
/// strings whole and dropping any `;` comment.
fn split(text: &str, line: usize) -> Result<Vec<String>> {
    let mut words = vec![];
    let mut word = String::new();
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            ';' => break,
            '"' => {
                word.push(ch);
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    word.push(ch);
                    if ch == '\\' {
                        if let Some(escaped) = chars.next() {
                            word.push(escaped);
                        }
                    } else if ch == '"' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(AsmError::new(line, AsmErrorKind::BadOperand(word)));
                }
            }
            c if c.is_whitespace() || c == ',' => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            }
            c => word.push(c),
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    Ok(words)
}

/// Quote bytes as an assembly string literal.
pub fn quote(bytes: &[u8]) -> String {
    let mut s = String::from("\"");
    for &b in bytes {
        match b {
            b'\n' => s.push_str("\\n"),
            b'\r' => s.push_str("\\r"),
            b'\t' => s.push_str("\\t"),
            b'\\' => s.push_str("\\\\"),
            b'"' => s.push_str("\\\""),
            0x20..=0x7E => s.push(char::from(b)),
            _ => s.push_str(&format!("\\x{:02X}", b)),
        }
    }
    s.push('"');
    s
}

/// Inverse of [`quote`]. `None` for malformed input.
pub fn unquote(word: &str) -> Option<Vec<u8>> {
    let inner = word.strip_prefix('"')?.strip_suffix('"')?;
    let mut bytes = vec![];
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let byte = match chars.next()? {
            'n' => b'\n',
            'r' => b'\r',
            't' => b'\t',
            '0' => 0,
            '\\' => b'\\',
            '"' => b'"',
            '\'' => b'\'',
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                u8::from_str_radix(&hex, 16).ok()?
            }
            _ => return None,
        };
        bytes.push(byte);
    }
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(source: &str) -> Vec<u8> {
        assemble(source, &AsmOptions::default()).unwrap()[HEADER_LEN..].to_vec()
    }

    #[test]
    fn test_header_magic() {
        let image = assemble("EXIT", &AsmOptions::default()).unwrap();
        assert_eq!(image[0..3], *b"LAV");
        assert_eq!(image.len(), HEADER_LEN + 1);
    }

    #[test]
    fn test_immediates_little_endian() {
        assert_eq!(
            code("PUSH_B 200\nPUSH_W -2\nPUSH_D 0x01020304"),
            vec![0x01, 200, 0x02, 0xFE, 0xFF, 0x03, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn test_jump_targets_add_header_length() {
        let bytes = code("JMP end\nNOP\nend:\nEXIT");
        assert_eq!(bytes, vec![0x34, 5 + 16, 0, 0, 0x00, 0x3A]);
    }

    #[test]
    fn test_backward_label() {
        let bytes = code("top: NOP\nJZ top");
        assert_eq!(bytes, vec![0x00, 0x35, 16, 0, 0]);
    }

    #[test]
    fn test_string_masked_with_terminator() {
        let options = AsmOptions {
            mask: 0x20,
            ..AsmOptions::default()
        };
        let image = assemble("PUSH_STR \"A;b\"", &options).unwrap();
        assert_eq!(image[5], 0x20);
        assert_eq!(image[HEADER_LEN..], [0x16, b'A' ^ 0x20, b';' ^ 0x20, b'b' ^ 0x20, 0x20]);
    }

    #[test]
    fn test_geometry_must_be_encodable() {
        let options = AsmOptions {
            height: 72,
            ..AsmOptions::default()
        };
        assert_eq!(
            assemble("EXIT", &options).unwrap_err().kind,
            AsmErrorKind::Geometry(160, 72)
        );
    }

    #[test]
    fn test_string_stops_at_nul() {
        let bytes = code("PUSH_STR \"a\\0b\"\nEXIT");
        assert_eq!(bytes, vec![0x16, b'a', 0, 0x3A]);
    }

    #[test]
    fn test_syscalls_and_directives() {
        let bytes = code("printf\nSYS 0xC5\nDB 1 2\nINIT 0x2000 7 8\nFUNC 13 2");
        assert_eq!(
            bytes,
            vec![0x82, 0xC5, 1, 2, 0x3C, 0x00, 0x20, 2, 0, 7, 8, 0x38, 13, 0, 2]
        );
    }

    #[test]
    fn test_undefined_label_is_fatal() {
        let err = assemble("NOP\nCALL missing", &AsmOptions::default()).unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, AsmErrorKind::UndefinedLabel("missing".into()));
    }

    #[test]
    fn test_unknown_mnemonic() {
        let err = assemble("FROB 1", &AsmOptions::default()).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownMnemonic("FROB".into()));
    }

    #[test]
    fn test_operand_range_checked() {
        assert!(assemble("PUSH_B 256", &AsmOptions::default()).is_err());
        assert!(assemble("LD_B", &AsmOptions::default()).is_err());
        assert!(assemble("POP 1", &AsmOptions::default()).is_err());
    }

    #[test]
    fn test_quote_round_trip() {
        let bytes = b"a\"b\\\n\x01\xFFz".to_vec();
        assert_eq!(unquote(&quote(&bytes)), Some(bytes));
    }
}
