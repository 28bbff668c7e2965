use super::assemble::quote;
use super::image::{Header, HEADER_LEN};
use super::opcode::SYSCALL_FIRST;
use super::{syscall, LoadError, Opcode, Operands};
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt::Write;

#[derive(Debug)]
enum Decoded {
    Op(Opcode, Vec<u8>),
    Sys(u8),
    Byte(u8),
}

fn le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

/// Decode the instruction at `at`; operand bytes are returned raw.
fn decode(code: &[u8], at: usize, mask: u8) -> (Decoded, usize) {
    let byte = code[at];
    if byte >= SYSCALL_FIRST {
        return (Decoded::Sys(byte), 1);
    }
    let op = match Opcode::try_from(byte) {
        Ok(op) => op,
        Err(_) => return (Decoded::Byte(byte), 1),
    };
    let rest = &code[at + 1..];
    let len = match op.operands() {
        Operands::Str => rest.iter().position(|&b| b ^ mask == 0).map(|p| p + 1),
        Operands::Data if rest.len() >= 4 => Some(4 + le(&rest[2..4]) as usize),
        Operands::Data => None,
        layout => layout.fixed_len(),
    };
    match len {
        Some(len) if len <= rest.len() => (Decoded::Op(op, rest[..len].to_vec()), 1 + len),
        _ => (Decoded::Byte(byte), 1),
    }
}

/// ## Disassembler
///
/// Image to assembly text that assembles back to the same bytes with
/// the same options. Jump targets get synthesized labels.
pub fn disassemble(image: &[u8]) -> Result<String, LoadError> {
    let header = Header::parse(image)?;
    let code = &image[HEADER_LEN..];

    let mut boundaries = BTreeSet::new();
    let mut targets = BTreeSet::new();
    let mut at = 0;
    while at < code.len() {
        boundaries.insert(at);
        let (decoded, len) = decode(code, at, header.mask);
        if let Decoded::Op(op, operands) = &decoded {
            if op.is_jump() {
                targets.insert(le(operands) as usize);
            }
        }
        at += len;
    }
    boundaries.insert(code.len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "; LAV version 0x{:02X} mask 0x{:02X} screen {}x{} entry 0x{:X}",
        header.version, header.mask, header.width, header.height, header.entry
    );
    let label = |target: usize| -> String {
        let offset = target.wrapping_sub(HEADER_LEN);
        if target >= HEADER_LEN && boundaries.contains(&offset) {
            format!("L{:04X}", offset)
        } else {
            target.saturating_sub(HEADER_LEN).to_string()
        }
    };
    let mut at = 0;
    while at < code.len() {
        if targets.contains(&(at + HEADER_LEN)) {
            let _ = writeln!(out, "L{:04X}:", at);
        }
        let (decoded, len) = decode(code, at, header.mask);
        let line = match decoded {
            Decoded::Byte(b) => format!("DB 0x{:02X}", b),
            Decoded::Sys(code) => match syscall::by_code(code) {
                Some(call) => call.name.to_string(),
                None => format!("SYS 0x{:02X}", code),
            },
            Decoded::Op(op, operands) => {
                let text = match op.operands() {
                    Operands::None => String::new(),
                    Operands::U8 => operands[0].to_string(),
                    Operands::I16 => (le(&operands) as u16 as i16).to_string(),
                    Operands::I32 => (le(&operands) as i32).to_string(),
                    Operands::Addr | Operands::Size => format!("0x{:04X}", le(&operands)),
                    Operands::Target => label(le(&operands) as usize),
                    Operands::Frame => format!("{} {}", le(&operands[..2]), operands[2]),
                    Operands::Str => {
                        let text: Vec<u8> = operands[..operands.len() - 1]
                            .iter()
                            .map(|b| b ^ header.mask)
                            .collect();
                        quote(&text)
                    }
                    Operands::Data => {
                        let mut s = format!("0x{:04X}", le(&operands[..2]));
                        for b in &operands[4..] {
                            let _ = write!(s, " {}", b);
                        }
                        s
                    }
                };
                if text.is_empty() {
                    op.mnemonic().to_string()
                } else {
                    format!("{} {}", op.mnemonic(), text)
                }
            }
        };
        let _ = writeln!(out, "    {}", line);
        at += len;
    }
    Ok(out)
}
