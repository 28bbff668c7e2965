use super::Width;
use std::convert::TryFrom;

/// ## Operand layout of an instruction
///
/// Everything after the opcode byte, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    None,
    /// Unsigned byte immediate.
    U8,
    /// Signed word immediate.
    I16,
    /// Dword immediate.
    I32,
    /// 16-bit address or base offset.
    Addr,
    /// 16-bit size.
    Size,
    /// 24-bit header-relative code address.
    Target,
    /// Frame size (16 bits) then argument count (8 bits).
    Frame,
    /// NUL-terminated string payload.
    Str,
    /// 16-bit address, 16-bit length, then that many bytes.
    Data,
}

impl Operands {
    /// Operand bytes for layouts that do not depend on the payload.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            Operands::None => Some(0),
            Operands::U8 => Some(1),
            Operands::I16 | Operands::Addr | Operands::Size => Some(2),
            Operands::Target | Operands::Frame => Some(3),
            Operands::I32 => Some(4),
            Operands::Str | Operands::Data => None,
        }
    }
}

macro_rules! opcodes {
    ($($name:ident = $code:literal, $mnemonic:literal, $operands:ident;)*) => {
        /// ## Virtual machine instruction set
        ///
        /// Stack machine; every operation works on the evaluation stack
        /// except the frame instructions, which also touch the header at
        /// `base`. `0x80..=0xDF` is reserved for syscalls.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($name = $code,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            pub fn operands(self) -> Operands {
                match self {
                    $(Opcode::$name => Operands::$operands,)*
                }
            }

            pub fn from_mnemonic(s: &str) -> Option<Opcode> {
                match s {
                    $($mnemonic => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;
            fn try_from(code: u8) -> Result<Opcode, u8> {
                match code {
                    $($code => Ok(Opcode::$name),)*
                    _ => Err(code),
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "NOP", None;
    PushB = 0x01, "PUSH_B", U8;
    PushW = 0x02, "PUSH_W", I16;
    PushD = 0x03, "PUSH_D", I32;
    LdB = 0x04, "LD_B", Addr;
    LdW = 0x05, "LD_W", Addr;
    LdD = 0x06, "LD_D", Addr;
    LdLB = 0x07, "LD_LB", Addr;
    LdLW = 0x08, "LD_LW", Addr;
    LdLD = 0x09, "LD_LD", Addr;
    LdiB = 0x0A, "LDI_B", Addr;
    LdiW = 0x0B, "LDI_W", Addr;
    LdiD = 0x0C, "LDI_D", Addr;
    LdiLB = 0x0D, "LDI_LB", Addr;
    LdiLW = 0x0E, "LDI_LW", Addr;
    LdiLD = 0x0F, "LDI_LD", Addr;
    LeaB = 0x10, "LEA_B", Addr;
    LeaW = 0x11, "LEA_W", Addr;
    LeaD = 0x12, "LEA_D", Addr;
    LeaLB = 0x13, "LEA_LB", Addr;
    LeaLW = 0x14, "LEA_LW", Addr;
    LeaLD = 0x15, "LEA_LD", Addr;
    PushStr = 0x16, "PUSH_STR", Str;
    Load = 0x17, "LOAD", None;
    Store = 0x18, "STORE", None;
    Pop = 0x19, "POP", None;
    Dup = 0x1A, "DUP", None;
    Neg = 0x1B, "NEG", None;
    IncPre = 0x1C, "INC_PRE", None;
    DecPre = 0x1D, "DEC_PRE", None;
    IncPost = 0x1E, "INC_POST", None;
    DecPost = 0x1F, "DEC_POST", None;
    Add = 0x20, "ADD", None;
    Sub = 0x21, "SUB", None;
    Mul = 0x22, "MUL", None;
    Div = 0x23, "DIV", None;
    Mod = 0x24, "MOD", None;
    And = 0x25, "AND", None;
    Or = 0x26, "OR", None;
    Xor = 0x27, "XOR", None;
    Not = 0x28, "NOT", None;
    Shl = 0x29, "SHL", None;
    Shr = 0x2A, "SHR", None;
    LNot = 0x2B, "LNOT", None;
    Eq = 0x2E, "EQ", None;
    Ne = 0x2F, "NE", None;
    Lt = 0x30, "LT", None;
    Gt = 0x31, "GT", None;
    Le = 0x32, "LE", None;
    Ge = 0x33, "GE", None;
    Jmp = 0x34, "JMP", Target;
    Jz = 0x35, "JZ", Target;
    Jnz = 0x36, "JNZ", Target;
    Call = 0x37, "CALL", Target;
    Func = 0x38, "FUNC", Frame;
    Ret = 0x39, "RET", None;
    Exit = 0x3A, "EXIT", None;
    Space = 0x3B, "SPACE", Size;
    Init = 0x3C, "INIT", Data;
    CastB = 0x3D, "CAST_B", None;
    CastW = 0x3E, "CAST_W", None;
    CastD = 0x3F, "CAST_D", None;
    AddrB = 0x40, "ADDR_B", Addr;
    AddrW = 0x41, "ADDR_W", Addr;
    AddrD = 0x42, "ADDR_D", Addr;
    AddrLB = 0x43, "ADDR_LB", Addr;
    AddrLW = 0x44, "ADDR_LW", Addr;
    AddrLD = 0x45, "ADDR_LD", Addr;
}

pub const SYSCALL_FIRST: u8 = 0x80;
pub const SYSCALL_LAST: u8 = 0xDF;

/// Variable access families, so code generation never spells out
/// per-width opcodes by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Direct load of a known address.
    Load,
    /// Load at address plus a popped byte offset.
    LoadIndexed,
    /// Handle of address plus a popped byte offset.
    Effective,
    /// Handle of a known address.
    Handle,
}

impl Opcode {
    pub fn access(access: Access, width: Width, local: bool) -> Opcode {
        use Opcode::*;
        let row = match (access, local) {
            (Access::Load, false) => [LdB, LdW, LdD],
            (Access::Load, true) => [LdLB, LdLW, LdLD],
            (Access::LoadIndexed, false) => [LdiB, LdiW, LdiD],
            (Access::LoadIndexed, true) => [LdiLB, LdiLW, LdiLD],
            (Access::Effective, false) => [LeaB, LeaW, LeaD],
            (Access::Effective, true) => [LeaLB, LeaLW, LeaLD],
            (Access::Handle, false) => [AddrB, AddrW, AddrD],
            (Access::Handle, true) => [AddrLB, AddrLW, AddrLD],
        };
        match width {
            Width::Byte => row[0],
            Width::Word => row[1],
            Width::Dword => row[2],
        }
    }

    pub fn cast(width: Width) -> Opcode {
        match width {
            Width::Byte => Opcode::CastB,
            Width::Word => Opcode::CastW,
            Width::Dword => Opcode::CastD,
        }
    }

    /// Width and base-relative flag of a variable access instruction.
    pub fn access_mode(self) -> Option<(Width, bool)> {
        use Opcode::*;
        let mode = match self {
            LdB | LdiB | LeaB | AddrB | CastB => (Width::Byte, false),
            LdW | LdiW | LeaW | AddrW | CastW => (Width::Word, false),
            LdD | LdiD | LeaD | AddrD | CastD => (Width::Dword, false),
            LdLB | LdiLB | LeaLB | AddrLB => (Width::Byte, true),
            LdLW | LdiLW | LeaLW | AddrLW => (Width::Word, true),
            LdLD | LdiLD | LeaLD | AddrLD => (Width::Dword, true),
            _ => return None,
        };
        Some(mode)
    }

    pub fn is_jump(self) -> bool {
        self.operands() == Operands::Target
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(*op as u8), Ok(*op));
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(*op));
        }
    }

    #[test]
    fn test_core_range() {
        for op in Opcode::ALL {
            assert!((*op as u8) <= 0x53);
        }
        assert_eq!(Opcode::try_from(0x2C), Err(0x2C));
        assert_eq!(Opcode::try_from(0x7F), Err(0x7F));
    }

    #[test]
    fn test_access_table_agrees_with_modes() {
        for access in [
            Access::Load,
            Access::LoadIndexed,
            Access::Effective,
            Access::Handle,
        ]
        .iter()
        {
            for width in [Width::Byte, Width::Word, Width::Dword].iter() {
                for local in [false, true].iter() {
                    let op = Opcode::access(*access, *width, *local);
                    assert_eq!(op.access_mode(), Some((*width, *local)));
                }
            }
        }
    }
}
