/// ## Runtime fault
///
/// Any of these halts the machine. Division by zero is not a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    InvalidOpcode(u8),
    StackOverflow,
    StackUnderflow,
    /// A call frame would reach into the heap.
    FrameOverflow,
    /// The program counter ran off the end of the loaded image.
    ImageOverrun(u32),
    NotLoaded,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Fault::*;
        match self {
            InvalidOpcode(code) => write!(f, "invalid opcode 0x{:02X}", code),
            StackOverflow => write!(f, "stack overflow"),
            StackUnderflow => write!(f, "stack underflow"),
            FrameOverflow => write!(f, "frame overflow"),
            ImageOverrun(pc) => write!(f, "execution ran past end of image at 0x{:06X}", pc),
            NotLoaded => write!(f, "no image loaded"),
        }
    }
}

impl std::error::Error for Fault {}

/// ## Image validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    TooShort(usize),
    BadMagic,
    Geometry(u16, u16),
    Entry(u32),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use LoadError::*;
        match self {
            TooShort(len) => write!(f, "image of {} bytes is shorter than its header", len),
            BadMagic => write!(f, "not a LAV image"),
            Geometry(w, h) => write!(f, "screen {}x{} does not fit the framebuffer", w, h),
            Entry(entry) => write!(f, "entry point 0x{:06X} is outside the image", entry),
        }
    }
}

impl std::error::Error for LoadError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
    UnknownMnemonic(String),
    BadOperand(String),
    MissingOperand,
    DuplicateLabel(String),
    UndefinedLabel(String),
    ImageTooLarge,
    /// Screen size the header cannot hold.
    Geometry(u16, u16),
}

/// ## Assembly failure
///
/// `line` is one-based in the assembly text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    pub line: usize,
    pub kind: AsmErrorKind,
}

impl AsmError {
    pub fn new(line: usize, kind: AsmErrorKind) -> AsmError {
        AsmError { line, kind }
    }
}

impl std::fmt::Display for AsmError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use AsmErrorKind::*;
        match &self.kind {
            UnknownMnemonic(s) => write!(f, "unknown mnemonic `{}`", s)?,
            BadOperand(s) => write!(f, "bad operand `{}`", s)?,
            MissingOperand => write!(f, "missing operand")?,
            DuplicateLabel(s) => write!(f, "duplicate label `{}`", s)?,
            UndefinedLabel(s) => write!(f, "undefined label `{}`", s)?,
            ImageTooLarge => write!(f, "image exceeds 24-bit address space")?,
            Geometry(w, h) => write!(f, "screen {}x{} is not a header geometry", w, h)?,
        }
        write!(f, " at line {}", self.line)
    }
}

impl std::error::Error for AsmError {}
