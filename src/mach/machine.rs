use super::image::Header;
use super::memory::*;
use super::opcode::{SYSCALL_FIRST, SYSCALL_LAST};
use super::{Console, Fault, Handle, LoadError, Opcode, Stack, Width};
use crate::host::Host;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, VecDeque};
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Fault>;

pub const STACK_LIMIT: usize = 1024;
pub const REGISTERS: usize = 8;

/// Outcome of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// A blocking syscall found no input; the PC is back on it.
    Blocked,
    Halted,
}

/// ## Interpreter core
///
/// All program state lives here and every instruction gets it by
/// `&mut self`. Code is fetched from the loaded image, data lives in
/// the 64K memory, and call frames are threaded through memory by
/// `base` and `base2`.

pub struct Machine {
    pub(super) memory: Memory,
    pub(super) stack: Stack<i32>,
    pub(super) image: Vec<u8>,
    pub(super) header: Header,
    pub(super) pc: u32,
    pub(super) last_pc: u32,
    pub(super) base: u16,
    pub(super) base2: u16,
    pub(super) regs: [i32; REGISTERS],
    pub(super) strings: u16,
    /// String slot of each `PUSH_STR` already run, by code position.
    literals: HashMap<u32, (u16, u16)>,
    pub(super) heap: u16,
    pub(super) keys: VecDeque<u8>,
    pub(super) console: Console,
    pub(super) rng: StdRng,
    pub(super) clock: chrono::DateTime<chrono::Local>,
    pub(super) host: Host,
    loaded: bool,
    halted: bool,
}

impl Default for Machine {
    fn default() -> Machine {
        Machine::new(Host::default())
    }
}

impl Machine {
    pub fn new(host: Host) -> Machine {
        let header = Header::default();
        Machine {
            memory: Memory::new(),
            stack: Stack::new(STACK_LIMIT),
            image: vec![],
            header,
            pc: 0,
            last_pc: 0,
            base: DATA_START,
            base2: DATA_START,
            regs: [0; REGISTERS],
            strings: STRING_START,
            literals: HashMap::new(),
            heap: HEAP_START,
            keys: VecDeque::new(),
            console: Console::new(header.width, header.height),
            rng: StdRng::seed_from_u64(0),
            clock: chrono::Local::now(),
            host,
            loaded: false,
            halted: false,
        }
    }

    /// Back to the blank, unloaded state. The host is kept.
    pub fn reset(&mut self) {
        tracing::debug!("reset");
        let header = Header::default();
        self.memory.clear();
        self.stack.clear();
        self.image.clear();
        self.header = header;
        self.pc = 0;
        self.last_pc = 0;
        self.base = DATA_START;
        self.base2 = DATA_START;
        self.regs = [0; REGISTERS];
        self.strings = STRING_START;
        self.literals.clear();
        self.heap = HEAP_START;
        self.keys.clear();
        self.console = Console::new(header.width, header.height);
        self.rng = StdRng::seed_from_u64(0);
        self.clock = chrono::Local::now();
        self.loaded = false;
        self.halted = false;
    }

    /// Validate and install an image. Nothing executes here.
    pub fn load(&mut self, image: &[u8]) -> std::result::Result<(), LoadError> {
        let header = Header::parse(image)?;
        self.reset();
        self.header = header;
        self.image = image.to_vec();
        self.pc = header.entry;
        self.last_pc = header.entry;
        self.console = Console::new(header.width, header.height);
        self.loaded = true;
        tracing::debug!(
            len = image.len(),
            entry = header.entry,
            width = header.width,
            height = header.height,
            "loaded image"
        );
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn stack(&self) -> &[i32] {
        self.stack.as_slice()
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn base2(&self) -> u16 {
        self.base2
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn push_key(&mut self, key: u8) {
        self.keys.push_back(key);
    }

    pub fn pending_keys(&self) -> usize {
        self.keys.len()
    }

    /// One line summary for fault reports.
    pub fn dump(&self) -> String {
        let top: Vec<i32> = self.stack.as_slice().iter().rev().take(4).copied().collect();
        format!(
            "pc=0x{:06X} sp={} base=0x{:04X} base2=0x{:04X} top={:?}",
            self.last_pc,
            self.stack.len(),
            self.base,
            self.base2,
            top
        )
    }

    fn fetch(&mut self, len: u32) -> Result<u32> {
        let start = self.pc as usize;
        let end = start + len as usize;
        if end > self.image.len() {
            return Err(Fault::ImageOverrun(self.pc));
        }
        let mut value = 0u32;
        for (i, byte) in self.image[start..end].iter().enumerate() {
            value |= u32::from(*byte) << (8 * i);
        }
        self.pc += len;
        Ok(value)
    }

    fn fetch_u16(&mut self) -> Result<u16> {
        Ok(self.fetch(2)? as u16)
    }

    /// Absolute address named by a pointer value.
    pub(super) fn address(&self, value: i32) -> u16 {
        Handle::decode(value).resolve(self.base)
    }

    fn push_bool(&mut self, cond: bool) -> Result<()> {
        self.stack.push(if cond { -1 } else { 0 })
    }

    /// Copy a string into the rolling buffer, restarting at its low end
    /// when the string would not fit below the top.
    pub(super) fn intern(&mut self, bytes: &[u8]) -> u16 {
        let room = usize::from(STRING_END - STRING_START) - 1;
        let bytes = &bytes[..bytes.len().min(room)];
        let len = bytes.len() as u16 + 1;
        if self.strings + len > STRING_END {
            self.strings = STRING_START;
        }
        let addr = self.strings;
        self.memory.copy_in(addr, bytes);
        self.memory.set_byte(addr + bytes.len() as u16, 0);
        self.strings += len;
        addr
    }

    /// Intern the literal of the `PUSH_STR` at `at`. A literal that runs
    /// again gets its old slot back, so only new literals move the
    /// rolling buffer. Slots the buffer wraps over are forgotten.
    fn literal(&mut self, at: u32, bytes: &[u8]) -> u16 {
        if let Some(&(addr, len)) = self.literals.get(&at) {
            let bytes = &bytes[..bytes.len().min(usize::from(len) - 1)];
            self.memory.copy_in(addr, bytes);
            self.memory.set_byte(addr + bytes.len() as u16, 0);
            return addr;
        }
        let addr = self.intern(bytes);
        let end = self.strings;
        self.literals
            .retain(|_, &mut (a, l)| a + l <= addr || a >= end);
        self.literals.insert(at, (addr, end - addr));
        addr
    }

    fn frame_end(&self, start: u16, size: u32) -> Result<u16> {
        let end = u32::from(start) + size;
        if end > u32::from(HEAP_START) {
            return Err(Fault::FrameOverflow);
        }
        Ok(end as u16)
    }

    pub fn step(&mut self) -> Result<Step> {
        if !self.loaded {
            return Err(Fault::NotLoaded);
        }
        if self.halted {
            return Ok(Step::Halted);
        }
        self.last_pc = self.pc;
        let code = self.fetch(1)? as u8;
        if (SYSCALL_FIRST..=SYSCALL_LAST).contains(&code) {
            return self.syscall(code);
        }
        match Opcode::try_from(code) {
            Ok(op) => self.execute(op),
            Err(code) => Err(Fault::InvalidOpcode(code)),
        }
    }

    fn execute(&mut self, op: Opcode) -> Result<Step> {
        use Opcode::*;
        match op {
            Nop => {}
            PushB => {
                let v = self.fetch(1)?;
                self.stack.push(v as i32)?;
            }
            PushW => {
                let v = self.fetch(2)?;
                self.stack.push(i32::from(v as u16 as i16))?;
            }
            PushD => {
                let v = self.fetch(4)?;
                self.stack.push(v as i32)?;
            }
            LdB | LdW | LdD | LdLB | LdLW | LdLD => {
                let handle = self.operand_handle(op)?;
                let v = self.memory.load(handle, self.base);
                self.stack.push(v)?;
            }
            LdiB | LdiW | LdiD | LdiLB | LdiLW | LdiLD => {
                let handle = self.operand_handle(op)?;
                let offset = self.stack.pop()?;
                let addr = handle.resolve(self.base).wrapping_add(offset as u16);
                let v = self.memory.read(addr, handle.width);
                self.stack.push(v)?;
            }
            LeaB | LeaW | LeaD | LeaLB | LeaLW | LeaLD => {
                let handle = self.operand_handle(op)?;
                let offset = self.stack.pop()?;
                let addr = handle.resolve(self.base).wrapping_add(offset as u16);
                self.stack.push(Handle::absolute(addr, handle.width).encode())?;
            }
            AddrB | AddrW | AddrD | AddrLB | AddrLW | AddrLD => {
                let handle = self.operand_handle(op)?;
                self.stack.push(handle.encode())?;
            }
            CastB | CastW | CastD => {
                let width = op.access_mode().map_or(Width::Byte, |(w, _)| w);
                let addr = self.stack.pop()?;
                self.stack.push(Handle::absolute(addr as u16, width).encode())?;
            }
            PushStr => {
                let mask = self.header.mask;
                let mut bytes = vec![];
                loop {
                    let b = self.fetch(1)? as u8 ^ mask;
                    if b == 0 {
                        break;
                    }
                    bytes.push(b);
                }
                let addr = self.literal(self.last_pc, &bytes);
                self.stack.push(Handle::absolute(addr, Width::Byte).encode())?;
            }
            Load => {
                let handle = Handle::decode(self.stack.pop()?);
                let v = self.memory.load(handle, self.base);
                self.stack.push(v)?;
            }
            Store => {
                let v = self.stack.pop()?;
                let handle = Handle::decode(self.stack.pop()?);
                let stored = self.memory.store(handle, self.base, v);
                self.stack.push(stored)?;
            }
            Pop => {
                self.stack.pop()?;
            }
            Dup => {
                let v = self.stack.last()?;
                self.stack.push(v)?;
            }
            Neg => {
                let v = self.stack.pop()?;
                self.stack.push(v.wrapping_neg())?;
            }
            IncPre | DecPre | IncPost | DecPost => {
                let handle = Handle::decode(self.stack.pop()?);
                let old = self.memory.load(handle, self.base);
                let delta = if op == IncPre || op == IncPost { 1 } else { -1 };
                let new = self.memory.store(handle, self.base, old.wrapping_add(delta));
                let v = if op == IncPre || op == DecPre { new } else { old };
                self.stack.push(v)?;
            }
            Add | Sub | Mul | Div | Mod | And | Or | Xor | Shl | Shr => {
                let (a, b) = self.stack.pop_2()?;
                let v = match op {
                    Add => a.wrapping_add(b),
                    Sub => a.wrapping_sub(b),
                    Mul => a.wrapping_mul(b),
                    Div if b == 0 => 0,
                    Div => a.wrapping_div(b),
                    Mod if b == 0 => 0,
                    Mod => a.wrapping_rem(b),
                    And => a & b,
                    Or => a | b,
                    Xor => a ^ b,
                    Shl => a.wrapping_shl(b as u32),
                    _ => a.wrapping_shr(b as u32),
                };
                self.stack.push(v)?;
            }
            Not => {
                let v = self.stack.pop()?;
                self.stack.push(!v)?;
            }
            LNot => {
                let v = self.stack.pop()?;
                self.push_bool(v == 0)?;
            }
            Eq | Ne | Lt | Gt | Le | Ge => {
                let (a, b) = self.stack.pop_2()?;
                let cond = match op {
                    Eq => a == b,
                    Ne => a != b,
                    Lt => a < b,
                    Gt => a > b,
                    Le => a <= b,
                    _ => a >= b,
                };
                self.push_bool(cond)?;
            }
            Jmp => {
                self.pc = self.fetch(3)?;
            }
            Jz | Jnz => {
                let target = self.fetch(3)?;
                let v = self.stack.pop()?;
                if (v == 0) == (op == Jz) {
                    self.pc = target;
                }
            }
            Call => {
                let target = self.fetch(3)?;
                self.frame_end(self.base2, u32::from(FRAME_HEADER))?;
                self.memory.write_le(self.base2, 3, self.pc);
                self.memory
                    .write_le(self.base2 + 3, 2, u32::from(self.base));
                self.base = self.base2;
                self.pc = target;
            }
            Func => {
                let size = self.fetch_u16()?;
                let argc = self.fetch(1)? as usize;
                self.base2 = self.frame_end(self.base, u32::from(size))?;
                let args = self.stack.window(0, argc)?.to_vec();
                for (i, arg) in args.iter().enumerate() {
                    let slot = self.base + FRAME_HEADER + PARAM_SLOT * i as u16;
                    self.memory.write(slot, Width::Dword, *arg);
                }
                self.stack.drop_n(argc)?;
            }
            Ret => {
                self.base2 = self.base;
                self.pc = self.memory.read_le(self.base, 3);
                self.base = self.memory.read_le(self.base + 3, 2) as u16;
            }
            Exit => {
                self.halted = true;
                return Ok(Step::Halted);
            }
            Space => {
                let size = self.fetch_u16()?;
                let top = self.frame_end(DATA_START, u32::from(size))?;
                self.base = top;
                self.base2 = top;
            }
            Init => {
                let addr = self.fetch_u16()?;
                let len = self.fetch_u16()? as usize;
                let start = self.pc as usize;
                if start + len > self.image.len() {
                    return Err(Fault::ImageOverrun(self.pc));
                }
                let Machine { memory, image, .. } = self;
                memory.copy_in(addr, &image[start..start + len]);
                self.pc += len as u32;
            }
        }
        Ok(Step::Continue)
    }

    fn operand_handle(&mut self, op: Opcode) -> Result<Handle> {
        let (width, relative) = op.access_mode().ok_or(Fault::InvalidOpcode(op as u8))?;
        let addr = self.fetch_u16()?;
        Ok(Handle::new(addr, width, relative))
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Machine {{ {} }}", self.dump())
    }
}
