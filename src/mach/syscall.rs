use super::machine::{Machine, Step};
use super::memory::{BACK_START, GRAPH_START, HEAP_START, MEMORY_SIZE, RASTER_SIZE};
use super::{Fault, Handle, Width};
use crate::host::{FontSize, Graphics, Mode, Raster, Whence};
use chrono::{Datelike, Timelike};
use rand::{Rng, SeedableRng};

type Result<T> = std::result::Result<T, Fault>;

/// Every syscall, numbered by its opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Call {
    Putchar = 0x80,
    Getchar = 0x81,
    Printf = 0x82,
    Strcpy = 0x83,
    Strlen = 0x84,
    Setscreen = 0x85,
    Refresh = 0x86,
    Delay = 0x87,
    Writeblock = 0x88,
    Getblock = 0x89,
    Textout = 0x8A,
    Block = 0x8B,
    Rectangle = 0x8C,
    Exit = 0x8D,
    Clearscreen = 0x8E,
    Abs = 0x8F,
    Rand = 0x90,
    Srand = 0x91,
    Locate = 0x92,
    Inkey = 0x93,
    Point = 0x94,
    Getpoint = 0x95,
    Line = 0x96,
    Box = 0x97,
    Circle = 0x98,
    Ellipse = 0x99,
    Beep = 0x9A,
    Isalnum = 0x9B,
    Isalpha = 0x9C,
    Iscntrl = 0x9D,
    Isdigit = 0x9E,
    Isgraph = 0x9F,
    Islower = 0xA0,
    Isprint = 0xA1,
    Ispunct = 0xA2,
    Isspace = 0xA3,
    Isupper = 0xA4,
    Isxdigit = 0xA5,
    Strcat = 0xA6,
    Strchr = 0xA7,
    Strcmp = 0xA8,
    Strstr = 0xA9,
    Tolower = 0xAA,
    Toupper = 0xAB,
    Memset = 0xAC,
    Memcpy = 0xAD,
    Fopen = 0xAE,
    Fclose = 0xAF,
    Fread = 0xB0,
    Fwrite = 0xB1,
    Fseek = 0xB2,
    Ftell = 0xB3,
    Feof = 0xB4,
    Rewind = 0xB5,
    Getc = 0xB6,
    Putc = 0xB7,
    Sprintf = 0xB8,
    Deletefile = 0xB9,
    Getms = 0xBA,
    Gettime = 0xBB,
    Checkkey = 0xBC,
    Crc16 = 0xBD,
    Secret = 0xBE,
    Fill = 0xBF,
    Alloc = 0xC0,
    Getword = 0xC1,
}

/// ## Syscall ABI entry
///
/// The compiler checks arity and balances the stack with this table and
/// the machine pops arguments with it, so the two cannot disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syscall {
    pub call: Call,
    pub name: &'static str,
    pub code: u8,
    /// Fixed arguments; for variadic calls the fixed prefix.
    pub args: usize,
    pub variadic: bool,
    pub returns: bool,
    pub blocking: bool,
}

impl Syscall {
    const fn new(call: Call, name: &'static str, args: usize) -> Syscall {
        Syscall {
            call,
            name,
            code: call as u8,
            args,
            variadic: false,
            returns: false,
            blocking: false,
        }
    }
    const fn r(self) -> Syscall {
        Syscall {
            returns: true,
            ..self
        }
    }
    const fn v(self) -> Syscall {
        Syscall {
            variadic: true,
            ..self
        }
    }
    const fn b(self) -> Syscall {
        Syscall {
            blocking: true,
            ..self
        }
    }
}

#[rustfmt::skip]
pub const SYSCALLS: &[Syscall] = &[
    Syscall::new(Call::Putchar, "putchar", 1),
    Syscall::new(Call::Getchar, "getchar", 0).r().b(),
    Syscall::new(Call::Printf, "printf", 1).v(),
    Syscall::new(Call::Strcpy, "strcpy", 2),
    Syscall::new(Call::Strlen, "strlen", 1).r(),
    Syscall::new(Call::Setscreen, "setscreen", 1),
    Syscall::new(Call::Refresh, "refresh", 0),
    Syscall::new(Call::Delay, "delay", 1),
    Syscall::new(Call::Writeblock, "writeblock", 6),
    Syscall::new(Call::Getblock, "getblock", 6),
    Syscall::new(Call::Textout, "textout", 4),
    Syscall::new(Call::Block, "block", 5),
    Syscall::new(Call::Rectangle, "rectangle", 5),
    Syscall::new(Call::Exit, "exit", 1),
    Syscall::new(Call::Clearscreen, "clearscreen", 0),
    Syscall::new(Call::Abs, "abs", 1).r(),
    Syscall::new(Call::Rand, "rand", 0).r(),
    Syscall::new(Call::Srand, "srand", 1),
    Syscall::new(Call::Locate, "locate", 2),
    Syscall::new(Call::Inkey, "inkey", 0).r(),
    Syscall::new(Call::Point, "point", 3),
    Syscall::new(Call::Getpoint, "getpoint", 2).r(),
    Syscall::new(Call::Line, "line", 5),
    Syscall::new(Call::Box, "box", 6),
    Syscall::new(Call::Circle, "circle", 5),
    Syscall::new(Call::Ellipse, "ellipse", 6),
    Syscall::new(Call::Beep, "beep", 0),
    Syscall::new(Call::Isalnum, "isalnum", 1).r(),
    Syscall::new(Call::Isalpha, "isalpha", 1).r(),
    Syscall::new(Call::Iscntrl, "iscntrl", 1).r(),
    Syscall::new(Call::Isdigit, "isdigit", 1).r(),
    Syscall::new(Call::Isgraph, "isgraph", 1).r(),
    Syscall::new(Call::Islower, "islower", 1).r(),
    Syscall::new(Call::Isprint, "isprint", 1).r(),
    Syscall::new(Call::Ispunct, "ispunct", 1).r(),
    Syscall::new(Call::Isspace, "isspace", 1).r(),
    Syscall::new(Call::Isupper, "isupper", 1).r(),
    Syscall::new(Call::Isxdigit, "isxdigit", 1).r(),
    Syscall::new(Call::Strcat, "strcat", 2),
    Syscall::new(Call::Strchr, "strchr", 2).r(),
    Syscall::new(Call::Strcmp, "strcmp", 2).r(),
    Syscall::new(Call::Strstr, "strstr", 2).r(),
    Syscall::new(Call::Tolower, "tolower", 1).r(),
    Syscall::new(Call::Toupper, "toupper", 1).r(),
    Syscall::new(Call::Memset, "memset", 3),
    Syscall::new(Call::Memcpy, "memcpy", 3),
    Syscall::new(Call::Fopen, "fopen", 2).r(),
    Syscall::new(Call::Fclose, "fclose", 1),
    Syscall::new(Call::Fread, "fread", 4).r(),
    Syscall::new(Call::Fwrite, "fwrite", 4).r(),
    Syscall::new(Call::Fseek, "fseek", 3).r(),
    Syscall::new(Call::Ftell, "ftell", 1).r(),
    Syscall::new(Call::Feof, "feof", 1).r(),
    Syscall::new(Call::Rewind, "rewind", 1),
    Syscall::new(Call::Getc, "getc", 1).r(),
    Syscall::new(Call::Putc, "putc", 2).r(),
    Syscall::new(Call::Sprintf, "sprintf", 2).v(),
    Syscall::new(Call::Deletefile, "deletefile", 1).r(),
    Syscall::new(Call::Getms, "getms", 0).r(),
    Syscall::new(Call::Gettime, "gettime", 1),
    Syscall::new(Call::Checkkey, "checkkey", 1).r(),
    Syscall::new(Call::Crc16, "crc16", 2).r(),
    Syscall::new(Call::Secret, "secret", 3),
    Syscall::new(Call::Fill, "fill", 3),
    Syscall::new(Call::Alloc, "alloc", 1).r(),
    Syscall::new(Call::Getword, "getword", 1).r().b(),
];

pub fn by_name(name: &str) -> Option<&'static Syscall> {
    SYSCALLS.iter().find(|s| s.name == name)
}

pub fn by_code(code: u8) -> Option<&'static Syscall> {
    SYSCALLS.iter().find(|s| s.code == code)
}

/// A byte count from a program, bounded by the 64K address space.
fn span(n: i32) -> usize {
    n.clamp(0, MEMORY_SIZE as i32) as usize
}

/// A bitmap dimension from a program.
fn extent(n: i32) -> u16 {
    n.clamp(0, i32::from(u16::MAX)) as u16
}

fn truth(cond: bool) -> i32 {
    if cond {
        -1
    } else {
        0
    }
}

impl Machine {
    fn input_ready(&self, call: &Syscall) -> bool {
        match self.keys.front() {
            None => false,
            Some(&first) if call.call == Call::Getword && first >= 0x80 => self.keys.len() >= 2,
            Some(_) => true,
        }
    }

    pub(super) fn syscall(&mut self, code: u8) -> Result<Step> {
        let call = match by_code(code) {
            Some(call) => call,
            None => {
                tracing::warn!("unknown syscall 0x{:02X} at 0x{:06X}", code, self.last_pc);
                self.stack.push(0)?;
                return Ok(Step::Continue);
            }
        };
        if call.blocking && !self.input_ready(call) {
            self.pc = self.last_pc;
            return Ok(Step::Blocked);
        }
        let args = if call.variadic {
            let count = self.stack.last()?;
            if count < call.args as i32 {
                return Err(Fault::StackUnderflow);
            }
            let window = self.stack.window(1, count as usize)?.to_vec();
            self.stack.drop_n(count as usize + 1)?;
            window
        } else {
            let window = self.stack.window(0, call.args)?.to_vec();
            self.stack.drop_n(call.args)?;
            window
        };
        for (reg, arg) in self.regs.iter_mut().zip(args.iter()) {
            *reg = *arg;
        }
        let extra = args.get(call.args..).unwrap_or(&[]);
        let value = self.dispatch(call, extra)?;
        if call.returns {
            self.stack.push(value)?;
        }
        if self.is_halted() {
            return Ok(Step::Halted);
        }
        Ok(Step::Continue)
    }

    fn draw<F>(&mut self, kind: i32, f: F)
    where
        F: FnOnce(&mut dyn Graphics, &mut Raster),
    {
        let start = if kind & 0x40 != 0 {
            GRAPH_START
        } else {
            BACK_START
        };
        let (width, height) = (self.header.width, self.header.height);
        let Machine { memory, host, .. } = self;
        let mut raster = Raster::new(width, height, memory.region_mut(start, RASTER_SIZE));
        f(host.graphics.as_mut(), &mut raster);
    }

    fn cstr(&self, value: i32) -> Vec<u8> {
        self.memory.cstr(self.address(value))
    }

    fn path(&self, value: i32) -> String {
        String::from_utf8_lossy(&self.cstr(value)).into_owned()
    }

    fn file(&self, value: i32) -> u8 {
        value as u8
    }

    fn dispatch(&mut self, call: &Syscall, extra: &[i32]) -> Result<i32> {
        let r = self.regs;
        let value = match call.call {
            Call::Putchar => {
                let Machine {
                    console, memory, ..
                } = self;
                console.put(memory, r[0] as u8);
                0
            }
            Call::Getchar | Call::Inkey => i32::from(self.keys.pop_front().unwrap_or(0)),
            Call::Getword => match self.keys.pop_front() {
                Some(first) if first >= 0x80 => {
                    let second = self.keys.pop_front().unwrap_or(0);
                    i32::from(first) << 8 | i32::from(second)
                }
                Some(first) => i32::from(first),
                None => 0,
            },
            Call::Checkkey => {
                let key = r[0] as u8;
                truth(if key == 0x80 {
                    !self.keys.is_empty()
                } else {
                    self.keys.contains(&key)
                })
            }
            Call::Printf => {
                let text = self.format(r[0], extra);
                let Machine {
                    console, memory, ..
                } = self;
                console.write(memory, &text);
                0
            }
            Call::Sprintf => {
                let text = self.format(r[1], extra);
                let dst = self.address(r[0]);
                self.memory.copy_in(dst, &text);
                self.memory
                    .set_byte(dst.wrapping_add(text.len() as u16), 0);
                0
            }
            Call::Strcpy => {
                let src = self.cstr(r[1]);
                let dst = self.address(r[0]);
                self.memory.copy_in(dst, &src);
                self.memory.set_byte(dst.wrapping_add(src.len() as u16), 0);
                0
            }
            Call::Strcat => {
                let src = self.cstr(r[1]);
                let dst = self.address(r[0]);
                let end = dst.wrapping_add(self.memory.cstr(dst).len() as u16);
                self.memory.copy_in(end, &src);
                self.memory.set_byte(end.wrapping_add(src.len() as u16), 0);
                0
            }
            Call::Strlen => self.cstr(r[0]).len() as i32,
            Call::Strcmp => {
                let (a, b) = (self.cstr(r[0]), self.cstr(r[1]));
                a.iter()
                    .chain(std::iter::once(&0))
                    .zip(b.iter().chain(std::iter::once(&0)))
                    .map(|(x, y)| i32::from(*x) - i32::from(*y))
                    .find(|d| *d != 0)
                    .unwrap_or(0)
            }
            Call::Strchr => {
                let haystack = self.cstr(r[0]);
                match haystack.iter().position(|&b| b == r[1] as u8) {
                    Some(at) => {
                        let addr = self.address(r[0]).wrapping_add(at as u16);
                        Handle::rebase(r[0], addr)
                    }
                    None => 0,
                }
            }
            Call::Strstr => {
                let (haystack, needle) = (self.cstr(r[0]), self.cstr(r[1]));
                let found = if needle.is_empty() {
                    Some(0)
                } else {
                    haystack.windows(needle.len()).position(|w| w == needle.as_slice())
                };
                match found {
                    Some(at) => {
                        let addr = self.address(r[0]).wrapping_add(at as u16);
                        Handle::rebase(r[0], addr)
                    }
                    None => 0,
                }
            }
            Call::Tolower => i32::from((r[0] as u8).to_ascii_lowercase()),
            Call::Toupper => i32::from((r[0] as u8).to_ascii_uppercase()),
            Call::Memset => {
                let dst = self.address(r[0]);
                let fill = vec![r[1] as u8; span(r[2])];
                self.memory.copy_in(dst, &fill);
                0
            }
            Call::Memcpy => {
                let data = self
                    .memory
                    .slice(self.address(r[1]), span(r[2]));
                self.memory.copy_in(self.address(r[0]), &data);
                0
            }
            Call::Secret => {
                let key = self.cstr(r[2]);
                let addr = self.address(r[0]);
                if !key.is_empty() {
                    let mut data = self.memory.slice(addr, span(r[1]));
                    for (b, k) in data.iter_mut().zip(key.iter().cycle()) {
                        *b ^= k;
                    }
                    self.memory.copy_in(addr, &data);
                }
                0
            }
            Call::Crc16 => {
                let data = self
                    .memory
                    .slice(self.address(r[0]), span(r[1]));
                i32::from(crc::crc16::checksum_x25(&data))
            }
            Call::Isalnum => truth((r[0] as u8).is_ascii_alphanumeric()),
            Call::Isalpha => truth((r[0] as u8).is_ascii_alphabetic()),
            Call::Iscntrl => truth((r[0] as u8).is_ascii_control()),
            Call::Isdigit => truth((r[0] as u8).is_ascii_digit()),
            Call::Isgraph => truth((r[0] as u8).is_ascii_graphic()),
            Call::Islower => truth((r[0] as u8).is_ascii_lowercase()),
            Call::Isprint => truth((r[0] as u8).is_ascii_graphic() || r[0] as u8 == b' '),
            Call::Ispunct => truth((r[0] as u8).is_ascii_punctuation()),
            Call::Isspace => truth((r[0] as u8).is_ascii_whitespace() || r[0] as u8 == 0x0B),
            Call::Isupper => truth((r[0] as u8).is_ascii_uppercase()),
            Call::Isxdigit => truth((r[0] as u8).is_ascii_hexdigit()),
            Call::Abs => r[0].wrapping_abs(),
            Call::Rand => self.rng.gen_range(0..32768),
            Call::Srand => {
                self.rng = rand::rngs::StdRng::seed_from_u64(u64::from(r[0] as u32));
                0
            }
            Call::Exit => {
                tracing::debug!(code = r[0], "exit");
                self.halt();
                0
            }
            Call::Delay => {
                tracing::trace!(ms = r[0], "delay");
                0
            }
            Call::Beep => {
                tracing::debug!("beep");
                0
            }
            Call::Getms => {
                let elapsed = chrono::Local::now().signed_duration_since(self.clock);
                elapsed.num_milliseconds() as i32
            }
            Call::Gettime => {
                let now = chrono::Local::now();
                let at = self.address(r[0]);
                self.memory.write(at, Width::Word, now.year());
                let fields = [
                    now.month(),
                    now.day(),
                    now.hour(),
                    now.minute(),
                    now.second(),
                    now.weekday().num_days_from_sunday(),
                ];
                for (i, field) in fields.iter().enumerate() {
                    self.memory.set_byte(at.wrapping_add(2 + i as u16), *field as u8);
                }
                0
            }
            Call::Alloc => {
                let size = r[0].max(0) as u32;
                let start = self.heap;
                if start < HEAP_START || u32::from(start) + size > 0x1_0000 {
                    0
                } else {
                    self.heap = start.wrapping_add(size as u16);
                    Handle::absolute(start, Width::Byte).encode()
                }
            }
            Call::Setscreen => {
                let font = if r[0] == 0 {
                    FontSize::Large
                } else {
                    FontSize::Small
                };
                let Machine {
                    console, memory, ..
                } = self;
                console.set_font(memory, font);
                0
            }
            Call::Clearscreen => {
                let Machine {
                    console, memory, ..
                } = self;
                console.clear(memory);
                self.draw(0, |_, raster| raster.clear());
                0
            }
            Call::Locate => {
                self.console.locate(r[0], r[1]);
                0
            }
            Call::Refresh => {
                let back = self.memory.region(BACK_START, RASTER_SIZE).to_vec();
                self.memory
                    .region_mut(GRAPH_START, RASTER_SIZE)
                    .copy_from_slice(&back);
                self.draw(0x40, |gfx, raster| gfx.present(raster));
                0
            }
            Call::Point => {
                self.draw(r[2], |gfx, raster| {
                    gfx.point(raster, r[0], r[1], Mode::from_type(r[2]))
                });
                0
            }
            Call::Getpoint => {
                let mut lit = false;
                self.draw(0x40, |_, raster| lit = raster.get(r[0], r[1]));
                i32::from(lit)
            }
            Call::Line => {
                self.draw(r[4], |gfx, raster| {
                    gfx.line(raster, r[0], r[1], r[2], r[3], Mode::from_type(r[4]))
                });
                0
            }
            Call::Rectangle | Call::Block => {
                let fill = call.call == Call::Block;
                self.draw(r[4], |gfx, raster| {
                    gfx.rect(raster, r[0], r[1], r[2], r[3], fill, Mode::from_type(r[4]))
                });
                0
            }
            Call::Box => {
                self.draw(r[5], |gfx, raster| {
                    gfx.rect(raster, r[0], r[1], r[2], r[3], r[4] != 0, Mode::from_type(r[5]))
                });
                0
            }
            Call::Circle => {
                self.draw(r[4], |gfx, raster| {
                    gfx.ellipse(raster, r[0], r[1], r[2], r[2], r[3] != 0, Mode::from_type(r[4]))
                });
                0
            }
            Call::Ellipse => {
                self.draw(r[5], |gfx, raster| {
                    gfx.ellipse(raster, r[0], r[1], r[2], r[3], r[4] != 0, Mode::from_type(r[5]))
                });
                0
            }
            Call::Fill => {
                self.draw(r[2], |gfx, raster| {
                    gfx.fill(raster, r[0], r[1], Mode::from_type(r[2]))
                });
                0
            }
            Call::Writeblock => {
                let (width, height) = (extent(r[2]), extent(r[3]));
                let len = ((usize::from(width) + 7) / 8 * usize::from(height)).min(MEMORY_SIZE);
                let data = self.memory.slice(self.address(r[5]), len);
                self.draw(r[4], |gfx, raster| {
                    gfx.blit(raster, r[0], r[1], width, height, &data, Mode::from_type(r[4]))
                });
                0
            }
            Call::Getblock => {
                let (width, height) = (i64::from(extent(r[2])), i64::from(extent(r[3])));
                let stride = (width + 7) / 8;
                let mut data = vec![0u8; (stride * height).min(MEMORY_SIZE as i64) as usize];
                let (left, top) = (i64::from(r[0]), i64::from(r[1]));
                self.draw(r[4], |_, raster| {
                    // Only cells on the raster can be lit.
                    let rows = (-top).max(0)..height.min(i64::from(raster.height()) - top);
                    let cols = (-left).max(0)..width.min(i64::from(raster.width()) - left);
                    for y in rows {
                        for x in cols.clone() {
                            let i = (y * stride + x / 8) as usize;
                            if i < data.len() && raster.get((left + x) as i32, (top + y) as i32) {
                                data[i] |= 0x80 >> (x % 8);
                            }
                        }
                    }
                });
                self.memory.copy_in(self.address(r[5]), &data);
                0
            }
            Call::Textout => {
                self.textout(r[0], r[1], r[2], r[3]);
                0
            }
            Call::Fopen => {
                let (path, mode) = (self.path(r[0]), self.path(r[1]));
                i32::from(self.host.fs.open(&path, &mode).unwrap_or(0))
            }
            Call::Fclose => {
                let fp = self.file(r[0]);
                self.host.fs.close(fp);
                0
            }
            Call::Fread => {
                let size = span(r[1]);
                let mut buf = vec![0u8; (size * span(r[2])).min(MEMORY_SIZE)];
                let fp = self.file(r[3]);
                match self.host.fs.read(fp, &mut buf) {
                    Some(n) if size > 0 => {
                        self.memory.copy_in(self.address(r[0]), &buf[..n]);
                        (n / size) as i32
                    }
                    _ => 0,
                }
            }
            Call::Fwrite => {
                let size = span(r[1]);
                let data = self
                    .memory
                    .slice(self.address(r[0]), (size * span(r[2])).min(MEMORY_SIZE));
                let fp = self.file(r[3]);
                match self.host.fs.write(fp, &data) {
                    Some(n) if size > 0 => (n / size) as i32,
                    _ => 0,
                }
            }
            Call::Fseek => {
                let fp = self.file(r[0]);
                match self.host.fs.seek(fp, r[1], Whence::from_code(r[2])) {
                    Some(_) => 0,
                    None => -1,
                }
            }
            Call::Ftell => self
                .host
                .fs
                .tell(self.file(r[0]))
                .map_or(-1, |pos| pos as i32),
            Call::Feof => match self.host.fs.eof(self.file(r[0])) {
                Some(eof) => truth(eof),
                None => -1,
            },
            Call::Rewind => {
                let fp = self.file(r[0]);
                self.host.fs.seek(fp, 0, Whence::Start);
                0
            }
            Call::Getc => {
                let mut byte = [0u8];
                let fp = self.file(r[0]);
                match self.host.fs.read(fp, &mut byte) {
                    Some(1) => i32::from(byte[0]),
                    _ => -1,
                }
            }
            Call::Putc => {
                let fp = self.file(r[1]);
                match self.host.fs.write(fp, &[r[0] as u8]) {
                    Some(1) => r[0] & 0xFF,
                    _ => -1,
                }
            }
            Call::Deletefile => {
                let path = self.path(r[0]);
                truth(self.host.fs.delete(&path))
            }
        };
        Ok(value)
    }

    fn textout(&mut self, x: i32, y: i32, text: i32, kind: i32) {
        let size = if kind & 0x80 != 0 {
            FontSize::Large
        } else {
            FontSize::Small
        };
        let bytes = self.cstr(text);
        let mut glyphs = vec![];
        let mut i = 0;
        while i < bytes.len() {
            let code = if bytes[i] >= 0x80 && i + 1 < bytes.len() {
                i += 2;
                u16::from(bytes[i - 2]) << 8 | u16::from(bytes[i - 1])
            } else {
                i += 1;
                u16::from(bytes[i - 1])
            };
            let cell = size.cell().0 * if code > 0xFF { 2 } else { 1 };
            glyphs.push((self.host.font.glyph(code, size), cell));
        }
        let mode = Mode::from_type(kind);
        self.draw(kind, |gfx, raster| {
            let mut x = x;
            for (glyph, cell) in glyphs {
                if let Some(glyph) = glyph {
                    gfx.blit(raster, x, y, glyph.width, glyph.height, &glyph.bits, mode);
                }
                x += i32::from(cell);
            }
        });
    }

    /// printf-style formatting: flags `-` and `0`, a width, `l` ignored,
    /// conversions `d i u x X c s %`.
    fn format(&self, fmt: i32, args: &[i32]) -> Vec<u8> {
        let fmt = self.cstr(fmt);
        let mut args = args.iter().copied();
        let mut out = vec![];
        let mut i = 0;
        while i < fmt.len() {
            let c = fmt[i];
            i += 1;
            if c != b'%' {
                out.push(c);
                continue;
            }
            let (mut left, mut zero) = (false, false);
            while let Some(flag) = fmt.get(i) {
                match flag {
                    b'-' => left = true,
                    b'0' => zero = true,
                    _ => break,
                }
                i += 1;
            }
            let mut width = 0usize;
            while let Some(d) = fmt.get(i).filter(|d| d.is_ascii_digit()) {
                width = width * 10 + usize::from(d - b'0');
                i += 1;
            }
            while fmt.get(i) == Some(&b'l') {
                i += 1;
            }
            let conv = match fmt.get(i) {
                Some(conv) => *conv,
                None => break,
            };
            i += 1;
            let numeric = matches!(conv, b'd' | b'i' | b'u' | b'x' | b'X');
            let body = match conv {
                b'%' => vec![b'%'],
                b'd' | b'i' => args.next().unwrap_or(0).to_string().into_bytes(),
                b'u' => (args.next().unwrap_or(0) as u32).to_string().into_bytes(),
                b'x' => format!("{:x}", args.next().unwrap_or(0) as u32).into_bytes(),
                b'X' => format!("{:X}", args.next().unwrap_or(0) as u32).into_bytes(),
                b'c' => vec![args.next().unwrap_or(0) as u8],
                b's' => self.cstr(args.next().unwrap_or(0)),
                other => vec![b'%', other],
            };
            let pad = width.saturating_sub(body.len());
            if left {
                out.extend_from_slice(&body);
                out.extend(std::iter::repeat(b' ').take(pad));
            } else if zero && numeric {
                let (sign, digits) = match body.split_first() {
                    Some((b'-', rest)) => (Some(b'-'), rest),
                    _ => (None, &body[..]),
                };
                out.extend(sign);
                out.extend(std::iter::repeat(b'0').take(pad));
                out.extend_from_slice(digits);
            } else {
                out.extend(std::iter::repeat(b' ').take(pad));
                out.extend_from_slice(&body);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_codes_unique_and_in_range() {
        let mut codes = HashSet::new();
        let mut names = HashSet::new();
        for call in SYSCALLS {
            assert!(call.code >= 0x80 && call.code <= 0xC1, "{}", call.name);
            assert!(codes.insert(call.code), "{}", call.name);
            assert!(names.insert(call.name), "{}", call.name);
            assert!(call.args <= super::super::machine::REGISTERS);
        }
        assert_eq!(SYSCALLS.len(), 0xC2 - 0x80);
    }

    #[test]
    fn test_variadic_and_blocking_calls() {
        let variadic: Vec<_> = SYSCALLS.iter().filter(|s| s.variadic).map(|s| s.name).collect();
        assert_eq!(variadic, vec!["printf", "sprintf"]);
        let blocking: Vec<_> = SYSCALLS.iter().filter(|s| s.blocking).map(|s| s.name).collect();
        assert_eq!(blocking, vec!["getchar", "getword"]);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(by_name("crc16").map(|s| s.code), Some(0xBD));
        assert_eq!(by_code(0xC1).map(|s| s.name), Some("getword"));
        assert_eq!(by_code(0xBD).map(|s| s.call), Some(Call::Crc16));
        assert!(by_code(0xC2).is_none());
    }
}
