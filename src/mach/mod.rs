/*!
## Rust Machine Module

The assembler, image format and bytecode machine. Assembly text goes
in, a LAV image comes out, and the machine runs that image in batches
against 64K of memory and the host collaborators.

*/

mod assemble;
mod console;
mod error;
mod handle;
mod image;
mod link;
mod listing;
mod machine;
mod memory;
mod opcode;
mod runtime;
mod stack;
pub mod syscall;

#[cfg(test)]
mod tests;

pub use assemble::{assemble, quote, unquote, AsmOptions};
pub use console::Console;
pub use error::{AsmError, AsmErrorKind, Fault, LoadError};
pub use handle::{Handle, Width};
pub use image::{Header, DEFAULT_ENTRY, HEADER_LEN, MAGIC, VERSION};
pub use link::{Fixup, Link};
pub use listing::disassemble;
pub use machine::{Machine, Step, STACK_LIMIT};
pub use memory::*;
pub use opcode::{Access, Opcode, Operands, SYSCALL_FIRST, SYSCALL_LAST};
pub use runtime::{Event, Runtime, DEFAULT_QUOTA};
pub use stack::Stack;
pub use syscall::Syscall;
