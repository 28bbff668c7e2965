//! # LavaX
//!
//! A small C-like language for 64K handheld targets, its assembler and
//! the bytecode machine that runs the resulting LAV images.
//!
//! Source text is compiled to assembly text by [`lang::compile`], the
//! assembly becomes a LAV image through [`mach::assemble`], and a
//! [`mach::Runtime`] executes the image in bounded batches so the host
//! loop stays responsive.
//!
//! ```
//! use lavax::mach::{AsmOptions, Event, Runtime};
//!
//! let image = lavax::build(
//!     "void main() { printf(\"%d\\n\", 6 * 7); }",
//!     &AsmOptions::default(),
//! ).unwrap();
//! let mut runtime = Runtime::default();
//! runtime.load(&image).unwrap();
//! assert_eq!(runtime.execute(), Event::Print("42\n".to_string()));
//! ```

pub mod host;
pub mod lang;
pub mod mach;
pub mod term;

#[derive(Debug)]
pub enum BuildError {
    Compile(lang::Error),
    Assemble(mach::AsmError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BuildError::Compile(e) => write!(f, "{}", e),
            BuildError::Assemble(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<lang::Error> for BuildError {
    fn from(e: lang::Error) -> BuildError {
        BuildError::Compile(e)
    }
}

impl From<mach::AsmError> for BuildError {
    fn from(e: mach::AsmError) -> BuildError {
        BuildError::Assemble(e)
    }
}

/// Compile and assemble in one step.
pub fn build(source: &str, options: &mach::AsmOptions) -> Result<Vec<u8>, BuildError> {
    let text = lang::compile(source)?;
    Ok(mach::assemble(&text, options)?)
}
