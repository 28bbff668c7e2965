/*!
## Rust Host Module

Capabilities the machine borrows from its embedder: drawing, glyphs and
files. Each comes with a reference implementation good enough to run
programs headless.

*/

mod font;
mod fs;
mod graphics;

pub use font::{Font, FontSize, Glyph, NoFont};
pub use fs::{FileSystem, MemoryFs, Whence};
pub use graphics::{Graphics, Mode, Pixels, Raster};

/// The collaborators one machine talks to.
pub struct Host {
    pub graphics: Box<dyn Graphics>,
    pub font: Box<dyn Font>,
    pub fs: Box<dyn FileSystem>,
}

impl Default for Host {
    fn default() -> Host {
        Host {
            graphics: Box::new(Pixels::new()),
            font: Box::new(NoFont),
            fs: Box::new(MemoryFs::new()),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Host")
    }
}
