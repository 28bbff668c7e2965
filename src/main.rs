//! # LavaX
//!
//! Compile, assemble, inspect and run LAV programs.
//!

use clap::{Parser, Subcommand};
use lavax::mach::{self, AsmOptions, DEFAULT_QUOTA, MAGIC};
use lavax::term::{self, RunOptions};
use lavax::BuildError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "lavax", version, about)]
struct Args {
    #[arg(short, long, global = true, default_value_t = Level::WARN)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct ImageArgs {
    /// XOR mask for string literals in the image.
    #[arg(long, default_value = "0", value_parser = parse_byte)]
    mask: u8,
    #[arg(long, default_value_t = 160)]
    width: u16,
    #[arg(long, default_value_t = 80)]
    height: u16,
}

impl ImageArgs {
    fn options(&self) -> AsmOptions {
        AsmOptions {
            mask: self.mask,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Source to assembly text.
    Compile {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Assembly text to a LAV image.
    Assemble {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Source straight to a LAV image.
    Build {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// LAV image back to assembly text.
    Disasm {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a LAV image, or build and run source.
    Run {
        input: PathBuf,
        /// Instructions per batch.
        #[arg(long, default_value_t = DEFAULT_QUOTA)]
        quota: usize,
        /// Directory for program files.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Print the final screen.
        #[arg(long)]
        screen: bool,
        #[command(flatten)]
        image: ImageArgs,
    },
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| e.to_string())
}

fn default_output(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

fn read_text(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))
}

fn write(path: &Path, data: &[u8]) -> Result<(), String> {
    tracing::info!(path = %path.display(), len = data.len(), "writing");
    fs::write(path, data).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Compile errors get a caret diagnostic against their source.
fn explain(error: BuildError, source: &str) -> String {
    match error {
        BuildError::Compile(e) => e.diagnostic(source),
        BuildError::Assemble(e) => format!("error: {}\n", e),
    }
}

fn build(path: &Path, options: &AsmOptions) -> Result<Vec<u8>, String> {
    let source = read_text(path)?;
    lavax::build(&source, options).map_err(|e| explain(e, &source))
}

fn execute(command: Command) -> Result<bool, String> {
    match command {
        Command::Compile { input, output } => {
            let source = read_text(&input)?;
            let text = lavax::lang::compile(&source).map_err(|e| e.diagnostic(&source))?;
            write(&output.unwrap_or_else(|| default_output(&input, "asm")), text.as_bytes())?;
        }
        Command::Assemble {
            input,
            output,
            image,
        } => {
            let text = read_text(&input)?;
            let bytes = mach::assemble(&text, &image.options()).map_err(|e| format!("error: {}", e))?;
            write(&output.unwrap_or_else(|| default_output(&input, "lav")), &bytes)?;
        }
        Command::Build {
            input,
            output,
            image,
        } => {
            let bytes = build(&input, &image.options())?;
            write(&output.unwrap_or_else(|| default_output(&input, "lav")), &bytes)?;
        }
        Command::Disasm { input, output } => {
            let bytes = fs::read(&input).map_err(|e| format!("{}: {}", input.display(), e))?;
            let text = mach::disassemble(&bytes).map_err(|e| format!("error: {}", e))?;
            match output {
                Some(path) => write(&path, text.as_bytes())?,
                None => print!("{}", text),
            }
        }
        Command::Run {
            input,
            quota,
            root,
            screen,
            image,
        } => {
            let bytes = fs::read(&input).map_err(|e| format!("{}: {}", input.display(), e))?;
            let bytes = if bytes.starts_with(&MAGIC) {
                bytes
            } else {
                build(&input, &image.options())?
            };
            let options = RunOptions {
                quota,
                root,
                screen,
            };
            return term::run(&bytes, &options).map_err(|e: io::Error| e.to_string());
        }
    }
    Ok(true)
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    match execute(args.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(message) => {
            eprint!("{}", message);
            if !message.ends_with('\n') {
                eprintln!();
            }
            ExitCode::FAILURE
        }
    }
}
