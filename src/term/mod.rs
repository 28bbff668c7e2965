extern crate ansi_term;
extern crate ctrlc;
extern crate linefeed;
use crate::host::{Host, MemoryFs, Raster};
use crate::mach::{Event, Runtime, DEFAULT_QUOTA, GRAPH_START};
use ansi_term::Style;
use linefeed::{Interface, ReadResult, Signal};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub quota: usize,
    /// Directory backing the program's files.
    pub root: Option<PathBuf>,
    /// Print the text grid and framebuffer after the program halts.
    pub screen: bool,
}

impl Default for RunOptions {
    fn default() -> RunOptions {
        RunOptions {
            quota: DEFAULT_QUOTA,
            root: None,
            screen: false,
        }
    }
}

/// Runs an image on the terminal until it halts. Input lines feed the
/// key queue, each followed by a newline. Returns false on a fault.
pub fn run(image: &[u8], options: &RunOptions) -> io::Result<bool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let int_moved = interrupted.clone();
    if let Err(error) = ctrlc::set_handler(move || {
        int_moved.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(%error, "Ctrl-C handler not installed");
    }

    let mut host = Host::default();
    if let Some(root) = &options.root {
        host.fs = Box::new(MemoryFs::rooted(root));
    }
    let mut runtime = Runtime::new(host).with_quota(options.quota);
    runtime
        .load(image)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    let ok = main_loop(&mut runtime, interrupted)?;
    if options.screen {
        print!("{}", screen(&runtime));
    }
    Ok(ok)
}

fn main_loop(runtime: &mut Runtime, interrupted: Arc<AtomicBool>) -> io::Result<bool> {
    let interface = Interface::new("lavax")?;
    interface.set_report_signal(Signal::Interrupt, true);
    let mut ok = true;
    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            runtime.stop();
        }
        match runtime.execute() {
            Event::Running => {}
            Event::Print(s) => {
                interface.write_fmt(format_args!("{}", s))?;
            }
            Event::AwaitingInput => {
                interface.set_prompt("")?;
                match interface.read_line()? {
                    ReadResult::Input(line) => {
                        for b in line.bytes() {
                            runtime.push_key(b);
                        }
                        runtime.push_key(b'\n');
                    }
                    ReadResult::Signal(Signal::Interrupt) => {
                        interface.set_buffer("")?;
                        interface.lock_reader().cancel_read_line()?;
                        runtime.stop();
                    }
                    ReadResult::Signal(_) | ReadResult::Eof => runtime.stop(),
                }
            }
            Event::Fault(fault) => {
                ok = false;
                interface.write_fmt(format_args!(
                    "{}\n",
                    Style::new().bold().paint(format!("fault: {}", fault))
                ))?;
            }
            Event::Halted => return Ok(ok),
        }
    }
}

/// Text grid then visible framebuffer, for headless inspection.
pub fn screen(runtime: &Runtime) -> String {
    let machine = runtime.machine();
    let header = machine.header();
    let mut out = String::new();
    for line in machine.console().lines(machine.memory()) {
        out.push_str(&line);
        out.push('\n');
    }
    let size = Raster::size(header.width, header.height) as u16;
    let mut bits = machine.memory().region(GRAPH_START, size).to_vec();
    out.push_str(&Raster::new(header.width, header.height, &mut bits).to_ascii());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach::AsmOptions;

    #[test]
    fn test_screen_dump() {
        let image = crate::build(
            "void main() { printf(\"hi\"); point(0, 0, 0x41); }",
            &AsmOptions::default(),
        )
        .unwrap();
        let mut runtime = Runtime::default();
        runtime.load(&image).unwrap();
        runtime.run();
        let dump = screen(&runtime);
        let mut lines = dump.lines();
        assert_eq!(lines.next(), Some("hi"));
        assert!(dump.lines().any(|l| l.starts_with('#')));
    }
}
