use super::compile;
use crate::mach::{assemble, AsmOptions};

mod compile_test;
mod error_test;

fn asm(source: &str) -> Vec<String> {
    let text = compile(source).unwrap();
    assemble(&text, &AsmOptions::default()).unwrap();
    text.lines().map(|l| l.trim().to_string()).collect()
}

fn has(lines: &[String], wanted: &[&str]) -> bool {
    lines.windows(wanted.len()).any(|w| w.iter().zip(wanted).all(|(a, b)| a == b))
}
