use super::*;
use crate::mach::Event;

#[test]
fn test_printf_variadic() {
    let mut r = load("PUSH_STR \"n=%d %s|%5x\\n\"\nPUSH_W -42\nPUSH_STR \"ok\"\nPUSH_B 255\nPUSH_B 4\nprintf\nEXIT");
    assert_eq!(run(&mut r), "n=-42 ok|   ff\n");
    assert!(r.machine().stack().is_empty());
}

#[test]
fn test_getchar_blocks_and_resumes() {
    let mut r = load("PUSH_B 1\ngetchar\nEXIT");
    assert_eq!(r.execute(), Event::AwaitingInput);
    assert_eq!(r.execute(), Event::AwaitingInput);
    assert_eq!(r.machine().stack(), &[1]);
    r.push_key(b'A');
    assert_eq!(run(&mut r), "");
    assert_eq!(r.machine().stack(), &[1, 65]);
}

#[test]
fn test_unknown_syscall_pushes_zero() {
    let mut r = load("SYS 0xD0\nEXIT");
    run(&mut r);
    assert_eq!(r.machine().stack(), &[0]);
    assert!(r.fault().is_none());
}

#[test]
fn test_string_functions() {
    let mut r = load(
        "PUSH_STR \"hello\"\n\
         strlen\n\
         PUSH_STR \"abc\"\n\
         PUSH_STR \"abd\"\n\
         strcmp\n\
         PUSH_B 0x61\n\
         toupper\n\
         EXIT",
    );
    run(&mut r);
    let stack = r.machine().stack();
    assert_eq!(stack[0], 5);
    assert!(stack[1] < 0);
    assert_eq!(stack[2], 0x41);
}

#[test]
fn test_putchar_transcript() {
    let mut r = load("PUSH_B 0x48\nputchar\nPUSH_B 0x69\nputchar\nEXIT");
    assert_eq!(run(&mut r), "Hi");
    assert_eq!(r.machine().console().transcript(), b"Hi");
}
