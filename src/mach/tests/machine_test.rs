use super::*;
use crate::mach::{Fault, DATA_START};

#[test]
fn test_comparisons_push_truth() {
    let mut r = load("PUSH_B 5\nPUSH_B 3\nGE\nPUSH_B 3\nPUSH_B 5\nGE\nEXIT");
    assert_eq!(run(&mut r), "");
    assert_eq!(r.machine().stack(), &[-1, 0]);
}

#[test]
fn test_increment_through_handle() {
    let mut r = load(
        "ADDR_B 0x2000\n\
         PUSH_B 7\n\
         STORE\n\
         POP\n\
         ADDR_B 0x2000\n\
         INC_PRE\n\
         ADDR_B 0x2000\n\
         INC_POST\n\
         EXIT",
    );
    run(&mut r);
    assert_eq!(r.machine().stack(), &[8, 8]);
    assert_eq!(r.machine().memory().byte(DATA_START), 9);
}

#[test]
fn test_byte_store_wraps() {
    let mut r = load("ADDR_B 0x2000\nPUSH_W 300\nSTORE\nLD_B 0x2000\nEXIT");
    run(&mut r);
    assert_eq!(r.machine().stack(), &[44, 44]);
}

#[test]
fn test_factorial_unwinds() {
    let mut r = load(
        "SPACE 0\n\
         JMP main\n\
         fact: FUNC 9 1\n\
         LD_LD 5\n\
         PUSH_B 1\n\
         LE\n\
         JZ recurse\n\
         PUSH_B 1\n\
         RET\n\
         recurse: LD_LD 5\n\
         LD_LD 5\n\
         PUSH_B 1\n\
         SUB\n\
         CALL fact\n\
         MUL\n\
         RET\n\
         main: FUNC 5 0\n\
         PUSH_B 5\n\
         CALL fact\n\
         EXIT",
    );
    assert_eq!(run(&mut r), "");
    assert_eq!(r.machine().stack(), &[120]);
    assert_eq!(r.machine().base(), DATA_START);
    assert_eq!(r.machine().base2(), DATA_START + 5);
}

#[test]
fn test_division_by_zero_is_zero() {
    let mut r = load("PUSH_B 7\nPUSH_B 0\nDIV\nPUSH_B 7\nPUSH_B 0\nMOD\nEXIT");
    run(&mut r);
    assert_eq!(r.machine().stack(), &[0, 0]);
    assert!(r.fault().is_none());
}

#[test]
fn test_faults_halt() {
    let mut r = load("NOP\nDB 0x2C\nNOP");
    assert_eq!(run(&mut r), "\ninvalid opcode 0x2C\n");
    assert_eq!(r.fault(), Some(&Fault::InvalidOpcode(0x2C)));
    assert!(r.is_halted());

    let mut r = load("POP");
    run(&mut r);
    assert_eq!(r.fault(), Some(&Fault::StackUnderflow));

    let mut r = load("top: PUSH_B 1\nJMP top");
    run(&mut r);
    assert_eq!(r.fault(), Some(&Fault::StackOverflow));

    let mut r = load("NOP");
    run(&mut r);
    assert!(matches!(r.fault(), Some(Fault::ImageOverrun(_))));
}

#[test]
fn test_quota_yields() {
    let image = assemble("top: JMP top", &AsmOptions::default()).unwrap();
    let mut r = Runtime::default().with_quota(10);
    r.load(&image).unwrap();
    assert_eq!(r.execute(), Event::Running);
    assert_eq!(r.execute(), Event::Running);
    r.stop();
    assert_eq!(r.execute(), Event::Halted);
    assert!(r.fault().is_none());
}

#[test]
fn test_halt_hook_runs_once() {
    use std::cell::Cell;
    use std::rc::Rc;
    let calls = Rc::new(Cell::new(0));
    let mut r = load("EXIT");
    let seen = calls.clone();
    r.on_halt(move |fault| {
        assert!(fault.is_none());
        seen.set(seen.get() + 1);
    });
    run(&mut r);
    assert_eq!(r.execute(), Event::Halted);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_load_rejects_short_image() {
    let mut r = Runtime::default();
    let image = vec![0x4C, 0x41, 0x56, 0x12, 0, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0];
    assert!(r.load(&image).is_err());
    assert!(r.is_halted());
}

#[test]
fn test_deterministic_rerun() {
    let source = "PUSH_B 99\nsrand\nrand\nrand\nEXIT";
    let mut a = load(source);
    let mut b = load(source);
    run(&mut a);
    run(&mut b);
    assert_eq!(a.machine().stack(), b.machine().stack());
    a.reset();
    let image = assemble(source, &AsmOptions::default()).unwrap();
    a.load(&image).unwrap();
    run(&mut a);
    assert_eq!(a.machine().stack(), b.machine().stack());
}
