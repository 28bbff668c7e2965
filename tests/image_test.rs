mod common;
use common::*;
use lavax::mach::syscall::SYSCALLS;
use lavax::mach::{assemble, disassemble, AsmOptions, LoadError, Runtime, HEADER_LEN, MAGIC};

#[test]
fn test_every_syscall_balances_the_stack() {
    let mut body = String::new();
    for call in SYSCALLS {
        if matches!(call.name, "exit" | "getchar" | "getword") {
            continue;
        }
        let args = vec!["0"; call.args].join(", ");
        body.push_str(&format!("    {}({});\n", call.name, args));
    }
    let source = format!("void main() {{\n{}}}\n", body);
    let mut r = load(&source);
    exec(&mut r);
    assert!(r.is_halted());
    assert!(r.fault().is_none(), "{:?}", r.fault());
    assert!(r.machine().stack().is_empty());
}

#[test]
fn test_syscalls_bound_extreme_arguments() {
    let mut r = load(
        "char buf[16];\n\
         void main() {\n\
             box(-32768, -32768, 32767, 32767, 1, 0x41);\n\
             ellipse(80, 40, 2147483647, 2147483647, 1, 0x42);\n\
             circle(0, 0, -2147483647, 0, 0x41);\n\
             line(-2147483647, 40, 2147483647, 40, 0x41);\n\
             writeblock(0, 0, 65535, 1, 0x41, buf);\n\
             getblock(-40000, 0, 65535, 1, 0x40, buf);\n\
             crc16(buf, 2147483647);\n\
             memcpy(buf, buf, 100000);\n\
             secret(buf, 100000, \"k\");\n\
             memset(buf, 0, 2147483647);\n\
             printf(\"ok\");\n\
         }",
    );
    assert_eq!(exec(&mut r), "ok");
    assert!(r.fault().is_none());
    assert!(r.machine().stack().is_empty());
}

#[test]
fn test_image_header() {
    let image = lavax::build("void main() { }", &AsmOptions::default()).unwrap();
    assert_eq!(&image[..3], &MAGIC);
    assert!(image.len() > HEADER_LEN);

    let mut bad = image.clone();
    bad[0] = b'X';
    let mut r = Runtime::default();
    assert!(matches!(r.load(&bad), Err(LoadError::BadMagic)));
    assert!(matches!(r.load(&image[..15]), Err(LoadError::TooShort(15))));
}

#[test]
fn test_disassembly_reassembles() {
    let options = AsmOptions {
        mask: 0x33,
        ..AsmOptions::default()
    };
    let image = lavax::build(
        "int g[3] = {4, 5, 6};\n\
         int twice(int n) { return n * 2; }\n\
         void main() { int i; for (i = 0; i < 3; i++) printf(\"%d\\n\", twice(g[i])); }",
        &options,
    )
    .unwrap();
    let text = disassemble(&image).unwrap();
    assert_eq!(assemble(&text, &options).unwrap(), image);

    let mut r = Runtime::default();
    r.load(&image).unwrap();
    assert_eq!(exec(&mut r), "8\n10\n12\n");
}

#[test]
fn test_halt_hook_sees_faults() {
    let image = assemble("JMP main\nmain: FUNC 5 0\nPOP\nEXIT\n", &AsmOptions::default()).unwrap();
    let mut r = Runtime::default();
    let seen = std::rc::Rc::new(std::cell::RefCell::new(vec![]));
    let log = seen.clone();
    r.on_halt(move |fault| log.borrow_mut().push(fault.map(|f| f.to_string())));
    r.load(&image).unwrap();
    exec(&mut r);
    assert_eq!(*seen.borrow(), vec![Some("stack underflow".to_string())]);
}
