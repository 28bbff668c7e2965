use super::*;

#[test]
fn test_every_program_assembles() {
    let lines = asm(
        "#define SIZE 4\n\
         int table[SIZE] = {1, 2, 3, 4};\n\
         char *names[2] = {\"a\", \"b\"};\n\
         int sum(int *p, int n) {\n\
             int i, s = 0;\n\
             for (i = 0; i < n; i++) s += p[i];\n\
             return s;\n\
         }\n\
         void main() {\n\
             printf(\"%d %s\\n\", sum(table, SIZE), names[1]);\n\
         }\n",
    );
    assert_eq!(lines[0], "SPACE 16");
    assert!(lines.contains(&"CALL sum".to_string()));
}

#[test]
fn test_for_step_follows_body() {
    let lines = asm("void main() { int i; for (i = 0; i < 3; i++) putchar(65); }");
    let body = lines.iter().position(|l| l == "putchar").unwrap();
    let step = lines.iter().position(|l| l == "INC_POST").unwrap();
    assert!(step > body);
}

#[test]
fn test_switch_dispatch() {
    let lines = asm(
        "void main() {\n\
             int k = 2;\n\
             switch (k) { case 1: putchar(49); break; case 2: putchar(50); default: putchar(63); }\n\
         }",
    );
    assert!(has(&lines, &["ADDR_LD 7", "LD_LW 5", "STORE", "POP"]));
    assert!(has(&lines, &["LD_LD 7", "PUSH_B 2", "EQ"]));
    assert_eq!(lines[lines.iter().position(|l| l.starts_with("FUNC")).unwrap()], "FUNC 11 0");
}

#[test]
fn test_logical_operators_short_circuit() {
    let lines = asm("int f() { return 1; } void main() { int a; a = 0 && f(); }");
    let jz = lines.iter().position(|l| l.starts_with("JZ")).unwrap();
    let call = lines.iter().position(|l| l == "CALL f").unwrap();
    assert!(jz < call);
    assert!(has(&lines, &["PUSH_W -1"]));
}

#[test]
fn test_arrays_and_pointers() {
    let lines = asm(
        "int m[2][3];\n\
         void main() { int *p; m[1][2] = 5; p = &m[0][1]; *p = 7; }",
    );
    assert!(has(&lines, &["PUSH_B 1", "PUSH_B 6", "MUL", "PUSH_B 2", "PUSH_B 2", "MUL", "ADD", "LEA_W 0x2000"]));
    assert!(has(&lines, &["LD_LD 5", "CAST_W", "PUSH_B 7", "STORE"]));
}

#[test]
fn test_local_array_initializers() {
    let lines = asm("void main() { char s[] = \"hey\"; int v[] = {4, 5}; }");
    assert!(has(&lines, &["PUSH_B 0", "LEA_LB 5", "PUSH_STR \"hey\"", "strcpy"]));
    assert!(has(&lines, &["ADDR_LW 9", "PUSH_B 4", "STORE", "POP", "ADDR_LW 11", "PUSH_B 5"]));
}

#[test]
fn test_returns() {
    let lines = asm("int f(int x) { if (x) return 2; } void main() { return; }");
    assert!(has(&lines, &["PUSH_B 2", "RET"]));
    assert!(has(&lines, &["PUSH_B 0", "RET"]));
    let main = lines.iter().position(|l| l == "main:").unwrap();
    assert!(lines[main..].iter().all(|l| l != "RET"));
}

#[test]
fn test_character_constants_and_macros() {
    let lines = asm("#define GREETING \"hi\"\n#define NL '\\n'\nvoid main() { printf(GREETING); putchar(NL); }");
    assert!(has(&lines, &["PUSH_STR \"hi\"", "PUSH_B 1", "printf"]));
    assert!(has(&lines, &["PUSH_B 10", "putchar"]));
}
