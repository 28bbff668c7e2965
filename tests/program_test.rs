mod common;
use common::*;

#[test]
fn test_locals_leave_stack_empty() {
    let mut r = load("void main(){int a=10;int b=20;int c=a+b;}");
    assert_eq!(exec(&mut r), "");
    assert!(r.is_halted());
    assert!(r.fault().is_none());
    assert!(r.machine().stack().is_empty());
}

#[test]
fn test_recursion_unwinds() {
    let mut r = load(
        "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }\n\
         void main() { int a = fact(5); printf(\"%d\", a); }",
    );
    assert_eq!(exec(&mut r), "120");
    assert!(r.machine().stack().is_empty());
}

#[test]
fn test_getchar_suspends_and_resumes() {
    let mut r = load("void main() { int c = getchar(); putchar(c + 1); }");
    assert_eq!(exec(&mut r), "\n?\n");
    assert!(!r.is_halted());
    r.push_key(b'A');
    assert_eq!(exec(&mut r), "B");
    assert!(r.is_halted());
}

#[test]
fn test_comparisons_are_minus_one_or_zero() {
    assert_eq!(
        output("void main() { printf(\"%d %d %d %d\", 5 >= 3, 3 >= 5, 2 == 2, !0); }"),
        "-1 0 -1 -1"
    );
}

#[test]
fn test_division_by_zero_is_zero() {
    assert_eq!(
        output("void main() { int z = 0; printf(\"%d %d\", 7 / z, 7 % z); }"),
        "0 0"
    );
}

#[test]
fn test_loops() {
    let s = output(
        "void main() {\n\
             int i, n = 0;\n\
             for (i = 0; i < 5; i++) { if (i == 3) continue; n += i; }\n\
             while (n < 20) n = n * 2;\n\
             do { n--; } while (n > 18);\n\
             printf(\"%d %d\", i, n);\n\
         }",
    );
    assert_eq!(s, "5 18");
}

#[test]
fn test_switch_falls_through() {
    let s = output(
        "void show(int k) {\n\
             switch (k) {\n\
             case 1: putchar('a');\n\
             case 2: putchar('b'); break;\n\
             default: putchar('?');\n\
             }\n\
         }\n\
         void main() { show(1); show(2); show(9); }",
    );
    assert_eq!(s, "abb?");
}

#[test]
fn test_globals_and_pointers() {
    let s = output(
        "int table[4] = {1, 2, 3, 4};\n\
         int total;\n\
         void bump(int *p) { *p = *p + 10; }\n\
         void main() {\n\
             int *p = table;\n\
             int i;\n\
             p++;\n\
             bump(p);\n\
             bump(&total);\n\
             for (i = 0; i < 4; i++) total += table[i];\n\
             printf(\"%d %d\", table[1], total);\n\
         }",
    );
    assert_eq!(s, "12 30");
}

#[test]
fn test_strings() {
    let s = output(
        "#define GREETING \"hello\"\n\
         char name[16] = GREETING;\n\
         char *other = \"world\";\n\
         void main() {\n\
             char buf[32];\n\
             strcpy(buf, name);\n\
             strcat(buf, \", \");\n\
             strcat(buf, other);\n\
             printf(\"%s %d %c\", buf, strlen(buf), toupper(buf[0]));\n\
         }",
    );
    assert_eq!(s, "hello, world 12 H");
}

#[test]
fn test_two_dimensional_array() {
    let s = output(
        "int m[3][3];\n\
         void main() {\n\
             int i, j, sum = 0;\n\
             for (i = 0; i < 3; i++) for (j = 0; j < 3; j++) m[i][j] = i * 3 + j;\n\
             for (i = 0; i < 3; i++) sum += m[i][i];\n\
             printf(\"%d\", sum);\n\
         }",
    );
    assert_eq!(s, "12");
}

#[test]
fn test_short_circuit_skips_calls() {
    let s = output(
        "int hit;\n\
         int touch() { hit++; return 1; }\n\
         void main() {\n\
             int a = 0 && touch();\n\
             int b = 1 || touch();\n\
             int c = 1 && touch();\n\
             printf(\"%d %d %d %d\", a, b, c, hit);\n\
         }",
    );
    assert_eq!(s, "0 -1 -1 1");
}

#[test]
fn test_ternary_and_compound_operators() {
    let s = output(
        "void main() {\n\
             int x = 6;\n\
             x <<= 2; x |= 1; x ^= 3; x -= 4;\n\
             printf(\"%d %s\", x, x > 10 ? \"big\" : \"small\");\n\
         }",
    );
    assert_eq!(s, "22 big");
}

#[test]
fn test_runs_are_deterministic() {
    let source = "void main() { int i; srand(7); for (i = 0; i < 5; i++) printf(\"%d \", rand()); }";
    assert_eq!(output(source), output(source));
}

#[test]
fn test_repeated_literal_keeps_other_strings() {
    let s = output(
        "char *g = \"hello\";\n\
         void main() {\n\
             int i;\n\
             for (i = 0; i < 1000; i++) strlen(\"abcdefgh\");\n\
             printf(\"%s\", g);\n\
         }",
    );
    assert_eq!(s, "hello");
}

#[test]
fn test_literal_with_nul_ends_there() {
    assert_eq!(output("void main() { printf(\"a\\0b\"); printf(\"!\"); }"), "a!");
}
