use super::*;
use crate::lang::ErrorCode;

fn fails(source: &str) -> crate::lang::Error {
    compile(source).unwrap_err()
}

#[test]
fn test_missing_main() {
    assert_eq!(fails("int f() { return 0; }").code(), ErrorCode::NoMain);
    assert_eq!(fails("void main(int a) {}").code(), ErrorCode::NoMain);
}

#[test]
fn test_misplaced_statements() {
    assert_eq!(fails("void main() { continue; }").code(), ErrorCode::Misplaced);
    assert_eq!(fails("void main() { case 1: ; }").code(), ErrorCode::Misplaced);
    assert_eq!(
        fails("void main() { int k; switch (k) { case 1: case 1: ; } }").code(),
        ErrorCode::Redeclared
    );
}

#[test]
fn test_argument_counts() {
    assert_eq!(fails("void main() { printf(); }").code(), ErrorCode::ArgumentCount);
    assert_eq!(
        fails("int f(int a) { return a; } void main() { f(); }").code(),
        ErrorCode::ArgumentCount
    );
}

#[test]
fn test_diagnostic_points_at_token() {
    let source = "void main() {\n    int x = 1;\n    x = y + 1;\n}\n";
    let diag = fails(source).diagnostic(source);
    assert_eq!(
        diag,
        "error: undefined name; `y`\n --> 3:9\n     |\n   3 |     x = y + 1;\n     |         ^\n"
    );
}

#[test]
fn test_lexical_errors_surface() {
    assert_eq!(fails("void main() { int s = \"open; }").code(), ErrorCode::SyntaxError);
}
