use super::Column;
use std::fmt::Write;

#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    code: ErrorCode,
    line: usize,
    column: Column,
    message: String,
}

#[doc(hidden)]
#[macro_export]
macro_rules! error {
    ($err:ident) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
    };
    ($err:ident; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).message($msg)
    };
    ($err:ident, $line:expr, ..$col:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_line($line)
            .in_column($col)
    };
    ($err:ident, $line:expr, ..$col:expr; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_line($line)
            .in_column($col)
            .message($msg)
    };
}

impl Error {
    pub fn new(code: ErrorCode) -> Error {
        Error {
            code,
            line: 0,
            column: 0..0,
            message: String::new(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// One-based line, or zero when unknown.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn in_line(self, line: usize) -> Error {
        Error { line, ..self }
    }

    pub fn in_column(self, column: &Column) -> Error {
        Error {
            column: column.clone(),
            ..self
        }
    }

    pub fn message<S: Into<String>>(self, message: S) -> Error {
        Error {
            message: message.into(),
            ..self
        }
    }

    /// Position, the offending source line and a caret under the column.
    pub fn diagnostic(&self, source: &str) -> String {
        let mut diag = String::new();
        let _ = writeln!(diag, "error: {}", self.headline());
        if self.line == 0 {
            return diag;
        }
        let _ = writeln!(diag, " --> {}:{}", self.line, self.column.start + 1);
        if let Some(text) = source.lines().nth(self.line - 1) {
            let text = text.trim_end_matches('\r');
            let width = (self.column.end.saturating_sub(self.column.start)).max(1);
            let _ = writeln!(diag, "     |");
            let _ = writeln!(diag, "{:>4} | {}", self.line, text);
            let _ = writeln!(
                diag,
                "     | {}{}",
                " ".repeat(self.column.start),
                "^".repeat(width)
            );
        }
        diag
    }

    fn headline(&self) -> String {
        if self.message.is_empty() {
            self.code.to_string()
        } else {
            format!("{}; {}", self.code, self.message)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    SyntaxError = 1,
    UndefinedName = 2,
    UndefinedFunction = 3,
    Redeclared = 4,
    ArgumentCount = 5,
    MissingSize = 6,
    NotAddressable = 7,
    TypeMismatch = 8,
    Overflow = 9,
    OutOfMemory = 10,
    NoMain = 11,
    Misplaced = 12,
    InternalError = 51,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorCode::*;
        let s = match self {
            SyntaxError => "syntax error",
            UndefinedName => "undefined name",
            UndefinedFunction => "undefined function",
            Redeclared => "redeclared",
            ArgumentCount => "wrong argument count",
            MissingSize => "missing array size",
            NotAddressable => "not addressable",
            TypeMismatch => "type mismatch",
            Overflow => "overflow",
            OutOfMemory => "out of memory",
            NoMain => "no main function",
            Misplaced => "misplaced statement",
            InternalError => "internal error",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {{ {} }}", self.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut suffix = String::new();
        if self.line != 0 {
            suffix.push_str(&format!(" in line {}", self.line));
        }
        if (0..0) != self.column {
            suffix.push_str(&format!(" ({}..{})", self.column.start, self.column.end));
        }
        if !self.message.is_empty() {
            suffix.push_str(&format!("; {}", self.message));
        }
        write!(f, "{}{}", self.code, suffix)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = error!(SyntaxError, 3, ..&(4..5); "expected `;`");
        assert_eq!(e.to_string(), "syntax error in line 3 (4..5); expected `;`");
        assert_eq!(error!(NoMain).to_string(), "no main function");
    }

    #[test]
    fn test_diagnostic_caret() {
        let source = "void main() {\n  int a = 1\n}\n";
        let e = error!(SyntaxError, 3, ..&(0..1); "expected `;`");
        let diag = e.diagnostic(source);
        assert!(diag.starts_with("error: syntax error; expected `;`\n --> 3:1\n"));
        assert!(diag.ends_with("   3 | }\n     | ^\n"));
    }
}
