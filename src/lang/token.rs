#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Int(i32),
    Str(Vec<u8>),
    Ident(String),
    Word(Word),
    Operator(Operator),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Question,
    Hash,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    Void,
    Char,
    Int,
    Long,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
}

impl Word {
    pub fn from_str(s: &str) -> Option<Word> {
        use Word::*;
        Some(match s {
            "void" => Void,
            "char" => Char,
            "int" => Int,
            "long" => Long,
            "if" => If,
            "else" => Else,
            "while" => While,
            "do" => Do,
            "for" => For,
            "switch" => Switch,
            "case" => Case,
            "default" => Default,
            "break" => Break,
            "continue" => Continue,
            "return" => Return,
            _ => return None,
        })
    }

    pub fn is_type(self) -> bool {
        matches!(self, Word::Void | Word::Char | Word::Int | Word::Long)
    }
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Word::*;
        let s = match self {
            Void => "void",
            Char => "char",
            Int => "int",
            Long => "long",
            If => "if",
            Else => "else",
            While => "while",
            Do => "do",
            For => "for",
            Switch => "switch",
            Case => "case",
            Default => "default",
            Break => "break",
            Continue => "continue",
            Return => "return",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    Inc,
    Dec,
}

/// Longest first so the lexer can take the first match.
pub const OPERATORS: &[(&str, Operator)] = &[
    ("<<=", Operator::ShlAssign),
    (">>=", Operator::ShrAssign),
    ("&&", Operator::AndAnd),
    ("||", Operator::OrOr),
    ("==", Operator::Eq),
    ("!=", Operator::Ne),
    ("<=", Operator::Le),
    (">=", Operator::Ge),
    ("<<", Operator::Shl),
    (">>", Operator::Shr),
    ("+=", Operator::PlusAssign),
    ("-=", Operator::MinusAssign),
    ("*=", Operator::StarAssign),
    ("/=", Operator::SlashAssign),
    ("%=", Operator::PercentAssign),
    ("&=", Operator::AmpAssign),
    ("|=", Operator::PipeAssign),
    ("^=", Operator::CaretAssign),
    ("++", Operator::Inc),
    ("--", Operator::Dec),
    ("+", Operator::Plus),
    ("-", Operator::Minus),
    ("*", Operator::Star),
    ("/", Operator::Slash),
    ("%", Operator::Percent),
    ("&", Operator::Amp),
    ("|", Operator::Pipe),
    ("^", Operator::Caret),
    ("~", Operator::Tilde),
    ("!", Operator::Bang),
    ("<", Operator::Lt),
    (">", Operator::Gt),
    ("=", Operator::Assign),
];

impl Operator {
    /// Binding power of binary operators; higher binds tighter.
    pub fn precedence(self) -> Option<u8> {
        use Operator::*;
        Some(match self {
            OrOr => 1,
            AndAnd => 2,
            Pipe => 3,
            Caret => 4,
            Amp => 5,
            Eq | Ne => 6,
            Lt | Gt | Le | Ge => 7,
            Shl | Shr => 8,
            Plus | Minus => 9,
            Star | Slash | Percent => 10,
            _ => return None,
        })
    }

    /// `+=` gives `Some(Plus)`, plain `=` gives `None`.
    pub fn compound(self) -> Option<Operator> {
        use Operator::*;
        Some(match self {
            PlusAssign => Plus,
            MinusAssign => Minus,
            StarAssign => Star,
            SlashAssign => Slash,
            PercentAssign => Percent,
            AmpAssign => Amp,
            PipeAssign => Pipe,
            CaretAssign => Caret,
            ShlAssign => Shl,
            ShrAssign => Shr,
            _ => return None,
        })
    }

    pub fn is_assignment(self) -> bool {
        self == Operator::Assign || self.compound().is_some()
    }

    /// Folds a binary operator the way the machine evaluates it.
    pub fn apply(self, a: i32, b: i32) -> i32 {
        use Operator::*;
        let truth = |c: bool| if c { -1 } else { 0 };
        match self {
            Plus => a.wrapping_add(b),
            Minus => a.wrapping_sub(b),
            Star => a.wrapping_mul(b),
            Slash if b == 0 => 0,
            Slash => a.wrapping_div(b),
            Percent if b == 0 => 0,
            Percent => a.wrapping_rem(b),
            Amp => a & b,
            Pipe => a | b,
            Caret => a ^ b,
            Shl => a.wrapping_shl(b as u32),
            Shr => a.wrapping_shr(b as u32),
            AndAnd => truth(a != 0 && b != 0),
            OrOr => truth(a != 0 || b != 0),
            Eq => truth(a == b),
            Ne => truth(a != b),
            Lt => truth(a < b),
            Gt => truth(a > b),
            Le => truth(a <= b),
            Ge => truth(a >= b),
            _ => 0,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = OPERATORS
            .iter()
            .find(|(_, op)| op == self)
            .map_or("?", |(s, _)| s);
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Token::*;
        match self {
            Int(n) => write!(f, "{}", n),
            Str(s) => write!(f, "\"{}\"", String::from_utf8_lossy(s)),
            Ident(s) => write!(f, "{}", s),
            Word(w) => write!(f, "{}", w),
            Operator(op) => write!(f, "{}", op),
            LParen => write!(f, "("),
            RParen => write!(f, ")"),
            LBracket => write!(f, "["),
            RBracket => write!(f, "]"),
            LBrace => write!(f, "{{"),
            RBrace => write!(f, "}}"),
            Comma => write!(f, ","),
            Semicolon => write!(f, ";"),
            Colon => write!(f, ":"),
            Question => write!(f, "?"),
            Hash => write!(f, "#"),
            Eof => write!(f, "end of file"),
        }
    }
}
