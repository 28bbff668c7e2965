use super::{token::*, Column, Error};

/// A token and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: Column,
}

impl Spanned {
    pub fn error(&self, code: super::ErrorCode) -> Error {
        Error::new(code).in_line(self.line).in_column(&self.column)
    }

    pub fn unexpected(&self, wanted: &str) -> Error {
        error!(SyntaxError, self.line, ..&self.column;
            format!("expected {}, found `{}`", wanted, self.token))
    }
}

pub fn lex(s: &str) -> Result<Vec<Spanned>, Error> {
    let mut lexer = Lexer::new(s);
    let mut tokens = vec![];
    loop {
        let t = lexer.next()?;
        if t.token == Token::Eof {
            tokens.push(t);
            return Ok(tokens);
        }
        tokens.push(t);
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(s: &'a str) -> Lexer<'a> {
        Lexer {
            chars: s.chars().peekable(),
            line: 1,
            col: 0,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn error_here(&self, start: usize, message: &str) -> Error {
        error!(SyntaxError, self.line, ..&(start..self.col.max(start + 1)); message)
    }

    fn skip_trivia(&mut self) -> Result<(), Error> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some('/') => {
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.bump();
                            }
                        }
                        Some('*') => {
                            let (line, col) = (self.line, self.col);
                            self.bump();
                            self.bump();
                            let mut star = false;
                            loop {
                                match self.bump() {
                                    Some('/') if star => break,
                                    Some(c) => star = c == '*',
                                    None => {
                                        return Err(error!(SyntaxError, line, ..&(col..col + 2);
                                            "unterminated comment"))
                                    }
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next(&mut self) -> Result<Spanned, Error> {
        self.skip_trivia()?;
        let line = self.line;
        let start = self.col;
        let token = match self.peek() {
            None => Token::Eof,
            Some(c) if c.is_ascii_digit() => self.number(start)?,
            Some(c) if is_ident_start(c) => self.word(),
            Some('"') => Token::Str(self.quoted('"', start)?),
            Some('\'') => {
                let bytes = self.quoted('\'', start)?;
                if bytes.len() != 1 {
                    return Err(self.error_here(start, "character literal must hold one byte"));
                }
                Token::Int(i32::from(bytes[0]))
            }
            Some(c) => {
                self.bump();
                match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    ',' => Token::Comma,
                    ';' => Token::Semicolon,
                    ':' => Token::Colon,
                    '?' => Token::Question,
                    '#' => Token::Hash,
                    _ => self.operator(c, start)?,
                }
            }
        };
        Ok(Spanned {
            token,
            line,
            column: start..self.col,
        })
    }

    fn operator(&mut self, first: char, start: usize) -> Result<Token, Error> {
        let mut s = first.to_string();
        for _ in 0..2 {
            let mut candidate = s.clone();
            match self.peek() {
                Some(c) => candidate.push(c),
                None => break,
            }
            if OPERATORS.iter().any(|(text, _)| text.starts_with(&candidate[..])) {
                self.bump();
                s = candidate;
            } else {
                break;
            }
        }
        match OPERATORS.iter().find(|(text, _)| *text == s) {
            Some((_, op)) => Ok(Token::Operator(*op)),
            None => Err(self.error_here(start, &format!("unexpected character `{}`", s))),
        }
    }

    fn word(&mut self) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            s.push(c);
            self.bump();
        }
        match Word::from_str(&s) {
            Some(word) => Token::Word(word),
            None => Token::Ident(s),
        }
    }

    fn number(&mut self, start: usize) -> Result<Token, Error> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            s.push(c);
            self.bump();
        }
        let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => (hex, 16),
            None => (&s[..], 10),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(self.error_here(start, &format!("malformed number `{}`", s)));
        }
        match u32::from_str_radix(digits, radix) {
            Ok(n) => Ok(Token::Int(n as i32)),
            Err(_) => Err(error!(Overflow, self.line, ..&(start..self.col))),
        }
    }

    fn quoted(&mut self, delimiter: char, start: usize) -> Result<Vec<u8>, Error> {
        self.bump();
        let mut bytes = vec![];
        loop {
            let ch = match self.bump() {
                Some('\n') | None => {
                    return Err(self.error_here(start, "unterminated literal"));
                }
                Some(c) => c,
            };
            if ch == delimiter {
                return Ok(bytes);
            }
            if ch != '\\' {
                let mut buf = [0; 4];
                bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                continue;
            }
            let escaped = match self.bump() {
                Some('n') => b'\n',
                Some('r') => b'\r',
                Some('t') => b'\t',
                Some('a') => 7,
                Some('b') => 8,
                Some('f') => 12,
                Some('v') => 11,
                Some('\\') => b'\\',
                Some('\'') => b'\'',
                Some('"') => b'"',
                Some('?') => b'?',
                Some('x') => {
                    let mut value = 0u32;
                    let mut digits = 0;
                    while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                        self.bump();
                        value = (value << 4) | d;
                        digits += 1;
                    }
                    if digits == 0 {
                        return Err(self.error_here(start, "bad hex escape"));
                    }
                    value as u8
                }
                Some(c) if c.is_digit(8) => {
                    let mut value = c.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match self.peek().and_then(|c| c.to_digit(8)) {
                            Some(d) => {
                                self.bump();
                                value = (value << 3) | d;
                            }
                            None => break,
                        }
                    }
                    value as u8
                }
                _ => return Err(self.error_here(start, "unknown escape")),
            };
            bytes.push(escaped);
        }
    }
}

/// One token of lookahead over the lexer.
pub struct Cursor<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Spanned>,
    last_line: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(s: &'a str) -> Cursor<'a> {
        Cursor {
            lexer: Lexer::new(s),
            peeked: None,
            last_line: 1,
        }
    }

    pub fn peek(&mut self) -> Result<&Spanned, Error> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next()?);
        }
        match &self.peeked {
            Some(t) => Ok(t),
            None => Err(error!(InternalError)),
        }
    }

    pub fn peek_token(&mut self) -> Result<&Token, Error> {
        Ok(&self.peek()?.token)
    }

    pub fn next(&mut self) -> Result<Spanned, Error> {
        let t = match self.peeked.take() {
            Some(t) => t,
            None => self.lexer.next()?,
        };
        self.last_line = t.line;
        Ok(t)
    }

    /// Line of the most recently consumed token.
    pub fn line(&self) -> usize {
        self.last_line
    }

    pub fn eat(&mut self, token: &Token) -> Result<bool, Error> {
        if self.peek_token()? == token {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn eat_op(&mut self, op: Operator) -> Result<bool, Error> {
        self.eat(&Token::Operator(op))
    }

    pub fn expect(&mut self, token: &Token) -> Result<Spanned, Error> {
        let t = self.next()?;
        if &t.token == token {
            Ok(t)
        } else {
            Err(t.unexpected(&format!("`{}`", token)))
        }
    }

    pub fn ident(&mut self) -> Result<(String, Spanned), Error> {
        let t = self.next()?;
        match &t.token {
            Token::Ident(name) => Ok((name.clone(), t)),
            _ => Err(t.unexpected("a name")),
        }
    }

    /// Consumes every remaining token on `line`.
    pub fn rest_of_line(&mut self, line: usize) -> Result<Vec<Spanned>, Error> {
        let mut tokens = vec![];
        loop {
            let t = self.peek()?;
            if t.line != line || t.token == Token::Eof {
                return Ok(tokens);
            }
            tokens.push(self.next()?);
        }
    }

    /// Skips a balanced `{ ... }` group; the opening brace is next.
    pub fn skip_block(&mut self) -> Result<(), Error> {
        let open = self.expect(&Token::LBrace)?;
        let mut depth = 1;
        while depth > 0 {
            let t = self.next()?;
            match t.token {
                Token::LBrace => depth += 1,
                Token::RBrace => depth -= 1,
                Token::Eof => return Err(open.unexpected("a matching `}`")),
                _ => {}
            }
        }
        Ok(())
    }

    /// Skips to and past the next `;` outside of braces.
    pub fn skip_statement(&mut self) -> Result<(), Error> {
        let mut depth = 0;
        loop {
            let t = self.next()?;
            match t.token {
                Token::LBrace => depth += 1,
                Token::RBrace => depth -= 1,
                Token::Semicolon if depth == 0 => return Ok(()),
                Token::Eof => return Err(t.unexpected("`;`")),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<Token> {
        lex(s).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            tokens("a<<=b>>c&&!d"),
            vec![
                Token::Ident("a".into()),
                Token::Operator(Operator::ShlAssign),
                Token::Ident("b".into()),
                Token::Operator(Operator::Shr),
                Token::Ident("c".into()),
                Token::Operator(Operator::AndAnd),
                Token::Operator(Operator::Bang),
                Token::Ident("d".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            tokens("0x1F 42 'A' '\\n' \"a\\tb\\x41\""),
            vec![
                Token::Int(31),
                Token::Int(42),
                Token::Int(65),
                Token::Int(10),
                Token::Str(b"a\tbA".to_vec()),
                Token::Eof,
            ]
        );
        assert_eq!(tokens("0xFFFFFFFF"), vec![Token::Int(-1), Token::Eof]);
    }

    #[test]
    fn test_comments_and_positions() {
        let t = lex("// one\n/* two\n */ int x;").unwrap();
        assert_eq!(t[0].token, Token::Word(Word::Int));
        assert_eq!(t[0].line, 3);
        assert_eq!(t[0].column, 4..7);
        assert_eq!(t[1].column, 8..9);
    }

    #[test]
    fn test_errors() {
        assert!(lex("\"open").is_err());
        assert!(lex("/* open").is_err());
        assert!(lex("a @ b").is_err());
        assert_eq!(
            lex("99999999999").unwrap_err().code(),
            super::super::ErrorCode::Overflow
        );
    }
}
