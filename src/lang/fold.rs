use super::lex::Cursor;
use super::scope::{Macro, Macros};
use super::{token::*, Error};

/// Evaluates a constant expression at compile time, with the same
/// wrapping and truth values the machine uses.
pub fn constant(cursor: &mut Cursor, macros: &Macros) -> Result<i32, Error> {
    let cond = binary(cursor, macros, 1)?;
    if !cursor.eat(&Token::Question)? {
        return Ok(cond);
    }
    let a = constant(cursor, macros)?;
    cursor.expect(&Token::Colon)?;
    let b = constant(cursor, macros)?;
    Ok(if cond != 0 { a } else { b })
}

fn binary(cursor: &mut Cursor, macros: &Macros, min: u8) -> Result<i32, Error> {
    let mut left = unary(cursor, macros)?;
    loop {
        let op = match cursor.peek_token()? {
            Token::Operator(op) => *op,
            _ => return Ok(left),
        };
        let prec = match op.precedence() {
            Some(p) if p >= min => p,
            _ => return Ok(left),
        };
        cursor.next()?;
        let right = binary(cursor, macros, prec + 1)?;
        left = op.apply(left, right);
    }
}

fn unary(cursor: &mut Cursor, macros: &Macros) -> Result<i32, Error> {
    let t = cursor.next()?;
    match &t.token {
        Token::Int(n) => Ok(*n),
        Token::Operator(Operator::Minus) => Ok(unary(cursor, macros)?.wrapping_neg()),
        Token::Operator(Operator::Plus) => unary(cursor, macros),
        Token::Operator(Operator::Tilde) => Ok(!unary(cursor, macros)?),
        Token::Operator(Operator::Bang) => Ok(if unary(cursor, macros)? == 0 { -1 } else { 0 }),
        Token::LParen => {
            let v = constant(cursor, macros)?;
            cursor.expect(&Token::RParen)?;
            Ok(v)
        }
        Token::Ident(name) => match macros.get(name) {
            Some(Macro::Int(n)) => Ok(*n),
            Some(Macro::Str(_)) => Err(error!(TypeMismatch, t.line, ..&t.column;
                format!("`{}` is a string", name))),
            None => Err(error!(UndefinedName, t.line, ..&t.column;
                format!("`{}` is not a constant", name))),
        },
        _ => Err(t.unexpected("a constant")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(s: &str) -> Result<i32, Error> {
        let mut macros = Macros::new();
        macros.insert("N".into(), Macro::Int(8));
        macros.insert("S".into(), Macro::Str(b"x".to_vec()));
        constant(&mut Cursor::new(s), &macros)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(fold("1 + 2 * 3").unwrap(), 7);
        assert_eq!(fold("(1 + 2) * 3").unwrap(), 9);
        assert_eq!(fold("10 - 4 - 3").unwrap(), 3);
        assert_eq!(fold("1 << 2 + 1").unwrap(), 8);
        assert_eq!(fold("N * 2 - -1").unwrap(), 17);
    }

    #[test]
    fn test_machine_semantics() {
        assert_eq!(fold("5 >= 3").unwrap(), -1);
        assert_eq!(fold("3 >= 5").unwrap(), 0);
        assert_eq!(fold("7 / 0").unwrap(), 0);
        assert_eq!(fold("!0 ? 4 : 5").unwrap(), 4);
        assert_eq!(fold("~0").unwrap(), -1);
    }

    #[test]
    fn test_errors() {
        assert_eq!(fold("S").unwrap_err().code(), super::super::ErrorCode::TypeMismatch);
        assert_eq!(fold("M").unwrap_err().code(), super::super::ErrorCode::UndefinedName);
        assert!(fold("1 +").is_err());
    }
}
