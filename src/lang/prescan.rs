use super::fold;
use super::lex::{Cursor, Spanned};
use super::scope::{Base, Function, Globals, Macro, Macros, Ty, Var};
use super::{token::*, Error};
use crate::mach::syscall;

/// `*`s, a name and any `[n]` suffixes. An empty `[]` is `None`.
#[derive(Debug)]
pub struct Declarator {
    pub name: String,
    pub at: Spanned,
    pub pointer: u8,
    pub dims: Vec<Option<u16>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Init {
    Value(i32),
    Str(Vec<u8>),
    List(Vec<Init>),
}

/// Consumes a type keyword if one is next.
pub fn base(cursor: &mut Cursor) -> Result<Option<Base>, Error> {
    let base = match cursor.peek_token()? {
        Token::Word(Word::Void) => Base::Void,
        Token::Word(Word::Char) => Base::Char,
        Token::Word(Word::Int) => Base::Int,
        Token::Word(Word::Long) => Base::Long,
        _ => return Ok(None),
    };
    cursor.next()?;
    Ok(Some(base))
}

pub fn declarator(cursor: &mut Cursor, macros: &Macros) -> Result<Declarator, Error> {
    let mut pointer = 0;
    while cursor.eat_op(Operator::Star)? {
        pointer += 1;
    }
    let (name, at) = cursor.ident()?;
    let mut dims = vec![];
    while cursor.eat(&Token::LBracket)? {
        if cursor.eat(&Token::RBracket)? {
            dims.push(None);
            continue;
        }
        let start = cursor.peek()?.clone();
        let n = fold::constant(cursor, macros)?;
        if n <= 0 || n > i32::from(u16::MAX) {
            return Err(error!(MissingSize, start.line, ..&start.column;
                format!("bad dimension {}", n)));
        }
        dims.push(Some(n as u16));
        cursor.expect(&Token::RBracket)?;
    }
    Ok(Declarator {
        name,
        at,
        pointer,
        dims,
    })
}

/// Parameter list including both parentheses. Array parameters are
/// pointers.
pub fn params(cursor: &mut Cursor, macros: &Macros) -> Result<Vec<(Option<String>, Ty, Spanned)>, Error> {
    cursor.expect(&Token::LParen)?;
    let mut params = vec![];
    if cursor.eat(&Token::RParen)? {
        return Ok(params);
    }
    loop {
        let at = cursor.peek()?.clone();
        let base = match base(cursor)? {
            Some(b) => b,
            None => return Err(at.unexpected("a parameter type")),
        };
        if base == Base::Void && params.is_empty() && cursor.eat(&Token::RParen)? {
            return Ok(params);
        }
        let mut pointer = 0;
        while cursor.eat_op(Operator::Star)? {
            pointer += 1;
        }
        let mut name = None;
        let mut at = at;
        let named = matches!(cursor.peek_token()?, Token::Ident(_));
        if named {
            let (n, t) = cursor.ident()?;
            name = Some(n);
            at = t;
        }
        while cursor.eat(&Token::LBracket)? {
            if !cursor.eat(&Token::RBracket)? {
                fold::constant(cursor, macros)?;
                cursor.expect(&Token::RBracket)?;
            }
            pointer += 1;
        }
        let ty = Ty::new(base, pointer);
        if ty.is_void() {
            return Err(error!(TypeMismatch, at.line, ..&at.column; "void parameter"));
        }
        params.push((name, ty, at));
        if cursor.eat(&Token::RParen)? {
            return Ok(params);
        }
        cursor.expect(&Token::Comma)?;
    }
}

pub fn initializer(cursor: &mut Cursor, macros: &Macros) -> Result<Init, Error> {
    if cursor.eat(&Token::LBrace)? {
        let mut items = vec![];
        while !cursor.eat(&Token::RBrace)? {
            items.push(initializer(cursor, macros)?);
            if !cursor.eat(&Token::Comma)? {
                cursor.expect(&Token::RBrace)?;
                break;
            }
        }
        return Ok(Init::List(items));
    }
    if let Some(s) = string(cursor, macros)? {
        return Ok(Init::Str(s));
    }
    Ok(Init::Value(fold::constant(cursor, macros)?))
}

/// A string literal, adjacent literals joined, or a string macro.
pub fn string(cursor: &mut Cursor, macros: &Macros) -> Result<Option<Vec<u8>>, Error> {
    let mut joined: Option<Vec<u8>> = None;
    loop {
        let piece = match cursor.peek_token()? {
            Token::Str(s) => s.clone(),
            Token::Ident(name) => match macros.get(name) {
                Some(Macro::Str(s)) => s.clone(),
                _ => return Ok(joined),
            },
            _ => return Ok(joined),
        };
        cursor.next()?;
        joined.get_or_insert_with(Vec::new).extend(piece);
    }
}

fn leaves(init: Init, out: &mut Vec<Init>) {
    match init {
        Init::List(items) => items.into_iter().for_each(|i| leaves(i, out)),
        leaf => out.push(leaf),
    }
}

/// Fills in an open first dimension from the initializer.
pub fn dims(d: &Declarator, ty: Ty, init: Option<&Init>) -> Result<Vec<u16>, Error> {
    let missing = || error!(MissingSize, d.at.line, ..&d.at.column; format!("`{}`", d.name));
    let mut dims = vec![];
    for (i, dim) in d.dims.iter().enumerate() {
        match (dim, i, init) {
            (Some(n), _, _) => dims.push(*n),
            (None, 0, Some(Init::Str(s))) if ty == Ty::new(Base::Char, 0) => {
                dims.push((s.len() + 1) as u16)
            }
            (None, 0, Some(Init::List(items))) => {
                let inner: usize = d.dims[1..]
                    .iter()
                    .map(|n| n.map_or(0, usize::from))
                    .product();
                if inner == 0 {
                    return Err(missing());
                }
                let count = if ty == Ty::new(Base::Char, 0) && d.dims.len() > 1 {
                    items.len() * inner
                } else {
                    let mut flat = vec![];
                    leaves(Init::List(items.clone()), &mut flat);
                    flat.len()
                };
                dims.push(((count + inner - 1) / inner).max(1) as u16);
            }
            _ => return Err(missing()),
        }
    }
    Ok(dims)
}

/// Lays constant initializers into bytes; string pointers are
/// recorded for start-up code.
fn lay_out(globals: &mut Globals, var: &Var, init: Init, at: &Spanned) -> Result<(), Error> {
    let mismatch = |msg: &str| error!(TypeMismatch, at.line, ..&at.column; msg);
    let elem = var.ty;
    let esize = usize::from(elem.size());
    let mut bytes = vec![0u8; var.size() as usize];
    let row = if var.dims.len() > 1 {
        usize::from(var.dims[var.dims.len() - 1]) * esize
    } else {
        bytes.len()
    };
    let mut flat = vec![];
    match (var.is_array(), init) {
        (false, Init::List(items)) => leaves(Init::List(items), &mut flat),
        (true, Init::Str(s)) if elem == Ty::new(Base::Char, 0) => {
            let n = s.len().min(bytes.len());
            bytes[..n].copy_from_slice(&s[..n]);
            flat.clear();
        }
        (true, Init::List(items)) => leaves(Init::List(items), &mut flat),
        (_, leaf) => flat.push(leaf),
    }
    if !var.is_array() && flat.len() > 1 {
        return Err(mismatch("too many initializers"));
    }
    let mut pos = 0;
    for leaf in flat {
        match leaf {
            Init::Value(n) => {
                if pos + esize > bytes.len() {
                    return Err(mismatch("too many initializers"));
                }
                bytes[pos..pos + esize].copy_from_slice(&n.to_le_bytes()[..esize]);
                pos += esize;
            }
            Init::Str(s) if elem.is_pointer() => {
                if pos + esize > bytes.len() {
                    return Err(mismatch("too many initializers"));
                }
                globals.strings.push((var.offset + pos as u16, s));
                pos += esize;
            }
            Init::Str(s) if elem == Ty::new(Base::Char, 0) && var.is_array() => {
                pos = (pos + row - 1) / row * row;
                if pos + row > bytes.len() {
                    return Err(mismatch("too many initializers"));
                }
                let n = s.len().min(row);
                bytes[pos..pos + n].copy_from_slice(&s[..n]);
                pos += row;
            }
            Init::Str(_) => return Err(mismatch("string initializer")),
            Init::List(_) => return Err(error!(InternalError)),
        }
    }
    let used = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    if used > 0 {
        bytes.truncate(used);
        globals.inits.push((var.offset, bytes));
    }
    Ok(())
}

fn directive(cursor: &mut Cursor, globals: &mut Globals) -> Result<(), Error> {
    let hash = cursor.expect(&Token::Hash)?;
    let word = cursor.peek()?.clone();
    match &word.token {
        Token::Ident(w) if w == "define" && word.line == hash.line => {
            cursor.next()?;
            let (name, at) = cursor.ident()?;
            if at.line != hash.line {
                return Err(at.unexpected("a macro name"));
            }
            let next = cursor.peek()?.clone();
            let value = if next.line != hash.line || next.token == Token::Eof {
                Macro::Int(1)
            } else if let Some(s) = string(cursor, &globals.macros)? {
                Macro::Str(s)
            } else {
                Macro::Int(fold::constant(cursor, &globals.macros)?)
            };
            let extra = cursor.rest_of_line(hash.line)?;
            if let Some(t) = extra.first() {
                return Err(t.unexpected("end of line"));
            }
            tracing::trace!(%name, "define");
            globals.macros.insert(name, value);
        }
        _ => {
            // Other directives are ignored.
            cursor.rest_of_line(hash.line)?;
        }
    }
    Ok(())
}

fn function(globals: &mut Globals, name: &str, f: Function, at: &Spanned) -> Result<(), Error> {
    if syscall::by_name(name).is_some() || globals.vars.contains_key(name) {
        return Err(error!(Redeclared, at.line, ..&at.column; format!("`{}`", name)));
    }
    if let Some(prior) = globals.functions.get_mut(name) {
        if prior.params != f.params {
            return Err(error!(ArgumentCount, at.line, ..&at.column;
                format!("`{}` declared with {} parameters", name, prior.params)));
        }
        if prior.defined && f.defined {
            return Err(error!(Redeclared, at.line, ..&at.column; format!("`{}`", name)));
        }
        prior.defined |= f.defined;
        return Ok(());
    }
    globals.functions.insert(name.to_string(), f);
    Ok(())
}

fn declaration(cursor: &mut Cursor, globals: &mut Globals) -> Result<(), Error> {
    let base = match base(cursor)? {
        Some(b) => b,
        None => return Err(cursor.next()?.unexpected("a type")),
    };
    loop {
        let d = declarator(cursor, &globals.macros)?;
        let ty = Ty::new(base, d.pointer);
        if d.dims.is_empty() && cursor.peek_token()? == &Token::LParen {
            let params = params(cursor, &globals.macros)?;
            let defined = cursor.peek_token()? == &Token::LBrace;
            if defined {
                cursor.skip_block()?;
            } else {
                cursor.expect(&Token::Semicolon)?;
            }
            let f = Function {
                ret: ty,
                params: params.len(),
                defined,
            };
            return function(globals, &d.name, f, &d.at);
        }
        if ty.is_void() {
            return Err(error!(TypeMismatch, d.at.line, ..&d.at.column; "void variable"));
        }
        let init = if cursor.eat_op(Operator::Assign)? {
            Some(initializer(cursor, &globals.macros)?)
        } else {
            None
        };
        let dims = dims(&d, ty, init.as_ref())?;
        let var = globals.declare(&d.name, ty, dims, (d.at.line, &d.at.column))?;
        if let Some(init) = init {
            lay_out(globals, &var, init, &d.at)?;
        }
        if !cursor.eat(&Token::Comma)? {
            cursor.expect(&Token::Semicolon)?;
            return Ok(());
        }
    }
}

/// ## Pre-scan
///
/// Walks the top level once to collect macros, globals with their
/// initial bytes, and every function signature, so the code pass can
/// call functions defined later in the file.
pub fn prescan(source: &str) -> Result<Globals, Error> {
    let mut cursor = Cursor::new(source);
    let mut globals = Globals::default();
    loop {
        let t = cursor.peek()?.clone();
        match t.token {
            Token::Eof => break,
            Token::Hash => directive(&mut cursor, &mut globals)?,
            Token::Semicolon => {
                cursor.next()?;
            }
            Token::Word(w) if w.is_type() => declaration(&mut cursor, &mut globals)?,
            _ => return Err(t.unexpected("a declaration")),
        }
    }
    match globals.functions.get("main") {
        Some(f) if f.defined && f.params == 0 => Ok(globals),
        Some(f) if f.defined => Err(error!(NoMain; "`main` takes no parameters")),
        _ => Err(error!(NoMain)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ErrorCode;
    use crate::mach::DATA_START;

    #[test]
    fn test_globals_and_inits() {
        let g = prescan(
            "#define N 3\n\
             int a = 258;\n\
             char s[] = \"hi\";\n\
             long t[N] = {1, -1};\n\
             char *p = \"x\";\n\
             int z;\n\
             void main() { a = 1; }\n",
        )
        .unwrap();
        assert_eq!(g.vars["a"].offset, DATA_START);
        assert_eq!(g.vars["s"].dims, vec![3]);
        assert_eq!(g.vars["t"].offset, DATA_START + 5);
        assert_eq!(g.vars["p"].offset, DATA_START + 17);
        assert_eq!(g.size, 23);
        assert_eq!(
            g.inits,
            vec![
                (DATA_START, vec![2, 1]),
                (DATA_START + 2, b"hi".to_vec()),
                (DATA_START + 5, vec![1, 0, 0, 0, 255, 255, 255, 255]),
            ]
        );
        assert_eq!(g.strings, vec![(DATA_START + 17, b"x".to_vec())]);
    }

    #[test]
    fn test_signatures() {
        let g = prescan("int f(int a, char *b);\nvoid main() { f(1, 0); }\nint f(int a, char *b) { return a; }").unwrap();
        assert_eq!(g.functions["f"].params, 2);
        assert!(g.functions["f"].defined);
        assert_eq!(
            prescan("int f(int a);\nint f(int a, int b) { return 0; }\nvoid main() {}")
                .unwrap_err()
                .code(),
            ErrorCode::ArgumentCount
        );
    }

    #[test]
    fn test_char_rows() {
        let g = prescan("char names[][4] = {\"ab\", \"cde\"};\nvoid main() {}").unwrap();
        assert_eq!(g.vars["names"].dims, vec![2, 4]);
        assert_eq!(g.inits, vec![(DATA_START, b"ab\0\0cde".to_vec())]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(prescan("int x;").unwrap_err().code(), ErrorCode::NoMain);
        assert_eq!(
            prescan("int a; int a; void main() {}").unwrap_err().code(),
            ErrorCode::Redeclared
        );
        assert_eq!(
            prescan("int printf() { return 0; } void main() {}")
                .unwrap_err()
                .code(),
            ErrorCode::Redeclared
        );
        assert_eq!(
            prescan("int v[]; void main() {}").unwrap_err().code(),
            ErrorCode::MissingSize
        );
    }
}
