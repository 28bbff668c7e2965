use super::fold;
use super::lex::{Cursor, Spanned};
use super::prescan::{self, Init};
use super::scope::{Base, Globals, Locals, Macro, Ty, Var};
use super::{token::*, Error};
use crate::mach::syscall::{self, Call};
use crate::mach::{quote, Access, Opcode};

type Result<T> = std::result::Result<T, Error>;

/// ## Compiler
///
/// Translates source text into assembly text for `mach::assemble`.
pub fn compile(source: &str) -> Result<String> {
    let globals = prescan::prescan(source)?;
    let mut compiler = Compiler::new(source, globals);
    compiler.program()?;
    Ok(compiler.finish())
}

/// What an expression left behind. Places that name storage defer the
/// choice between reading a value and producing a handle to it.
#[derive(Debug, Clone)]
enum Place {
    /// Nothing on the stack.
    Void,
    /// A value on the stack.
    Value(Ty),
    /// Nothing emitted yet.
    Var(Var),
    /// Byte offset on the stack after this many subscripts.
    Element(Var, usize),
    /// Address on the stack of an object of this type.
    Deref(Ty),
}

#[derive(Debug)]
struct Flow {
    exit: String,
    next: Option<String>,
}

#[derive(Debug)]
struct Switch {
    temp: u16,
    cases: Vec<(i32, String)>,
    default: Option<String>,
}

#[derive(Debug)]
struct Current {
    ret: Ty,
    main: bool,
}

struct Compiler<'a> {
    cursor: Cursor<'a>,
    globals: Globals,
    locals: Locals,
    out: Vec<String>,
    labels: usize,
    flows: Vec<Flow>,
    switches: Vec<Switch>,
    current: Current,
}

impl<'a> Compiler<'a> {
    fn new(source: &'a str, globals: Globals) -> Compiler<'a> {
        Compiler {
            cursor: Cursor::new(source),
            globals,
            locals: Locals::new(),
            out: vec![],
            labels: 0,
            flows: vec![],
            switches: vec![],
            current: Current {
                ret: Ty::new(Base::Void, 0),
                main: false,
            },
        }
    }

    fn finish(self) -> String {
        let mut s = self.out.join("\n");
        s.push('\n');
        s
    }

    fn emit<S: AsRef<str>>(&mut self, text: S) {
        self.out.push(format!("    {}", text.as_ref()));
    }

    fn op(&mut self, op: Opcode) {
        self.emit(op.mnemonic());
    }

    fn op1<D: std::fmt::Display>(&mut self, op: Opcode, operand: D) {
        self.emit(format!("{} {}", op, operand));
    }

    fn label(&mut self) -> String {
        self.labels += 1;
        format!(".L{}", self.labels)
    }

    fn place_label(&mut self, label: &str) {
        self.out.push(format!("{}:", label));
    }

    fn push_int(&mut self, n: i32) {
        if (0..=255).contains(&n) {
            self.op1(Opcode::PushB, n);
        } else if i32::from(n as i16) == n {
            self.op1(Opcode::PushW, n);
        } else {
            self.op1(Opcode::PushD, n);
        }
    }

    /// The machine copies a literal only up to its first NUL.
    fn push_str(&mut self, s: &[u8]) {
        let end = s.iter().position(|&b| b == 0).unwrap_or(s.len());
        self.op1(Opcode::PushStr, quote(&s[..end]));
    }

    fn access(&mut self, access: Access, var: &Var) {
        let op = Opcode::access(access, var.ty.width(), var.local);
        if var.local {
            self.op1(op, var.offset);
        } else {
            self.op1(op, format!("0x{:04X}", var.offset));
        }
    }

    fn scale(&mut self, stride: u32) {
        if stride != 1 {
            self.push_int(stride as i32);
            self.op(Opcode::Mul);
        }
    }

    fn program(&mut self) -> Result<()> {
        tracing::trace!("starting code pass");
        self.op1(Opcode::Space, self.globals.size);
        for (addr, bytes) in std::mem::take(&mut self.globals.inits) {
            let mut line = format!("INIT 0x{:04X}", addr);
            for b in bytes {
                line.push_str(&format!(" {}", b));
            }
            self.emit(line);
        }
        for (addr, s) in std::mem::take(&mut self.globals.strings) {
            self.op1(Opcode::AddrD, format!("0x{:04X}", addr));
            self.push_str(&s);
            self.op(Opcode::Store);
            self.op(Opcode::Pop);
        }
        self.op1(Opcode::Jmp, "main");
        loop {
            let t = self.cursor.peek()?.clone();
            match t.token {
                Token::Eof => return Ok(()),
                Token::Hash => {
                    self.cursor.next()?;
                    self.cursor.rest_of_line(t.line)?;
                }
                Token::Semicolon => {
                    self.cursor.next()?;
                }
                _ => self.top_level()?,
            }
        }
    }

    fn top_level(&mut self) -> Result<()> {
        let base = match prescan::base(&mut self.cursor)? {
            Some(b) => b,
            None => return Err(self.cursor.next()?.unexpected("a declaration")),
        };
        let d = prescan::declarator(&mut self.cursor, &self.globals.macros)?;
        if !d.dims.is_empty() || self.cursor.peek_token()? != &Token::LParen {
            // Globals were laid out by the pre-scan.
            return self.cursor.skip_statement();
        }
        let params = prescan::params(&mut self.cursor, &self.globals.macros)?;
        if !self.cursor.eat(&Token::Semicolon)? {
            self.function(&d.name, Ty::new(base, d.pointer), params)?;
        }
        Ok(())
    }

    fn function(&mut self, name: &str, ret: Ty, params: Vec<(Option<String>, Ty, Spanned)>) -> Result<()> {
        tracing::trace!(%name, "function");
        self.current = Current {
            ret,
            main: name == "main",
        };
        self.locals = Locals::new();
        for (pname, ty, at) in params {
            let pname = pname.ok_or_else(|| {
                error!(SyntaxError, at.line, ..&at.column; "parameter needs a name")
            })?;
            self.locals.param(&pname, ty, (at.line, &at.column))?;
        }
        self.place_label(name);
        let frame = self.out.len();
        self.out.push(String::new());
        self.block()?;
        self.epilogue();
        self.out[frame] = format!(
            "    {} {} {}",
            Opcode::Func,
            self.locals.frame_size(),
            self.locals.params()
        );
        Ok(())
    }

    fn epilogue(&mut self) {
        if self.current.main {
            self.op(Opcode::Exit);
        } else {
            if !self.current.ret.is_void() {
                self.push_int(0);
            }
            self.op(Opcode::Ret);
        }
    }

    fn block(&mut self) -> Result<()> {
        self.cursor.expect(&Token::LBrace)?;
        while !self.cursor.eat(&Token::RBrace)? {
            self.statement()?;
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<()> {
        let t = self.cursor.peek()?.clone();
        match t.token {
            Token::LBrace => self.block(),
            Token::Semicolon => {
                self.cursor.next()?;
                Ok(())
            }
            Token::Word(w) if w.is_type() => self.declaration(),
            Token::Word(Word::If) => self.if_else(),
            Token::Word(Word::While) => self.while_loop(),
            Token::Word(Word::Do) => self.do_loop(),
            Token::Word(Word::For) => self.for_loop(),
            Token::Word(Word::Switch) => self.switch(),
            Token::Word(Word::Case) => self.case(),
            Token::Word(Word::Default) => self.default(),
            Token::Word(Word::Break) => self.jump(false),
            Token::Word(Word::Continue) => self.jump(true),
            Token::Word(Word::Return) => self.return_value(),
            Token::Word(Word::Else) => Err(t.unexpected("a statement")),
            _ => {
                let place = self.expression()?;
                self.discard(place);
                self.cursor.expect(&Token::Semicolon)?;
                Ok(())
            }
        }
    }

    fn declaration(&mut self) -> Result<()> {
        let base = match prescan::base(&mut self.cursor)? {
            Some(b) => b,
            None => return Err(error!(InternalError)),
        };
        loop {
            let d = prescan::declarator(&mut self.cursor, &self.globals.macros)?;
            let at = (d.at.line, &d.at.column);
            let ty = Ty::new(base, d.pointer);
            if ty.is_void() {
                return Err(error!(TypeMismatch, d.at.line, ..&d.at.column; "void variable"));
            }
            if self.cursor.peek_token()? == &Token::LParen {
                return Err(error!(Misplaced, d.at.line, ..&d.at.column;
                    "functions are declared at the top level"));
            }
            if !self.cursor.eat_op(Operator::Assign)? {
                let dims = prescan::dims(&d, ty, None)?;
                self.locals.declare(&d.name, ty, dims, at)?;
            } else if d.dims.is_empty() {
                let var = self.locals.declare(&d.name, ty, vec![], at)?;
                self.access(Access::Handle, &var);
                let value = self.assignment()?;
                self.load(value, &d.at)?;
                self.op(Opcode::Store);
                self.op(Opcode::Pop);
            } else if let Some(s) = prescan::string(&mut self.cursor, &self.globals.macros)? {
                if ty != Ty::new(Base::Char, 0) {
                    return Err(error!(TypeMismatch, d.at.line, ..&d.at.column; "string initializer"));
                }
                let dims = prescan::dims(&d, ty, Some(&Init::Str(s.clone())))?;
                let var = self.locals.declare(&d.name, ty, dims, at)?;
                if s.len() >= var.size() as usize {
                    return Err(error!(Overflow, d.at.line, ..&d.at.column; "string longer than array"));
                }
                self.push_int(0);
                self.access(Access::Effective, &var);
                self.push_str(&s);
                self.emit("strcpy");
            } else {
                let elements = self.element_list()?;
                let placeholder = Init::List(vec![Init::Value(0); elements.len()]);
                let dims = prescan::dims(&d, ty, Some(&placeholder))?;
                let mut var = self.locals.declare(&d.name, ty, dims, at)?;
                if elements.len() as u32 > var.count() {
                    return Err(error!(TypeMismatch, d.at.line, ..&d.at.column; "too many initializers"));
                }
                let size = var.ty.size();
                let start = var.offset;
                var.dims.clear();
                for (i, code) in elements.into_iter().enumerate() {
                    var.offset = start + i as u16 * size;
                    self.access(Access::Handle, &var);
                    self.out.extend(code);
                    self.op(Opcode::Store);
                    self.op(Opcode::Pop);
                }
            }
            if !self.cursor.eat(&Token::Comma)? {
                self.cursor.expect(&Token::Semicolon)?;
                return Ok(());
            }
        }
    }

    /// Code for each value of a braced list, flattened, so the caller
    /// can interleave element handles.
    fn element_list(&mut self) -> Result<Vec<Vec<String>>> {
        let open = self.cursor.expect(&Token::LBrace)?;
        let mut elements = vec![];
        while !self.cursor.eat(&Token::RBrace)? {
            if self.cursor.peek_token()? == &Token::LBrace {
                elements.extend(self.element_list()?);
            } else {
                let mark = self.out.len();
                let value = self.assignment()?;
                self.load(value, &open)?;
                elements.push(self.out.split_off(mark));
            }
            if !self.cursor.eat(&Token::Comma)? {
                self.cursor.expect(&Token::RBrace)?;
                break;
            }
        }
        Ok(elements)
    }

    fn condition(&mut self) -> Result<()> {
        let open = self.cursor.expect(&Token::LParen)?;
        let cond = self.expression()?;
        self.load(cond, &open)?;
        self.cursor.expect(&Token::RParen)?;
        Ok(())
    }

    fn if_else(&mut self) -> Result<()> {
        self.cursor.next()?;
        self.condition()?;
        let otherwise = self.label();
        self.op1(Opcode::Jz, &otherwise);
        self.statement()?;
        if self.cursor.eat(&Token::Word(Word::Else))? {
            let end = self.label();
            self.op1(Opcode::Jmp, &end);
            self.place_label(&otherwise);
            self.statement()?;
            self.place_label(&end);
        } else {
            self.place_label(&otherwise);
        }
        Ok(())
    }

    fn looped(&mut self, exit: &str, next: &str) -> Result<()> {
        self.flows.push(Flow {
            exit: exit.to_string(),
            next: Some(next.to_string()),
        });
        let result = self.statement();
        self.flows.pop();
        result
    }

    fn while_loop(&mut self) -> Result<()> {
        self.cursor.next()?;
        let top = self.label();
        let end = self.label();
        self.place_label(&top);
        self.condition()?;
        self.op1(Opcode::Jz, &end);
        self.looped(&end, &top)?;
        self.op1(Opcode::Jmp, &top);
        self.place_label(&end);
        Ok(())
    }

    fn do_loop(&mut self) -> Result<()> {
        self.cursor.next()?;
        let top = self.label();
        let next = self.label();
        let end = self.label();
        self.place_label(&top);
        self.looped(&end, &next)?;
        self.place_label(&next);
        self.cursor.expect(&Token::Word(Word::While))?;
        self.condition()?;
        self.op1(Opcode::Jnz, &top);
        self.place_label(&end);
        self.cursor.expect(&Token::Semicolon)?;
        Ok(())
    }

    fn for_loop(&mut self) -> Result<()> {
        self.cursor.next()?;
        let open = self.cursor.expect(&Token::LParen)?;
        let is_declaration = matches!(self.cursor.peek_token()?, Token::Word(w) if w.is_type());
        if is_declaration {
            self.declaration()?;
        } else if !self.cursor.eat(&Token::Semicolon)? {
            let init = self.expression()?;
            self.discard(init);
            self.cursor.expect(&Token::Semicolon)?;
        }
        let top = self.label();
        let next = self.label();
        let end = self.label();
        self.place_label(&top);
        if !self.cursor.eat(&Token::Semicolon)? {
            let cond = self.expression()?;
            self.load(cond, &open)?;
            self.op1(Opcode::Jz, &end);
            self.cursor.expect(&Token::Semicolon)?;
        }
        let mark = self.out.len();
        if !self.cursor.eat(&Token::RParen)? {
            let step = self.expression()?;
            self.discard(step);
            self.cursor.expect(&Token::RParen)?;
        }
        let step = self.out.split_off(mark);
        self.looped(&end, &next)?;
        self.place_label(&next);
        self.out.extend(step);
        self.op1(Opcode::Jmp, &top);
        self.place_label(&end);
        Ok(())
    }

    fn switch(&mut self) -> Result<()> {
        let t = self.cursor.next()?;
        let temp = self.locals.claim(4, (t.line, &t.column))?;
        self.op1(Opcode::AddrLD, temp);
        self.condition()?;
        self.op(Opcode::Store);
        self.op(Opcode::Pop);
        let dispatch = self.label();
        let end = self.label();
        self.op1(Opcode::Jmp, &dispatch);
        self.switches.push(Switch {
            temp,
            cases: vec![],
            default: None,
        });
        self.flows.push(Flow {
            exit: end.clone(),
            next: None,
        });
        let body = self.statement();
        self.flows.pop();
        let switch = self.switches.pop();
        body?;
        let switch = switch.ok_or_else(|| error!(InternalError))?;
        self.op1(Opcode::Jmp, &end);
        self.place_label(&dispatch);
        for (value, label) in &switch.cases {
            self.op1(Opcode::LdLD, switch.temp);
            self.push_int(*value);
            self.op(Opcode::Eq);
            self.op1(Opcode::Jnz, label);
        }
        self.op1(Opcode::Jmp, switch.default.as_ref().unwrap_or(&end));
        self.place_label(&end);
        Ok(())
    }

    fn case(&mut self) -> Result<()> {
        let t = self.cursor.next()?;
        let value = fold::constant(&mut self.cursor, &self.globals.macros)?;
        self.cursor.expect(&Token::Colon)?;
        let label = self.label();
        let switch = self
            .switches
            .last_mut()
            .ok_or_else(|| error!(Misplaced, t.line, ..&t.column; "`case` outside `switch`"))?;
        if switch.cases.iter().any(|(v, _)| *v == value) {
            return Err(error!(Redeclared, t.line, ..&t.column; format!("case {}", value)));
        }
        switch.cases.push((value, label.clone()));
        self.place_label(&label);
        Ok(())
    }

    fn default(&mut self) -> Result<()> {
        let t = self.cursor.next()?;
        self.cursor.expect(&Token::Colon)?;
        let label = self.label();
        let switch = self
            .switches
            .last_mut()
            .ok_or_else(|| error!(Misplaced, t.line, ..&t.column; "`default` outside `switch`"))?;
        if switch.default.is_some() {
            return Err(error!(Redeclared, t.line, ..&t.column; "default"));
        }
        switch.default = Some(label.clone());
        self.place_label(&label);
        Ok(())
    }

    fn jump(&mut self, next: bool) -> Result<()> {
        let t = self.cursor.next()?;
        let target = if next {
            self.flows.iter().rev().find_map(|f| f.next.clone())
        } else {
            self.flows.last().map(|f| f.exit.clone())
        };
        let target = target.ok_or_else(|| {
            error!(Misplaced, t.line, ..&t.column; format!("`{}` outside a loop", t.token))
        })?;
        self.op1(Opcode::Jmp, target);
        self.cursor.expect(&Token::Semicolon)?;
        Ok(())
    }

    fn return_value(&mut self) -> Result<()> {
        let t = self.cursor.next()?;
        if !self.cursor.eat(&Token::Semicolon)? {
            let value = self.expression()?;
            if self.current.main || self.current.ret.is_void() {
                self.discard(value);
            } else {
                self.load(value, &t)?;
                self.op(Opcode::Ret);
                return self.cursor.expect(&Token::Semicolon).map(|_| ());
            }
            self.cursor.expect(&Token::Semicolon)?;
        }
        self.epilogue();
        Ok(())
    }

    fn expression(&mut self) -> Result<Place> {
        let mut place = self.assignment()?;
        while self.cursor.eat(&Token::Comma)? {
            self.discard(place);
            place = self.assignment()?;
        }
        Ok(place)
    }

    fn assignment(&mut self) -> Result<Place> {
        let left = self.ternary()?;
        let op = match self.cursor.peek_token()? {
            Token::Operator(op) if op.is_assignment() => *op,
            _ => return Ok(left),
        };
        let at = self.cursor.next()?;
        let ty = self.handle(left, &at)?;
        match op.compound() {
            None => {
                let right = self.assignment()?;
                self.load(right, &at)?;
            }
            Some(bin) => {
                self.op(Opcode::Dup);
                self.op(Opcode::Load);
                let right = self.assignment()?;
                let rty = self.load(right, &at)?;
                self.arithmetic(bin, ty, rty);
            }
        }
        self.op(Opcode::Store);
        Ok(Place::Value(ty))
    }

    fn ternary(&mut self) -> Result<Place> {
        let cond = self.binary(1)?;
        let at = self.cursor.peek()?.clone();
        if !self.cursor.eat(&Token::Question)? {
            return Ok(cond);
        }
        self.load(cond, &at)?;
        let otherwise = self.label();
        let end = self.label();
        self.op1(Opcode::Jz, &otherwise);
        let a = self.expression()?;
        let ty = self.load(a, &at)?;
        self.op1(Opcode::Jmp, &end);
        self.cursor.expect(&Token::Colon)?;
        self.place_label(&otherwise);
        let b = self.ternary()?;
        self.load(b, &at)?;
        self.place_label(&end);
        Ok(Place::Value(ty))
    }

    fn binary(&mut self, min: u8) -> Result<Place> {
        let mut left = self.unary()?;
        loop {
            let (op, prec) = match self.cursor.peek_token()? {
                Token::Operator(op) => match op.precedence() {
                    Some(prec) if prec >= min => (*op, prec),
                    _ => return Ok(left),
                },
                _ => return Ok(left),
            };
            let at = self.cursor.next()?;
            let lty = self.load(left, &at)?;
            left = match op {
                Operator::AndAnd | Operator::OrOr => {
                    let and = op == Operator::AndAnd;
                    let (jump, early, late) = if and {
                        (Opcode::Jz, 0, -1)
                    } else {
                        (Opcode::Jnz, -1, 0)
                    };
                    let short = self.label();
                    let end = self.label();
                    self.op1(jump, &short);
                    let right = self.binary(prec + 1)?;
                    self.load(right, &at)?;
                    self.op1(jump, &short);
                    self.push_int(late);
                    self.op1(Opcode::Jmp, &end);
                    self.place_label(&short);
                    self.push_int(early);
                    self.place_label(&end);
                    Place::Value(Ty::NUMBER)
                }
                _ => {
                    let right = self.binary(prec + 1)?;
                    let rty = self.load(right, &at)?;
                    Place::Value(self.arithmetic(op, lty, rty))
                }
            };
        }
    }

    /// Emits a binary operator over the top two values, scaling the
    /// integer side of pointer arithmetic.
    fn arithmetic(&mut self, op: Operator, lty: Ty, rty: Ty) -> Ty {
        let pointer_math = matches!(op, Operator::Plus | Operator::Minus) && lty.is_pointer();
        if pointer_math && !rty.is_pointer() {
            self.scale(u32::from(lty.stride()));
        }
        let opcode = match op {
            Operator::Plus => Opcode::Add,
            Operator::Minus => Opcode::Sub,
            Operator::Star => Opcode::Mul,
            Operator::Slash => Opcode::Div,
            Operator::Percent => Opcode::Mod,
            Operator::Amp => Opcode::And,
            Operator::Pipe => Opcode::Or,
            Operator::Caret => Opcode::Xor,
            Operator::Shl => Opcode::Shl,
            Operator::Shr => Opcode::Shr,
            Operator::Eq => Opcode::Eq,
            Operator::Ne => Opcode::Ne,
            Operator::Lt => Opcode::Lt,
            Operator::Gt => Opcode::Gt,
            Operator::Le => Opcode::Le,
            _ => Opcode::Ge,
        };
        self.op(opcode);
        if pointer_math && rty.is_pointer() {
            if lty.stride() != 1 {
                self.push_int(i32::from(lty.stride()));
                self.op(Opcode::Div);
            }
            Ty::NUMBER
        } else if pointer_math {
            lty
        } else {
            Ty::NUMBER
        }
    }

    fn unary(&mut self) -> Result<Place> {
        let t = self.cursor.peek()?.clone();
        let op = match t.token {
            Token::Operator(op) => op,
            _ => return self.postfix(),
        };
        match op {
            Operator::Inc | Operator::Dec => {
                self.cursor.next()?;
                let place = self.unary()?;
                let ty = self.handle(place, &t)?;
                self.step(ty, op == Operator::Inc, true);
                Ok(Place::Value(ty))
            }
            Operator::Minus => {
                self.cursor.next()?;
                let literal = match self.cursor.peek_token()? {
                    Token::Int(n) => Some(*n),
                    _ => None,
                };
                if let Some(n) = literal {
                    self.cursor.next()?;
                    self.push_int(n.wrapping_neg());
                    return Ok(Place::Value(Ty::NUMBER));
                }
                let place = self.unary()?;
                self.load(place, &t)?;
                self.op(Opcode::Neg);
                Ok(Place::Value(Ty::NUMBER))
            }
            Operator::Plus => {
                self.cursor.next()?;
                let place = self.unary()?;
                Ok(Place::Value(self.load(place, &t)?))
            }
            Operator::Bang | Operator::Tilde => {
                self.cursor.next()?;
                let place = self.unary()?;
                self.load(place, &t)?;
                self.op(if op == Operator::Bang {
                    Opcode::LNot
                } else {
                    Opcode::Not
                });
                Ok(Place::Value(Ty::NUMBER))
            }
            Operator::Star => {
                self.cursor.next()?;
                let place = self.unary()?;
                let ty = self.load(place, &t)?;
                Ok(Place::Deref(ty.pointee()))
            }
            Operator::Amp => {
                self.cursor.next()?;
                let place = self.unary()?;
                Ok(Place::Value(self.address(place, &t)?))
            }
            _ => Err(t.unexpected("an expression")),
        }
    }

    fn postfix(&mut self) -> Result<Place> {
        let mut place = self.primary()?;
        loop {
            let t = self.cursor.peek()?.clone();
            match t.token {
                Token::LBracket => {
                    self.cursor.next()?;
                    place = self.index(place, &t)?;
                    self.cursor.expect(&Token::RBracket)?;
                }
                Token::Operator(op @ Operator::Inc) | Token::Operator(op @ Operator::Dec) => {
                    self.cursor.next()?;
                    let ty = self.handle(place, &t)?;
                    self.step(ty, op == Operator::Inc, false);
                    place = Place::Value(ty);
                }
                _ => return Ok(place),
            }
        }
    }

    fn index(&mut self, place: Place, at: &Spanned) -> Result<Place> {
        match place {
            Place::Var(var) if var.is_array() => {
                self.subscript(at)?;
                self.scale(var.stride(0));
                Ok(Place::Element(var, 1))
            }
            Place::Element(var, n) if n < var.dims.len() => {
                self.subscript(at)?;
                self.scale(var.stride(n));
                self.op(Opcode::Add);
                Ok(Place::Element(var, n + 1))
            }
            other => {
                let ty = self.load(other, at)?;
                self.subscript(at)?;
                self.scale(u32::from(ty.stride()));
                self.op(Opcode::Add);
                Ok(Place::Deref(ty.pointee()))
            }
        }
    }

    fn subscript(&mut self, at: &Spanned) -> Result<()> {
        let index = self.expression()?;
        self.load(index, at)?;
        Ok(())
    }

    fn primary(&mut self) -> Result<Place> {
        if let Some(s) = prescan::string(&mut self.cursor, &self.globals.macros)? {
            self.push_str(&s);
            return Ok(Place::Value(Ty::new(Base::Char, 1)));
        }
        let t = self.cursor.next()?;
        match &t.token {
            Token::Int(n) => {
                self.push_int(*n);
                Ok(Place::Value(Ty::NUMBER))
            }
            Token::LParen => {
                let place = self.expression()?;
                self.cursor.expect(&Token::RParen)?;
                Ok(place)
            }
            Token::Ident(name) => {
                if self.cursor.peek_token()? == &Token::LParen {
                    return self.call(name, &t);
                }
                if let Some(Macro::Int(n)) = self.globals.macros.get(name) {
                    let n = *n;
                    self.push_int(n);
                    return Ok(Place::Value(Ty::NUMBER));
                }
                match self.locals.get(name).or_else(|| self.globals.vars.get(name)) {
                    Some(var) => Ok(Place::Var(var.clone())),
                    None => Err(error!(UndefinedName, t.line, ..&t.column; format!("`{}`", name))),
                }
            }
            _ => Err(t.unexpected("an expression")),
        }
    }

    fn call(&mut self, name: &str, at: &Spanned) -> Result<Place> {
        let function = self.globals.functions.get(name).cloned();
        let sys = syscall::by_name(name);
        if function.is_none() && sys.is_none() {
            return Err(error!(UndefinedFunction, at.line, ..&at.column; format!("`{}`", name)));
        }
        self.cursor.expect(&Token::LParen)?;
        let mut argc = 0;
        if !self.cursor.eat(&Token::RParen)? {
            loop {
                let arg = self.assignment()?;
                self.load(arg, at)?;
                argc += 1;
                if self.cursor.eat(&Token::RParen)? {
                    break;
                }
                self.cursor.expect(&Token::Comma)?;
            }
        }
        let count = |expected: usize| {
            error!(ArgumentCount, at.line, ..&at.column;
                format!("`{}` takes {} arguments, got {}", name, expected, argc))
        };
        if let Some(f) = function {
            if argc != f.params {
                return Err(count(f.params));
            }
            self.op1(Opcode::Call, name);
            return Ok(if f.ret.is_void() {
                Place::Void
            } else {
                Place::Value(f.ret)
            });
        }
        let sys = sys.ok_or_else(|| error!(InternalError))?;
        if sys.variadic {
            if argc < sys.args {
                return Err(count(sys.args));
            }
            self.push_int(argc as i32);
        } else if argc != sys.args {
            return Err(count(sys.args));
        }
        self.emit(sys.name);
        Ok(if !sys.returns {
            Place::Void
        } else if matches!(sys.call, Call::Strchr | Call::Strstr | Call::Alloc) {
            Place::Value(Ty::new(Base::Char, 1))
        } else {
            Place::Value(Ty::NUMBER)
        })
    }

    /// Type a place would have once loaded, without emitting.
    fn type_of(&self, place: &Place) -> Ty {
        match place {
            Place::Void => Ty::new(Base::Void, 0),
            Place::Value(ty) | Place::Deref(ty) => *ty,
            Place::Var(var) => var.decayed(),
            Place::Element(var, n) if *n == var.dims.len() => var.ty,
            Place::Element(var, _) => Ty::new(var.ty.base, var.ty.pointer + 1),
        }
    }

    /// Leaves the value of `place` on the stack.
    fn load(&mut self, place: Place, at: &Spanned) -> Result<Ty> {
        let ty = self.type_of(&place);
        match place {
            Place::Void => {
                return Err(error!(TypeMismatch, at.line, ..&at.column; "void value"));
            }
            Place::Value(_) => {}
            Place::Var(var) if var.is_array() => {
                self.push_int(0);
                self.access(Access::Effective, &var);
            }
            Place::Var(var) => self.access(Access::Load, &var),
            Place::Element(var, n) if n == var.dims.len() => {
                self.access(Access::LoadIndexed, &var)
            }
            Place::Element(var, _) => self.access(Access::Effective, &var),
            Place::Deref(ty) => {
                self.op(Opcode::cast(ty.width()));
                self.op(Opcode::Load);
            }
        }
        Ok(ty)
    }

    /// Leaves a handle to the storage of `place` on the stack.
    fn handle(&mut self, place: Place, at: &Spanned) -> Result<Ty> {
        match place {
            Place::Var(var) if !var.is_array() => {
                self.access(Access::Handle, &var);
                Ok(var.ty)
            }
            Place::Element(var, n) if n == var.dims.len() => {
                self.access(Access::Effective, &var);
                Ok(var.ty)
            }
            Place::Deref(ty) => {
                self.op(Opcode::cast(ty.width()));
                Ok(ty)
            }
            _ => Err(error!(NotAddressable, at.line, ..&at.column)),
        }
    }

    /// `&place`: an absolute handle, usable from any frame.
    fn address(&mut self, place: Place, at: &Spanned) -> Result<Ty> {
        match place {
            Place::Var(var) => {
                self.push_int(0);
                self.access(Access::Effective, &var);
                Ok(Ty::new(var.ty.base, var.ty.pointer + 1))
            }
            Place::Element(var, _) => {
                self.access(Access::Effective, &var);
                Ok(Ty::new(var.ty.base, var.ty.pointer + 1))
            }
            Place::Deref(ty) => {
                self.op(Opcode::cast(ty.width()));
                Ok(Ty::new(ty.base, ty.pointer + 1))
            }
            _ => Err(error!(NotAddressable, at.line, ..&at.column)),
        }
    }

    /// `++`/`--` on the handle on the stack. Pointers move by their
    /// stride.
    fn step(&mut self, ty: Ty, up: bool, prefix: bool) {
        let stride = i32::from(ty.stride());
        if ty.is_pointer() && stride != 1 {
            let delta = if up { stride } else { -stride };
            self.op(Opcode::Dup);
            self.op(Opcode::Load);
            self.push_int(delta);
            self.op(Opcode::Add);
            self.op(Opcode::Store);
            if !prefix {
                self.push_int(delta);
                self.op(Opcode::Sub);
            }
            return;
        }
        self.op(match (up, prefix) {
            (true, true) => Opcode::IncPre,
            (false, true) => Opcode::DecPre,
            (true, false) => Opcode::IncPost,
            (false, false) => Opcode::DecPost,
        });
    }

    /// Drops whatever an expression statement left on the stack.
    fn discard(&mut self, place: Place) {
        match place {
            Place::Void | Place::Var(_) => {}
            Place::Value(_) | Place::Element(..) | Place::Deref(_) => self.op(Opcode::Pop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ErrorCode;

    fn body(source: &str) -> Vec<String> {
        let asm = compile(source).unwrap();
        let lines: Vec<String> = asm.lines().map(|l| l.trim().to_string()).collect();
        let start = lines.iter().position(|l| l == "main:").unwrap();
        lines[start + 1..].to_vec()
    }

    #[test]
    fn test_locals_and_frame() {
        assert_eq!(
            body("void main() { int a = 10; int b = 20; int c = a + b; }"),
            vec![
                "FUNC 11 0",
                "ADDR_LW 5",
                "PUSH_B 10",
                "STORE",
                "POP",
                "ADDR_LW 7",
                "PUSH_B 20",
                "STORE",
                "POP",
                "ADDR_LW 9",
                "LD_LW 5",
                "LD_LW 7",
                "ADD",
                "STORE",
                "POP",
                "EXIT",
            ]
        );
    }

    #[test]
    fn test_layout_order() {
        let asm = compile("int g = 5;\nchar *s = \"hi\";\nvoid main() { }").unwrap();
        let lines: Vec<&str> = asm.lines().map(str::trim).collect();
        assert_eq!(
            &lines[..7],
            &[
                "SPACE 6",
                "INIT 0x2000 5",
                "ADDR_D 0x2002",
                "PUSH_STR \"hi\"",
                "STORE",
                "POP",
                "JMP main",
            ]
        );
    }

    #[test]
    fn test_compound_assignment() {
        let code = body("void main() { int x; x += 3; }");
        assert_eq!(
            &code[1..8],
            &["ADDR_LW 5", "DUP", "LOAD", "PUSH_B 3", "ADD", "STORE", "POP"]
        );
    }

    #[test]
    fn test_literal_cut_at_nul() {
        let code = body("void main() { printf(\"a\\0b\"); }");
        assert_eq!(&code[1..4], &["PUSH_STR \"a\"", "PUSH_B 1", "printf"]);
    }

    #[test]
    fn test_variadic_count() {
        let code = body("void main() { printf(\"%d %d\", 1, 2); }");
        assert_eq!(
            &code[1..6],
            &["PUSH_STR \"%d %d\"", "PUSH_B 1", "PUSH_B 2", "PUSH_B 3", "printf"]
        );
    }

    #[test]
    fn test_pointer_scaling() {
        let code = body("void main() { int *p; p = p + 1; p++; }");
        assert_eq!(
            &code[1..8],
            &["ADDR_LD 5", "LD_LD 5", "PUSH_B 1", "PUSH_B 2", "MUL", "ADD", "STORE"]
        );
        assert!(code.contains(&"PUSH_B 2".to_string()));
        assert!(!code.contains(&"INC_POST".to_string()));
    }

    #[test]
    fn test_errors() {
        let code = |s: &str| compile(s).unwrap_err().code();
        assert_eq!(code("void main() { x = 1; }"), ErrorCode::UndefinedName);
        assert_eq!(code("void main() { nope(); }"), ErrorCode::UndefinedFunction);
        assert_eq!(code("void main() { putchar(1, 2); }"), ErrorCode::ArgumentCount);
        assert_eq!(code("void main() { 3 = 4; }"), ErrorCode::NotAddressable);
        assert_eq!(code("void main() { break; }"), ErrorCode::Misplaced);
        assert_eq!(code("void main() { int a; int a; }"), ErrorCode::Redeclared);
        assert_eq!(code("void main() { int a = 1 }"), ErrorCode::SyntaxError);
        assert_eq!(code("void f() {} void main() { int a = f(); }"), ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_error_position() {
        let e = compile("void main() {\n  int a;\n  a = b;\n}").unwrap_err();
        assert_eq!(e.line(), 3);
        assert_eq!(e.column(), &(6..7));
    }
}
