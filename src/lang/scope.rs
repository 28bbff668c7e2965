use super::{Column, Error};
use crate::mach::{Width, DATA_START, FRAME_HEADER, HEAP_START, PARAM_SLOT};
use std::collections::HashMap;

/// Scalar base of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Void,
    Char,
    Int,
    Long,
}

impl Base {
    pub fn width(self) -> Width {
        match self {
            Base::Char | Base::Void => Width::Byte,
            Base::Int => Width::Word,
            Base::Long => Width::Dword,
        }
    }
}

/// Type of a value: a base plus pointer depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ty {
    pub base: Base,
    pub pointer: u8,
}

impl Ty {
    /// Plain arithmetic result.
    pub const NUMBER: Ty = Ty {
        base: Base::Long,
        pointer: 0,
    };

    pub fn new(base: Base, pointer: u8) -> Ty {
        Ty { base, pointer }
    }

    pub fn width(self) -> Width {
        if self.pointer > 0 {
            Width::Dword
        } else {
            self.base.width()
        }
    }

    pub fn size(self) -> u16 {
        self.width().bytes()
    }

    pub fn is_pointer(self) -> bool {
        self.pointer > 0
    }

    pub fn is_void(self) -> bool {
        self.base == Base::Void && self.pointer == 0
    }

    /// What `*p` reads. Dereferencing a number reads a byte.
    pub fn pointee(self) -> Ty {
        if self.pointer == 0 {
            Ty::new(Base::Char, 0)
        } else {
            Ty::new(self.base, self.pointer - 1)
        }
    }

    /// Scale for `p + n`.
    pub fn stride(self) -> u16 {
        if self.pointer == 0 {
            1
        } else {
            let pointee = self.pointee();
            if pointee.is_void() {
                1
            } else {
                pointee.size()
            }
        }
    }
}

/// A named object. Globals carry absolute addresses, locals carry
/// frame offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    pub offset: u16,
    pub ty: Ty,
    pub dims: Vec<u16>,
    pub local: bool,
}

impl Var {
    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    pub fn elem(&self) -> Ty {
        self.ty
    }

    pub fn count(&self) -> u32 {
        self.dims.iter().map(|&d| u32::from(d)).product()
    }

    pub fn size(&self) -> u32 {
        u32::from(self.ty.size()) * self.count()
    }

    /// Byte distance between consecutive indices at dimension `dim`.
    pub fn stride(&self, dim: usize) -> u32 {
        let inner: u32 = self.dims[dim + 1..].iter().map(|&d| u32::from(d)).product();
        inner * u32::from(self.ty.size())
    }

    /// Type after decay when used as a value.
    pub fn decayed(&self) -> Ty {
        if self.is_array() {
            Ty::new(self.ty.base, self.ty.pointer + 1)
        } else {
            self.ty
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub ret: Ty,
    pub params: usize,
    pub defined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Macro {
    Int(i32),
    Str(Vec<u8>),
}

pub type Macros = HashMap<String, Macro>;

/// Everything known at the top level after the pre-scan.
#[derive(Debug, Default)]
pub struct Globals {
    pub vars: HashMap<String, Var>,
    pub functions: HashMap<String, Function>,
    pub macros: Macros,
    pub size: u32,
    /// Constant initial bytes by address.
    pub inits: Vec<(u16, Vec<u8>)>,
    /// Pointer globals that start out pointing at a string.
    pub strings: Vec<(u16, Vec<u8>)>,
}

impl Globals {
    pub fn declare(&mut self, name: &str, ty: Ty, dims: Vec<u16>, at: (usize, &Column)) -> Result<Var, Error> {
        if self.vars.contains_key(name) || self.functions.contains_key(name) {
            return Err(error!(Redeclared, at.0, ..at.1; format!("`{}`", name)));
        }
        let mut var = Var {
            offset: 0,
            ty,
            dims,
            local: false,
        };
        let start = u32::from(DATA_START) + self.size;
        if start + var.size() > u32::from(HEAP_START) {
            return Err(error!(OutOfMemory, at.0, ..at.1; "globals exceed data space"));
        }
        var.offset = start as u16;
        self.size += var.size();
        self.vars.insert(name.to_string(), var.clone());
        Ok(var)
    }
}

/// One flat scope per function body.
#[derive(Debug, Default)]
pub struct Locals {
    vars: HashMap<String, Var>,
    next: u32,
    params: usize,
}

impl Locals {
    pub fn new() -> Locals {
        Locals {
            vars: HashMap::new(),
            next: u32::from(FRAME_HEADER),
            params: 0,
        }
    }

    pub fn param(&mut self, name: &str, ty: Ty, at: (usize, &Column)) -> Result<(), Error> {
        if self.vars.contains_key(name) {
            return Err(error!(Redeclared, at.0, ..at.1; format!("`{}`", name)));
        }
        let offset = FRAME_HEADER + PARAM_SLOT * self.params as u16;
        self.params += 1;
        self.next = u32::from(offset + PARAM_SLOT);
        self.vars.insert(
            name.to_string(),
            Var {
                offset,
                ty,
                dims: vec![],
                local: true,
            },
        );
        Ok(())
    }

    pub fn declare(&mut self, name: &str, ty: Ty, dims: Vec<u16>, at: (usize, &Column)) -> Result<Var, Error> {
        if self.vars.contains_key(name) {
            return Err(error!(Redeclared, at.0, ..at.1; format!("`{}`", name)));
        }
        let mut var = Var {
            offset: 0,
            ty,
            dims,
            local: true,
        };
        var.offset = self.claim(var.size(), at)?;
        self.vars.insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// Reserve unnamed frame bytes.
    pub fn claim(&mut self, size: u32, at: (usize, &Column)) -> Result<u16, Error> {
        let offset = self.next;
        if offset + size > u32::from(u16::MAX) {
            return Err(error!(OutOfMemory, at.0, ..at.1; "frame too large"));
        }
        self.next += size;
        Ok(offset as u16)
    }

    pub fn get(&self, name: &str) -> Option<&Var> {
        self.vars.get(name)
    }

    pub fn frame_size(&self) -> u16 {
        self.next as u16
    }

    pub fn params(&self) -> usize {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let mut locals = Locals::new();
        locals.param("a", Ty::new(Base::Char, 0), (1, &(0..1))).unwrap();
        locals.param("b", Ty::new(Base::Int, 1), (1, &(0..1))).unwrap();
        assert_eq!(locals.get("b").unwrap().offset, 9);
        let m = locals
            .declare("m", Ty::new(Base::Int, 0), vec![2, 3], (2, &(0..1)))
            .unwrap();
        assert_eq!(m.offset, 13);
        assert_eq!(m.size(), 12);
        assert_eq!(m.stride(0), 6);
        assert_eq!(m.stride(1), 2);
        assert_eq!(locals.frame_size(), 25);
        assert!(locals.declare("a", Ty::NUMBER, vec![], (3, &(0..1))).is_err());
    }

    #[test]
    fn test_globals() {
        let mut globals = Globals::default();
        let a = globals
            .declare("a", Ty::new(Base::Long, 0), vec![], (1, &(0..1)))
            .unwrap();
        let b = globals
            .declare("b", Ty::new(Base::Char, 0), vec![10], (1, &(0..1)))
            .unwrap();
        assert_eq!(a.offset, DATA_START);
        assert_eq!(b.offset, DATA_START + 4);
        assert_eq!(globals.size, 14);
    }

    #[test]
    fn test_pointer_types() {
        let p = Ty::new(Base::Int, 1);
        assert_eq!(p.width(), Width::Dword);
        assert_eq!(p.stride(), 2);
        assert_eq!(p.pointee(), Ty::new(Base::Int, 0));
        assert_eq!(Ty::new(Base::Char, 2).stride(), 4);
        assert_eq!(Ty::NUMBER.pointee(), Ty::new(Base::Char, 0));
    }
}
