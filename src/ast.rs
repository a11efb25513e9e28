//! Abstract syntax tree for the Lisp dialect
//!
//! A tagged-variant tree built by the transformer (`transformer` module)
//! from a concrete parse tree, consumed by the lambda lifter and the
//! code generator. Nodes are immutable once constructed; the lifter
//! produces a new tree rather than mutating this one in place.
//!
//! Invariants (enforced by construction, not by the types):
//! - After the transformer: a `Define` whose value is a `Lambda` is a
//!   named function; any other value is a constant binding at its
//!   lexical position.
//! - After the lifter: every `Lambda` is the direct value of some
//!   top-level `Define`; no `Lambda` appears anywhere else. Every
//!   `ProcCall` whose operator names a lifted function carries both its
//!   original and its captured arguments.
//! - Parameter lists have no duplicate names; no local `Define` inside a
//!   `Lambda` shadows one of its parameters.

/// Names the lifter never captures and the code generator dispatches on
/// directly rather than treating as a call to a user/global function.
///
/// Single source of truth for both: the lifter's free-variable ignore
/// list and the codegen's primitive dispatch table must stay in sync,
/// and drawing both from this array is how we keep that true instead of
/// maintaining the list twice.
pub const RESERVED_NAMES: &[&str] = &["+", "-", "*", "/", ">", "<", "=", "if", "define", "lambda"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// An unevaluated literal captured by `quote`. Reserved for a future
/// data/list runtime; the code generator never lowers it.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Symbol(String),
    Number(f64),
    Str(String),
    Bool(bool),
    List(Vec<Datum>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Define {
    pub target: String,
    pub value: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub test: Box<Expr>,
    pub consequent: Box<Expr>,
    pub alternate: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcCall {
    pub operator: Box<Expr>,
    pub operands: Vec<Expr>,
}

/// Every expression position in the language, including `Define` itself
/// — a nested function definition inside a `Lambda` body is just another
/// entry in that body's expression sequence until the lifter promotes
/// it to the top level.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Define(Define),
    If(If),
    Lambda(Lambda),
    ProcCall(ProcCall),
    Quote(Datum),
    Symbol(String),
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Expr {
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    /// `true` for a top-level `Define` whose value is a `Lambda` — the
    /// shape both the lifter and the codegen treat specially.
    pub fn is_function_define(&self) -> bool {
        matches!(self, Expr::Define(d) if matches!(*d.value, Expr::Lambda(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Expr>,
}

impl Program {
    pub fn new(body: Vec<Expr>) -> Self {
        Program { body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_cover_every_primitive_and_keyword() {
        for name in ["+", "-", "*", "/", ">", "<", "=", "if", "define", "lambda"] {
            assert!(is_reserved(name), "{name} should be reserved");
        }
        assert!(!is_reserved("square"));
    }

    #[test]
    fn function_define_detection() {
        let func = Expr::Define(Define {
            target: "f".to_string(),
            value: Box::new(Expr::Lambda(Lambda {
                params: vec!["x".to_string()],
                body: vec![Expr::symbol("x")],
            })),
        });
        assert!(func.is_function_define());

        let constant = Expr::Define(Define {
            target: "x".to_string(),
            value: Box::new(Expr::Number(1.0)),
        });
        assert!(!constant.is_function_define());
    }
}
