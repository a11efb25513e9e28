//! Parse-tree transformer
//!
//! Maps the concrete parse tree produced by the reader into the AST in
//! `ast`. Every application form `(op ...)` arrives as a generic list;
//! this module re-recognizes the handful of special forms the grammar
//! would otherwise route through a generic `procedure_call` production
//! — `define`, `if`, `lambda` — before falling through to `ProcCall`.

use crate::ast::{Datum, Define, Expr, If, Lambda, Program, ProcCall};
use crate::error::{CompileError, Result};
use crate::reader::ParseTree;

/// Transform every top-level form read from source into a `Program`.
pub fn transform_program(forms: Vec<ParseTree>) -> Result<Program> {
    let body = forms
        .into_iter()
        .map(transform_expr)
        .collect::<Result<Vec<_>>>()?;
    Ok(Program::new(body))
}

fn transform_expr(tree: ParseTree) -> Result<Expr> {
    match tree {
        ParseTree::Symbol(name) => Ok(Expr::Symbol(name)),
        ParseTree::Number(n) => Ok(Expr::Number(n.as_f64())),
        ParseTree::Str(s) => Ok(Expr::Str(s)),
        ParseTree::Bool(b) => Ok(Expr::Bool(b)),
        ParseTree::List(elements) => transform_list(elements),
    }
}

fn transform_list(elements: Vec<ParseTree>) -> Result<Expr> {
    let Some(first) = elements.first() else {
        return Err(CompileError::MalformedForm {
            form: "application",
            expected: "an operator and zero or more operands",
            got: 0,
        });
    };

    if let ParseTree::Symbol(name) = first {
        match name.as_str() {
            "define" => return transform_define(elements),
            "if" => return transform_if(elements),
            "lambda" => return transform_lambda(elements),
            _ => {}
        }
    }

    let mut rest = elements.into_iter();
    let operator = transform_expr(rest.next().expect("checked non-empty above"))?;
    let operands = rest.map(transform_expr).collect::<Result<Vec<_>>>()?;
    Ok(Expr::ProcCall(ProcCall {
        operator: Box::new(operator),
        operands,
    }))
}

/// `(define v e)` or `(define (f p...) body...)`.
fn transform_define(elements: Vec<ParseTree>) -> Result<Expr> {
    let operand_count = elements.len().saturating_sub(1);
    if operand_count < 2 {
        return Err(CompileError::MalformedForm {
            form: "define",
            expected: "a target and a value, or a (name . formals) head and a body",
            got: operand_count,
        });
    }

    let mut iter = elements.into_iter().skip(1);
    let head = iter.next().expect("operand_count >= 2");

    match head {
        // (define (f p...) body...)
        ParseTree::List(mut head_elements) => {
            if head_elements.is_empty() {
                return Err(CompileError::MalformedForm {
                    form: "define",
                    expected: "a function name inside the formals list",
                    got: 0,
                });
            }
            let target = symbol_name(head_elements.remove(0), "define")?;
            let params = head_elements
                .into_iter()
                .map(|p| symbol_name(p, "define"))
                .collect::<Result<Vec<_>>>()?;
            let body = iter.map(transform_expr).collect::<Result<Vec<_>>>()?;
            if body.is_empty() {
                return Err(CompileError::MalformedForm {
                    form: "define",
                    expected: "a non-empty function body",
                    got: 0,
                });
            }
            Ok(Expr::Define(Define {
                target,
                value: Box::new(Expr::Lambda(Lambda { params, body })),
            }))
        }
        // (define v e)
        other => {
            let target = symbol_name(other, "define")?;
            let value = transform_expr(iter.next().ok_or(CompileError::MalformedForm {
                form: "define",
                expected: "a value expression",
                got: 1,
            })?)?;
            Ok(Expr::Define(Define {
                target,
                value: Box::new(value),
            }))
        }
    }
}

/// `(if t c)` or `(if t c a)`.
fn transform_if(elements: Vec<ParseTree>) -> Result<Expr> {
    let operand_count = elements.len().saturating_sub(1);
    if !(2..=3).contains(&operand_count) {
        return Err(CompileError::MalformedForm {
            form: "if",
            expected: "2 or 3 operands",
            got: operand_count,
        });
    }
    let mut iter = elements.into_iter().skip(1);
    let test = transform_expr(iter.next().expect("operand_count >= 2"))?;
    let consequent = transform_expr(iter.next().expect("operand_count >= 2"))?;
    let alternate = iter.next().map(transform_expr).transpose()?;
    Ok(Expr::If(If {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: alternate.map(Box::new),
    }))
}

/// `(lambda (p...) body...)`.
fn transform_lambda(elements: Vec<ParseTree>) -> Result<Expr> {
    let operand_count = elements.len().saturating_sub(1);
    if operand_count < 2 {
        return Err(CompileError::MalformedForm {
            form: "lambda",
            expected: "a formals list and a non-empty body",
            got: operand_count,
        });
    }
    let mut iter = elements.into_iter().skip(1);
    let formals = match iter.next().expect("operand_count >= 2") {
        ParseTree::List(params) => params
            .into_iter()
            .map(|p| symbol_name(p, "lambda"))
            .collect::<Result<Vec<_>>>()?,
        other => return Err(CompileError::MalformedForm {
            form: "lambda",
            expected: "a formals list",
            got: matches!(other, ParseTree::List(_)) as usize,
        }),
    };
    let body = iter.map(transform_expr).collect::<Result<Vec<_>>>()?;
    if body.is_empty() {
        return Err(CompileError::MalformedForm {
            form: "lambda",
            expected: "a non-empty body",
            got: 0,
        });
    }
    Ok(Expr::Lambda(Lambda {
        params: formals,
        body,
    }))
}

#[allow(dead_code)]
fn transform_quote(datum: ParseTree) -> Datum {
    match datum {
        ParseTree::Symbol(s) => Datum::Symbol(s),
        ParseTree::Number(n) => Datum::Number(n.as_f64()),
        ParseTree::Str(s) => Datum::Str(s),
        ParseTree::Bool(b) => Datum::Bool(b),
        ParseTree::List(elements) => Datum::List(elements.into_iter().map(transform_quote).collect()),
    }
}

fn symbol_name(tree: ParseTree, form: &'static str) -> Result<String> {
    match tree {
        ParseTree::Symbol(name) => Ok(name),
        _ => Err(CompileError::MalformedForm {
            form,
            expected: "a symbol",
            got: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_program;

    fn transform(src: &str) -> Program {
        transform_program(read_program(src).unwrap()).unwrap()
    }

    #[test]
    fn value_define_vs_function_define() {
        let program = transform("(define x 10) (define (f y) y)");
        assert!(!program.body[0].is_function_define());
        assert!(program.body[1].is_function_define());
    }

    #[test]
    fn if_with_and_without_alternate() {
        let program = transform("(if (= 1 1) 7) (if (= 1 2) 7 8)");
        match &program.body[0] {
            Expr::If(i) => assert!(i.alternate.is_none()),
            other => panic!("expected If, got {other:?}"),
        }
        match &program.body[1] {
            Expr::If(i) => assert!(i.alternate.is_some()),
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn lambda_expression_form() {
        let program = transform("((lambda (x) (* x x)) 5)");
        match &program.body[0] {
            Expr::ProcCall(call) => match &*call.operator {
                Expr::Lambda(l) => assert_eq!(l.params, vec!["x".to_string()]),
                other => panic!("expected Lambda operator, got {other:?}"),
            },
            other => panic!("expected ProcCall, got {other:?}"),
        }
    }

    #[test]
    fn malformed_if_reports_operand_count() {
        let err = transform_program(read_program("(if (= 1 1))").unwrap()).unwrap_err();
        match err {
            CompileError::MalformedForm { form, got, .. } => {
                assert_eq!(form, "if");
                assert_eq!(got, 1);
            }
            other => panic!("expected MalformedForm, got {other:?}"),
        }
    }

    #[test]
    fn numeric_literals_disambiguate_int_vs_real() {
        let program = transform("42 3.5");
        assert_eq!(program.body[0], Expr::Number(42.0));
        assert_eq!(program.body[1], Expr::Number(3.5));
    }
}
