//! Lambda lifting
//!
//! Rewrites a `Program` so that every `Lambda` is the direct value of a
//! top-level `Define`. A `Lambda` nested inside another function's body
//! becomes its own top-level function, named uniquely, with its free
//! variables appended to its parameter list in sorted order; every call
//! site is rewritten to pass those same values along.
//!
//! Two invariants make this tractable without a fixed-point loop:
//! - A lambda's free variables are computed purely from its own text
//!   (`free_vars_of_body`), recursing through any lambdas nested inside
//!   it. A grandchild's free variable that isn't resolved by its parent
//!   bubbles up into the parent's own free variable set automatically —
//!   nothing special is needed to thread captures through multiple
//!   levels of nesting.
//! - Siblings defined in the same body are registered (name only) before
//!   any of their bodies are processed, so mutually recursive local
//!   functions resolve each other's calls correctly regardless of
//!   definition order.

use std::collections::{HashMap, HashSet};

use crate::ast::{is_reserved, Define, Expr, If, Lambda, Program, ProcCall};
use crate::error::{CompileError, Result};

/// What a lifted function needs at its call sites: its new top-level
/// name, and the extra trailing arguments every call must supply.
#[derive(Debug, Clone)]
struct Binding {
    lifted_name: String,
    captures: Vec<String>,
}

/// One level of lexical scope: the local function siblings visible at
/// that point in the source, by their original name.
type Scope = HashMap<String, Binding>;

struct Lifter {
    counter: usize,
    hoisted: Vec<Expr>,
}

impl Lifter {
    fn fresh_name(&mut self, base: &str) -> String {
        self.counter += 1;
        format!("{base}_lifted_{}", self.counter)
    }

    /// Process one function-body-worth of expressions (a program's top
    /// level, or a lambda's body): hoist every nested function define it
    /// contains and rewrite the rest to call through the new names.
    fn process_body(
        &mut self,
        body: Vec<Expr>,
        scopes: &mut Vec<Scope>,
        known_functions: &HashSet<String>,
    ) -> Result<Vec<Expr>> {
        let sibling_names: HashSet<String> = body
            .iter()
            .filter_map(|e| match e {
                Expr::Define(d) if matches!(*d.value, Expr::Lambda(_)) => Some(d.target.clone()),
                _ => None,
            })
            .collect();

        let mut all_known = known_functions.clone();
        all_known.extend(sibling_names.iter().cloned());

        let mut level: Scope = HashMap::new();
        let mut sibling_lambdas: HashMap<String, Lambda> = HashMap::new();
        for expr in &body {
            if let Expr::Define(d) = expr {
                if let Expr::Lambda(lambda) = d.value.as_ref() {
                    // A top-level define can never have a genuine capture:
                    // anything free in its body that isn't a known function
                    // is an undefined variable, which codegen reports when
                    // it can't resolve the reference — not a value to smuggle
                    // in as a synthetic parameter.
                    let mut captures: Vec<String> = if scopes.is_empty() {
                        Vec::new()
                    } else {
                        let free = free_vars_of_body(&lambda.body);
                        free.into_iter()
                            .filter(|name| {
                                !lambda.params.contains(name) && !all_known.contains(name)
                            })
                            .collect()
                    };
                    captures.sort();
                    let lifted_name = if scopes.is_empty() {
                        d.target.clone()
                    } else {
                        self.fresh_name(&d.target)
                    };
                    level.insert(
                        d.target.clone(),
                        Binding {
                            lifted_name,
                            captures,
                        },
                    );
                    sibling_lambdas.insert(d.target.clone(), lambda.clone());
                }
            }
        }

        scopes.push(level);

        for (name, lambda) in &sibling_lambdas {
            let binding = scopes
                .last()
                .expect("just pushed")
                .get(name)
                .cloned()
                .expect("registered above");
            let mut params = lambda.params.clone();
            params.extend(binding.captures.iter().cloned());
            let new_body = self.process_body(lambda.body.clone(), scopes, &all_known)?;
            self.hoisted.push(Expr::Define(Define {
                target: binding.lifted_name,
                value: Box::new(Expr::Lambda(Lambda {
                    params,
                    body: new_body,
                })),
            }));
        }

        let mut rewritten = Vec::new();
        for expr in body {
            if let Expr::Define(d) = &expr {
                if matches!(*d.value, Expr::Lambda(_)) {
                    continue;
                }
            }
            rewritten.push(self.rewrite_expr(expr, scopes)?);
        }

        scopes.pop();
        Ok(rewritten)
    }

    fn lookup(scopes: &[Scope], name: &str) -> Option<Binding> {
        scopes.iter().rev().find_map(|s| s.get(name).cloned())
    }

    fn rewrite_expr(&mut self, expr: Expr, scopes: &mut Vec<Scope>) -> Result<Expr> {
        match expr {
            Expr::Symbol(name) => match Self::lookup(scopes, &name) {
                Some(binding) => Ok(Expr::Symbol(binding.lifted_name)),
                None => Ok(Expr::Symbol(name)),
            },
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Quote(_) => Ok(expr),
            Expr::If(i) => Ok(Expr::If(If {
                test: Box::new(self.rewrite_expr(*i.test, scopes)?),
                consequent: Box::new(self.rewrite_expr(*i.consequent, scopes)?),
                alternate: i
                    .alternate
                    .map(|a| self.rewrite_expr(*a, scopes))
                    .transpose()?
                    .map(Box::new),
            })),
            Expr::Define(d) => Ok(Expr::Define(Define {
                target: d.target,
                value: Box::new(self.rewrite_expr(*d.value, scopes)?),
            })),
            Expr::Lambda(lambda) => {
                // An anonymous lambda reached outside of call position: lift
                // it under a synthetic name; it can only ever be invoked if
                // the enclosing ProcCall rewrite below replaces it first, so
                // reaching here at all means it is not applied directly.
                let known: HashSet<String> = scopes.iter().flat_map(|s| s.keys().cloned()).collect();
                self.lift_anonymous(lambda, scopes, &known)
            }
            Expr::ProcCall(call) => {
                if let Expr::Lambda(lambda) = *call.operator {
                    let known: HashSet<String> =
                        scopes.iter().flat_map(|s| s.keys().cloned()).collect();
                    let operator = self.lift_anonymous(lambda, scopes, &known)?;
                    let operands = call
                        .operands
                        .into_iter()
                        .map(|o| self.rewrite_expr(o, scopes))
                        .collect::<Result<Vec<_>>>()?;
                    return self.rewrite_call(operator, operands, scopes);
                }
                let operator = self.rewrite_expr(*call.operator, scopes)?;
                let operands = call
                    .operands
                    .into_iter()
                    .map(|o| self.rewrite_expr(o, scopes))
                    .collect::<Result<Vec<_>>>()?;
                self.rewrite_call(operator, operands, scopes)
            }
        }
    }

    /// Append a callee's captures (if it resolves to a lifted local
    /// function) to the already-rewritten operand list.
    fn rewrite_call(
        &mut self,
        operator: Expr,
        mut operands: Vec<Expr>,
        scopes: &[Scope],
    ) -> Result<Expr> {
        if let Expr::Symbol(name) = &operator {
            if let Some(binding) = Self::lookup(scopes, name) {
                operands.extend(binding.captures.iter().cloned().map(Expr::Symbol));
                return Ok(Expr::ProcCall(ProcCall {
                    operator: Box::new(Expr::Symbol(binding.lifted_name)),
                    operands,
                }));
            }
        }
        Ok(Expr::ProcCall(ProcCall {
            operator: Box::new(operator),
            operands,
        }))
    }

    fn lift_anonymous(
        &mut self,
        lambda: Lambda,
        scopes: &mut Vec<Scope>,
        known_functions: &HashSet<String>,
    ) -> Result<Expr> {
        let free = free_vars_of_body(&lambda.body);
        let mut captures: Vec<String> = free
            .into_iter()
            .filter(|name| !lambda.params.contains(name) && !known_functions.contains(name))
            .collect();
        captures.sort();
        let lifted_name = self.fresh_name("anon");
        let mut params = lambda.params.clone();
        params.extend(captures.iter().cloned());

        let mut child_scopes = scopes.clone();
        let new_body = self.process_body(lambda.body, &mut child_scopes, known_functions)?;
        self.hoisted.push(Expr::Define(Define {
            target: lifted_name.clone(),
            value: Box::new(Expr::Lambda(Lambda {
                params,
                body: new_body,
            })),
        }));

        if captures.is_empty() {
            Ok(Expr::Symbol(lifted_name))
        } else {
            scopes
                .last_mut()
                .expect("top level always has a scope frame")
                .insert(
                    lifted_name.clone(),
                    Binding {
                        lifted_name: lifted_name.clone(),
                        captures: captures.clone(),
                    },
                );
            Ok(Expr::Symbol(lifted_name))
        }
    }
}

/// Free variables referenced in a sequential body, where earlier
/// `define`s in the same body bind names visible to every sibling
/// (mirroring the pre-registration the lifter itself performs).
fn free_vars_of_body(body: &[Expr]) -> HashSet<String> {
    let bound: HashSet<String> = body
        .iter()
        .filter_map(|e| match e {
            Expr::Define(d) => Some(d.target.clone()),
            _ => None,
        })
        .collect();

    let mut free = HashSet::new();
    for expr in body {
        match expr {
            Expr::Define(d) => free.extend(free_vars_of_expr(&d.value)),
            other => free.extend(free_vars_of_expr(other)),
        }
    }
    free.retain(|name| !bound.contains(name));
    free
}

fn free_vars_of_expr(expr: &Expr) -> HashSet<String> {
    match expr {
        Expr::Symbol(s) => {
            if is_reserved(s) {
                HashSet::new()
            } else {
                let mut set = HashSet::new();
                set.insert(s.clone());
                set
            }
        }
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Quote(_) => HashSet::new(),
        Expr::If(i) => {
            let mut free = free_vars_of_expr(&i.test);
            free.extend(free_vars_of_expr(&i.consequent));
            if let Some(alt) = &i.alternate {
                free.extend(free_vars_of_expr(alt));
            }
            free
        }
        Expr::ProcCall(c) => {
            let mut free = free_vars_of_expr(&c.operator);
            for operand in &c.operands {
                free.extend(free_vars_of_expr(operand));
            }
            free
        }
        Expr::Lambda(l) => {
            let mut free = free_vars_of_body(&l.body);
            for p in &l.params {
                free.remove(p);
            }
            free
        }
        Expr::Define(d) => free_vars_of_expr(&d.value),
    }
}

/// Lift every nested lambda in `program` to the top level.
pub fn lift_program(program: Program) -> Result<Program> {
    let global_names: HashSet<String> = program
        .body
        .iter()
        .filter_map(|e| match e {
            Expr::Define(d) if matches!(*d.value, Expr::Lambda(_)) => Some(d.target.clone()),
            _ => None,
        })
        .collect();

    let mut lifter = Lifter {
        counter: 0,
        hoisted: Vec::new(),
    };
    let mut scopes: Vec<Scope> = Vec::new();
    let top_level = lifter.process_body(program.body, &mut scopes, &global_names)?;

    let mut body = std::mem::take(&mut lifter.hoisted);
    body.extend(top_level);
    Ok(Program::new(body))
}

/// `true` if no `Lambda` remains anywhere except as the direct value of
/// a top-level `Define` — the shape the code generator requires.
pub fn is_fully_lifted(program: &Program) -> bool {
    fn expr_has_nested_lambda(expr: &Expr) -> bool {
        match expr {
            Expr::Lambda(l) => l.body.iter().any(expr_has_nested_lambda),
            Expr::If(i) => {
                expr_has_nested_lambda(&i.test)
                    || expr_has_nested_lambda(&i.consequent)
                    || i.alternate.as_deref().is_some_and(expr_has_nested_lambda)
            }
            Expr::ProcCall(c) => {
                matches!(*c.operator, Expr::Lambda(_))
                    || expr_has_nested_lambda(&c.operator)
                    || c.operands.iter().any(expr_has_nested_lambda)
            }
            Expr::Define(d) => match d.value.as_ref() {
                Expr::Lambda(_) => false,
                other => expr_has_nested_lambda(other),
            },
            _ => false,
        }
    }

    program.body.iter().all(|e| match e {
        Expr::Define(d) => match d.value.as_ref() {
            Expr::Lambda(l) => !l.body.iter().any(expr_has_nested_lambda),
            other => !expr_has_nested_lambda(other),
        },
        other => !expr_has_nested_lambda(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_program;
    use crate::transformer::transform_program;

    fn lift(src: &str) -> Program {
        let forms = read_program(src).unwrap();
        let program = transform_program(forms).unwrap();
        lift_program(program).unwrap()
    }

    #[test]
    fn global_functions_are_left_alone() {
        let program = lift("(define (square x) (* x x)) (square 5)");
        assert_eq!(program.body.len(), 2);
        match &program.body[0] {
            Expr::Define(d) => assert_eq!(d.target, "square"),
            other => panic!("expected Define, got {other:?}"),
        }
    }

    #[test]
    fn nested_capture_is_threaded_as_extra_parameter() {
        let program = lift(
            "(define (outer x) (define (inner y) (+ x y)) (inner 10))",
        );
        assert!(is_fully_lifted(&program));
        let lifted_inner = program
            .body
            .iter()
            .find_map(|e| match e {
                Expr::Define(d) if d.target.starts_with("inner_lifted_") => Some(d),
                _ => None,
            })
            .expect("inner should be hoisted to the top level");
        match lifted_inner.value.as_ref() {
            Expr::Lambda(l) => assert_eq!(l.params, vec!["y".to_string(), "x".to_string()]),
            other => panic!("expected Lambda, got {other:?}"),
        }
    }

    #[test]
    fn sibling_capture_is_sorted_and_shared() {
        let program = lift(
            "(define (outer x y) \
               (define (f z) (+ x z)) \
               (define (g z) (+ y z)) \
               (+ (f 1) (g 2)))",
        );
        assert!(is_fully_lifted(&program));
        for prefix in ["f_lifted_", "g_lifted_"] {
            let def = program
                .body
                .iter()
                .find_map(|e| match e {
                    Expr::Define(d) if d.target.starts_with(prefix) => Some(d),
                    _ => None,
                })
                .unwrap_or_else(|| panic!("{prefix} should be hoisted"));
            match def.value.as_ref() {
                Expr::Lambda(l) => assert_eq!(l.params.len(), 2, "z plus one captured variable"),
                other => panic!("expected Lambda, got {other:?}"),
            }
        }
    }

    #[test]
    fn every_lifted_function_is_closed() {
        let program = lift(
            "(define (outer x) (define (inner y) (+ x y)) (inner 10))",
        );
        for expr in &program.body {
            if let Expr::Define(d) = expr {
                if let Expr::Lambda(l) = d.value.as_ref() {
                    let free = free_vars_of_body(&l.body);
                    let unresolved: Vec<_> =
                        free.iter().filter(|n| !l.params.contains(n)).collect();
                    assert!(
                        unresolved.is_empty(),
                        "{} has unresolved free variables: {unresolved:?}",
                        d.target
                    );
                }
            }
        }
    }

    #[test]
    fn arity_of_global_functions_is_unchanged() {
        let program = lift("(define (add3 a b c) (+ a (+ b c)))");
        match &program.body[0] {
            Expr::Define(d) => match d.value.as_ref() {
                Expr::Lambda(l) => assert_eq!(l.params.len(), 3),
                other => panic!("expected Lambda, got {other:?}"),
            },
            other => panic!("expected Define, got {other:?}"),
        }
    }

    #[test]
    fn immediately_invoked_lambda_is_lifted_and_applied() {
        let program = lift("((lambda (x) (* x x)) 5)");
        assert!(is_fully_lifted(&program));
        let call = program
            .body
            .iter()
            .find(|e| matches!(e, Expr::ProcCall(_)))
            .expect("call to the lifted anonymous function should remain at top level");
        match call {
            Expr::ProcCall(c) => assert!(matches!(*c.operator, Expr::Symbol(_))),
            _ => unreachable!(),
        }
    }
}
