//! LLVM IR code generation via text
//!
//! Emits textual LLVM IR (`.ll`) directly with a `String` output buffer
//! rather than linking an LLVM binding such as inkwell — simpler and more
//! portable, at the cost of hand-rolled SSA bookkeeping. The `toolchain`
//! module hands the result to `clang`/`llc` for assembly and linking.
//!
//! Every Scheme value is a 64-bit `double`; comparisons produce an `i1`
//! that is immediately widened back to `double` so results flow through
//! the same uniform value universe as everything else (spec's "every
//! value is a double, booleans widen to 1.0/0.0").
//!
//! Emission is two-pass: pass 1 declares every top-level function's
//! signature so forward references and mutual recursion resolve
//! regardless of definition order; pass 2 emits bodies. A third pass
//! emits `main`, which evaluates every top-level non-function expression
//! in source order and prints each result with `printf`.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::{Expr, Program};
use crate::error::{CompileError, Result};

/// The reserved primitive operators the code generator lowers directly to
/// IR instructions rather than a `call`. Re-exported so the lifter's
/// free-variable ignore list and this dispatch table are provably the
/// same set (see `ast::RESERVED_NAMES` and the `primitives_match_reserved`
/// test below).
pub const PRIMITIVES: &[&str] = &["+", "-", "*", "/", ">", "<", "="];

/// One top-level function's signature, recorded during pass 1 so pass 2
/// (and any call site preceding the function's own definition) can emit
/// a correctly-shaped `call`.
#[derive(Debug, Clone)]
struct FuncSig {
    mangled: String,
    arity: usize,
}

pub struct CodeGen {
    /// Function bodies, appended in pass 2.
    functions: String,
    /// Module-level function table: source name -> signature.
    func_table: HashMap<String, FuncSig>,
    temp_counter: usize,
    block_counter: usize,
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            functions: String::new(),
            func_table: HashMap::new(),
            temp_counter: 0,
            block_counter: 0,
        }
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn fresh_block(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.block_counter);
        self.block_counter += 1;
        name
    }

    /// Lower a fully-lifted `Program` into a textual LLVM IR module.
    pub fn codegen_program(&mut self, program: &Program) -> Result<String> {
        // Pass 1: declare every top-level function's signature.
        for expr in &program.body {
            if let Expr::Define(d) = expr {
                if let Expr::Lambda(lambda) = d.value.as_ref() {
                    let mangled = mangle(&d.target);
                    self.func_table.insert(
                        d.target.clone(),
                        FuncSig {
                            mangled,
                            arity: lambda.params.len(),
                        },
                    );
                }
            }
        }

        // Pass 2: emit bodies.
        for expr in &program.body {
            if let Expr::Define(d) = expr {
                if let Expr::Lambda(lambda) = d.value.as_ref() {
                    self.codegen_function(&d.target, &lambda.params, &lambda.body)?;
                }
            }
        }

        // Pass 3: emit main, evaluating every non-function top-level
        // expression in source order and printing each result.
        let main_body = self.codegen_main(program)?;

        let mut ir = String::new();
        writeln!(&mut ir, "; ModuleID = 'lispc'").unwrap();
        writeln!(&mut ir, "target triple = \"{}\"", target_triple()).unwrap();
        writeln!(&mut ir).unwrap();
        writeln!(
            &mut ir,
            "@.result.fmt = private unnamed_addr constant [12 x i8] c\"Result: %f\\0A\\00\""
        )
        .unwrap();
        writeln!(&mut ir).unwrap();
        writeln!(&mut ir, "declare i32 @printf(ptr, ...)").unwrap();
        writeln!(&mut ir).unwrap();
        ir.push_str(&self.functions);
        ir.push_str(&main_body);
        Ok(ir)
    }

    /// Emit one top-level function: bind each IR argument to its
    /// parameter in a fresh local symbol table, emit the body, and
    /// `ret` the value of the final expression.
    fn codegen_function(&mut self, name: &str, params: &[String], body: &[Expr]) -> Result<()> {
        let sig = self
            .func_table
            .get(name)
            .expect("registered in pass 1")
            .clone();

        let mut locals: HashMap<String, String> = HashMap::new();
        let mut params_ir = Vec::new();
        for (i, p) in params.iter().enumerate() {
            let arg_name = format!("arg{i}");
            locals.insert(p.clone(), format!("%{arg_name}"));
            params_ir.push(format!("double %{arg_name}"));
        }

        let mut out = String::new();
        writeln!(
            &mut out,
            "define double @{}({}) {{",
            sig.mangled,
            params_ir.join(", ")
        )
        .unwrap();
        writeln!(&mut out, "entry:").unwrap();

        let mut body_out = String::new();
        let mut result = String::from("0.000000e+00");
        for expr in body {
            result = self.codegen_expr(expr, &locals, &mut body_out)?;
        }
        out.push_str(&body_out);
        writeln!(&mut out, "  ret double {result}").unwrap();
        writeln!(&mut out, "}}").unwrap();
        writeln!(&mut out).unwrap();

        self.functions.push_str(&out);
        Ok(())
    }

    /// Emit `main`: evaluate every non-function top-level expression and
    /// print it via `printf`, then `ret i32 0`.
    fn codegen_main(&mut self, program: &Program) -> Result<String> {
        let locals: HashMap<String, String> = HashMap::new();
        let mut body = String::new();
        for expr in &program.body {
            if expr.is_function_define() {
                continue;
            }
            if let Expr::Define(_) = expr {
                // Non-function top-level `Define`: a constant binding, not lowered.
                continue;
            }
            let value = self.codegen_expr(expr, &locals, &mut body)?;
            writeln!(
                &mut body,
                "  call i32 (ptr, ...) @printf(ptr @.result.fmt, double {value})"
            )
            .unwrap();
        }

        let mut out = String::new();
        writeln!(&mut out, "define i32 @main() {{").unwrap();
        writeln!(&mut out, "entry:").unwrap();
        out.push_str(&body);
        writeln!(&mut out, "  ret i32 0").unwrap();
        writeln!(&mut out, "}}").unwrap();
        Ok(out)
    }

    /// Lower one expression, appending its instructions to `out` and
    /// returning the IR value (a literal, `%name`, or `%temp`) it
    /// produces.
    fn codegen_expr(
        &mut self,
        expr: &Expr,
        locals: &HashMap<String, String>,
        out: &mut String,
    ) -> Result<String> {
        match expr {
            Expr::Number(n) => Ok(format_double(*n)),
            Expr::Bool(b) => Ok(format_double(if *b { 1.0 } else { 0.0 })),
            Expr::Symbol(name) => locals
                .get(name)
                .cloned()
                .ok_or_else(|| CompileError::UndefinedVariable(name.clone())),
            Expr::Str(_) | Expr::Quote(_) => {
                // Reserved for a future string/data runtime; never reached
                // by a fully-lifted program that only prints doubles.
                Ok(format_double(0.0))
            }
            Expr::If(i) => self.codegen_if(i, locals, out),
            Expr::ProcCall(call) => self.codegen_call(call, locals, out),
            Expr::Define(_) | Expr::Lambda(_) => {
                unreachable!("lambda lifting removes these from expression position")
            }
        }
    }

    fn codegen_if(
        &mut self,
        i: &crate::ast::If,
        locals: &HashMap<String, String>,
        out: &mut String,
    ) -> Result<String> {
        let test = self.codegen_expr(&i.test, locals, out)?;
        let cond = self.fresh_temp();
        writeln!(out, "  %{cond} = fcmp one double {test}, 0.000000e+00").unwrap();

        let then_block = self.fresh_block("then");
        let else_block = self.fresh_block("else");
        let merge_block = self.fresh_block("merge");

        writeln!(out, "  br i1 %{cond}, label %{then_block}, label %{else_block}").unwrap();

        writeln!(out, "{then_block}:").unwrap();
        let then_val = self.codegen_expr(&i.consequent, locals, out)?;
        // Record the block the branch actually sits in: nested control
        // flow inside the arm may have opened further blocks, so the
        // predecessor for the phi is wherever emission ended up, not
        // `then_block` itself.
        let then_pred = self.current_block(out).unwrap_or_else(|| then_block.clone());
        writeln!(out, "  br label %{merge_block}").unwrap();

        writeln!(out, "{else_block}:").unwrap();
        let else_val = match &i.alternate {
            Some(alt) => self.codegen_expr(alt, locals, out)?,
            None => format_double(0.0),
        };
        let else_pred = self.current_block(out).unwrap_or_else(|| else_block.clone());
        writeln!(out, "  br label %{merge_block}").unwrap();

        writeln!(out, "{merge_block}:").unwrap();
        let result = self.fresh_temp();
        writeln!(
            out,
            "  %{result} = phi double [ {then_val}, %{then_pred} ], [ {else_val}, %{else_pred} ]"
        )
        .unwrap();
        Ok(format!("%{result}"))
    }

    /// The label of the block most recently opened in `out` — the
    /// predecessor a `br` inserted right now would belong to. Used to
    /// capture the correct incoming edge for a `phi` when an arm's own
    /// lowering (e.g. a nested `If`) has moved emission into a new block.
    fn current_block(&self, out: &str) -> Option<String> {
        out.lines()
            .rev()
            .find_map(|line| line.strip_suffix(':').map(|l| l.trim().to_string()))
    }

    fn codegen_call(
        &mut self,
        call: &crate::ast::ProcCall,
        locals: &HashMap<String, String>,
        out: &mut String,
    ) -> Result<String> {
        let Expr::Symbol(name) = call.operator.as_ref() else {
            return Err(CompileError::NonSymbolOperator(format!(
                "{:?}",
                call.operator
            )));
        };

        if let Some(result) = self.codegen_primitive(name, &call.operands, locals, out)? {
            return Ok(result);
        }

        let Some(sig) = self.func_table.get(name).cloned() else {
            return Err(CompileError::UnknownFunction(name.clone()));
        };
        if sig.arity != call.operands.len() {
            return Err(CompileError::UnknownFunction(format!(
                "{name} (expected {} argument(s), got {})",
                sig.arity,
                call.operands.len()
            )));
        }

        let mut args = Vec::with_capacity(call.operands.len());
        for operand in &call.operands {
            args.push(self.codegen_expr(operand, locals, out)?);
        }
        let result = self.fresh_temp();
        let args_ir = args
            .iter()
            .map(|a| format!("double {a}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "  %{result} = call double @{}({args_ir})", sig.mangled).unwrap();
        Ok(format!("%{result}"))
    }

    /// Lower a primitive operator. Returns `Ok(None)` if `name` is not
    /// one of `PRIMITIVES`, so the caller falls through to a function
    /// call / unknown-function error.
    fn codegen_primitive(
        &mut self,
        name: &str,
        operands: &[Expr],
        locals: &HashMap<String, String>,
        out: &mut String,
    ) -> Result<Option<String>> {
        if !PRIMITIVES.contains(&name) {
            return Ok(None);
        }

        if name == "-" && operands.len() == 1 {
            let x = self.codegen_expr(&operands[0], locals, out)?;
            let result = self.fresh_temp();
            writeln!(out, "  %{result} = fsub double 0.000000e+00, {x}").unwrap();
            return Ok(Some(format!("%{result}")));
        }

        if operands.len() != 2 {
            return Err(CompileError::UnknownFunction(format!(
                "{name} (primitive requires exactly two operands, got {})",
                operands.len()
            )));
        }

        let lhs = self.codegen_expr(&operands[0], locals, out)?;
        let rhs = self.codegen_expr(&operands[1], locals, out)?;

        let result = match name {
            "+" => {
                let t = self.fresh_temp();
                writeln!(out, "  %{t} = fadd double {lhs}, {rhs}").unwrap();
                format!("%{t}")
            }
            "-" => {
                let t = self.fresh_temp();
                writeln!(out, "  %{t} = fsub double {lhs}, {rhs}").unwrap();
                format!("%{t}")
            }
            "*" => {
                let t = self.fresh_temp();
                writeln!(out, "  %{t} = fmul double {lhs}, {rhs}").unwrap();
                format!("%{t}")
            }
            "/" => {
                let t = self.fresh_temp();
                writeln!(out, "  %{t} = fdiv double {lhs}, {rhs}").unwrap();
                format!("%{t}")
            }
            "=" | ">" | "<" => {
                let pred = match name {
                    "=" => "oeq",
                    ">" => "ogt",
                    "<" => "olt",
                    _ => unreachable!(),
                };
                let cmp = self.fresh_temp();
                writeln!(out, "  %{cmp} = fcmp {pred} double {lhs}, {rhs}").unwrap();
                let widened = self.fresh_temp();
                writeln!(out, "  %{widened} = uitofp i1 %{cmp} to double").unwrap();
                format!("%{widened}")
            }
            _ => unreachable!("checked by PRIMITIVES.contains above"),
        };
        Ok(Some(result))
    }
}

/// Format an `f64` as an LLVM IR hexadecimal double literal, which round
/// trips exactly regardless of the value's decimal representation.
fn format_double(n: f64) -> String {
    format!("0x{:016X}", n.to_bits())
}

/// Map a Lisp identifier (which may contain `-`, `?`, `!`, `*`, etc.) to a
/// valid LLVM IR global identifier.
fn mangle(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '$' => out.push(c),
            '-' => out.push('_'),
            '?' => out.push_str("_p"),
            '!' => out.push_str("_b"),
            '*' => out.push_str("_s"),
            '/' => out.push_str("_f"),
            '+' => out.push_str("_a"),
            '=' => out.push_str("_e"),
            '<' => out.push_str("_lt"),
            '>' => out.push_str("_gt"),
            _ => {
                for byte in c.to_string().as_bytes() {
                    write!(&mut out, "_x{byte:02x}").unwrap();
                }
            }
        }
    }
    out
}

fn target_triple() -> &'static str {
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        "arm64-apple-macosx"
    }
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    {
        "x86_64-apple-darwin"
    }
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        "x86_64-unknown-linux-gnu"
    }
    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    {
        "aarch64-unknown-linux-gnu"
    }
    #[cfg(not(any(
        all(target_os = "macos", target_arch = "aarch64"),
        all(target_os = "macos", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "aarch64")
    )))]
    {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifter::lift_program;
    use crate::reader::read_program;
    use crate::transformer::transform_program;

    fn compile(src: &str) -> String {
        let forms = read_program(src).unwrap();
        let program = transform_program(forms).unwrap();
        let lifted = lift_program(program).unwrap();
        CodeGen::new().codegen_program(&lifted).unwrap()
    }

    #[test]
    fn primitives_match_reserved_non_keywords() {
        for p in PRIMITIVES {
            assert!(crate::ast::is_reserved(p), "{p} should be reserved");
        }
        for kw in ["if", "define", "lambda"] {
            assert!(!PRIMITIVES.contains(&kw), "{kw} is a keyword, not a primitive");
        }
    }

    #[test]
    fn number_literal_prints() {
        let ir = compile("42");
        assert!(ir.contains("call i32 (ptr, ...) @printf"));
        assert!(ir.contains(&format_double(42.0)));
    }

    #[test]
    fn two_pass_emission_resolves_forward_reference() {
        let ir = compile(
            "(define (even? n) (if (= n 0) 1 (odd? (- n 1)))) \
             (define (odd? n) (if (= n 0) 0 (even? (- n 1)))) \
             (even? 4)",
        );
        assert!(ir.contains("define double @even_p("));
        assert!(ir.contains("define double @odd_p("));
        assert!(ir.contains("call double @odd_p("));
    }

    #[test]
    fn if_lowers_to_phi_with_branch_time_predecessors() {
        let ir = compile("(define (f x) (if (> x 0) x (- x))) (f 3)");
        assert!(ir.contains("fcmp one double"));
        assert!(ir.contains("phi double"));
    }

    #[test]
    fn unary_minus_is_zero_subtract() {
        let ir = compile("(- 5)");
        assert!(ir.contains("fsub double 0.000000e+00"));
    }

    #[test]
    fn comparison_widens_i1_to_double() {
        let ir = compile("(+ (< 1 2) (< 3 2))");
        assert!(ir.contains("fcmp olt double"));
        assert!(ir.contains("uitofp i1"));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let forms = read_program("(ghost 1 2)").unwrap();
        let program = transform_program(forms).unwrap();
        let lifted = lift_program(program).unwrap();
        let err = CodeGen::new().codegen_program(&lifted).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction(_)));
    }

    #[test]
    fn non_symbol_operator_is_an_error() {
        // `((if #t + -) 1 2)`: operator position is itself a call, not a
        // bare symbol, and is not a lambda so the lifter leaves it in
        // place for codegen to reject.
        let forms = read_program("((if #t + -) 1 2)").unwrap();
        let program = transform_program(forms).unwrap();
        let lifted = lift_program(program).unwrap();
        let err = CodeGen::new().codegen_program(&lifted).unwrap_err();
        assert!(matches!(err, CompileError::NonSymbolOperator(_)));
    }

    #[test]
    fn nested_capture_call_site_carries_extra_argument() {
        let ir = compile("(define (outer n) (define (inner) (+ n 1)) (inner)) (outer 41)");
        assert!(ir.contains("call double @inner_lifted_1(double"));
    }
}
