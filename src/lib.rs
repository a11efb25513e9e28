//! lispc — an ahead-of-time compiler for a small Scheme-like Lisp
//!
//! Pipeline: [`reader`] → [`transformer`] → [`lifter`] → [`codegen`] →
//! [`toolchain`]. The reader and toolchain modules stand in for the
//! out-of-scope external collaborators (a generated parser, an
//! IR-to-object step, and a linker) named by the specification; the
//! middle three stages — the AST, the lambda lifter, and the LLVM IR
//! code generator — are the core this crate actually implements.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lifter;
pub mod reader;
pub mod toolchain;
pub mod transformer;

pub use ast::Program;
pub use codegen::CodeGen;
pub use error::{CompileError, Result};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

/// A built-in example compiled when the CLI is invoked with no argument.
pub const DEFAULT_EXAMPLE: &str =
    "(define (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))) (fib 10)";

/// Run the full front-to-middle pipeline — read, transform, lift — and
/// lower the result to textual LLVM IR. Does not touch the filesystem or
/// invoke any external tool; used directly by tests and by
/// [`compile_to_executable`].
pub fn compile_to_ir(source: &str) -> Result<String> {
    let forms = reader::read_program(source)?;
    info!(forms = forms.len(), "read source into parse tree");

    let program = transformer::transform_program(forms)?;
    info!(top_level = program.body.len(), "transformed parse tree into AST");

    let lifted = lifter::lift_program(program)?;
    info!("lambda lifting complete");
    debug_assert!(
        lifter::is_fully_lifted(&lifted),
        "lifter must remove every nested lambda"
    );

    let ir = CodeGen::new().codegen_program(&lifted)?;
    info!(bytes = ir.len(), "generated LLVM IR");
    Ok(ir)
}

/// Compile `source` all the way to a linked native executable at
/// `exe_path`, leaving `output.ll` and `output.o` alongside it (named
/// from `exe_path`'s stem). Returns
/// the path to the generated IR file so the caller can report or remove
/// it.
pub fn compile_to_executable(source: &str, exe_path: &Path, keep_ir: bool) -> Result<PathOutputs> {
    let ir = compile_to_ir(source)?;

    let ir_path = exe_path.with_extension("ll");
    let obj_path = exe_path.with_extension("o");

    fs::write(&ir_path, &ir).map_err(|e| CompileError::Io {
        path: ir_path.clone(),
        source: e,
    })?;

    toolchain::emit_object(&ir_path, &obj_path)?;
    toolchain::link(&obj_path, exe_path)?;

    if !keep_ir {
        fs::remove_file(&ir_path).ok();
    }

    Ok(PathOutputs {
        ir_path,
        obj_path,
        exe_path: exe_path.to_path_buf(),
    })
}

/// The filesystem artifacts a successful compilation leaves behind.
pub struct PathOutputs {
    pub ir_path: PathBuf,
    pub obj_path: PathBuf,
    pub exe_path: PathBuf,
}

/// Load source from a CLI argument: a path ending in
/// `.lisp`/`.scm` is read as a file; anything else is the source text
/// itself; `None` falls back to [`DEFAULT_EXAMPLE`].
pub fn load_source(arg: Option<&str>) -> Result<String> {
    match arg {
        None => Ok(DEFAULT_EXAMPLE.to_string()),
        Some(arg) if arg.ends_with(".lisp") || arg.ends_with(".scm") => {
            fs::read_to_string(arg).map_err(|e| CompileError::Io {
                path: PathBuf::from(arg),
                source: e,
            })
        }
        Some(arg) => Ok(arg.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_example_compiles_to_ir() {
        let ir = compile_to_ir(DEFAULT_EXAMPLE).unwrap();
        assert!(ir.contains("define double @fib("));
        assert!(ir.contains("call i32 (ptr, ...) @printf"));
    }

    #[test]
    fn load_source_falls_back_to_default() {
        assert_eq!(load_source(None).unwrap(), DEFAULT_EXAMPLE);
    }

    #[test]
    fn load_source_treats_non_suffixed_arg_as_inline_source() {
        assert_eq!(load_source(Some("(+ 1 2)")).unwrap(), "(+ 1 2)");
    }

    #[test]
    fn load_source_reports_io_error_for_missing_file() {
        let err = load_source(Some("/nonexistent/path/to/program.lisp")).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }

    #[test]
    fn number_literal_scenario() {
        let ir = compile_to_ir("42").unwrap();
        assert!(ir.contains(&format!("{:016X}", 42.0_f64.to_bits())));
    }

    #[test]
    fn conditional_without_alternate_scenarios() {
        let ir = compile_to_ir("(if (= 1 1) 7)").unwrap();
        assert!(ir.contains("phi double"));
        let ir2 = compile_to_ir("(if (= 1 2) 7)").unwrap();
        assert!(ir2.contains("phi double"));
    }

    #[test]
    fn end_to_end_square() {
        let ir = compile_to_ir("(define (square x) (* x x)) (square 6)").unwrap();
        assert!(ir.contains("define double @square("));
        assert!(ir.contains("fmul double"));
    }

    #[test]
    fn end_to_end_factorial() {
        let ir = compile_to_ir(
            "(define (fact n) (if (< n 2) 1 (* n (fact (- n 1))))) (fact 5)",
        )
        .unwrap();
        assert!(ir.contains("call double @fact("));
    }

    #[test]
    fn end_to_end_mutual_recursion() {
        let ir = compile_to_ir(
            "(define (even? n) (if (= n 0) 1 (odd? (- n 1)))) \
             (define (odd? n) (if (= n 0) 0 (even? (- n 1)))) \
             (even? 4)",
        )
        .unwrap();
        assert!(ir.contains("call double @odd_p("));
        assert!(ir.contains("call double @even_p("));
    }

    #[test]
    fn end_to_end_nested_capture() {
        let ir =
            compile_to_ir("(define (outer n) (define (inner) (+ n 1)) (inner)) (outer 41)")
                .unwrap();
        assert!(ir.contains("define double @inner_lifted_1(double %arg0)"));
    }

    #[test]
    fn end_to_end_sibling_capture() {
        let ir = compile_to_ir(
            "(define (f n) (define (g) (+ n 1)) (define (h) (+ n 2)) (+ (g) (h))) (f 10)",
        )
        .unwrap();
        assert!(ir.contains("define double @g_lifted_1(double %arg0)"));
        assert!(ir.contains("define double @h_lifted_2(double %arg0)"));
    }
}
