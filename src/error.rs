//! Compiler error model
//!
//! One variant per error kind the pipeline can raise. Every stage is
//! fatal-on-first-error: there is no recovery or retry between stages,
//! so a single enum covering the whole pipeline is simpler than a
//! per-stage error type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("ill-formed '{form}': expected {expected}, got {got}")]
    MalformedForm {
        form: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function position must be a symbol, found: {0}")]
    NonSymbolOperator(String),

    #[error("IR verification failed:\n{0}")]
    IrVerification(String),

    #[error("toolchain step '{step}' failed (status {status}):\n{stderr}")]
    Toolchain {
        step: &'static str,
        status: i32,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, CompileError>;
