//! lispc CLI
//!
//! Compiles a small Scheme-like Lisp program to a native executable:
//! `lisp source -> reader -> transformer -> lambda lifter -> LLVM IR ->
//! clang/llc -> output`.

use std::path::PathBuf;
use std::process;

use clap::Parser;

#[derive(Parser)]
#[command(name = "lispc")]
#[command(about = "Compile a small Scheme-like Lisp program to a native executable")]
struct Cli {
    /// Source file (.lisp/.scm) or inline source string. Uses a built-in
    /// fibonacci example when omitted.
    source: Option<String>,

    /// Output executable path.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Keep the intermediate `output.ll` LLVM IR file.
    #[arg(long)]
    keep_ir: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let source = match lispc::load_source(cli.source.as_deref()) {
        Ok(source) => source,
        Err(e) => fail(&e),
    };

    println!("Parsing...");
    println!("Lambda lifting...");
    println!("Generating LLVM IR...");

    match lispc::compile_to_executable(&source, &cli.output, cli.keep_ir) {
        Ok(outputs) => {
            println!("Compiling to native object...");
            println!("Linking...");
            println!("Compiled -> {}", outputs.exe_path.display());
            if cli.keep_ir {
                println!("IR saved to {}", outputs.ir_path.display());
            }
        }
        Err(e) => fail(&e),
    }
}

fn fail(e: &lispc::CompileError) -> ! {
    eprintln!("Error: {e}");
    process::exit(1);
}
