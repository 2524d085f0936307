//! Gad compiler: scanner, parser, AST-level optimizer, and bytecode
//! compiler/symbol table, wired together into a single [`compile`]
//! pipeline per spec.md §2's data-flow diagram.

pub mod ast;
pub mod compiler;
pub mod config;
pub mod optimizer;
pub mod parser;
pub mod printer;
pub mod scanner;
pub mod symbol;
pub mod token;

pub use compiler::{CompileError, Compiler};
pub use config::CompilerConfig;
pub use optimizer::OptimizerConfig;
pub use parser::ParseError;
pub use scanner::ScanError;

use gad_core::{CompiledFunction, Constant, Pos};

/// Every way compiling a source unit can fail, preserving spec.md §7's
/// distinction between phases: scan/parse errors are accumulated and
/// reported together, while a compile error halts on the first one.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UnitError {
    #[error("{} scan error(s)", .0.len())]
    Scan(Vec<ScanError>),
    #[error("{} parse error(s)", .0.len())]
    Parse(Vec<ParseError>),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// The product of compiling one source unit: the module's top-level
/// function plus its constant pool, ready to hand to `gad-runtime`'s VM.
/// `global_names` lists this unit's global-scope symbols in definition
/// order, so the VM can expose an imported module's globals as a
/// name-keyed value once it has finished running (spec.md §4).
pub struct CompiledUnit {
    pub main: CompiledFunction,
    pub constants: Vec<Constant>,
    pub global_names: Vec<String>,
}

/// Runs the full pipeline (scan, parse, optimize unless disabled, compile)
/// over one source unit.
///
/// `base` is the source file's offset into the shared `gad_core::SourceMap`
/// (see `gad_core::source`), used so positions recorded in the bytecode's
/// position map resolve back to the right file.
pub fn compile(src: &[u8], base: Pos, config: &CompilerConfig) -> Result<CompiledUnit, UnitError> {
    let scanner_config = scanner::ScannerConfig {
        mixed_mode: config.mixed_mode,
        mixed_start: config.mixed_start.clone(),
        mixed_end: config.mixed_end.clone(),
    };
    let (tokens, scan_errors) = scanner::tokenize(src, base, scanner_config);
    if !scan_errors.is_empty() {
        return Err(UnitError::Scan(scan_errors));
    }

    let mut parser = parser::Parser::new(tokens);
    let mut program = parser.parse_program();
    if !parser.errors().is_empty() {
        return Err(UnitError::Parse(parser.errors().to_vec()));
    }

    if config.optimize {
        let opt_config = optimizer::OptimizerConfig {
            max_passes: config.max_passes,
        };
        optimizer::optimize(&mut program, &opt_config);
    }

    let compiler = compiler::Compiler::with_predefined_globals(&config.predefined_globals);
    let (main, constants, global_names) = compiler.compile_program(&program)?;
    Ok(CompiledUnit {
        main,
        constants,
        global_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_simple_program_end_to_end() {
        let unit = compile(b"1 + 2", 0, &CompilerConfig::default()).expect("compiles");
        assert!(!unit.main.instructions.is_empty());
    }

    #[test]
    fn reports_scan_errors_without_compiling() {
        let err = compile(b"\"unterminated", 0, &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, UnitError::Scan(_)));
    }

    #[test]
    fn reports_parse_errors_without_compiling() {
        let err = compile(b"var = ", 0, &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, UnitError::Parse(_)));
    }

    #[test]
    fn reports_compile_errors_for_unresolved_names() {
        let err = compile(b"undefined_name + 1", 0, &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, UnitError::Compile(_)));
    }
}
