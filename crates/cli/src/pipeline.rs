//! Wraps `gadc::compile`'s scan/parse/optimize/compile pipeline with the
//! CLI's `-trace=parser|optimizer|compiler` diagnostics (spec.md §6),
//! printing the AST or bytecode produced by each named phase to stderr
//! as it runs.

use crate::disasm::disassemble;
use clap::ValueEnum;
use gad_core::Pos;
use gadc::compiler::Compiler;
use gadc::{optimizer, parser::Parser, scanner, CompiledUnit, CompilerConfig, UnitError};

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum TracePhase {
    Parser,
    Optimizer,
    Compiler,
}

pub fn compile_traced(
    src: &[u8],
    base: Pos,
    config: &CompilerConfig,
    trace: &[TracePhase],
) -> Result<CompiledUnit, UnitError> {
    let scanner_config = scanner::ScannerConfig {
        mixed_mode: config.mixed_mode,
        mixed_start: config.mixed_start.clone(),
        mixed_end: config.mixed_end.clone(),
    };
    let (tokens, scan_errors) = scanner::tokenize(src, base, scanner_config);
    if !scan_errors.is_empty() {
        return Err(UnitError::Scan(scan_errors));
    }

    let mut parser = Parser::new(tokens);
    let mut program = parser.parse_program();
    if !parser.errors().is_empty() {
        return Err(UnitError::Parse(parser.errors().to_vec()));
    }
    if trace.contains(&TracePhase::Parser) {
        eprintln!("-- parser --\n{program}");
    }

    if config.optimize {
        let opt_config = optimizer::OptimizerConfig { max_passes: config.max_passes };
        optimizer::optimize(&mut program, &opt_config);
    }
    if trace.contains(&TracePhase::Optimizer) {
        eprintln!("-- optimizer --\n{program}");
    }

    let compiler = Compiler::with_predefined_globals(&config.predefined_globals);
    let (main, constants, global_names) = compiler.compile_program(&program)?;
    if trace.contains(&TracePhase::Compiler) {
        eprintln!("-- compiler --\n{}", disassemble(&main, &constants));
    }

    Ok(CompiledUnit { main, constants, global_names })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_without_tracing() {
        let unit = compile_traced(b"1 + 2", 0, &CompilerConfig::default(), &[]).unwrap();
        assert!(!unit.main.instructions.is_empty());
    }
}
