//! Runs one script to completion: reads source, compiles it, seeds
//! `Args`/`NamedArgs`, wires `-timeout`/SIGINT into [`gad_runtime::Vm`]
//! abort, runs it, and renders whatever error surfaces (spec.md §6/§7).

use crate::args;
use crate::diagnostics::render_unit_error;
use crate::pipeline::{compile_traced, TracePhase};
use crate::resolver;
use gad_core::SourceMap;
use gad_runtime::Value;
use gad_runtime::Vm;
use gadc::CompilerConfig;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Duration;

pub struct RunOptions<'a> {
    pub script: &'a str,
    pub script_args: &'a [String],
    pub trace: &'a [TracePhase],
    pub no_optimizer: bool,
    pub safe: bool,
    pub module: bool,
    pub disabled_modules: &'a [String],
    pub timeout: Option<Duration>,
}

/// Runs `opts.script` and returns the process exit code.
pub fn run(opts: RunOptions) -> i32 {
    let (name, bytes, work_dir) = match read_source(opts.script) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("gad: {}: {e}", opts.script);
            return 1;
        }
    };

    let mut source_map = SourceMap::new();
    let file_idx = source_map.add_file(name, bytes.clone());
    let base = source_map.file(file_idx).base();

    let args::ScriptArgs { positional, named } = args::parse(opts.script_args);

    let mut config = CompilerConfig::new();
    config.optimize = !opts.no_optimizer;
    config.predefined_globals = vec!["Args".to_string(), "NamedArgs".to_string()];

    let unit = match compile_traced(&bytes, base, &config, opts.trace) {
        Ok(unit) => unit,
        Err(err) => {
            eprint!("{}", render_unit_error(&source_map, &err));
            return 1;
        }
    };

    let resolver = resolver::build(opts.safe, opts.disabled_modules);
    let mut vm = Vm::new(work_dir, Rc::new(resolver));
    vm.globals().borrow_mut().insert("Args".to_string(), Value::array(positional));
    vm.globals().borrow_mut().insert("NamedArgs".to_string(), Value::dict(named));

    let _sigint = signal_hook::flag::register(signal_hook::consts::SIGINT, vm.abort_flag());

    if let Some(timeout) = opts.timeout {
        let flag = vm.abort_flag();
        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            flag.store(true, Ordering::SeqCst);
        });
    }

    let global_names = unit.global_names.clone();
    let result = vm.run(std::sync::Arc::new(unit.main), unit.constants, unit.global_names, source_map.clone());
    match result {
        Ok(_) => {
            if opts.module {
                let globals = vm.globals().borrow();
                let json = crate::export::globals_to_json(&global_names, &globals);
                println!("{}", serde_json::to_string_pretty(&json).expect("JSON values never fail to serialize"));
            }
            0
        }
        Err(err) => {
            eprint!("{}", err.0.render(&source_map));
            1
        }
    }
}

fn read_source(script: &str) -> std::io::Result<(String, Vec<u8>, PathBuf)> {
    if script == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(("<stdin>".to_string(), buf, std::env::current_dir()?))
    } else {
        let path = Path::new(script);
        let bytes = std::fs::read(path)?;
        let work_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((script.to_string(), bytes, work_dir))
    }
}

/// Parses `-timeout`'s `DURATION` value: a bare integer (seconds) or an
/// integer suffixed with `ms`, `s`, or `m` (spec.md §6).
pub fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => raw.split_at(i),
        None => (raw, "s"),
    };
    let amount: u64 = digits.parse().map_err(|_| format!("invalid timeout: {raw:?}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" | "" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        other => Err(format!("invalid timeout unit: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_timeout("5").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn parses_millisecond_suffix() {
        assert_eq!(parse_timeout("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn parses_minute_suffix() {
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timeout("banana").is_err());
    }
}
