//! Renders scanner/parser/compiler errors against a [`gad_core::SourceMap`]
//! in the spec.md §7 user-visible format: a kind/message line followed by
//! a `file:line:column` location and a source excerpt with a caret.

use gad_core::SourceMap;
use gadc::UnitError;

fn render_one(map: &SourceMap, kind: &str, pos: gad_core::Pos, message: &str) -> String {
    let position = map.position(pos);
    let file = map.file(position.file).name();
    let mut out = format!("{kind}: {message}\n  at {file}:{position}\n");
    out.push_str(&indent(&map.render_trace(position, 1)));
    out
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {l}\n")).collect()
}

/// Renders every error accumulated for one compile unit, in encounter
/// order (spec.md §7: scan/parse phases accumulate and report together).
pub fn render_unit_error(map: &SourceMap, err: &UnitError) -> String {
    match err {
        UnitError::Scan(errors) => errors
            .iter()
            .map(|e| render_one(map, "ScanError", e.pos, &e.message))
            .collect::<Vec<_>>()
            .join("\n"),
        UnitError::Parse(errors) => errors
            .iter()
            .map(|e| render_one(map, "ParseError", e.pos, &e.message))
            .collect::<Vec<_>>()
            .join("\n"),
        UnitError::Compile(e) => render_one(map, "CompileError", e.pos, &e.message),
    }
}
