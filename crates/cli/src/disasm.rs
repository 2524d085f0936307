//! Bytecode disassembly: a flat, human-readable instruction listing used
//! by `-trace=compiler` and the REPL's `.bytecode` command.

use gad_core::bytecode::read_operands;
use gad_core::{CompiledFunction, Constant, Opcode};

pub fn disassemble(main: &CompiledFunction, constants: &[Constant]) -> String {
    let mut out = String::new();
    disassemble_one(main, constants, "main", &mut out);
    for (i, c) in constants.iter().enumerate() {
        if let Constant::Function(f) = c {
            let label = f.name.clone().unwrap_or_else(|| format!("const[{i}]"));
            disassemble_one(f, constants, &label, &mut out);
        }
    }
    out
}

fn disassemble_one(func: &CompiledFunction, constants: &[Constant], label: &str, out: &mut String) {
    out.push_str(&format!("== {label} ==\n"));
    let buf = &func.instructions;
    let mut pc = 0u32;
    while (pc as usize) < buf.len() {
        let Some(op) = Opcode::from_u8(buf[pc as usize]) else {
            out.push_str(&format!("{pc:>6}  <bad opcode {}>\n", buf[pc as usize]));
            break;
        };
        let (operands, next) = read_operands(op, buf, pc + 1);
        let mut line = format!("{pc:>6}  {op}");
        for operand in &operands {
            line.push_str(&format!(" {operand}"));
        }
        if matches!(op, Opcode::PushConst) {
            if let Some(c) = constants.get(operands[0] as usize) {
                line.push_str(&format!("   ; {}", describe_constant(c)));
            }
        }
        out.push_str(&line);
        out.push('\n');
        pc = next;
    }
}

fn describe_constant(c: &Constant) -> String {
    match c {
        Constant::Int(v) => v.to_string(),
        Constant::Uint(v) => format!("{v}u"),
        Constant::Float(v) => v.to_string(),
        Constant::Decimal(m, s) => format!("{m}e-{s}d"),
        Constant::Str(s) => format!("{s:?}"),
        Constant::Bytes(b) => format!("<{} bytes>", b.len()),
        Constant::Function(f) => format!("<function {}>", f.name.as_deref().unwrap_or("anonymous")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gad_core::bytecode::{emit, Opcode as Op};

    #[test]
    fn disassembles_push_const_with_constant_comment() {
        let mut func = CompiledFunction::new(Default::default());
        emit(&mut func.instructions, Op::PushConst, &[0]);
        emit(&mut func.instructions, Op::ReturnNil, &[]);
        let constants = vec![Constant::Int(42)];
        let text = disassemble(&func, &constants);
        assert!(text.contains("PushConst"));
        assert!(text.contains("; 42"));
        assert!(text.contains("ReturnNil"));
    }
}
