//! Numeric binary operators (`Add`/`Sub`/`Mul`/`Div`/`Rem`/`Pow`, the
//! bitwise family, and ordered comparison), dispatched across
//! `Int`/`Uint`/`Float`/`Decimal` with the promotion rules spec.md's Open
//! Questions settle: mixing `Int`/`Uint` with `Float` or `Decimal`
//! promotes to the wider type; `Int`/`Uint` stay exact; division and
//! modulo by zero are runtime errors, never folded away at compile time.

use crate::decimal::Decimal;
use crate::error::{ErrorKind, RuntimeError};
use crate::value::Value;
use gad_core::Opcode;
use std::cmp::Ordering;

fn type_error(op: Opcode, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::Type,
        format!("cannot apply {op} to {} and {}", a.type_name(), b.type_name()),
    )
}

/// The common numeric type two operands should be combined in, widest
/// wins: `Decimal > Float > Uint > Int`. `None` if either side isn't
/// numeric at all.
enum Promoted {
    Int(i64, i64),
    Uint(u64, u64),
    Float(f64, f64),
    Decimal(Decimal, Decimal),
}

fn promote(a: &Value, b: &Value) -> Option<Promoted> {
    use Value::*;
    match (a, b) {
        (Decimal(_), _) | (_, Decimal(_)) => {
            let da = as_decimal(a)?;
            let db = as_decimal(b)?;
            Some(Promoted::Decimal(da, db))
        }
        (Float(_), _) | (_, Float(_)) => {
            let fa = as_f64(a)?;
            let fb = as_f64(b)?;
            Some(Promoted::Float(fa, fb))
        }
        (Int(x), Int(y)) => Some(Promoted::Int(*x, *y)),
        (Uint(x), Uint(y)) => Some(Promoted::Uint(*x, *y)),
        (Int(x), Uint(y)) => Some(Promoted::Int(*x, *y as i64)),
        (Uint(x), Int(y)) => Some(Promoted::Int(*x as i64, *y)),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Uint(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        Value::Decimal(d) => Some(d.to_f64()),
        _ => None,
    }
}

fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Int(n) => Some(Decimal::from_i64(*n)),
        Value::Uint(n) => Some(Decimal::from_i64(*n as i64)),
        Value::Decimal(d) => Some(*d),
        Value::Float(f) => Some(Decimal::from_i64(*f as i64)),
        _ => None,
    }
}

fn as_i64_bits(v: &Value) -> Option<i64> {
    match v {
        Value::Int(n) => Some(*n),
        Value::Uint(n) => Some(*n as i64),
        _ => None,
    }
}

pub fn binary_numeric(op: Opcode, a: Value, b: Value) -> Result<Value, RuntimeError> {
    use Opcode::*;
    match op {
        BitAnd | BitOr | BitXor | AndNot | Shl | Shr => {
            let (Some(x), Some(y)) = (as_i64_bits(&a), as_i64_bits(&b)) else {
                return Err(type_error(op, &a, &b));
            };
            let result = match op {
                BitAnd => x & y,
                BitOr => x | y,
                BitXor => x ^ y,
                AndNot => x & !y,
                Shl => x.wrapping_shl(y as u32),
                Shr => x.wrapping_shr(y as u32),
                _ => unreachable!(),
            };
            return Ok(Value::Int(result));
        }
        _ => {}
    }

    let Some(promoted) = promote(&a, &b) else {
        return Err(type_error(op, &a, &b));
    };

    match promoted {
        Promoted::Int(x, y) => match op {
            Add => Ok(Value::Int(x.wrapping_add(y))),
            Sub => Ok(Value::Int(x.wrapping_sub(y))),
            Mul => Ok(Value::Int(x.wrapping_mul(y))),
            Div => {
                if y == 0 {
                    Err(RuntimeError::new(ErrorKind::DivisionByZero, "division by zero"))
                } else {
                    Ok(Value::Int(x.wrapping_div(y)))
                }
            }
            Rem => {
                if y == 0 {
                    Err(RuntimeError::new(ErrorKind::DivisionByZero, "division by zero"))
                } else {
                    Ok(Value::Int(x.wrapping_rem(y)))
                }
            }
            Pow => Ok(Value::Int(x.wrapping_pow(y.max(0) as u32))),
            _ => Err(type_error(op, &a, &b)),
        },
        Promoted::Uint(x, y) => match op {
            Add => Ok(Value::Uint(x.wrapping_add(y))),
            Sub => Ok(Value::Uint(x.wrapping_sub(y))),
            Mul => Ok(Value::Uint(x.wrapping_mul(y))),
            Div => {
                if y == 0 {
                    Err(RuntimeError::new(ErrorKind::DivisionByZero, "division by zero"))
                } else {
                    Ok(Value::Uint(x.wrapping_div(y)))
                }
            }
            Rem => {
                if y == 0 {
                    Err(RuntimeError::new(ErrorKind::DivisionByZero, "division by zero"))
                } else {
                    Ok(Value::Uint(x.wrapping_rem(y)))
                }
            }
            Pow => Ok(Value::Uint(x.wrapping_pow(y as u32))),
            _ => Err(type_error(op, &a, &b)),
        },
        Promoted::Float(x, y) => match op {
            Add => Ok(Value::Float(x + y)),
            Sub => Ok(Value::Float(x - y)),
            Mul => Ok(Value::Float(x * y)),
            Div => {
                if y == 0.0 {
                    Err(RuntimeError::new(ErrorKind::DivisionByZero, "division by zero"))
                } else {
                    Ok(Value::Float(x / y))
                }
            }
            Rem => {
                if y == 0.0 {
                    Err(RuntimeError::new(ErrorKind::DivisionByZero, "division by zero"))
                } else {
                    Ok(Value::Float(x % y))
                }
            }
            Pow => Ok(Value::Float(x.powf(y))),
            _ => Err(type_error(op, &a, &b)),
        },
        Promoted::Decimal(x, y) => match op {
            Add => Ok(Value::Decimal(x.add(y))),
            Sub => Ok(Value::Decimal(x.sub(y))),
            Mul => Ok(Value::Decimal(x.mul(y))),
            Div => x
                .div(y)
                .map(Value::Decimal)
                .ok_or_else(|| RuntimeError::new(ErrorKind::DivisionByZero, "division by zero")),
            Rem => x
                .rem(y)
                .map(Value::Decimal)
                .ok_or_else(|| RuntimeError::new(ErrorKind::DivisionByZero, "division by zero")),
            Pow => {
                let mut result = Decimal::from_i64(1);
                let exp = y.to_f64() as i64;
                for _ in 0..exp.max(0) {
                    result = result.mul(x);
                }
                Ok(Value::Decimal(result))
            }
            _ => Err(type_error(op, &a, &b)),
        },
    }
}

pub fn compare(op: Opcode, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    use Opcode::*;
    let ordering = match (a, b) {
        (Value::Str(x), Value::Str(y))
        | (Value::RawStr(x), Value::RawStr(y))
        | (Value::Str(x), Value::RawStr(y))
        | (Value::RawStr(x), Value::Str(y)) => x.as_ref().cmp(y.as_ref()),
        (Value::Char(x), Value::Char(y)) => x.cmp(y),
        _ => match promote(a, b) {
            Some(Promoted::Int(x, y)) => x.cmp(&y),
            Some(Promoted::Uint(x, y)) => x.cmp(&y),
            Some(Promoted::Float(x, y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            Some(Promoted::Decimal(x, y)) => x.cmp(&y),
            None => return Err(type_error(op, a, b)),
        },
    };
    Ok(match op {
        Less => ordering == Ordering::Less,
        LessEq => ordering != Ordering::Greater,
        Greater => ordering == Ordering::Greater,
        GreaterEq => ordering != Ordering::Less,
        _ => unreachable!("compare called with non-comparison opcode"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_division_by_zero_errors() {
        let err = binary_numeric(Opcode::Div, Value::Int(1), Value::Int(0)).unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn int_and_float_promote_to_float() {
        let v = binary_numeric(Opcode::Add, Value::Int(1), Value::Float(0.5)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 1.5));
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        assert!(compare(Opcode::Less, &Value::str("a"), &Value::str("b")).unwrap());
    }

    #[test]
    fn decimal_division_by_zero_errors() {
        let err = binary_numeric(Opcode::Div, Value::Decimal(Decimal::from_i64(1)), Value::Decimal(Decimal::zero()))
            .unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::DivisionByZero);
    }
}
