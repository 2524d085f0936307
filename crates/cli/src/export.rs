//! Backs `-module` (spec.md §6): instead of just running the script,
//! print its top-level globals as a JSON object, the way a host would
//! introspect a script meant to be imported as a module rather than run
//! as a program.

use gad_runtime::value::DictMap;
use gad_runtime::Value;
use serde_json::{Map, Number};

pub fn globals_to_json(names: &[String], globals: &DictMap) -> serde_json::Value {
    let mut map = Map::new();
    for name in names {
        if let Some(value) = globals.get(name) {
            map.insert(name.clone(), value_to_json(value));
        }
    }
    serde_json::Value::Object(map)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) | Value::Flag(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Uint(u) => serde_json::Value::Number(Number::from(*u)),
        Value::Float(f) => Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::Char(c) => serde_json::Value::String(c.to_string()),
        Value::Str(s) | Value::RawStr(s) => serde_json::Value::String(s.to_string()),
        Value::Array(items) => {
            serde_json::Value::Array(items.borrow().iter().map(value_to_json).collect())
        }
        Value::Dict(dict) => {
            let mut map = Map::new();
            for (k, v) in dict.borrow().iter() {
                map.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(map)
        }
        // Non-data values (closures, builtins, errors, handles, decimals)
        // have no lossless JSON form; fall back to their display text.
        other => serde_json::Value::String(other.display_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_primitives_and_arrays() {
        let mut globals = DictMap::new();
        globals.insert("n".to_string(), Value::Int(42));
        globals.insert("xs".to_string(), Value::array(vec![Value::Int(1), Value::Int(2)]));
        let json = globals_to_json(&["n".to_string(), "xs".to_string()], &globals);
        assert_eq!(json["n"], serde_json::json!(42));
        assert_eq!(json["xs"], serde_json::json!([1, 2]));
    }
}
