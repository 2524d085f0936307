//! Turns a script's trailing command-line arguments into the `Args`
//! array and `NamedArgs` dict exposed to the running program (spec.md
//! §6: "trailing arguments become positional; `--NAME=VALUE` become
//! named; `--NAME` alone becomes `NAME=yes`").

use gad_runtime::value::DictMap;
use gad_runtime::Value;

pub struct ScriptArgs {
    pub positional: Vec<Value>,
    pub named: DictMap,
}

pub fn parse(args: &[String]) -> ScriptArgs {
    let mut positional = Vec::new();
    let mut named = DictMap::new();
    for arg in args {
        if let Some(rest) = arg.strip_prefix("--") {
            match rest.split_once('=') {
                Some((name, value)) => {
                    named.insert(name.to_string(), Value::str(value));
                }
                None => {
                    named.insert(rest.to_string(), Value::Flag(true));
                }
            }
        } else {
            positional.push(Value::str(arg.as_str()));
        }
    }
    ScriptArgs { positional, named }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_args_become_strings() {
        let parsed = parse(&["one".to_string(), "two".to_string()]);
        assert_eq!(parsed.positional.len(), 2);
        assert_eq!(parsed.positional[0].display_string(), "one");
    }

    #[test]
    fn named_value_arg_splits_on_equals() {
        let parsed = parse(&["--name=value".to_string()]);
        assert_eq!(parsed.named.get("name").unwrap().display_string(), "value");
    }

    #[test]
    fn bare_named_flag_becomes_yes() {
        let parsed = parse(&["--verbose".to_string()]);
        assert_eq!(parsed.named.get("verbose").unwrap().display_string(), "yes");
    }

    #[test]
    fn mixed_positional_and_named() {
        let parsed = parse(&["a.txt".to_string(), "--force".to_string(), "b.txt".to_string()]);
        assert_eq!(parsed.positional.len(), 2);
        assert!(parsed.named.contains_key("force"));
    }
}
