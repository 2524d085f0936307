//! Compiler configuration: in-source `# gad:` directives and the
//! compile-time options they (or CLI flags) can set.

use std::collections::HashMap;

/// Options controlling a single compile, settable from CLI flags
/// (`gad-cli`) or from in-source `# gad:` directives.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Run the optimizer's constant-folding/dead-code passes.
    pub optimize: bool,
    /// Upper bound on optimizer fixpoint iterations.
    pub max_passes: u8,
    /// Scan source in mixed text/code mode.
    pub mixed_mode: bool,
    /// Delimiters for mixed mode, when enabled.
    pub mixed_start: String,
    pub mixed_end: String,
    /// Global-scope names pre-declared before compiling, so a script may
    /// reference them without assigning first (spec.md §6: `Args` and
    /// `NamedArgs`, populated by the CLI from script invocation args).
    pub predefined_globals: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            optimize: true,
            max_passes: 3,
            mixed_mode: false,
            mixed_start: "{{".to_string(),
            mixed_end: "}}".to_string(),
            predefined_globals: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Applies the key=value pairs from a single `# gad:` directive line
    /// (the leading `# gad:` has already been stripped by the caller).
    pub fn apply_directive(&mut self, body: &str) {
        for pair in parse_directive_pairs(body) {
            match pair.0.as_str() {
                "optimize" => self.optimize = pair.1 != "false" && pair.1 != "0",
                "max_passes" => {
                    if let Ok(n) = pair.1.parse() {
                        self.max_passes = n;
                    }
                }
                "mixed" => self.mixed_mode = pair.1 != "false" && pair.1 != "0",
                "mixed_start" => self.mixed_start = unquote(&pair.1),
                "mixed_end" => self.mixed_end = unquote(&pair.1),
                _ => {}
            }
        }
    }
}

/// Parses a directive body of the form `key=value key2=value2` (values
/// may be bare words or quoted strings) into ordered key/value pairs.
fn parse_directive_pairs(body: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let bytes = body.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if key_start == i {
            break;
        }
        let key = body[key_start..i].to_string();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            let val_start = i;
            if i < bytes.len() && bytes[i] == b'"' {
                i += 1;
                let inner_start = i;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                let val = body[inner_start..i].to_string();
                if i < bytes.len() {
                    i += 1;
                }
                pairs.push((key, val));
            } else {
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                pairs.push((key, body[val_start..i].to_string()));
            }
        } else {
            pairs.push((key, "true".to_string()));
        }
    }
    pairs
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

/// Optional `.gadrc.toml` for REPL/CLI defaults: history file location
/// and module search-path overrides. Parsed with `toml`; absent from
/// in-source directives, which only ever affect a single compile.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct GadRc {
    pub history_file: Option<String>,
    #[serde(default)]
    pub module_paths: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl GadRc {
    pub fn parse(toml_src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_sets_optimize_off() {
        let mut cfg = CompilerConfig::new();
        cfg.apply_directive("optimize=false");
        assert!(!cfg.optimize);
    }

    #[test]
    fn directive_parses_quoted_mixed_delimiters() {
        let mut cfg = CompilerConfig::new();
        cfg.apply_directive(r#"mixed=true mixed_start="<%" mixed_end="%>""#);
        assert!(cfg.mixed_mode);
        assert_eq!(cfg.mixed_start, "<%");
        assert_eq!(cfg.mixed_end, "%>");
    }

    #[test]
    fn directive_parses_max_passes() {
        let mut cfg = CompilerConfig::new();
        cfg.apply_directive("max_passes=5");
        assert_eq!(cfg.max_passes, 5);
    }

    #[test]
    fn gadrc_parses_from_toml() {
        let rc = GadRc::parse(
            r#"
            history_file = "~/.gad_history"
            module_paths = ["./lib", "./vendor"]
            "#,
        )
        .unwrap();
        assert_eq!(rc.history_file.as_deref(), Some("~/.gad_history"));
        assert_eq!(rc.module_paths.len(), 2);
    }
}
