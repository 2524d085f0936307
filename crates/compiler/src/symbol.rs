//! Lexical scope resolution: classifies every identifier reference as a
//! builtin, a global, a local slot, or a free variable captured from an
//! enclosing function, promoting captures across nested scopes as
//! needed.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Builtin,
    Global,
    Local,
    Free,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub scope: ScopeKind,
    pub index: u16,
}

struct Scope {
    symbols: HashMap<String, Symbol>,
    /// Free variables captured into this scope, in capture order; each
    /// entry names which slot of the *parent* scope it was sourced from.
    free_symbols: Vec<Symbol>,
    num_definitions: u16,
    is_function: bool,
}

impl Scope {
    fn new(is_function: bool) -> Self {
        Scope {
            symbols: HashMap::new(),
            free_symbols: Vec::new(),
            num_definitions: 0,
            is_function,
        }
    }
}

/// A stack of scopes, walked once per function body. The outermost scope
/// is the global scope; builtin names are registered into it with
/// `ScopeKind::Builtin` up front.
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::new(false)],
        }
    }

    pub fn define_builtin(&mut self, index: u16, name: &str) {
        let symbol = Symbol {
            name: name.to_string(),
            scope: ScopeKind::Builtin,
            index,
        };
        self.scopes[0].symbols.insert(name.to_string(), symbol);
    }

    pub fn enter_function_scope(&mut self) {
        self.scopes.push(Scope::new(true));
    }

    pub fn enter_block_scope(&mut self) {
        self.scopes.push(Scope::new(false));
    }

    pub fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn is_global(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Defines a new name in the innermost scope, returning its symbol.
    /// Global-scope definitions get `ScopeKind::Global`; any other scope
    /// gets `ScopeKind::Local` (even non-function block scopes share
    /// their enclosing function's local slot space by the caller
    /// incrementing from the function scope's counter, see `compiler.rs`
    /// which flattens block scopes' locals into the owning function's
    /// frame).
    pub fn define(&mut self, name: &str) -> Symbol {
        let depth = self.scopes.len();
        let is_global_scope = depth == 1;
        let scope = self.scopes.last_mut().unwrap();
        let index = scope.num_definitions;
        scope.num_definitions += 1;
        let kind = if is_global_scope {
            ScopeKind::Global
        } else {
            ScopeKind::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope: kind,
            index,
        };
        scope.symbols.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Resolves a name, walking outward from the innermost scope.
    /// Crossing a function-scope boundary promotes the symbol to
    /// `ScopeKind::Free` and records the capture in every intervening
    /// function scope, so a doubly-nested closure captures through its
    /// immediate parent rather than reaching past it.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        self.resolve_from(self.scopes.len() - 1, name)
    }

    fn resolve_from(&mut self, depth: usize, name: &str) -> Option<Symbol> {
        if let Some(sym) = self.scopes[depth].symbols.get(name).cloned() {
            return Some(sym);
        }
        if depth == 0 {
            return None;
        }
        let parent = self.resolve_from(depth - 1, name)?;
        match parent.scope {
            ScopeKind::Builtin | ScopeKind::Global => {
                // Visible everywhere without capture machinery.
                self.scopes[depth].symbols.insert(name.to_string(), parent.clone());
                Some(parent)
            }
            ScopeKind::Local | ScopeKind::Free => {
                if self.scopes[depth].is_function {
                    let free_index = self.scopes[depth].free_symbols.len() as u16;
                    self.scopes[depth].free_symbols.push(parent);
                    let sym = Symbol {
                        name: name.to_string(),
                        scope: ScopeKind::Free,
                        index: free_index,
                    };
                    self.scopes[depth].symbols.insert(name.to_string(), sym.clone());
                    Some(sym)
                } else {
                    // Non-function block scope: the symbol is visible as-is,
                    // no capture bookkeeping needed.
                    self.scopes[depth].symbols.insert(name.to_string(), parent.clone());
                    Some(parent)
                }
            }
        }
    }

    /// The free-variable symbols captured into the current (innermost)
    /// function scope, in capture order; consumed by the compiler to
    /// emit `OpClosure`'s free-variable source list.
    pub fn free_symbols(&self) -> &[Symbol] {
        &self.scopes.last().unwrap().free_symbols
    }

    pub fn num_definitions(&self) -> u16 {
        self.scopes.last().unwrap().num_definitions
    }

    /// Global-scope names in definition-index order, used by the VM to
    /// expose a module's globals as a name-keyed value once it has
    /// finished running (spec.md §4 Open Questions: `global` writes must
    /// stay visible across an import boundary).
    pub fn global_names(&self) -> Vec<String> {
        let root = &self.scopes[0];
        let mut names: Vec<(u16, &str)> = root
            .symbols
            .values()
            .filter(|s| s.scope == ScopeKind::Global)
            .map(|s| (s.index, s.name.as_str()))
            .collect();
        names.sort_by_key(|(i, _)| *i);
        names.into_iter().map(|(_, n)| n.to_string()).collect()
    }

    /// Builds a table that shares only the root (builtin + global) scope,
    /// used to compile named-parameter default-value expressions, which
    /// may reference globals and builtins but not sibling parameters or
    /// enclosing closures (a default runs before the rest of the frame's
    /// locals exist).
    pub fn snapshot_root(&self) -> SymbolTable {
        let root = &self.scopes[0];
        SymbolTable {
            scopes: vec![Scope {
                symbols: root.symbols.clone(),
                free_symbols: Vec::new(),
                num_definitions: root.num_definitions,
                is_function: false,
            }],
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_define_and_resolve() {
        let mut table = SymbolTable::new();
        let sym = table.define("x");
        assert_eq!(sym.scope, ScopeKind::Global);
        assert_eq!(table.resolve("x").unwrap().scope, ScopeKind::Global);
    }

    #[test]
    fn local_shadows_global() {
        let mut table = SymbolTable::new();
        table.define("x");
        table.enter_function_scope();
        let local = table.define("x");
        assert_eq!(local.scope, ScopeKind::Local);
        assert_eq!(table.resolve("x").unwrap().scope, ScopeKind::Local);
    }

    #[test]
    fn nested_function_captures_as_free() {
        let mut table = SymbolTable::new();
        table.enter_function_scope();
        table.define("x");
        table.enter_function_scope();
        let resolved = table.resolve("x").unwrap();
        assert_eq!(resolved.scope, ScopeKind::Free);
        assert_eq!(table.free_symbols().len(), 1);
    }

    #[test]
    fn builtin_visible_without_capture() {
        let mut table = SymbolTable::new();
        table.define_builtin(0, "len");
        table.enter_function_scope();
        table.enter_function_scope();
        let resolved = table.resolve("len").unwrap();
        assert_eq!(resolved.scope, ScopeKind::Builtin);
        assert!(table.free_symbols().is_empty());
    }

    #[test]
    fn unresolved_name_is_none() {
        let mut table = SymbolTable::new();
        assert!(table.resolve("nope").is_none());
    }

    #[test]
    fn global_names_are_in_definition_order() {
        let mut table = SymbolTable::new();
        table.define("b");
        table.define("a");
        assert_eq!(table.global_names(), vec!["b".to_string(), "a".to_string()]);
    }
}
