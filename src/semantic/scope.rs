use std::collections::HashMap;

use super::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Variable,
    Function { params: Vec<Type> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn variable(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            kind: SymbolKind::Variable,
        }
    }

    pub fn function(name: impl Into<String>, ret: Type, params: Vec<Type>) -> Self {
        Self {
            name: name.into(),
            ty: ret,
            kind: SymbolKind::Function { params },
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. })
    }
}

/// Stack of lexical scopes. The bottom scope is the root and is never popped.
///
/// Generic over the entry so the code generator can track its own lowered
/// locals with the same push/declare/resolve discipline as the analyzer.
#[derive(Debug, Clone)]
pub struct SymbolTable<T> {
    scopes: Vec<HashMap<String, T>>,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Returns false when `name` already exists in the innermost scope.
    pub fn declare(&mut self, name: impl Into<String>, entry: T) -> bool {
        let name = name.into();
        let Some(scope) = self.scopes.last_mut() else {
            return false;
        };
        if scope.contains_key(&name) {
            return false;
        }
        scope.insert(name, entry);
        true
    }

    pub fn resolve(&self, name: &str) -> Option<&T> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        assert!(table.declare("x", Symbol::variable("x", Type::INT)));
        assert!(!table.declare("x", Symbol::variable("x", Type::FLOAT)));
        assert_eq!(table.resolve("x").map(|s| s.ty), Some(Type::INT));
    }

    #[test]
    fn inner_scope_shadows_and_restores() {
        let mut table = SymbolTable::new();
        table.declare("x", Symbol::variable("x", Type::INT));

        table.push_scope();
        assert!(table.declare("x", Symbol::variable("x", Type::STR)));
        assert_eq!(table.resolve("x").map(|s| s.ty), Some(Type::STR));
        table.pop_scope();

        assert_eq!(table.resolve("x").map(|s| s.ty), Some(Type::INT));
    }

    #[test]
    fn root_scope_survives_extra_pops() {
        let mut table: SymbolTable<u32> = SymbolTable::new();
        table.declare("main", 1);
        table.pop_scope();
        table.pop_scope();
        assert_eq!(table.depth(), 1);
        assert_eq!(table.resolve("main"), Some(&1));
        assert!(table.resolve("missing").is_none());
    }
}
