//! Nested name resolution: a scope stack with separate value and type
//! namespaces, unsafe/loop flags, and per-variable moved state.

use crate::types::{FunctionSig, Type};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum Symbol {
    Variable {
        ty: Type,
        is_mut: bool,
        moved: bool,
    },
    /// A function name with its overload set.
    Function { overloads: Vec<FunctionSig> },
    Module { name: String },
}

#[derive(Debug, Default)]
pub struct Scope {
    names: HashMap<String, Symbol>,
    types: HashMap<String, Type>,
    pub is_unsafe: bool,
    pub is_loop: bool,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

/// Saved moved-flags of every variable visible at a branch point,
/// identified by (scope depth, name). Scope depths above the snapshot
/// point are stable while the branch body is checked.
pub type MovedSnapshot = Vec<(usize, String, bool)>;

impl ScopeStack {
    pub fn new() -> Self {
        let mut stack = Self { scopes: Vec::new() };
        stack.push(false, false); // module scope
        stack
    }

    pub fn push(&mut self, is_unsafe: bool, is_loop: bool) {
        self.scopes.push(Scope {
            is_unsafe,
            is_loop,
            ..Scope::default()
        });
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare a value symbol in the innermost scope. Re-declaring a
    /// variable shadows the old binding (and clears its moved flag).
    pub fn declare(&mut self, name: &str, symbol: Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_string(), symbol);
        }
    }

    pub fn declare_type(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.types.insert(name.to_string(), ty);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.names.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.names.get_mut(name))
    }

    pub fn lookup_type(&self, name: &str) -> Option<&Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.types.get(name))
    }

    /// Declared in the module (outermost) scope — used for collection.
    pub fn declare_global(&mut self, name: &str, symbol: Symbol) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.names.insert(name.to_string(), symbol);
        }
    }

    pub fn declare_global_type(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.types.insert(name.to_string(), ty);
        }
    }

    pub fn inside_unsafe(&self) -> bool {
        self.scopes.iter().rev().any(|scope| scope.is_unsafe)
    }

    pub fn inside_loop(&self) -> bool {
        self.scopes.iter().rev().any(|scope| scope.is_loop)
    }

    /// Every visible value name, for did-you-mean suggestions.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.names.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn visible_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.types.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    // ==================== move tracking ====================

    pub fn mark_moved(&mut self, name: &str, moved: bool) {
        if let Some(Symbol::Variable { moved: flag, .. }) = self.lookup_mut(name) {
            *flag = moved;
        }
    }

    pub fn is_moved(&self, name: &str) -> bool {
        matches!(self.lookup(name), Some(Symbol::Variable { moved: true, .. }))
    }

    /// Snapshot the moved flag of every visible variable.
    pub fn moved_snapshot(&self) -> MovedSnapshot {
        let mut snapshot = Vec::new();
        for (depth, scope) in self.scopes.iter().enumerate() {
            for (name, symbol) in &scope.names {
                if let Symbol::Variable { moved, .. } = symbol {
                    snapshot.push((depth, name.clone(), *moved));
                }
            }
        }
        snapshot
    }

    /// Reset moved flags to a snapshot. Variables declared after the
    /// snapshot (deeper or newer) are untouched; they go out of scope
    /// with their block anyway.
    pub fn restore_moved(&mut self, snapshot: &MovedSnapshot) {
        for (depth, name, moved) in snapshot {
            if let Some(scope) = self.scopes.get_mut(*depth) {
                if let Some(Symbol::Variable { moved: flag, .. }) = scope.names.get_mut(name) {
                    *flag = *moved;
                }
            }
        }
    }

    /// Conservative join: a variable is moved after the construct if any
    /// branch outcome marked it moved.
    pub fn join_moved(&mut self, outcomes: &[MovedSnapshot]) {
        for outcome in outcomes {
            for (depth, name, moved) in outcome {
                if !moved {
                    continue;
                }
                if let Some(scope) = self.scopes.get_mut(*depth) {
                    if let Some(Symbol::Variable { moved: flag, .. }) = scope.names.get_mut(name)
                    {
                        *flag = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::I32;

    fn var(ty: Type) -> Symbol {
        Symbol::Variable {
            ty,
            is_mut: false,
            moved: false,
        }
    }

    #[test]
    fn test_lookup_climbs_scopes() {
        let mut stack = ScopeStack::new();
        stack.declare("a", var(I32));
        stack.push(false, false);
        stack.declare("b", var(I32));
        assert!(stack.lookup("a").is_some());
        assert!(stack.lookup("b").is_some());
        stack.pop();
        assert!(stack.lookup("b").is_none());
    }

    #[test]
    fn test_shadowing_clears_moved() {
        let mut stack = ScopeStack::new();
        stack.declare("a", var(I32));
        stack.mark_moved("a", true);
        assert!(stack.is_moved("a"));
        stack.declare("a", var(I32));
        assert!(!stack.is_moved("a"));
    }

    #[test]
    fn test_unsafe_flag_climbs() {
        let mut stack = ScopeStack::new();
        assert!(!stack.inside_unsafe());
        stack.push(true, false);
        stack.push(false, false);
        assert!(stack.inside_unsafe());
        stack.pop();
        stack.pop();
        assert!(!stack.inside_unsafe());
    }

    #[test]
    fn test_branch_join_is_conservative() {
        let mut stack = ScopeStack::new();
        stack.declare("a", var(I32));
        stack.declare("b", var(I32));

        let base = stack.moved_snapshot();

        // then-branch moves a
        stack.mark_moved("a", true);
        let after_then = stack.moved_snapshot();
        stack.restore_moved(&base);

        // else-branch moves b
        stack.mark_moved("b", true);
        let after_else = stack.moved_snapshot();
        stack.restore_moved(&base);

        stack.join_moved(&[after_then, after_else]);
        assert!(stack.is_moved("a"));
        assert!(stack.is_moved("b"));
    }
}
