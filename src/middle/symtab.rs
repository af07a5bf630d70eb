//! Symbol table: a tree of lexical scopes with name → symbol bindings.
//!
//! Scopes and symbols live in arenas owned by the [`SymbolTable`] and
//! refer to each other through typed indices, so the parent/child and
//! symbol→scope back-edges never form owning cycles. Shadowing across
//! parent scopes is permitted; a name is unique within one scope.

use hashbrown::HashMap;
use thiserror::Error;

use crate::frontend::ast::LiteralValue;
use crate::frontend::position::Position;
use crate::index::{simple_index, IndexVec};
use crate::middle::ty::Type;

simple_index! {
    pub struct ScopeId;
}

simple_index! {
    pub struct SymbolId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    Loop,
    Switch,
    Struct,
}

impl core::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ScopeKind::Global => "global",
            ScopeKind::Function => "function",
            ScopeKind::Block => "block",
            ScopeKind::Loop => "loop",
            ScopeKind::Switch => "switch",
            ScopeKind::Struct => "struct",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Parameter,
    TypeAlias,
    Struct,
    Field,
    Package,
}

impl core::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Function => "function",
            SymbolKind::Parameter => "parameter",
            SymbolKind::TypeAlias => "type",
            SymbolKind::Struct => "struct",
            SymbolKind::Field => "field",
            SymbolKind::Package => "package",
        };
        f.write_str(text)
    }
}

/// A named entity in the program.
#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub pos: Position,
    /// The scope this symbol was defined in; set by `define`
    pub scope: Option<ScopeId>,
    pub constant: bool,
    /// Set when the symbol is resolved through `lookup`
    pub used: bool,
    /// Compile-time value, only meaningful for constants
    pub value: Option<LiteralValue>,
    /// Field symbols by name, only for struct symbols
    pub fields: Option<HashMap<String, SymbolId>>,
    /// 0-based insertion order within the owning scope; parameters carry
    /// their positional index, fields their declared index
    pub index: usize,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: Type, pos: Position) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            pos,
            scope: None,
            constant: false,
            used: false,
            value: None,
            fields: None,
            index: 0,
        }
    }

    /// Constants, functions and types can not be assigned to.
    pub fn can_assign(&self) -> bool {
        !self.constant && matches!(self.kind, SymbolKind::Variable | SymbolKind::Parameter)
    }
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// Locally declared symbols in insertion order
    symbols: Vec<SymbolId>,
    by_name: HashMap<String, SymbolId>,
    pub children: Vec<ScopeId>,
    /// The function symbol this scope belongs to, if any
    pub function: Option<SymbolId>,
    pub depth: usize,
}

/// Arena holding every scope and symbol of one compilation unit.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: IndexVec<ScopeId, Scope>,
    symbols: IndexVec<SymbolId, Symbol>,
}

impl SymbolTable {
    /// Creates the table with its global scope.
    pub fn new() -> (SymbolTable, ScopeId) {
        let mut table = SymbolTable {
            scopes: IndexVec::new(),
            symbols: IndexVec::new(),
        };

        let global = table.scopes.push(Scope {
            kind: ScopeKind::Global,
            parent: None,
            symbols: Vec::new(),
            by_name: HashMap::new(),
            children: Vec::new(),
            function: None,
            depth: 0,
        });

        (table, global)
    }

    /// Opens a child scope. Non-function scopes inherit the enclosing
    /// function symbol.
    pub fn push_scope(&mut self, kind: ScopeKind, parent: ScopeId) -> ScopeId {
        let function = if kind == ScopeKind::Function {
            None
        } else {
            self.scopes[parent].function
        };
        let depth = self.scopes[parent].depth + 1;

        let scope = self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            symbols: Vec::new(),
            by_name: HashMap::new(),
            children: Vec::new(),
            function,
            depth,
        });

        self.scopes[parent].children.push(scope);
        scope
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn set_scope_function(&mut self, scope: ScopeId, function: Option<SymbolId>) {
        self.scopes[scope].function = function;
    }

    /// Adds a symbol to `scope`. Fails when the name is already bound in
    /// that same scope (shadowing an outer scope is fine); on success
    /// the symbol receives its scope back-pointer and local index.
    pub fn define(&mut self, scope: ScopeId, symbol: Symbol) -> Result<SymbolId, DuplicateSymbol> {
        if let Some(&existing) = self.scopes[scope].by_name.get(&symbol.name) {
            return Err(DuplicateSymbol {
                name: symbol.name.clone(),
                previous: self.symbols[existing].pos.clone(),
            });
        }

        let index = self.scopes[scope].symbols.len();
        let name = symbol.name.clone();

        let id = self.symbols.push(Symbol {
            scope: Some(scope),
            index,
            ..symbol
        });

        let entry = &mut self.scopes[scope];
        entry.symbols.push(id);
        entry.by_name.insert(name, id);

        Ok(id)
    }

    /// Resolves `name` starting at `scope` and walking up the parents.
    /// The returned symbol is marked as used.
    pub fn lookup(&mut self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);

        while let Some(id) = current {
            if let Some(&symbol) = self.scopes[id].by_name.get(name) {
                self.symbols[symbol].used = true;
                return Some(symbol);
            }
            current = self.scopes[id].parent;
        }

        None
    }

    /// Resolves `name` in `scope` only, without touching the used flag.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope].by_name.get(name).copied()
    }

    /// The nearest enclosing function scope, `scope` included.
    pub fn find_enclosing_function(&self, scope: ScopeId) -> Option<ScopeId> {
        self.find_enclosing(scope, |kind| kind == ScopeKind::Function)
    }

    pub fn find_enclosing_loop(&self, scope: ScopeId) -> Option<ScopeId> {
        self.find_enclosing(scope, |kind| kind == ScopeKind::Loop)
    }

    pub fn find_enclosing_loop_or_switch(&self, scope: ScopeId) -> Option<ScopeId> {
        self.find_enclosing(scope, |kind| {
            matches!(kind, ScopeKind::Loop | ScopeKind::Switch)
        })
    }

    fn find_enclosing(&self, scope: ScopeId, matches: impl Fn(ScopeKind) -> bool) -> Option<ScopeId> {
        let mut current = Some(scope);

        while let Some(id) = current {
            if matches(self.scopes[id].kind) {
                return Some(id);
            }
            current = self.scopes[id].parent;
        }

        None
    }

    /// Symbols declared directly in `scope`, in insertion order.
    pub fn local_symbols(&self, scope: ScopeId) -> impl Iterator<Item = SymbolId> + '_ {
        self.scopes[scope].symbols.iter().copied()
    }

    /// Locally declared symbols that were never resolved via `lookup`.
    pub fn unused_local_symbols(&self, scope: ScopeId) -> Vec<SymbolId> {
        self.scopes[scope]
            .symbols
            .iter()
            .copied()
            .filter(|&id| !self.symbols[id].used)
            .collect()
    }
}

/// Error returned by `define` for a name already bound in the scope.
#[derive(Debug, Error)]
#[error("symbol {name} already declared at {previous}")]
pub struct DuplicateSymbol {
    pub name: String,
    pub previous: Position,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str) -> Symbol {
        Symbol::new(
            name,
            SymbolKind::Variable,
            Type::Int,
            Position::new("t.mica", 1, 1, 0),
        )
    }

    #[test]
    fn define_twice_in_same_scope_fails() {
        let (mut table, global) = SymbolTable::new();

        table.define(global, symbol("x")).unwrap();
        let err = table.define(global, symbol("x")).unwrap_err();
        assert_eq!(err.name, "x");
    }

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let (mut table, global) = SymbolTable::new();
        let inner = table.push_scope(ScopeKind::Block, global);

        let outer_x = table.define(global, symbol("x")).unwrap();
        let inner_x = table.define(inner, symbol("x")).unwrap();

        // Innermost binding wins
        assert_eq!(table.lookup(inner, "x"), Some(inner_x));
        assert_eq!(table.lookup(global, "x"), Some(outer_x));
    }

    #[test]
    fn lookup_walks_up_to_parent_scopes() {
        let (mut table, global) = SymbolTable::new();
        let function = table.push_scope(ScopeKind::Function, global);
        let block = table.push_scope(ScopeKind::Block, function);

        let id = table.define(global, symbol("g")).unwrap();
        assert_eq!(table.lookup(block, "g"), Some(id));
        assert_eq!(table.lookup(block, "missing"), None);
    }

    #[test]
    fn lookup_marks_symbols_used() {
        let (mut table, global) = SymbolTable::new();
        let id = table.define(global, symbol("x")).unwrap();

        assert!(!table.symbol(id).used);
        table.lookup(global, "x");
        assert!(table.symbol(id).used);

        assert!(table.unused_local_symbols(global).is_empty());
    }

    #[test]
    fn lookup_local_ignores_parents_and_used_flag() {
        let (mut table, global) = SymbolTable::new();
        let inner = table.push_scope(ScopeKind::Block, global);
        let id = table.define(global, symbol("x")).unwrap();

        assert_eq!(table.lookup_local(inner, "x"), None);
        assert_eq!(table.lookup_local(global, "x"), Some(id));
        assert!(!table.symbol(id).used);
    }

    #[test]
    fn define_assigns_scope_and_insertion_index() {
        let (mut table, global) = SymbolTable::new();
        let a = table.define(global, symbol("a")).unwrap();
        let b = table.define(global, symbol("b")).unwrap();

        assert_eq!(table.symbol(a).scope, Some(global));
        assert_eq!(table.symbol(a).index, 0);
        assert_eq!(table.symbol(b).index, 1);

        // local_symbols reports insertion order
        let locals: Vec<_> = table.local_symbols(global).collect();
        assert_eq!(locals, vec![a, b]);
    }

    #[test]
    fn enclosing_scope_queries() {
        let (mut table, global) = SymbolTable::new();
        let function = table.push_scope(ScopeKind::Function, global);
        let looop = table.push_scope(ScopeKind::Loop, function);
        let switch = table.push_scope(ScopeKind::Switch, looop);
        let block = table.push_scope(ScopeKind::Block, switch);

        assert_eq!(table.find_enclosing_function(block), Some(function));
        assert_eq!(table.find_enclosing_loop(block), Some(looop));
        assert_eq!(table.find_enclosing_loop_or_switch(block), Some(switch));
        assert_eq!(table.find_enclosing_loop(global), None);
    }

    #[test]
    fn scope_depth_and_function_inheritance() {
        let (mut table, global) = SymbolTable::new();
        let function_scope = table.push_scope(ScopeKind::Function, global);
        let f = table.define(global, symbol("f")).unwrap();
        table.set_scope_function(function_scope, Some(f));

        let block = table.push_scope(ScopeKind::Block, function_scope);
        assert_eq!(table.scope(block).depth, 2);
        assert_eq!(table.scope(block).function, Some(f));

        // A nested function scope does not inherit the outer function
        let nested = table.push_scope(ScopeKind::Function, block);
        assert_eq!(table.scope(nested).function, None);
    }

    #[test]
    fn constants_and_functions_reject_assignment() {
        let mut constant = symbol("c");
        constant.constant = true;
        assert!(!constant.can_assign());

        let function = Symbol::new(
            "f",
            SymbolKind::Function,
            Type::function(vec![], Type::Void),
            Position::none(),
        );
        assert!(!function.can_assign());

        assert!(symbol("v").can_assign());
    }
}
