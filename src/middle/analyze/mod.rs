//! Semantic analysis: name resolution, type checking, and context
//! checks (break/continue/return placement) over a parsed file.
//!
//! The analyzer is a depth-first [`Visitor`] whose expression visits
//! return the expression's type. Before bodies are checked, every
//! top-level name is declared with a placeholder type and the headers
//! (struct layouts, type aliases, function signatures) are resolved, so
//! bodies may refer to declarations appearing later in the file.
//! Checking continues after errors by substituting the `Invalid` type.

use hashbrown::HashMap;

use crate::diagnostics::{Diagnostic, Phase};
use crate::frontend::ast::{
    Block, Expression, File, ForStmt, FuncDecl, IfStmt, Item, ItemKind, NodeId, Statement,
    StructDecl, SwitchStmt, TypeAliasDecl, TypeExpr, VarDecl, WhileStmt,
};
use crate::frontend::ast::visit::{self, Visitor};
use crate::frontend::position::Position;
use crate::middle::symtab::{ScopeId, ScopeKind, Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::middle::ty::{StructField, Type};

mod expr;

/// Everything later stages need from semantic analysis.
pub struct Analysis {
    pub table: SymbolTable,
    pub global_scope: ScopeId,
    /// Type of every analyzed expression, keyed by node id
    pub types: HashMap<NodeId, Type>,
    /// Resolved type of every declared variable name, keyed by the
    /// name identifier's node id
    pub var_types: HashMap<NodeId, Type>,
}

impl Analysis {
    pub fn type_of(&self, id: NodeId) -> Type {
        self.types.get(&id).cloned().unwrap_or(Type::Invalid)
    }

    pub fn var_type_of(&self, id: NodeId) -> Type {
        self.var_types.get(&id).cloned().unwrap_or(Type::Invalid)
    }
}

/// Runs semantic analysis over a file. The diagnostic list is empty on
/// success; the analysis is returned either way so tooling can inspect
/// partial results.
pub fn analyze(file: &File) -> (Analysis, Vec<Diagnostic>) {
    let (table, global_scope) = SymbolTable::new();

    let mut analyzer = Analyzer {
        table,
        global_scope,
        current_scope: global_scope,
        current_function: None,
        errors: Vec::new(),
        types: HashMap::new(),
        var_types: HashMap::new(),
    };

    analyzer.analyze_file(file);

    let Analyzer {
        table,
        global_scope,
        errors,
        types,
        var_types,
        ..
    } = analyzer;

    (
        Analysis {
            table,
            global_scope,
            types,
            var_types,
        },
        errors,
    )
}

pub(crate) struct Analyzer {
    pub(crate) table: SymbolTable,
    global_scope: ScopeId,
    pub(crate) current_scope: ScopeId,
    /// The function symbol whose body is being checked
    current_function: Option<SymbolId>,
    pub(crate) errors: Vec<Diagnostic>,
    pub(crate) types: HashMap<NodeId, Type>,
    var_types: HashMap<NodeId, Type>,
}

impl Analyzer {
    fn analyze_file(&mut self, file: &File) {
        if file.package_name.is_none() {
            self.error(Position::none(), "missing package declaration");
            return;
        }

        for import in &file.imports {
            let name = import
                .alias
                .as_ref()
                .map(|alias| alias.name.clone())
                .unwrap_or_else(|| import.path.clone());

            let symbol = Symbol::new(
                name,
                SymbolKind::Package,
                Type::Invalid,
                import.span.start.clone(),
            );
            self.define(self.global_scope, symbol);
        }

        // Pass 1: bind every top-level name with a placeholder type
        for item in &file.items {
            self.declare_item(item);
        }

        // Pass 2: resolve headers so bodies may use later declarations
        for item in &file.items {
            match &item.kind {
                ItemKind::TypeAlias(decl) => self.finalize_type_alias(decl),
                ItemKind::Struct(decl) => self.finalize_struct(decl),
                _ => {}
            }
        }
        for item in &file.items {
            if let ItemKind::Func(decl) = &item.kind {
                self.finalize_signature(decl);
            }
        }

        // Pass 3: check bodies and initializers
        visit::walk_file(self, file);
    }

    fn declare_item(&mut self, item: &Item) {
        match &item.kind {
            ItemKind::Var(decl) => {
                for name in &decl.names {
                    let symbol = Symbol::new(
                        name.name.clone(),
                        SymbolKind::Variable,
                        Type::Invalid,
                        name.pos().clone(),
                    );
                    self.define(self.global_scope, symbol);
                }
            }
            ItemKind::Func(decl) => {
                let symbol = Symbol::new(
                    decl.name.name.clone(),
                    SymbolKind::Function,
                    Type::Invalid,
                    decl.name.pos().clone(),
                );
                self.define(self.global_scope, symbol);
            }
            ItemKind::TypeAlias(decl) => {
                let symbol = Symbol::new(
                    decl.name.name.clone(),
                    SymbolKind::TypeAlias,
                    Type::Invalid,
                    decl.name.pos().clone(),
                );
                self.define(self.global_scope, symbol);
            }
            ItemKind::Struct(decl) => {
                let mut symbol = Symbol::new(
                    decl.name.name.clone(),
                    SymbolKind::Struct,
                    Type::Invalid,
                    decl.name.pos().clone(),
                );
                symbol.fields = Some(HashMap::new());
                self.define(self.global_scope, symbol);
            }
        }
    }

    fn finalize_type_alias(&mut self, decl: &TypeAliasDecl) {
        let aliased = self.resolve_type(&decl.ty);
        if let Some(id) = self.table.lookup_local(self.global_scope, &decl.name.name) {
            self.table.symbol_mut(id).ty = aliased;
        }
    }

    fn finalize_struct(&mut self, decl: &StructDecl) {
        let scope = self.table.push_scope(ScopeKind::Struct, self.global_scope);

        let mut struct_fields = Vec::with_capacity(decl.fields.len());
        let mut field_symbols = HashMap::new();

        for field in &decl.fields {
            let field_type = self.resolve_type(&field.ty);
            struct_fields.push(StructField {
                name: field.name.name.clone(),
                ty: field_type.clone(),
            });

            let symbol = Symbol::new(
                field.name.name.clone(),
                SymbolKind::Field,
                field_type,
                field.name.pos().clone(),
            );
            match self.table.define(scope, symbol) {
                Ok(id) => {
                    field_symbols.insert(field.name.name.clone(), id);
                }
                Err(_) => {
                    self.error(
                        field.name.pos().clone(),
                        format!("duplicate field: {}", field.name.name),
                    );
                }
            }
        }

        let struct_type = Type::strukt(decl.name.name.clone(), struct_fields);

        if let Some(id) = self.table.lookup_local(self.global_scope, &decl.name.name) {
            let symbol = self.table.symbol_mut(id);
            symbol.ty = struct_type;
            symbol.fields = Some(field_symbols);
        }
    }

    fn finalize_signature(&mut self, decl: &FuncDecl) {
        let parameters = decl
            .params
            .iter()
            .map(|param| self.resolve_type(&param.ty))
            .collect();

        let return_type = decl
            .return_type
            .as_ref()
            .map(|ty| self.resolve_type(ty))
            .unwrap_or(Type::Void);

        if let Some(id) = self.table.lookup_local(self.global_scope, &decl.name.name) {
            self.table.symbol_mut(id).ty = Type::function(parameters, return_type);
        }
    }

    /* Helpers */

    fn define(&mut self, scope: ScopeId, symbol: Symbol) -> Option<SymbolId> {
        let pos = symbol.pos.clone();
        match self.table.define(scope, symbol) {
            Ok(id) => Some(id),
            Err(duplicate) => {
                self.error(pos, duplicate.to_string());
                None
            }
        }
    }

    fn enter_scope(&mut self, kind: ScopeKind) {
        self.current_scope = self.table.push_scope(kind, self.current_scope);
    }

    fn exit_scope(&mut self) {
        if let Some(parent) = self.table.scope(self.current_scope).parent {
            self.current_scope = parent;
        }
    }

    pub(crate) fn error(&mut self, pos: Position, message: impl Into<String>) {
        self.errors
            .push(Diagnostic::new(Phase::Semantic, pos, message));
    }

    /// Resolves a source-level type annotation to a type. Built-in
    /// names win; everything else must name a struct or type alias in
    /// scope.
    fn resolve_type(&mut self, ty: &TypeExpr) -> Type {
        match ty.name.as_str() {
            "int" => return Type::Int,
            "float" => return Type::Float,
            "bool" => return Type::Bool,
            "string" => return Type::String,
            "char" => return Type::Char,
            "void" => return Type::Void,
            _ => {}
        }

        let Some(id) = self.table.lookup(self.current_scope, &ty.name) else {
            self.error(
                ty.span.start.clone(),
                format!("undefined type: {}", ty.name),
            );
            return Type::Invalid;
        };

        let symbol = self.table.symbol(id);
        if !matches!(symbol.kind, SymbolKind::TypeAlias | SymbolKind::Struct) {
            self.error(
                ty.span.start.clone(),
                format!("{} is not a type", ty.name),
            );
            return Type::Invalid;
        }

        symbol.ty.clone()
    }

    /// Checks that `value` may be assigned to `target`, reporting an
    /// error at `pos` when it may not.
    pub(crate) fn assignable(&mut self, value: &Type, target: &Type, pos: &Position) -> bool {
        if value.assignable_to(target) {
            return true;
        }

        // An Invalid side was already reported; avoid cascading
        if !value.is_invalid() && !target.is_invalid() {
            self.error(pos.clone(), format!("cannot assign {value} to {target}"));
        }
        false
    }

    pub(crate) fn lookup(&mut self, name: &str) -> Option<SymbolId> {
        self.table.lookup(self.current_scope, name)
    }
}

impl Visitor for Analyzer {
    type ExprResult = Type;

    fn visit_var_decl(&mut self, decl: &VarDecl) {
        let init_type = decl
            .initializer
            .as_ref()
            .map(|initializer| self.visit_expression(initializer));

        let var_type = if let Some(ty) = &decl.ty {
            let declared = self.resolve_type(ty);
            if let (Some(init_type), Some(initializer)) = (&init_type, &decl.initializer) {
                self.assignable(init_type, &declared, initializer.pos());
            }
            declared
        } else if let Some(init_type) = init_type {
            init_type
        } else {
            self.error(
                decl.span.start.clone(),
                "variable declaration must have type or initializer",
            );
            Type::Invalid
        };

        for name in &decl.names {
            self.var_types.insert(name.id, var_type.clone());

            // Top-level names were bound by the declare pass and only
            // need their placeholder type replaced
            let predeclared = (self.current_scope == self.global_scope)
                .then(|| self.table.lookup_local(self.global_scope, &name.name))
                .flatten();

            match predeclared {
                Some(id) => self.table.symbol_mut(id).ty = var_type.clone(),
                None => {
                    let symbol = Symbol::new(
                        name.name.clone(),
                        SymbolKind::Variable,
                        var_type.clone(),
                        name.pos().clone(),
                    );
                    self.define(self.current_scope, symbol);
                }
            }
        }
    }

    fn visit_func_decl(&mut self, decl: &FuncDecl) {
        let symbol = self.table.lookup_local(self.global_scope, &decl.name.name);

        let (parameters, _) = match symbol.map(|id| &self.table.symbol(id).ty) {
            Some(Type::Function(signature)) => {
                (signature.parameters.clone(), signature.return_type.clone())
            }
            // Signature resolution failed earlier; nothing to check
            // against, but the body is still walked for its own errors
            _ => (
                decl.params.iter().map(|_| Type::Invalid).collect(),
                Type::Invalid,
            ),
        };

        self.enter_scope(ScopeKind::Function);
        self.table.set_scope_function(self.current_scope, symbol);
        self.current_function = symbol;

        for (i, param) in decl.params.iter().enumerate() {
            let ty = parameters.get(i).cloned().unwrap_or(Type::Invalid);
            self.var_types.insert(param.name.id, ty.clone());

            let symbol = Symbol::new(
                param.name.name.clone(),
                SymbolKind::Parameter,
                ty,
                param.name.pos().clone(),
            );
            self.define(self.current_scope, symbol);
        }

        self.visit_block_stmt(&decl.body);

        self.exit_scope();
        self.current_function = None;
    }

    fn visit_type_alias_decl(&mut self, _decl: &TypeAliasDecl) {
        // Fully handled by the header pass
    }

    fn visit_struct_decl(&mut self, _decl: &StructDecl) {
        // Fully handled by the header pass
    }

    fn visit_block_stmt(&mut self, block: &Block) {
        self.enter_scope(ScopeKind::Block);
        visit::walk_block(self, block);
        self.exit_scope();
    }

    fn visit_if_stmt(&mut self, _stmt: &Statement, if_stmt: &IfStmt) {
        let condition = self.visit_expression(&if_stmt.condition);
        if !condition.is_boolean() && !condition.is_invalid() {
            self.error(
                if_stmt.condition.pos().clone(),
                "condition must be boolean",
            );
        }

        self.visit_block_stmt(&if_stmt.then_branch);
        if let Some(else_branch) = &if_stmt.else_branch {
            visit::walk_statement(self, else_branch);
        }
    }

    fn visit_while_stmt(&mut self, _stmt: &Statement, while_stmt: &WhileStmt) {
        let condition = self.visit_expression(&while_stmt.condition);
        if !condition.is_boolean() && !condition.is_invalid() {
            self.error(
                while_stmt.condition.pos().clone(),
                "condition must be boolean",
            );
        }

        self.enter_scope(ScopeKind::Loop);
        self.visit_block_stmt(&while_stmt.body);
        self.exit_scope();
    }

    fn visit_for_stmt(&mut self, _stmt: &Statement, for_stmt: &ForStmt) {
        self.enter_scope(ScopeKind::Loop);

        if let Some(init) = &for_stmt.init {
            visit::walk_statement(self, init);
        }

        if let Some(condition) = &for_stmt.condition {
            let ty = self.visit_expression(condition);
            if !ty.is_boolean() && !ty.is_invalid() {
                self.error(condition.pos().clone(), "condition must be boolean");
            }
        }

        if let Some(post) = &for_stmt.post {
            visit::walk_statement(self, post);
        }

        self.visit_block_stmt(&for_stmt.body);

        self.exit_scope();
    }

    fn visit_return_stmt(&mut self, stmt: &Statement, value: Option<&Expression>) {
        let Some(function) = self.current_function else {
            self.error(stmt.pos().clone(), "return outside function");
            // Still analyze the value expression for its own errors
            if let Some(value) = value {
                self.visit_expression(value);
            }
            return;
        };

        let Type::Function(signature) = self.table.symbol(function).ty.clone() else {
            if let Some(value) = value {
                self.visit_expression(value);
            }
            return;
        };

        match value {
            Some(value) => {
                let value_type = self.visit_expression(value);
                self.assignable(&value_type, &signature.return_type, value.pos());
            }
            None => {
                if !signature.return_type.is_void() {
                    self.error(
                        stmt.pos().clone(),
                        format!("expected return value of type {}", signature.return_type),
                    );
                }
            }
        }
    }

    fn visit_break_stmt(&mut self, stmt: &Statement) {
        if self
            .table
            .find_enclosing_loop_or_switch(self.current_scope)
            .is_none()
        {
            self.error(stmt.pos().clone(), "break outside loop or switch");
        }
    }

    fn visit_continue_stmt(&mut self, stmt: &Statement) {
        if self.table.find_enclosing_loop(self.current_scope).is_none() {
            self.error(stmt.pos().clone(), "continue outside loop");
        }
    }

    fn visit_switch_stmt(&mut self, _stmt: &Statement, switch: &SwitchStmt) {
        let value_type = self.visit_expression(&switch.value);

        self.enter_scope(ScopeKind::Switch);

        let mut seen_default = false;
        for case in &switch.cases {
            if case.is_default {
                if seen_default {
                    self.error(case.span.start.clone(), "multiple default clauses");
                }
                seen_default = true;
            } else {
                for value in &case.values {
                    let case_type = self.visit_expression(value);
                    self.assignable(&case_type, &value_type, value.pos());
                }
            }

            for statement in &case.body {
                visit::walk_statement(self, statement);
            }
        }

        self.exit_scope();
    }

    /* Expression dispatch: the rules live in expr.rs */

    fn visit_binary_expr(
        &mut self,
        expr: &Expression,
        binary: &crate::frontend::ast::BinaryExpr,
    ) -> Type {
        self.check_binary(expr, binary)
    }

    fn visit_unary_expr(
        &mut self,
        expr: &Expression,
        unary: &crate::frontend::ast::UnaryExpr,
    ) -> Type {
        self.check_unary(expr, unary)
    }

    fn visit_logical_expr(
        &mut self,
        expr: &Expression,
        logical: &crate::frontend::ast::LogicalExpr,
    ) -> Type {
        self.check_logical(expr, logical)
    }

    fn visit_literal_expr(
        &mut self,
        expr: &Expression,
        literal: &crate::frontend::ast::LiteralExpr,
    ) -> Type {
        self.check_literal(expr, literal)
    }

    fn visit_identifier_expr(
        &mut self,
        expr: &Expression,
        identifier: &crate::frontend::ast::IdentifierExpr,
    ) -> Type {
        self.check_identifier(expr, identifier)
    }

    fn visit_call_expr(
        &mut self,
        expr: &Expression,
        call: &crate::frontend::ast::CallExpr,
    ) -> Type {
        self.check_call(expr, call)
    }

    fn visit_index_expr(
        &mut self,
        expr: &Expression,
        index: &crate::frontend::ast::IndexExpr,
    ) -> Type {
        self.check_index(expr, index)
    }

    fn visit_member_expr(
        &mut self,
        expr: &Expression,
        member: &crate::frontend::ast::MemberExpr,
    ) -> Type {
        self.check_member(expr, member)
    }

    fn visit_assignment_expr(
        &mut self,
        expr: &Expression,
        assignment: &crate::frontend::ast::AssignmentExpr,
    ) -> Type {
        self.check_assignment(expr, assignment)
    }

    fn visit_grouping_expr(&mut self, expr: &Expression, inner: &Expression) -> Type {
        let ty = self.visit_expression(inner);
        self.types.insert(expr.id, ty.clone());
        ty
    }

    fn visit_array_literal_expr(
        &mut self,
        expr: &Expression,
        array: &crate::frontend::ast::ArrayLiteralExpr,
    ) -> Type {
        self.check_array_literal(expr, array)
    }

    fn visit_struct_literal_expr(
        &mut self,
        expr: &Expression,
        literal: &crate::frontend::ast::StructLiteralExpr,
    ) -> Type {
        self.check_struct_literal(expr, literal)
    }
}

/// Convenience used by tests and the IR builder: the symbol an
/// identifier resolves to at global scope after analysis.
pub fn resolve_global<'a>(analysis: &'a Analysis, name: &str) -> Option<&'a Symbol> {
    analysis
        .table
        .lookup_local(analysis.global_scope, name)
        .map(|id| analysis.table.symbol(id))
}
