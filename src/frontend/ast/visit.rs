//! Trait definition for an AST visitor which walks the tree in DFS
//! order. Statement visits return `()`; expression visits return the
//! visitor's semantic result (a type for the analyzer, a value for the
//! IR builder).

use super::{
    ArrayLiteralExpr, AssignmentExpr, BinaryExpr, Block, CallExpr, Expression, ExpressionKind,
    File, FuncDecl, IdentifierExpr, IfStmt, IndexExpr, Item, ItemKind, LiteralExpr, LogicalExpr,
    MemberExpr, Statement, StatementKind, StructDecl, StructLiteralExpr, SwitchStmt,
    TypeAliasDecl, UnaryExpr, VarDecl, WhileStmt,
};
use crate::frontend::ast::ForStmt;

pub trait Visitor: Sized {
    /// The semantic result an expression visit produces.
    type ExprResult;

    /* Declarations */

    fn visit_var_decl(&mut self, decl: &VarDecl);

    fn visit_func_decl(&mut self, decl: &FuncDecl);

    fn visit_type_alias_decl(&mut self, decl: &TypeAliasDecl);

    fn visit_struct_decl(&mut self, decl: &StructDecl);

    /* Statements */

    fn visit_block_stmt(&mut self, block: &Block) {
        walk_block(self, block)
    }

    fn visit_expr_stmt(&mut self, stmt: &Statement, expression: &Expression) {
        let _ = stmt;
        let _ = self.visit_expression(expression);
    }

    fn visit_if_stmt(&mut self, stmt: &Statement, if_stmt: &IfStmt);

    fn visit_while_stmt(&mut self, stmt: &Statement, while_stmt: &WhileStmt);

    fn visit_for_stmt(&mut self, stmt: &Statement, for_stmt: &ForStmt);

    fn visit_return_stmt(&mut self, stmt: &Statement, value: Option<&Expression>);

    fn visit_break_stmt(&mut self, stmt: &Statement);

    fn visit_continue_stmt(&mut self, stmt: &Statement);

    fn visit_switch_stmt(&mut self, stmt: &Statement, switch: &SwitchStmt);

    /* Expressions */

    fn visit_expression(&mut self, expression: &Expression) -> Self::ExprResult {
        walk_expression(self, expression)
    }

    fn visit_binary_expr(&mut self, expr: &Expression, binary: &BinaryExpr) -> Self::ExprResult;

    fn visit_unary_expr(&mut self, expr: &Expression, unary: &UnaryExpr) -> Self::ExprResult;

    fn visit_logical_expr(&mut self, expr: &Expression, logical: &LogicalExpr)
        -> Self::ExprResult;

    fn visit_literal_expr(&mut self, expr: &Expression, literal: &LiteralExpr)
        -> Self::ExprResult;

    fn visit_identifier_expr(
        &mut self,
        expr: &Expression,
        identifier: &IdentifierExpr,
    ) -> Self::ExprResult;

    fn visit_call_expr(&mut self, expr: &Expression, call: &CallExpr) -> Self::ExprResult;

    fn visit_index_expr(&mut self, expr: &Expression, index: &IndexExpr) -> Self::ExprResult;

    fn visit_member_expr(&mut self, expr: &Expression, member: &MemberExpr) -> Self::ExprResult;

    fn visit_assignment_expr(
        &mut self,
        expr: &Expression,
        assignment: &AssignmentExpr,
    ) -> Self::ExprResult;

    fn visit_grouping_expr(&mut self, expr: &Expression, inner: &Expression) -> Self::ExprResult;

    fn visit_array_literal_expr(
        &mut self,
        expr: &Expression,
        array: &ArrayLiteralExpr,
    ) -> Self::ExprResult;

    fn visit_struct_literal_expr(
        &mut self,
        expr: &Expression,
        literal: &StructLiteralExpr,
    ) -> Self::ExprResult;
}

pub fn walk_file<V: Visitor>(visitor: &mut V, file: &File) {
    for item in &file.items {
        walk_item(visitor, item);
    }
}

pub fn walk_item<V: Visitor>(visitor: &mut V, item: &Item) {
    match &item.kind {
        ItemKind::Var(decl) => visitor.visit_var_decl(decl),
        ItemKind::Func(decl) => visitor.visit_func_decl(decl),
        ItemKind::TypeAlias(decl) => visitor.visit_type_alias_decl(decl),
        ItemKind::Struct(decl) => visitor.visit_struct_decl(decl),
    }
}

pub fn walk_block<V: Visitor>(visitor: &mut V, block: &Block) {
    for statement in &block.statements {
        walk_statement(visitor, statement);
    }
}

pub fn walk_statement<V: Visitor>(visitor: &mut V, statement: &Statement) {
    match &statement.kind {
        StatementKind::Block(block) => visitor.visit_block_stmt(block),
        StatementKind::Expr(expression) => visitor.visit_expr_stmt(statement, expression),
        StatementKind::If(if_stmt) => visitor.visit_if_stmt(statement, if_stmt),
        StatementKind::While(while_stmt) => visitor.visit_while_stmt(statement, while_stmt),
        StatementKind::For(for_stmt) => visitor.visit_for_stmt(statement, for_stmt),
        StatementKind::Return(ret) => visitor.visit_return_stmt(statement, ret.value.as_ref()),
        StatementKind::Break => visitor.visit_break_stmt(statement),
        StatementKind::Continue => visitor.visit_continue_stmt(statement),
        StatementKind::Switch(switch) => visitor.visit_switch_stmt(statement, switch),
        StatementKind::Var(decl) => visitor.visit_var_decl(decl),
    }
}

pub fn walk_expression<V: Visitor>(visitor: &mut V, expression: &Expression) -> V::ExprResult {
    match &expression.kind {
        ExpressionKind::Binary(binary) => visitor.visit_binary_expr(expression, binary),
        ExpressionKind::Unary(unary) => visitor.visit_unary_expr(expression, unary),
        ExpressionKind::Logical(logical) => visitor.visit_logical_expr(expression, logical),
        ExpressionKind::Literal(literal) => visitor.visit_literal_expr(expression, literal),
        ExpressionKind::Identifier(identifier) => {
            visitor.visit_identifier_expr(expression, identifier)
        }
        ExpressionKind::Call(call) => visitor.visit_call_expr(expression, call),
        ExpressionKind::Index(index) => visitor.visit_index_expr(expression, index),
        ExpressionKind::Member(member) => visitor.visit_member_expr(expression, member),
        ExpressionKind::Assignment(assignment) => {
            visitor.visit_assignment_expr(expression, assignment)
        }
        ExpressionKind::Grouping(inner) => visitor.visit_grouping_expr(expression, inner),
        ExpressionKind::ArrayLiteral(array) => visitor.visit_array_literal_expr(expression, array),
        ExpressionKind::StructLiteral(literal) => {
            visitor.visit_struct_literal_expr(expression, literal)
        }
    }
}
