//! Lowers the type-annotated AST into an IR [`Module`].
//!
//! The builder is the second mandatory [`Visitor`]: statement visits
//! emit instructions into the current block, expression visits return
//! the [`ValueId`] holding the expression's result. Structured control
//! flow becomes an explicit CFG; `&&`/`||` are decomposed into branch
//! diamonds joined by Phi nodes so the right operand is only evaluated
//! when needed. Break and continue targets are kept on stacks pushed
//! by the enclosing loop or switch.

use hashbrown::HashMap;

use crate::diagnostics::{Diagnostic, Phase};
use crate::frontend::ast::visit::{self, Visitor};
use crate::frontend::ast::{
    ArrayLiteralExpr, AssignmentExpr, BinaryExpr, BinaryOp, Block, CallExpr, Expression,
    ExpressionKind, File, ForStmt, FuncDecl, IdentifierExpr, IfStmt, IndexExpr, ItemKind,
    LiteralExpr, LogicalExpr, LogicalOp, MemberExpr, Statement, StructDecl, StructLiteralExpr,
    SwitchStmt, TypeAliasDecl, UnaryExpr, UnaryOp, VarDecl, WhileStmt,
};
use crate::frontend::position::Position;
use crate::index::Index;
use crate::middle::analyze::Analysis;
use crate::middle::ir::{
    BinaryOperator, BlockId, ConstantValue, Function, Instruction, Module, UnaryOperator, Value,
    ValueId, ValueKind,
};
use crate::middle::symtab::SymbolKind;
use crate::middle::ty::Type;

/// Builds the IR module for a file. Requires the analysis of the same
/// file; the diagnostic list is empty on success.
pub fn build(file: &File, analysis: &Analysis) -> (Module, Vec<Diagnostic>) {
    let name = file
        .package_name
        .as_ref()
        .map(|ident| ident.name.clone())
        .unwrap_or_default();

    let mut builder = Builder {
        analysis,
        module: Module::new(name),
        errors: Vec::new(),
        function: None,
        current_block: BlockId::ZERO,
        named_values: HashMap::new(),
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
    };

    // Globals first so function bodies can refer to them
    for item in &file.items {
        if let ItemKind::Var(decl) = &item.kind {
            builder.build_global(decl);
        }
    }

    for item in &file.items {
        if let ItemKind::Func(decl) = &item.kind {
            builder.visit_func_decl(decl);
        }
    }

    (builder.module, builder.errors)
}

struct Builder<'a> {
    analysis: &'a Analysis,
    module: Module,
    errors: Vec<Diagnostic>,

    /* Per-function state */
    function: Option<Function>,
    current_block: BlockId,
    /// Locals, parameters, and referenced globals/functions by name
    named_values: HashMap<String, ValueId>,
    break_targets: Vec<BlockId>,
    continue_targets: Vec<BlockId>,
}

impl<'a> Builder<'a> {
    fn func(&mut self) -> &mut Function {
        self.function.as_mut().unwrap()
    }

    fn error(&mut self, pos: &Position, message: impl Into<String>) {
        self.errors
            .push(Diagnostic::new(Phase::Ir, pos.clone(), message));
    }

    fn emit(&mut self, instruction: Instruction) {
        let block = self.current_block;
        self.func().append(block, instruction);
    }

    fn is_terminated(&mut self) -> bool {
        let block = self.current_block;
        self.func().block(block).is_terminated()
    }

    fn build_global(&mut self, decl: &VarDecl) {
        for name in &decl.names {
            let ty = self.analysis.var_type_of(name.id);
            let id = ValueId::new(self.module.globals.len());

            self.module.globals.push(Value {
                id,
                name: Some(name.name.clone()),
                ty,
                kind: ValueKind::Variable,
                constant: None,
            });
        }
    }

    /// The value a named identifier denotes in the current function,
    /// creating (and memoizing) proxies for globals and function
    /// references on first use.
    fn named_value(&mut self, name: &str, pos: &Position) -> ValueId {
        if let Some(&value) = self.named_values.get(name) {
            return value;
        }

        let symbol = self
            .analysis
            .table
            .lookup_local(self.analysis.global_scope, name)
            .map(|id| self.analysis.table.symbol(id));

        let Some(symbol) = symbol else {
            self.error(pos, "undefined variable");
            return self.func().new_temp(Type::Invalid);
        };

        let matches_global = matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Function);
        if !matches_global {
            self.error(pos, format!("{} is not a value", name));
            return self.func().new_temp(Type::Invalid);
        }

        let ty = symbol.ty.clone();
        let value = self
            .func()
            .new_value(Some(name.to_owned()), ty, ValueKind::Variable);
        self.named_values.insert(name.to_owned(), value);
        value
    }

    /// The struct type behind an expression, as annotated by the
    /// analyzer.
    fn struct_type_of(&self, expr: &Expression) -> Option<std::rc::Rc<crate::middle::ty::StructType>> {
        match self.analysis.type_of(expr.id) {
            Type::Struct(strukt) => Some(strukt),
            _ => None,
        }
    }

    /// Lowers an index or member expression to the address of the
    /// element or field. The returned value carries the loaded type.
    fn lower_address(&mut self, expr: &Expression) -> Option<ValueId> {
        match &expr.kind {
            ExpressionKind::Index(index) => {
                let base = self.visit_expression(&index.object);
                let offset = self.visit_expression(&index.index);
                let ty = self.analysis.type_of(expr.id);

                let dest = self.func().new_temp(ty);
                self.emit(Instruction::GetElementPtr {
                    dest,
                    base,
                    index: offset,
                });
                Some(dest)
            }
            ExpressionKind::Member(member) => {
                let strukt = self.struct_type_of(&member.object);
                let base = self.visit_expression(&member.object);

                let Some((field_index, _)) =
                    strukt.as_ref().and_then(|s| s.field(&member.member.name))
                else {
                    self.error(expr.pos(), "cannot resolve field access");
                    return None;
                };

                let ty = self.analysis.type_of(expr.id);
                let dest = self.func().new_temp(ty);
                self.emit(Instruction::GetFieldPtr {
                    dest,
                    base,
                    field_index,
                });
                Some(dest)
            }
            _ => None,
        }
    }

    fn constant_int(&mut self, value: i64) -> ValueId {
        self.func()
            .new_constant(Type::Int, ConstantValue::Int(value))
    }

    fn constant_bool(&mut self, value: bool) -> ValueId {
        self.func()
            .new_constant(Type::Bool, ConstantValue::Bool(value))
    }

    /// The constant `1` of the operand's type, for `++` / `--`.
    fn constant_one(&mut self, ty: &Type) -> ValueId {
        match ty {
            Type::Float => self
                .func()
                .new_constant(Type::Float, ConstantValue::Float(1.0)),
            _ => self.constant_int(1),
        }
    }

    /// Stores `value` into the place named by `target`, which the
    /// analyzer has confirmed to be an lvalue.
    fn store_to(&mut self, target: &Expression, value: ValueId) {
        match &target.kind {
            ExpressionKind::Identifier(ident) => {
                let dest = self.named_value(&ident.name, target.pos());
                self.emit(Instruction::Copy { dest, value });
            }
            ExpressionKind::Index(_) | ExpressionKind::Member(_) => {
                if let Some(address) = self.lower_address(target) {
                    self.emit(Instruction::Store { address, value });
                }
            }
            _ => {
                // The analyzer already rejected other targets
                self.error(target.pos(), "invalid assignment target");
            }
        }
    }
}

impl<'a> Visitor for Builder<'a> {
    type ExprResult = ValueId;

    /* Declarations */

    fn visit_var_decl(&mut self, decl: &VarDecl) {
        if self.function.is_none() {
            // Globals were registered before function bodies
            return;
        }

        let initializer = decl
            .initializer
            .as_ref()
            .map(|initializer| self.visit_expression(initializer));

        for name in &decl.names {
            let ty = self.analysis.var_type_of(name.id);
            let value =
                self.func()
                    .new_value(Some(name.name.clone()), ty, ValueKind::Variable);

            self.func().locals.push(value);
            self.named_values.insert(name.name.clone(), value);

            if let Some(initializer) = initializer {
                self.emit(Instruction::Copy {
                    dest: value,
                    value: initializer,
                });
            }
        }
    }

    fn visit_func_decl(&mut self, decl: &FuncDecl) {
        let symbol = self
            .analysis
            .table
            .lookup_local(self.analysis.global_scope, &decl.name.name)
            .map(|id| self.analysis.table.symbol(id));

        let Some(Type::Function(signature)) = symbol.map(|s| s.ty.clone()) else {
            self.error(decl.name.pos(), "function symbol not found");
            return;
        };

        let params = decl
            .params
            .iter()
            .zip(&signature.parameters)
            .map(|(param, ty)| (param.name.name.clone(), ty.clone()))
            .collect();

        let function = Function::new(decl.name.name.clone(), params, signature.return_type.clone());
        self.current_block = function.entry;
        self.named_values.clear();

        for (param, &value) in decl.params.iter().zip(&function.parameters) {
            self.named_values.insert(param.name.name.clone(), value);
        }

        self.function = Some(function);

        self.visit_block_stmt(&decl.body);

        // Void functions return implicitly when control falls off the
        // end
        if signature.return_type.is_void() && !self.is_terminated() {
            self.emit(Instruction::Return { value: None });
        }

        let mut function = self.function.take().unwrap();
        // Lowering a fully-returning `if` or `switch` leaves an empty
        // tail block behind; drop anything the entry can not reach
        function.remove_unreachable();
        self.module.functions.push(function);
        self.named_values.clear();
    }

    fn visit_type_alias_decl(&mut self, _decl: &TypeAliasDecl) {
        // Pure type information; no IR
    }

    fn visit_struct_decl(&mut self, _decl: &StructDecl) {
        // Pure type information; no IR
    }

    /* Statements */

    fn visit_block_stmt(&mut self, block: &Block) {
        visit::walk_block(self, block);
    }

    fn visit_if_stmt(&mut self, _stmt: &Statement, if_stmt: &IfStmt) {
        let condition = self.visit_expression(&if_stmt.condition);

        let then_block = self.func().new_block("if.then");
        let end_block = self.func().new_block("if.end");
        let else_block = if if_stmt.else_branch.is_some() {
            self.func().new_block("if.else")
        } else {
            end_block
        };

        self.emit(Instruction::Branch {
            condition,
            true_block: then_block,
            false_block: else_block,
        });

        self.current_block = then_block;
        self.visit_block_stmt(&if_stmt.then_branch);
        if !self.is_terminated() {
            self.emit(Instruction::Jump { target: end_block });
        }

        if let Some(else_branch) = &if_stmt.else_branch {
            self.current_block = else_block;
            visit::walk_statement(self, else_branch);
            if !self.is_terminated() {
                self.emit(Instruction::Jump { target: end_block });
            }
        }

        self.current_block = end_block;
    }

    fn visit_while_stmt(&mut self, _stmt: &Statement, while_stmt: &WhileStmt) {
        let cond_block = self.func().new_block("while.cond");
        let body_block = self.func().new_block("while.body");
        let end_block = self.func().new_block("while.end");

        self.emit(Instruction::Jump { target: cond_block });

        self.current_block = cond_block;
        let condition = self.visit_expression(&while_stmt.condition);
        // The condition may itself have introduced blocks
        let cond_exit = self.current_block;
        self.func().append(
            cond_exit,
            Instruction::Branch {
                condition,
                true_block: body_block,
                false_block: end_block,
            },
        );

        self.break_targets.push(end_block);
        self.continue_targets.push(cond_block);

        self.current_block = body_block;
        self.visit_block_stmt(&while_stmt.body);
        if !self.is_terminated() {
            self.emit(Instruction::Jump { target: cond_block });
        }

        self.break_targets.pop();
        self.continue_targets.pop();

        self.current_block = end_block;
    }

    fn visit_for_stmt(&mut self, _stmt: &Statement, for_stmt: &ForStmt) {
        if let Some(init) = &for_stmt.init {
            visit::walk_statement(self, init);
        }

        let cond_block = self.func().new_block("for.cond");
        let body_block = self.func().new_block("for.body");
        let post_block = self.func().new_block("for.post");
        let end_block = self.func().new_block("for.end");

        self.emit(Instruction::Jump { target: cond_block });

        self.current_block = cond_block;
        match &for_stmt.condition {
            Some(condition) => {
                let condition = self.visit_expression(condition);
                let cond_exit = self.current_block;
                self.func().append(
                    cond_exit,
                    Instruction::Branch {
                        condition,
                        true_block: body_block,
                        false_block: end_block,
                    },
                );
            }
            None => {
                // No condition: loop forever
                self.emit(Instruction::Jump { target: body_block });
            }
        }

        self.break_targets.push(end_block);
        self.continue_targets.push(post_block);

        self.current_block = body_block;
        self.visit_block_stmt(&for_stmt.body);
        if !self.is_terminated() {
            self.emit(Instruction::Jump { target: post_block });
        }

        self.current_block = post_block;
        if let Some(post) = &for_stmt.post {
            visit::walk_statement(self, post);
        }
        self.emit(Instruction::Jump { target: cond_block });

        self.break_targets.pop();
        self.continue_targets.pop();

        self.current_block = end_block;
    }

    fn visit_return_stmt(&mut self, _stmt: &Statement, value: Option<&Expression>) {
        let value = value.map(|value| self.visit_expression(value));
        self.emit(Instruction::Return { value });
    }

    fn visit_break_stmt(&mut self, _stmt: &Statement) {
        // A missing frame was already reported by the analyzer
        if let Some(&target) = self.break_targets.last() {
            self.emit(Instruction::Jump { target });
        }
    }

    fn visit_continue_stmt(&mut self, _stmt: &Statement) {
        if let Some(&target) = self.continue_targets.last() {
            self.emit(Instruction::Jump { target });
        }
    }

    fn visit_switch_stmt(&mut self, _stmt: &Statement, switch: &SwitchStmt) {
        let subject = self.visit_expression(&switch.value);

        let end_block = self.func().new_block("switch.end");

        // One body block per clause, in source order
        let bodies: Vec<BlockId> = switch
            .cases
            .iter()
            .map(|case| {
                let label = if case.is_default {
                    "switch.default"
                } else {
                    "switch.case"
                };
                self.func().new_block(label)
            })
            .collect();

        let default_target = switch
            .cases
            .iter()
            .position(|case| case.is_default)
            .map(|i| bodies[i])
            .unwrap_or(end_block);

        // Comparison chain: each case value gets an equality test that
        // either enters the clause body or falls to the next test
        for (case, &body) in switch.cases.iter().zip(&bodies) {
            if case.is_default {
                continue;
            }

            for value in &case.values {
                let case_value = self.visit_expression(value);
                let matched = self.func().new_temp(Type::Bool);
                self.emit(Instruction::Binary {
                    op: BinaryOperator::Eq,
                    dest: matched,
                    left: subject,
                    right: case_value,
                });

                let next_test = self.func().new_block("switch.test");
                self.emit(Instruction::Branch {
                    condition: matched,
                    true_block: body,
                    false_block: next_test,
                });
                self.current_block = next_test;
            }
        }

        // All tests failed: run the default clause (or leave)
        self.emit(Instruction::Jump {
            target: default_target,
        });

        self.break_targets.push(end_block);

        for (case, &body) in switch.cases.iter().zip(&bodies) {
            self.current_block = body;
            for statement in &case.body {
                visit::walk_statement(self, statement);
            }
            if !self.is_terminated() {
                self.emit(Instruction::Jump { target: end_block });
            }
        }

        self.break_targets.pop();

        self.current_block = end_block;
    }

    /* Expressions */

    fn visit_binary_expr(&mut self, expr: &Expression, binary: &BinaryExpr) -> ValueId {
        let left = self.visit_expression(&binary.lhs);
        let right = self.visit_expression(&binary.rhs);

        let ty = self.analysis.type_of(expr.id);
        let dest = self.func().new_temp(ty);

        let Some(op) = lower_binary_op(binary.operator.kind) else {
            self.error(expr.pos(), "unsupported binary operator");
            return dest;
        };

        self.emit(Instruction::Binary {
            op,
            dest,
            left,
            right,
        });

        dest
    }

    fn visit_unary_expr(&mut self, expr: &Expression, unary: &UnaryExpr) -> ValueId {
        match unary.operator.kind {
            UnaryOp::Negate | UnaryOp::Not | UnaryOp::BitNot => {
                let operand = self.visit_expression(&unary.operand);
                let ty = self.analysis.type_of(expr.id);
                let dest = self.func().new_temp(ty);

                let op = match unary.operator.kind {
                    UnaryOp::Negate => UnaryOperator::Neg,
                    UnaryOp::Not => UnaryOperator::Not,
                    _ => UnaryOperator::BitNot,
                };

                self.emit(Instruction::Unary { op, dest, operand });
                dest
            }

            // `x++` / `x--` and the prefix forms: read, adjust by one,
            // write back; the result is the old value for postfix and
            // the new one for prefix
            UnaryOp::Increment | UnaryOp::Decrement => {
                let ty = self.analysis.type_of(expr.id);
                let op = if unary.operator.kind == UnaryOp::Increment {
                    BinaryOperator::Add
                } else {
                    BinaryOperator::Sub
                };

                match &unary.operand.kind {
                    ExpressionKind::Identifier(_) => {
                        let current = self.visit_expression(&unary.operand);
                        let old = self.func().new_temp(ty.clone());
                        self.emit(Instruction::Copy {
                            dest: old,
                            value: current,
                        });

                        let one = self.constant_one(&ty);
                        let new = self.func().new_temp(ty);
                        self.emit(Instruction::Binary {
                            op,
                            dest: new,
                            left: old,
                            right: one,
                        });
                        self.store_to(&unary.operand, new);

                        if unary.is_postfix {
                            old
                        } else {
                            new
                        }
                    }
                    _ => {
                        // Address computed once; read-modify-write
                        let Some(address) = self.lower_address(&unary.operand) else {
                            return self.func().new_temp(ty);
                        };
                        let old = self.func().new_temp(ty.clone());
                        self.emit(Instruction::Load {
                            dest: old,
                            address,
                        });

                        let one = self.constant_one(&ty);
                        let new = self.func().new_temp(ty);
                        self.emit(Instruction::Binary {
                            op,
                            dest: new,
                            left: old,
                            right: one,
                        });
                        self.emit(Instruction::Store {
                            address,
                            value: new,
                        });

                        if unary.is_postfix {
                            old
                        } else {
                            new
                        }
                    }
                }
            }
        }
    }

    fn visit_logical_expr(&mut self, _expr: &Expression, logical: &LogicalExpr) -> ValueId {
        let (rhs_label, end_label) = match logical.operator.kind {
            LogicalOp::And => ("and.rhs", "and.end"),
            LogicalOp::Or => ("or.rhs", "or.end"),
        };

        let lhs = self.visit_expression(&logical.lhs);
        let branch_block = self.current_block;

        let rhs_block = self.func().new_block(rhs_label);
        let end_block = self.func().new_block(end_label);

        // For `&&` a false lhs short-circuits to the join; for `||` a
        // true lhs does
        match logical.operator.kind {
            LogicalOp::And => self.emit(Instruction::Branch {
                condition: lhs,
                true_block: rhs_block,
                false_block: end_block,
            }),
            LogicalOp::Or => self.emit(Instruction::Branch {
                condition: lhs,
                true_block: end_block,
                false_block: rhs_block,
            }),
        }

        self.current_block = rhs_block;
        let rhs = self.visit_expression(&logical.rhs);
        let rhs_exit = self.current_block;
        if !self.is_terminated() {
            self.emit(Instruction::Jump { target: end_block });
        }

        self.current_block = end_block;

        let short_circuit = self.constant_bool(logical.operator.kind == LogicalOp::Or);
        let dest = self.func().new_temp(Type::Bool);
        self.emit(Instruction::Phi {
            dest,
            incoming: vec![(rhs, rhs_exit), (short_circuit, branch_block)],
        });

        dest
    }

    fn visit_literal_expr(&mut self, expr: &Expression, literal: &LiteralExpr) -> ValueId {
        let ty = self.analysis.type_of(expr.id);
        self.func()
            .new_constant(ty, ConstantValue::from(&literal.value))
    }

    fn visit_identifier_expr(&mut self, expr: &Expression, identifier: &IdentifierExpr) -> ValueId {
        self.named_value(&identifier.name, expr.pos())
    }

    fn visit_call_expr(&mut self, expr: &Expression, call: &CallExpr) -> ValueId {
        let function = self.visit_expression(&call.callee);

        let arguments = call
            .arguments
            .iter()
            .map(|argument| self.visit_expression(argument))
            .collect();

        let return_type = self.analysis.type_of(expr.id);
        if return_type.is_void() {
            self.emit(Instruction::Call {
                dest: None,
                function,
                arguments,
            });
            // A void result can never be read; the placeholder keeps
            // the expression result type uniform
            self.func().new_temp(Type::Void)
        } else {
            let dest = self.func().new_temp(return_type);
            self.emit(Instruction::Call {
                dest: Some(dest),
                function,
                arguments,
            });
            dest
        }
    }

    fn visit_index_expr(&mut self, expr: &Expression, _index: &IndexExpr) -> ValueId {
        let ty = self.analysis.type_of(expr.id);

        let Some(address) = self.lower_address(expr) else {
            return self.func().new_temp(ty);
        };

        let dest = self.func().new_temp(ty);
        self.emit(Instruction::Load { dest, address });
        dest
    }

    fn visit_member_expr(&mut self, expr: &Expression, _member: &MemberExpr) -> ValueId {
        let ty = self.analysis.type_of(expr.id);

        let Some(address) = self.lower_address(expr) else {
            return self.func().new_temp(ty);
        };

        let dest = self.func().new_temp(ty);
        self.emit(Instruction::Load { dest, address });
        dest
    }

    fn visit_assignment_expr(&mut self, expr: &Expression, assignment: &AssignmentExpr) -> ValueId {
        let value = self.visit_expression(&assignment.value);

        match &assignment.operator {
            // Compound assignment desugars to the binary operation on
            // the target's current value
            Some(operator) => {
                let ty = self.analysis.type_of(expr.id);
                let Some(op) = lower_binary_op(operator.kind) else {
                    self.error(expr.pos(), "unsupported binary operator");
                    return value;
                };

                match &assignment.target.kind {
                    ExpressionKind::Identifier(ident) => {
                        let target = self.named_value(&ident.name, assignment.target.pos());
                        let result = self.func().new_temp(ty);
                        self.emit(Instruction::Binary {
                            op,
                            dest: result,
                            left: target,
                            right: value,
                        });
                        self.emit(Instruction::Copy {
                            dest: target,
                            value: result,
                        });
                        target
                    }
                    _ => {
                        // Address computed once; read-modify-write
                        let Some(address) = self.lower_address(&assignment.target) else {
                            return value;
                        };
                        let old = self.func().new_temp(ty.clone());
                        self.emit(Instruction::Load {
                            dest: old,
                            address,
                        });
                        let result = self.func().new_temp(ty);
                        self.emit(Instruction::Binary {
                            op,
                            dest: result,
                            left: old,
                            right: value,
                        });
                        self.emit(Instruction::Store {
                            address,
                            value: result,
                        });
                        result
                    }
                }
            }
            None => {
                self.store_to(&assignment.target, value);
                value
            }
        }
    }

    fn visit_grouping_expr(&mut self, _expr: &Expression, inner: &Expression) -> ValueId {
        self.visit_expression(inner)
    }

    fn visit_array_literal_expr(&mut self, expr: &Expression, array: &ArrayLiteralExpr) -> ValueId {
        let ty = self.analysis.type_of(expr.id);
        let element_type = match &ty {
            Type::Array(array_type) => array_type.element.clone(),
            _ => Type::Invalid,
        };

        let dest = self.func().new_temp(ty.clone());
        self.emit(Instruction::Alloca { dest, ty });

        for (i, element) in array.elements.iter().enumerate() {
            let value = self.visit_expression(element);
            let index = self.constant_int(i as i64);
            let address = self.func().new_temp(element_type.clone());
            self.emit(Instruction::GetElementPtr {
                dest: address,
                base: dest,
                index,
            });
            self.emit(Instruction::Store { address, value });
        }

        dest
    }

    fn visit_struct_literal_expr(
        &mut self,
        expr: &Expression,
        literal: &StructLiteralExpr,
    ) -> ValueId {
        let ty = self.analysis.type_of(expr.id);
        let strukt = match &ty {
            Type::Struct(strukt) => Some(strukt.clone()),
            _ => None,
        };

        let dest = self.func().new_temp(ty.clone());
        self.emit(Instruction::Alloca { dest, ty });

        for field in &literal.fields {
            let value = self.visit_expression(&field.value);

            let Some((field_index, declared)) = strukt
                .as_ref()
                .and_then(|s| s.field(&field.name.name).map(|(i, f)| (i, f.ty.clone())))
            else {
                continue;
            };

            let address = self.func().new_temp(declared);
            self.emit(Instruction::GetFieldPtr {
                dest: address,
                base: dest,
                field_index,
            });
            self.emit(Instruction::Store { address, value });
        }

        dest
    }
}

fn lower_binary_op(op: BinaryOp) -> Option<BinaryOperator> {
    match op {
        BinaryOp::Add => Some(BinaryOperator::Add),
        BinaryOp::Subtract => Some(BinaryOperator::Sub),
        BinaryOp::Multiply => Some(BinaryOperator::Mul),
        BinaryOp::Divide => Some(BinaryOperator::Div),
        BinaryOp::Modulo => Some(BinaryOperator::Mod),
        BinaryOp::Equal => Some(BinaryOperator::Eq),
        BinaryOp::NotEqual => Some(BinaryOperator::Ne),
        BinaryOp::Less => Some(BinaryOperator::Lt),
        BinaryOp::LessEqual => Some(BinaryOperator::Le),
        BinaryOp::Greater => Some(BinaryOperator::Gt),
        BinaryOp::GreaterEqual => Some(BinaryOperator::Ge),
        BinaryOp::BitAnd => Some(BinaryOperator::BitAnd),
        BinaryOp::BitOr => Some(BinaryOperator::BitOr),
        BinaryOp::BitXor => Some(BinaryOperator::BitXor),
        BinaryOp::ShiftLeft => Some(BinaryOperator::Shl),
        BinaryOp::ShiftRight => Some(BinaryOperator::Shr),
        BinaryOp::Power => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::frontend::SourceFile;
    use crate::middle::analyze;

    fn build_module(source: &str) -> Module {
        let file = SourceFile::from_memory(source);
        let (ast, errors) = Parser::parse_file(&file);
        assert!(errors.is_empty(), "parse errors: {errors:?}");

        let (analysis, errors) = analyze::analyze(&ast);
        assert!(errors.is_empty(), "semantic errors: {errors:?}");

        let (module, errors) = build(&ast, &analysis);
        assert!(errors.is_empty(), "ir errors: {errors:?}");
        module
    }

    fn instructions(function: &Function) -> Vec<&Instruction> {
        function
            .blocks
            .values()
            .flat_map(|block| block.instructions.iter())
            .collect()
    }

    #[test]
    fn void_function_gets_implicit_return() {
        let module = build_module("package p; func f() { }");
        let function = module.function("f").unwrap();

        assert!(matches!(
            function.block(function.entry).terminator(),
            Some(Instruction::Return { value: None })
        ));
    }

    #[test]
    fn local_initializer_becomes_copy_of_constant() {
        let module = build_module("package p; func f() int { var x int = 5; return x; }");
        let function = module.function("f").unwrap();

        let copy = instructions(function)
            .into_iter()
            .find_map(|i| match i {
                Instruction::Copy { dest, value } => Some((*dest, *value)),
                _ => None,
            })
            .expect("expected a copy for the initializer");

        assert_eq!(function.value(copy.0).name.as_deref(), Some("x"));
        assert!(function.value(copy.1).is_constant());
        assert!(function.locals.contains(&copy.0));
    }

    #[test]
    fn if_lowering_creates_branch_diamond() {
        let module = build_module(
            "package p; func f(c bool) int { if (c) { return 1; } return 2; }",
        );
        let function = module.function("f").unwrap();

        let Some(Instruction::Branch {
            true_block,
            false_block,
            ..
        }) = function.block(function.entry).terminator()
        else {
            panic!("entry should end in a branch");
        };

        assert!(function.block(*true_block).label.starts_with("if.then"));
        // No else branch: the false edge goes to the end block
        assert!(function.block(*false_block).label.starts_with("if.end"));

        // Both arms return
        assert!(matches!(
            function.block(*true_block).terminator(),
            Some(Instruction::Return { value: Some(_) })
        ));
    }

    #[test]
    fn while_lowering_shapes_the_loop() {
        let module = build_module(
            "package p; func f() int { var i int = 0; while (i < 3) { i = i + 1; } return i; }",
        );
        let function = module.function("f").unwrap();

        let cond = function
            .blocks
            .values()
            .find(|b| b.label.starts_with("while.cond"))
            .unwrap();
        let body = function
            .blocks
            .values()
            .find(|b| b.label.starts_with("while.body"))
            .unwrap();
        let end = function
            .blocks
            .values()
            .find(|b| b.label.starts_with("while.end"))
            .unwrap();

        // Condition branches into body or end; body jumps back
        assert!(matches!(
            cond.terminator(),
            Some(Instruction::Branch { true_block, false_block, .. })
                if *true_block == body.id && *false_block == end.id
        ));
        assert!(matches!(
            body.terminator(),
            Some(Instruction::Jump { target }) if *target == cond.id
        ));

        // The loop back-edge makes the condition block a join point
        assert_eq!(cond.predecessors.len(), 2);
    }

    #[test]
    fn for_lowering_routes_continue_through_post() {
        let module = build_module(
            "package p; func f() { for (var i int = 0; i < 3; i = i + 1) { continue; } }",
        );
        let function = module.function("f").unwrap();

        let body = function
            .blocks
            .values()
            .find(|b| b.label.starts_with("for.body"))
            .unwrap();
        let post = function
            .blocks
            .values()
            .find(|b| b.label.starts_with("for.post"))
            .unwrap();
        let cond = function
            .blocks
            .values()
            .find(|b| b.label.starts_with("for.cond"))
            .unwrap();

        assert!(matches!(
            body.terminator(),
            Some(Instruction::Jump { target }) if *target == post.id
        ));
        assert!(matches!(
            post.terminator(),
            Some(Instruction::Jump { target }) if *target == cond.id
        ));
    }

    #[test]
    fn break_jumps_to_loop_end() {
        let module = build_module(
            "package p; func f() int { var i int = 0; \
             while (i < 10) { if (i == 5) { break; } i = i + 1; } return i; }",
        );
        let function = module.function("f").unwrap();

        let end = function
            .blocks
            .values()
            .find(|b| b.label.starts_with("while.end"))
            .unwrap();

        // The break edge lands in while.end alongside the condition's
        // false edge
        assert!(end.predecessors.len() >= 2);
    }

    #[test]
    fn short_circuit_and_becomes_control_flow() {
        let module = build_module(
            "package p; func f(a bool, b bool) bool { return a && b; }",
        );
        let function = module.function("f").unwrap();

        // No strict And instruction anywhere
        assert!(!instructions(function)
            .iter()
            .any(|i| matches!(i, Instruction::Binary { op: BinaryOperator::And, .. })));

        // The join block carries a phi whose incomings match its
        // predecessors
        let (join_id, phi) = function
            .blocks
            .iter()
            .find_map(|(id, block)| {
                block.instructions.iter().find_map(|i| match i {
                    Instruction::Phi { incoming, .. } => Some((*id, incoming.clone())),
                    _ => None,
                })
            })
            .expect("expected a phi join");

        let mut incoming_blocks: Vec<BlockId> = phi.iter().map(|(_, b)| *b).collect();
        incoming_blocks.sort();
        let mut predecessors = function.block(join_id).predecessors.clone();
        predecessors.sort();
        assert_eq!(incoming_blocks, predecessors);

        // The short-circuit edge carries `false` for &&
        assert!(phi.iter().any(|(value, _)| {
            function.value(*value).constant == Some(ConstantValue::Bool(false))
        }));
    }

    #[test]
    fn switch_lowers_to_comparison_chain() {
        let module = build_module(
            "package p; func f(x int) int { switch (x) { \
             case 1: return 10; case 2, 3: return 20; default: return 0; } }",
        );
        let function = module.function("f").unwrap();

        let eq_tests = instructions(function)
            .iter()
            .filter(|i| matches!(i, Instruction::Binary { op: BinaryOperator::Eq, .. }))
            .count();
        // One test per case value
        assert_eq!(eq_tests, 3);

        assert!(function
            .blocks
            .values()
            .any(|b| b.label.starts_with("switch.default")));
    }

    #[test]
    fn calls_carry_destination_only_for_non_void() {
        let module = build_module(
            "package p; func g() { } func h() int { return 1; } \
             func f() { g(); var x int = h(); }",
        );
        let function = module.function("f").unwrap();

        let calls: Vec<_> = instructions(function)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::Call { dest, function, .. } => Some((*dest, *function)),
                _ => None,
            })
            .collect();

        assert_eq!(calls.len(), 2);
        let g = calls
            .iter()
            .find(|(_, f)| function.value(*f).name.as_deref() == Some("g"))
            .unwrap();
        assert!(g.0.is_none());
        let h = calls
            .iter()
            .find(|(_, f)| function.value(*f).name.as_deref() == Some("h"))
            .unwrap();
        assert!(h.0.is_some());
    }

    #[test]
    fn compound_assignment_desugars_to_binary_op() {
        let module = build_module("package p; func f() int { var x int = 1; x += 2; return x; }");
        let function = module.function("f").unwrap();

        assert!(instructions(function).iter().any(|i| matches!(
            i,
            Instruction::Binary {
                op: BinaryOperator::Add,
                ..
            }
        )));
    }

    #[test]
    fn postfix_increment_returns_old_value() {
        let module = build_module(
            "package p; func f() int { var x int = 1; var y int = x++; return y; }",
        );
        let function = module.function("f").unwrap();

        // The adjusted value is written back to x
        let wrote_back = instructions(function).iter().any(|i| {
            matches!(i, Instruction::Copy { dest, .. }
                if function.value(*dest).name.as_deref() == Some("x"))
        });
        assert!(wrote_back);

        // And an addition by one happened
        assert!(instructions(function).iter().any(|i| matches!(
            i,
            Instruction::Binary {
                op: BinaryOperator::Add,
                ..
            }
        )));
    }

    #[test]
    fn member_increment_computes_its_address_once() {
        let module = build_module(
            "package p; struct Point { x int; } \
             func f() int { var pt = Point{x: 1}; pt.x++; return pt.x; }",
        );
        let function = module.function("f").unwrap();

        // One field address for the literal's store, one shared by the
        // increment's load and store, one for the final read
        let field_ptrs = instructions(function)
            .iter()
            .filter(|i| matches!(i, Instruction::GetFieldPtr { .. }))
            .count();
        assert_eq!(field_ptrs, 3);

        // The increment's load and write-back go through the same
        // address value
        let load_addresses: Vec<ValueId> = instructions(function)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::Load { address, .. } => Some(*address),
                _ => None,
            })
            .collect();
        let store_addresses: Vec<ValueId> = instructions(function)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::Store { address, .. } => Some(*address),
                _ => None,
            })
            .collect();
        assert!(load_addresses
            .iter()
            .any(|address| store_addresses.contains(address)));
    }

    #[test]
    fn index_increment_computes_its_address_once() {
        let module = build_module(
            "package p; func f() int { var xs = [1, 2]; xs[1]++; return xs[1]; }",
        );
        let function = module.function("f").unwrap();

        // Two element addresses for the literal's stores, one shared by
        // the increment, one for the final read
        let element_ptrs = instructions(function)
            .iter()
            .filter(|i| matches!(i, Instruction::GetElementPtr { .. }))
            .count();
        assert_eq!(element_ptrs, 4);
    }

    #[test]
    fn array_literal_allocates_and_stores_elements() {
        let module = build_module(
            "package p; func f() int { var xs = [1, 2, 3]; return xs[0]; }",
        );
        let function = module.function("f").unwrap();

        let all = instructions(function);
        assert!(all.iter().any(|i| matches!(i, Instruction::Alloca { .. })));
        let stores = all
            .iter()
            .filter(|i| matches!(i, Instruction::Store { .. }))
            .count();
        assert_eq!(stores, 3);
        assert!(all.iter().any(|i| matches!(i, Instruction::Load { .. })));
    }

    #[test]
    fn struct_literal_stores_fields_by_declared_index() {
        let module = build_module(
            "package p; struct Point { x int; y int; } \
             func f() int { var pt = Point{y: 2, x: 1}; return pt.y; }",
        );
        let function = module.function("f").unwrap();

        let field_indices: Vec<usize> = instructions(function)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::GetFieldPtr { field_index, .. } => Some(*field_index),
                _ => None,
            })
            .collect();

        // y (index 1) is initialized first per source order, then x,
        // then the read of pt.y
        assert_eq!(field_indices, vec![1, 0, 1]);
    }

    #[test]
    fn globals_are_registered_on_the_module() {
        let module = build_module("package p; var counter int; func f() { }");
        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].name.as_deref(), Some("counter"));
        assert!(module.globals[0].ty.is_integer());
    }

    #[test]
    fn statements_after_return_are_dropped() {
        let module = build_module(
            "package p; func f() int { return 1; var x int = 2; return x; }",
        );
        let function = module.function("f").unwrap();

        let entry = function.block(function.entry);
        assert_eq!(entry.instructions.len(), 1);
        assert!(matches!(
            entry.instructions[0],
            Instruction::Return { value: Some(_) }
        ));
    }
}
