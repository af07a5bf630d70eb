//! Expression type checking rules. Each check records the computed
//! type in the analyzer's node-type map and returns it; `Invalid`
//! stands in after an error so checking can continue.

use hashbrown::HashSet;

use super::Analyzer;
use crate::frontend::ast::visit::Visitor;
use crate::frontend::ast::{
    ArrayLiteralExpr, AssignmentExpr, BinaryExpr, BinaryOp, CallExpr, Expression, ExpressionKind,
    IdentifierExpr, IndexExpr, LiteralExpr, LiteralValue, LogicalExpr, MemberExpr,
    StructLiteralExpr, UnaryExpr, UnaryOp,
};
use crate::middle::symtab::SymbolKind;
use crate::middle::ty::Type;

impl Analyzer {
    pub(super) fn check_binary(&mut self, expr: &Expression, binary: &BinaryExpr) -> Type {
        let left = self.visit_expression(&binary.lhs);
        let right = self.visit_expression(&binary.rhs);
        let operator_pos = binary.operator.span.start.clone();

        let result = match binary.operator.kind {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => {
                if left.is_invalid() || right.is_invalid() {
                    Type::Invalid
                } else if !left.is_numeric() || !right.is_numeric() {
                    self.error(
                        operator_pos,
                        format!(
                            "operator {} requires numeric operands",
                            binary.operator.kind
                        ),
                    );
                    Type::Invalid
                } else if !left.equals(&right) {
                    self.error(
                        operator_pos,
                        format!("mismatched types: {left} and {right}"),
                    );
                    Type::Invalid
                } else {
                    left
                }
            }

            BinaryOp::Equal | BinaryOp::NotEqual => {
                if left.is_invalid() || right.is_invalid() {
                    Type::Invalid
                } else if !left.is_comparable() || !right.is_comparable() {
                    self.error(operator_pos, "operands must be comparable");
                    Type::Invalid
                } else if !left.equals(&right) {
                    self.error(operator_pos, format!("cannot compare {left} and {right}"));
                    Type::Invalid
                } else {
                    Type::Bool
                }
            }

            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                if left.is_invalid() || right.is_invalid() {
                    Type::Invalid
                } else if !left.is_ordered() || !right.is_ordered() {
                    self.error(operator_pos, "operands must be ordered");
                    Type::Invalid
                } else if !left.equals(&right) {
                    self.error(operator_pos, format!("cannot compare {left} and {right}"));
                    Type::Invalid
                } else {
                    Type::Bool
                }
            }

            BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::ShiftLeft
            | BinaryOp::ShiftRight => {
                if left.is_invalid() || right.is_invalid() {
                    Type::Invalid
                } else if !left.is_integer() || !right.is_integer() {
                    self.error(operator_pos, "bitwise operators require integer operands");
                    Type::Invalid
                } else {
                    Type::Int
                }
            }

            BinaryOp::Power => {
                self.error(
                    operator_pos,
                    format!("unknown binary operator: {}", binary.operator.kind),
                );
                Type::Invalid
            }
        };

        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_unary(&mut self, expr: &Expression, unary: &UnaryExpr) -> Type {
        let operand = self.visit_expression(&unary.operand);
        let operator_pos = unary.operator.span.start.clone();

        let result = match unary.operator.kind {
            UnaryOp::Negate => {
                if operand.is_invalid() {
                    Type::Invalid
                } else if !operand.is_numeric() {
                    self.error(operator_pos, "unary - requires numeric operand");
                    Type::Invalid
                } else {
                    operand
                }
            }

            UnaryOp::Not => {
                if operand.is_invalid() {
                    Type::Invalid
                } else if !operand.is_boolean() {
                    self.error(operator_pos, "unary ! requires boolean operand");
                    Type::Invalid
                } else {
                    Type::Bool
                }
            }

            UnaryOp::BitNot => {
                if operand.is_invalid() {
                    Type::Invalid
                } else if !operand.is_integer() {
                    self.error(operator_pos, "unary ~ requires integer operand");
                    Type::Invalid
                } else {
                    Type::Int
                }
            }

            UnaryOp::Increment | UnaryOp::Decrement => {
                if operand.is_invalid() {
                    Type::Invalid
                } else if !operand.is_numeric() {
                    self.error(
                        operator_pos,
                        format!("{} requires numeric operand", unary.operator.kind),
                    );
                    Type::Invalid
                } else {
                    if !unary.operand.is_lvalue() {
                        self.error(
                            operator_pos.clone(),
                            format!("{} requires an assignable operand", unary.operator.kind),
                        );
                    } else if let ExpressionKind::Identifier(ident) = &unary.operand.kind {
                        let name = ident.name.clone();
                        if let Some(id) = self.lookup(&name) {
                            if !self.table.symbol(id).can_assign() {
                                self.error(
                                    operator_pos.clone(),
                                    format!("cannot modify {name}"),
                                );
                            }
                        }
                    }
                    operand
                }
            }
        };

        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_logical(&mut self, expr: &Expression, logical: &LogicalExpr) -> Type {
        let left = self.visit_expression(&logical.lhs);
        let right = self.visit_expression(&logical.rhs);

        if !left.is_boolean() && !left.is_invalid() {
            self.error(logical.lhs.pos().clone(), "left operand must be boolean");
        }
        if !right.is_boolean() && !right.is_invalid() {
            self.error(logical.rhs.pos().clone(), "right operand must be boolean");
        }

        self.types.insert(expr.id, Type::Bool);
        Type::Bool
    }

    pub(super) fn check_literal(&mut self, expr: &Expression, literal: &LiteralExpr) -> Type {
        let result = match literal.value {
            LiteralValue::Int(_) => Type::Int,
            LiteralValue::Float(_) => Type::Float,
            LiteralValue::Bool(_) => Type::Bool,
            LiteralValue::String(_) => Type::String,
            LiteralValue::Char(_) => Type::Char,
            LiteralValue::Nil => Type::Nil,
        };

        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_identifier(
        &mut self,
        expr: &Expression,
        identifier: &IdentifierExpr,
    ) -> Type {
        let Some(id) = self.lookup(&identifier.name) else {
            self.error(
                expr.pos().clone(),
                format!("undefined: {}", identifier.name),
            );
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        };

        let symbol = self.table.symbol(id);
        if matches!(symbol.kind, SymbolKind::TypeAlias | SymbolKind::Struct) {
            self.error(
                expr.pos().clone(),
                format!("{} is a type, not a value", identifier.name),
            );
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        }

        let result = symbol.ty.clone();
        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_call(&mut self, expr: &Expression, call: &CallExpr) -> Type {
        let callee = self.visit_expression(&call.callee);

        let Type::Function(signature) = callee else {
            if !callee.is_invalid() {
                self.error(call.callee.pos().clone(), "expression is not a function");
            }
            // The arguments still get analyzed so their errors surface
            for argument in &call.arguments {
                self.visit_expression(argument);
            }
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        };

        if call.arguments.len() != signature.parameters.len() {
            self.error(
                expr.pos().clone(),
                format!(
                    "expected {} arguments, got {}",
                    signature.parameters.len(),
                    call.arguments.len()
                ),
            );
            for argument in &call.arguments {
                self.visit_expression(argument);
            }
            self.types.insert(expr.id, signature.return_type.clone());
            return signature.return_type.clone();
        }

        for (argument, expected) in call.arguments.iter().zip(&signature.parameters) {
            let argument_type = self.visit_expression(argument);
            self.assignable(&argument_type, expected, argument.pos());
        }

        let result = signature.return_type.clone();
        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_index(&mut self, expr: &Expression, index: &IndexExpr) -> Type {
        let object = self.visit_expression(&index.object);

        let Type::Array(array) = object else {
            if !object.is_invalid() {
                self.error(index.object.pos().clone(), "expression is not an array");
            }
            self.visit_expression(&index.index);
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        };

        let index_type = self.visit_expression(&index.index);
        if !index_type.is_integer() && !index_type.is_invalid() {
            self.error(index.index.pos().clone(), "array index must be integer");
        }

        let result = array.element.clone();
        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_member(&mut self, expr: &Expression, member: &MemberExpr) -> Type {
        let object = self.visit_expression(&member.object);

        let Type::Struct(strukt) = object else {
            if !object.is_invalid() {
                self.error(member.object.pos().clone(), "expression is not a struct");
            }
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        };

        let Some((_, field)) = strukt.field(&member.member.name) else {
            self.error(
                member.member.pos().clone(),
                format!(
                    "struct {} has no field {}",
                    strukt.name, member.member.name
                ),
            );
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        };

        let result = field.ty.clone();
        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_assignment(
        &mut self,
        expr: &Expression,
        assignment: &AssignmentExpr,
    ) -> Type {
        let target_type = self.visit_expression(&assignment.target);
        let value_type = self.visit_expression(&assignment.value);

        match &assignment.target.kind {
            ExpressionKind::Identifier(ident) => {
                let name = ident.name.clone();
                if let Some(id) = self.lookup(&name) {
                    if !self.table.symbol(id).can_assign() {
                        self.error(
                            assignment.target.pos().clone(),
                            format!("cannot assign to {name}"),
                        );
                    }
                }
            }
            ExpressionKind::Index(_) | ExpressionKind::Member(_) => {}
            _ => {
                self.error(
                    assignment.target.pos().clone(),
                    "invalid assignment target",
                );
            }
        }

        match &assignment.operator {
            // `x op= v` checks the operand rules of `op` and that the
            // result flows back into the target
            Some(operator) => {
                let pos = operator.span.start.clone();
                match operator.kind {
                    BinaryOp::Add
                    | BinaryOp::Subtract
                    | BinaryOp::Multiply
                    | BinaryOp::Divide
                    | BinaryOp::Modulo => {
                        if target_type.is_invalid() || value_type.is_invalid() {
                            // already reported
                        } else if !target_type.is_numeric() || !value_type.is_numeric() {
                            self.error(
                                pos,
                                format!("operator {} requires numeric operands", operator.kind),
                            );
                        } else if !target_type.equals(&value_type) {
                            self.error(
                                pos,
                                format!("mismatched types: {target_type} and {value_type}"),
                            );
                        }
                    }
                    _ => {
                        if target_type.is_invalid() || value_type.is_invalid() {
                            // already reported
                        } else if !target_type.is_integer() || !value_type.is_integer() {
                            self.error(
                                pos,
                                "bitwise operators require integer operands",
                            );
                        }
                    }
                }
            }
            None => {
                self.assignable(&value_type, &target_type, assignment.value.pos());
            }
        }

        self.types.insert(expr.id, target_type.clone());
        target_type
    }

    pub(super) fn check_array_literal(
        &mut self,
        expr: &Expression,
        array: &ArrayLiteralExpr,
    ) -> Type {
        let element_types: Vec<Type> = array
            .elements
            .iter()
            .map(|element| self.visit_expression(element))
            .collect();

        let element_type = if let Some(first) = element_types.first() {
            first.clone()
        } else {
            self.error(
                expr.pos().clone(),
                "cannot infer array type from empty literal",
            );
            Type::Invalid
        };

        for (element, ty) in array.elements.iter().zip(&element_types) {
            self.assignable(ty, &element_type, element.pos());
        }

        let result = Type::array(element_type, Some(array.elements.len()));
        self.types.insert(expr.id, result.clone());
        result
    }

    pub(super) fn check_struct_literal(
        &mut self,
        expr: &Expression,
        literal: &StructLiteralExpr,
    ) -> Type {
        let Some(id) = self.lookup(&literal.type_name.name) else {
            self.error(
                literal.type_name.pos().clone(),
                format!("undefined struct: {}", literal.type_name.name),
            );
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        };

        let symbol = self.table.symbol(id);
        if symbol.kind != SymbolKind::Struct {
            self.error(
                literal.type_name.pos().clone(),
                format!("{} is not a struct", literal.type_name.name),
            );
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        }

        let Type::Struct(strukt) = symbol.ty.clone() else {
            self.types.insert(expr.id, Type::Invalid);
            return Type::Invalid;
        };

        let mut provided = HashSet::new();
        for field in &literal.fields {
            let Some((_, declared)) = strukt.field(&field.name.name) else {
                self.error(
                    field.name.pos().clone(),
                    format!("struct {} has no field {}", strukt.name, field.name.name),
                );
                self.visit_expression(&field.value);
                continue;
            };

            if !provided.insert(field.name.name.clone()) {
                self.error(
                    field.name.pos().clone(),
                    format!("duplicate field: {}", field.name.name),
                );
                continue;
            }

            let declared_type = declared.ty.clone();
            let value_type = self.visit_expression(&field.value);
            self.assignable(&value_type, &declared_type, field.value.pos());
        }

        for declared in &strukt.fields {
            if !provided.contains(&declared.name) {
                self.error(
                    expr.pos().clone(),
                    format!("missing field: {}", declared.name),
                );
            }
        }

        let result = Type::Struct(strukt);
        self.types.insert(expr.id, result.clone());
        result
    }
}
