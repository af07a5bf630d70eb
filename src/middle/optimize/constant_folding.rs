//! Constant folding with constant propagation.
//!
//! A map from values to known constants is seeded from `Copy`
//! instructions whose source is a constant, then every binary and
//! unary instruction over mapped operands is replaced by a `Copy` of
//! the computed constant. Folded destinations feed back into the map
//! so chains collapse within one run. Known constants are also
//! propagated into the operands of copies, branches, returns, calls,
//! stores, and phis, and a branch on a known condition is rewritten to
//! a jump (orphaning its dead edge for unreachable-block removal).
//!
//! Only values with exactly one definition enter the map: a
//! multiply-assigned variable (a loop counter, say) has no single
//! compile-time value, and admitting it would fold `i == 5` against
//! `i`'s initializer.
//!
//! Folding covers integer arithmetic/bitwise/comparison operations and
//! boolean `!`. Floating-point folding is out of scope, and `&&`/`||`
//! never reach this pass as strict operations (the builder lowers them
//! to branches). Division and modulo by zero, and any overflowing
//! division, are left for runtime.

use hashbrown::{HashMap, HashSet};

use crate::middle::ir::{
    BinaryOperator, ConstantValue, Function, Instruction, UnaryOperator, ValueId,
};
use crate::middle::optimize::{OptimizeError, Pass};
use crate::middle::ty::Type;

pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&self, function: &mut Function) -> Result<bool, OptimizeError> {
        Ok(fold_function(function))
    }
}

fn fold_function(function: &mut Function) -> bool {
    let mut changed = false;

    let single_definitions = single_definition_set(function);
    let mut constants: HashMap<ValueId, ConstantValue> = HashMap::new();

    // Seed: copies of constants into single-definition values
    for block in function.blocks.values() {
        for instruction in &block.instructions {
            if let Instruction::Copy { dest, value } = instruction {
                if single_definitions.contains(dest) {
                    if let Some(constant) = function.value(*value).constant.clone() {
                        constants.insert(*dest, constant);
                    }
                }
            }
        }
    }

    // Fold arithmetic over known constants, feeding results back into
    // the map so chains collapse transitively
    let block_ids: Vec<_> = function.blocks.keys().copied().collect();
    for block_id in &block_ids {
        for i in 0..function.block(*block_id).instructions.len() {
            let instruction = function.block(*block_id).instructions[i].clone();

            let folded = match &instruction {
                Instruction::Binary {
                    op,
                    dest,
                    left,
                    right,
                } => fold_binary(function, &constants, *op, *left, *right).map(|c| (*dest, c)),
                Instruction::Unary { op, dest, operand } => {
                    fold_unary(function, &constants, *op, *operand).map(|c| (*dest, c))
                }
                _ => None,
            };

            if let Some((dest, constant)) = folded {
                let ty = match constant {
                    ConstantValue::Bool(_) => Type::Bool,
                    _ => Type::Int,
                };
                let source = function.new_constant(ty, constant.clone());
                function.block_mut(*block_id).instructions[i] =
                    Instruction::Copy { dest, value: source };

                if single_definitions.contains(&dest) {
                    constants.insert(dest, constant);
                }
                changed = true;
            }
        }
    }

    // Propagate: rewrite operands that resolve to known constants
    for block_id in &block_ids {
        for i in 0..function.block(*block_id).instructions.len() {
            let mut instruction = function.block(*block_id).instructions[i].clone();
            let mut rewritten = false;

            {
                let mut rewrite = |operand: &mut ValueId| {
                    if let Some(constant) = constants.get(operand) {
                        let ty = constant_type(constant);
                        *operand = resolve_constant_value(function, ty, constant.clone());
                        rewritten = true;
                    }
                };

                match &mut instruction {
                    Instruction::Copy { value, .. } => rewrite(value),
                    Instruction::Branch { condition, .. } => rewrite(condition),
                    Instruction::Return { value: Some(value) } => rewrite(value),
                    Instruction::Store { value, .. } => rewrite(value),
                    Instruction::Call { arguments, .. } => {
                        for argument in arguments {
                            rewrite(argument);
                        }
                    }
                    Instruction::Phi { incoming, .. } => {
                        for (value, _) in incoming {
                            rewrite(value);
                        }
                    }
                    _ => {}
                }
            }

            if rewritten {
                function.block_mut(*block_id).instructions[i] = instruction;
                changed = true;
            }
        }
    }

    // A branch whose condition is now a known boolean becomes a jump;
    // the dead edge is unlinked so the orphaned block can be removed
    for block_id in &block_ids {
        let Some(Instruction::Branch {
            condition,
            true_block,
            false_block,
        }) = function.block(*block_id).terminator().cloned()
        else {
            continue;
        };

        let known = function
            .value(condition)
            .constant
            .clone()
            .or_else(|| constants.get(&condition).cloned());

        if let Some(ConstantValue::Bool(taken)) = known {
            let (live, dead) = if taken {
                (true_block, false_block)
            } else {
                (false_block, true_block)
            };

            function.replace_branch_with_jump(*block_id, live, dead);
            changed = true;
        }
    }

    changed
}

/// Values defined by exactly one instruction in the function.
fn single_definition_set(function: &Function) -> HashSet<ValueId> {
    let mut counts: HashMap<ValueId, usize> = HashMap::new();

    for block in function.blocks.values() {
        for instruction in &block.instructions {
            if let Some(dest) = instruction.result() {
                *counts.entry(dest).or_default() += 1;
            }
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count == 1)
        .map(|(value, _)| value)
        .collect()
}

/// The constant behind a value: its own payload, or its mapped
/// compile-time value.
fn constant_of(
    function: &Function,
    constants: &HashMap<ValueId, ConstantValue>,
    value: ValueId,
) -> Option<ConstantValue> {
    if let Some(constant) = &function.value(value).constant {
        return Some(constant.clone());
    }
    constants.get(&value).cloned()
}

fn constant_type(constant: &ConstantValue) -> Type {
    match constant {
        ConstantValue::Int(_) => Type::Int,
        ConstantValue::Float(_) => Type::Float,
        ConstantValue::Bool(_) => Type::Bool,
        ConstantValue::Str(_) => Type::String,
        ConstantValue::Char(_) => Type::Char,
        ConstantValue::Nil => Type::Nil,
    }
}

fn resolve_constant_value(function: &mut Function, ty: Type, constant: ConstantValue) -> ValueId {
    function.new_constant(ty, constant)
}

fn fold_binary(
    function: &Function,
    constants: &HashMap<ValueId, ConstantValue>,
    op: BinaryOperator,
    left: ValueId,
    right: ValueId,
) -> Option<ConstantValue> {
    let left = constant_of(function, constants, left)?;
    let right = constant_of(function, constants, right)?;

    let (ConstantValue::Int(l), ConstantValue::Int(r)) = (left, right) else {
        return None;
    };

    let result = match op {
        BinaryOperator::Add => ConstantValue::Int(l.wrapping_add(r)),
        BinaryOperator::Sub => ConstantValue::Int(l.wrapping_sub(r)),
        BinaryOperator::Mul => ConstantValue::Int(l.wrapping_mul(r)),
        BinaryOperator::Div => ConstantValue::Int(l.checked_div(r)?),
        BinaryOperator::Mod => ConstantValue::Int(l.checked_rem(r)?),

        BinaryOperator::Eq => ConstantValue::Bool(l == r),
        BinaryOperator::Ne => ConstantValue::Bool(l != r),
        BinaryOperator::Lt => ConstantValue::Bool(l < r),
        BinaryOperator::Le => ConstantValue::Bool(l <= r),
        BinaryOperator::Gt => ConstantValue::Bool(l > r),
        BinaryOperator::Ge => ConstantValue::Bool(l >= r),

        BinaryOperator::BitAnd => ConstantValue::Int(l & r),
        BinaryOperator::BitOr => ConstantValue::Int(l | r),
        BinaryOperator::BitXor => ConstantValue::Int(l ^ r),
        // The shift count must be a representable non-negative amount
        BinaryOperator::Shl => {
            if !(0..64).contains(&r) {
                return None;
            }
            ConstantValue::Int(l.wrapping_shl(r as u32))
        }
        BinaryOperator::Shr => {
            if !(0..64).contains(&r) {
                return None;
            }
            ConstantValue::Int(l.wrapping_shr(r as u32))
        }

        BinaryOperator::And | BinaryOperator::Or => return None,
    };

    Some(result)
}

fn fold_unary(
    function: &Function,
    constants: &HashMap<ValueId, ConstantValue>,
    op: UnaryOperator,
    operand: ValueId,
) -> Option<ConstantValue> {
    match (op, constant_of(function, constants, operand)?) {
        (UnaryOperator::Neg, ConstantValue::Int(v)) => Some(ConstantValue::Int(v.wrapping_neg())),
        (UnaryOperator::BitNot, ConstantValue::Int(v)) => Some(ConstantValue::Int(!v)),
        (UnaryOperator::Not, ConstantValue::Bool(v)) => Some(ConstantValue::Bool(!v)),
        _ => None,
    }
}
