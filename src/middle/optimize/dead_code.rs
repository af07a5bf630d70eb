//! Dead-code elimination and unreachable-block removal.
//!
//! DCE is the textbook mark/sweep: critical instructions (stores,
//! calls, returns, branches, jumps) are roots; everything a root
//! transitively reads through def-use chains is marked; the sweep
//! drops unmarked non-critical instructions. Mark and sweep iterate to
//! a local fixed point so chains of dead instructions disappear in one
//! pass run.
//!
//! Unreachable-block removal walks the successor graph from the entry
//! block with an explicit stack, deletes everything unvisited, and
//! renumbers the surviving block indices. Predecessor lists and Phi
//! incomings referencing deleted blocks are pruned so the CFG stays
//! consistent for the verifier.

use hashbrown::{HashMap, HashSet};

use crate::middle::ir::{BlockId, Function, ValueId};
use crate::middle::optimize::{OptimizeError, Pass};

pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run(&self, function: &mut Function) -> Result<bool, OptimizeError> {
        let mut changed = false;

        loop {
            let used = mark_used_values(function);
            if !sweep(function, &used) {
                break;
            }
            changed = true;
        }

        Ok(changed)
    }
}

/// Marks every value transitively required by a critical instruction.
fn mark_used_values(function: &Function) -> HashSet<ValueId> {
    // Where each value is defined, for chasing def-use chains
    let mut definitions: HashMap<ValueId, (BlockId, usize)> = HashMap::new();
    for (&block_id, block) in &function.blocks {
        for (i, instruction) in block.instructions.iter().enumerate() {
            if let Some(dest) = instruction.result() {
                definitions.insert(dest, (block_id, i));
            }
        }
    }

    let mut used = HashSet::new();
    let mut worklist: Vec<ValueId> = Vec::new();

    for block in function.blocks.values() {
        for instruction in &block.instructions {
            if instruction.is_critical() {
                worklist.extend(instruction.operands());
            }
        }
    }

    while let Some(value) = worklist.pop() {
        // Constants are always available and need no defining
        // instruction
        if function.value(value).is_constant() || !used.insert(value) {
            continue;
        }

        if let Some(&(block_id, i)) = definitions.get(&value) {
            worklist.extend(function.block(block_id).instructions[i].operands());
        }
    }

    used
}

/// Drops non-critical instructions whose results are unused. Returns
/// whether anything was removed.
fn sweep(function: &mut Function, used: &HashSet<ValueId>) -> bool {
    let mut removed = false;

    for block in function.blocks.values_mut() {
        let before = block.instructions.len();

        block.instructions.retain(|instruction| {
            if instruction.is_critical() {
                return true;
            }
            match instruction.result() {
                Some(dest) => used.contains(&dest),
                None => false,
            }
        });

        removed |= block.instructions.len() != before;
    }

    removed
}

pub struct UnreachableBlockRemoval;

impl Pass for UnreachableBlockRemoval {
    fn name(&self) -> &'static str {
        "unreachable-block-removal"
    }

    fn run(&self, function: &mut Function) -> Result<bool, OptimizeError> {
        Ok(function.remove_unreachable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{BinaryOperator, ConstantValue, Instruction};
    use crate::middle::ty::Type;

    #[test]
    fn removes_computation_with_unused_result() {
        // t3 = 100 * 200 (unused); return 5
        let mut function = Function::new("f", vec![], Type::Int);
        let entry = function.entry;

        let hundred = function.new_constant(Type::Int, ConstantValue::Int(100));
        let two_hundred = function.new_constant(Type::Int, ConstantValue::Int(200));
        let five = function.new_constant(Type::Int, ConstantValue::Int(5));
        let t = function.new_temp(Type::Int);

        function.append(
            entry,
            Instruction::Binary {
                op: BinaryOperator::Mul,
                dest: t,
                left: hundred,
                right: two_hundred,
            },
        );
        function.append(entry, Instruction::Return { value: Some(five) });

        let changed = DeadCodeElimination.run(&mut function).unwrap();

        assert!(changed);
        assert_eq!(function.block(entry).instructions.len(), 1);
        assert!(matches!(
            function.block(entry).instructions[0],
            Instruction::Return { .. }
        ));
    }

    #[test]
    fn keeps_transitively_used_chains() {
        // t = 2 + 3; u = t * 4; return u — everything is live
        let mut function = Function::new("f", vec![], Type::Int);
        let entry = function.entry;

        let two = function.new_constant(Type::Int, ConstantValue::Int(2));
        let three = function.new_constant(Type::Int, ConstantValue::Int(3));
        let four = function.new_constant(Type::Int, ConstantValue::Int(4));
        let t = function.new_temp(Type::Int);
        let u = function.new_temp(Type::Int);

        function.append(
            entry,
            Instruction::Binary {
                op: BinaryOperator::Add,
                dest: t,
                left: two,
                right: three,
            },
        );
        function.append(
            entry,
            Instruction::Binary {
                op: BinaryOperator::Mul,
                dest: u,
                left: t,
                right: four,
            },
        );
        function.append(entry, Instruction::Return { value: Some(u) });

        let changed = DeadCodeElimination.run(&mut function).unwrap();

        assert!(!changed);
        assert_eq!(function.block(entry).instructions.len(), 3);
    }

    #[test]
    fn dead_chains_collapse_in_one_pass_run() {
        // a = 1 + 2; b = a + 3; both dead once the return ignores them
        let mut function = Function::new("f", vec![], Type::Int);
        let entry = function.entry;

        let one = function.new_constant(Type::Int, ConstantValue::Int(1));
        let two = function.new_constant(Type::Int, ConstantValue::Int(2));
        let three = function.new_constant(Type::Int, ConstantValue::Int(3));
        let a = function.new_temp(Type::Int);
        let b = function.new_temp(Type::Int);

        function.append(
            entry,
            Instruction::Binary {
                op: BinaryOperator::Add,
                dest: a,
                left: one,
                right: two,
            },
        );
        function.append(
            entry,
            Instruction::Binary {
                op: BinaryOperator::Add,
                dest: b,
                left: a,
                right: three,
            },
        );
        function.append(entry, Instruction::Return { value: Some(one) });

        DeadCodeElimination.run(&mut function).unwrap();
        assert_eq!(function.block(entry).instructions.len(), 1);
    }

    #[test]
    fn stores_and_calls_are_never_removed() {
        let mut function = Function::new("f", vec![], Type::Void);
        let entry = function.entry;

        let callee = function.new_value(
            Some("g".to_owned()),
            Type::function(vec![], Type::Void),
            crate::middle::ir::ValueKind::Variable,
        );
        let slot = function.new_temp(Type::Int);
        let one = function.new_constant(Type::Int, ConstantValue::Int(1));

        function.append(
            entry,
            Instruction::Store {
                address: slot,
                value: one,
            },
        );
        function.append(
            entry,
            Instruction::Call {
                dest: None,
                function: callee,
                arguments: vec![],
            },
        );
        function.append(entry, Instruction::Return { value: None });

        let changed = DeadCodeElimination.run(&mut function).unwrap();

        assert!(!changed);
        assert_eq!(function.block(entry).instructions.len(), 3);
    }

    #[test]
    fn unreachable_blocks_are_deleted_and_indices_renumbered() {
        let mut function = Function::new("f", vec![], Type::Int);
        let entry = function.entry;
        let orphan = function.new_block("orphan");
        let tail = function.new_block("tail");

        let one = function.new_constant(Type::Int, ConstantValue::Int(1));
        function.append(entry, Instruction::Jump { target: tail });
        function.append(orphan, Instruction::Return { value: Some(one) });
        function.append(tail, Instruction::Return { value: Some(one) });

        let changed = UnreachableBlockRemoval.run(&mut function).unwrap();

        assert!(changed);
        assert!(!function.blocks.contains_key(&orphan));
        let indices: Vec<usize> = function.blocks.values().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn reachability_follows_all_branch_edges() {
        let mut function = Function::new("f", vec![], Type::Int);
        let entry = function.entry;
        let left = function.new_block("left");
        let right = function.new_block("right");

        let cond = function.new_temp(Type::Bool);
        let one = function.new_constant(Type::Int, ConstantValue::Int(1));

        function.append(
            entry,
            Instruction::Branch {
                condition: cond,
                true_block: left,
                false_block: right,
            },
        );
        function.append(left, Instruction::Return { value: Some(one) });
        function.append(right, Instruction::Return { value: Some(one) });

        let changed = UnreachableBlockRemoval.run(&mut function).unwrap();
        assert!(!changed);
        assert_eq!(function.blocks.len(), 3);
    }

    #[test]
    fn phi_incomings_from_deleted_blocks_are_pruned() {
        let mut function = Function::new("f", vec![], Type::Int);
        let entry = function.entry;
        let orphan = function.new_block("orphan");
        let join = function.new_block("join");

        let one = function.new_constant(Type::Int, ConstantValue::Int(1));
        let two = function.new_constant(Type::Int, ConstantValue::Int(2));

        function.append(entry, Instruction::Jump { target: join });
        // The orphan also jumps to the join, then loses its own
        // incoming edge
        function.append(orphan, Instruction::Jump { target: join });

        let t = function.new_temp(Type::Int);
        function.append(
            join,
            Instruction::Phi {
                dest: t,
                incoming: vec![(one, entry), (two, orphan)],
            },
        );
        function.append(join, Instruction::Return { value: Some(t) });

        UnreachableBlockRemoval.run(&mut function).unwrap();

        let Some(Instruction::Phi { incoming, .. }) =
            function.block(join).instructions.first()
        else {
            panic!("phi expected");
        };
        assert_eq!(incoming.len(), 1);
        assert_eq!(function.block(join).predecessors, vec![entry]);
    }
}
