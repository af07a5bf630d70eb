//! Structural IR verification. All failures are collected; nothing is
//! repaired. The pipeline runs the verifier after building and again
//! after optimization (the second run additionally requires every
//! non-entry block to be reachable through at least one predecessor).

use crate::diagnostics::{Diagnostic, Phase};
use crate::frontend::position::Position;
use crate::index::Index;
use crate::middle::ir::{Function, Instruction, Module};
use crate::middle::ty::Type;

/// Checks the module's structural invariants. `after_optimization`
/// enables the predecessor requirement for non-entry blocks.
pub fn verify(module: &Module, after_optimization: bool) -> Vec<Diagnostic> {
    let mut errors = Vec::new();

    for function in &module.functions {
        verify_function(function, after_optimization, &mut errors);
    }

    errors
}

fn verify_function(function: &Function, after_optimization: bool, errors: &mut Vec<Diagnostic>) {
    let mut error = |message: String| {
        errors.push(Diagnostic::new(Phase::Verify, Position::none(), message));
    };

    for block in function.blocks.values() {
        // Exactly one terminator, and it is the last instruction
        match block.instructions.last() {
            Some(last) if last.is_terminator() => {}
            _ => error(format!(
                "block {} in function {} has no terminator",
                block.label, function.name
            )),
        }

        for instruction in block
            .instructions
            .iter()
            .take(block.instructions.len().saturating_sub(1))
        {
            if instruction.is_terminator() {
                error(format!(
                    "block {} in function {} has instructions after its terminator",
                    block.label, function.name
                ));
                break;
            }
        }

        // Successor lists must agree with the terminator
        if let Some(terminator) = block.terminator() {
            let mut expected: Vec<_> = match terminator {
                Instruction::Jump { target } => vec![*target],
                Instruction::Branch {
                    true_block,
                    false_block,
                    ..
                } => vec![*true_block, *false_block],
                _ => Vec::new(),
            };
            expected.sort();
            expected.dedup();

            let mut actual = block.successors.clone();
            actual.sort();
            actual.dedup();

            if expected != actual {
                error(format!(
                    "successors of block {} in function {} do not match its terminator",
                    block.label, function.name
                ));
            }
        }

        // Edges must be recorded on both ends
        for &successor in &block.successors {
            let mutual = function
                .blocks
                .get(&successor)
                .is_some_and(|s| s.predecessors.contains(&block.id));
            if !mutual {
                error(format!(
                    "edge {} -> bb{} in function {} is not mutually recorded",
                    block.label,
                    successor.index(),
                    function.name
                ));
            }
        }

        // Phi incomings mirror the block's predecessors
        for instruction in &block.instructions {
            match instruction {
                Instruction::Phi { incoming, .. } => {
                    let mut incoming_blocks: Vec<_> =
                        incoming.iter().map(|(_, block)| *block).collect();
                    incoming_blocks.sort();

                    let mut predecessors = block.predecessors.clone();
                    predecessors.sort();

                    if incoming_blocks != predecessors {
                        error(format!(
                            "phi in block {} of function {} does not cover its predecessors",
                            block.label, function.name
                        ));
                    }
                }
                Instruction::Call { dest, function: callee, .. } => {
                    if let Type::Function(signature) = &function.value(*callee).ty {
                        let returns_value = !signature.return_type.is_void();
                        if returns_value != dest.is_some() {
                            error(format!(
                                "call in block {} of function {} disagrees with its callee's return type",
                                block.label, function.name
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // The entry block is never a jump target
    if !function.block(function.entry).predecessors.is_empty() {
        error(format!(
            "entry block of function {} has predecessors",
            function.name
        ));
    }

    if after_optimization {
        for block in function.blocks.values() {
            if block.id != function.entry && block.predecessors.is_empty() {
                error(format!(
                    "block {} in function {} is unreachable",
                    block.label, function.name
                ));
            }
        }
    }
}
