//! The optimization pass manager.
//!
//! Passes run per function, in order, and the whole pipeline is
//! iterated until no pass reports a change (or the iteration cap is
//! reached, default 10). The fixed point makes the optimizer
//! idempotent: running it twice yields the IR of running it once.

use thiserror::Error;

use crate::middle::ir::{Function, Module};

pub mod constant_folding;
pub mod dead_code;

pub use constant_folding::ConstantFolding;
pub use dead_code::{DeadCodeElimination, UnreachableBlockRemoval};

/// An IR-to-IR transformation over a single function.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Runs the pass; `Ok(true)` when the function was modified.
    fn run(&self, function: &mut Function) -> Result<bool, OptimizeError>;
}

#[derive(Debug, Error)]
#[error("pass {pass} failed: {message}")]
pub struct OptimizeError {
    pub pass: &'static str,
    pub message: String,
}

pub struct Optimizer {
    passes: Vec<Box<dyn Pass>>,
    max_iterations: usize,
}

impl Optimizer {
    /// The default pipeline: constant folding (with propagation), dead
    /// code elimination, unreachable-block removal.
    pub fn new() -> Self {
        Self {
            passes: vec![
                Box::new(ConstantFolding),
                Box::new(DeadCodeElimination),
                Box::new(UnreachableBlockRemoval),
            ],
            max_iterations: 10,
        }
    }

    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    pub fn optimize(&self, module: &mut Module) -> Result<(), OptimizeError> {
        for function in &mut module.functions {
            self.optimize_function(function)?;
        }
        Ok(())
    }

    /// Applies the pass pipeline to one function until a fixed point.
    pub fn optimize_function(&self, function: &mut Function) -> Result<(), OptimizeError> {
        for _ in 0..self.max_iterations {
            let mut changed = false;
            for pass in &self.passes {
                changed |= pass.run(function)?;
            }
            if !changed {
                break;
            }
        }
        Ok(())
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{ConstantValue, Instruction};
    use crate::middle::ty::Type;

    struct CountingPass(std::rc::Rc<std::cell::Cell<usize>>);

    impl Pass for CountingPass {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self, _function: &mut Function) -> Result<bool, OptimizeError> {
            self.0.set(self.0.get() + 1);
            Ok(false)
        }
    }

    #[test]
    fn pipeline_stops_at_fixed_point() {
        let mut function = Function::new("f", vec![], Type::Int);
        let c = function.new_constant(Type::Int, ConstantValue::Int(1));
        function.append(function.entry, Instruction::Return { value: Some(c) });

        let counter = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut optimizer = Optimizer::new();
        optimizer.add_pass(Box::new(CountingPass(counter.clone())));

        optimizer.optimize_function(&mut function).unwrap();

        // An already-minimal function converges immediately: each pass
        // runs exactly once before the manager sees no change
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn pass_names_are_stable() {
        assert_eq!(ConstantFolding.name(), "constant-folding");
        assert_eq!(DeadCodeElimination.name(), "dead-code-elimination");
        assert_eq!(UnreachableBlockRemoval.name(), "unreachable-block-removal");
    }
}
