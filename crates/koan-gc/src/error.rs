//! Heap error types.

use thiserror::Error;

/// Failures surfaced by the heap. Allocation failure never unwinds
/// into the evaluator - it becomes the language's OutOfMemory value at
/// the allocation site.
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("heap budget exhausted: {live} live allocations, budget {budget}")]
    BudgetExhausted { live: usize, budget: usize },
}
