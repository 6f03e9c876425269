//! Whole-automaton structural transformations.
//!
//! The one transformation the core ships is the single-loop rewrite: an
//! arbitrary automaton, interprocedural edges included, becomes an automaton
//! with exactly one loop header by encoding "where control came from" into a
//! synthetic program-counter variable that a central decision tree
//! dispatches on. Analyses whose precision or termination reasoning degrades
//! with many loop heads run on the rewritten automaton instead.

mod single_loop;

pub use single_loop::{transform_to_single_loop, ChunkStrategy, PcAssignment, SingleLoopConfig};
