//! Interprocedural supergraph assembly.
//!
//! The front end delivers independent per-function automata in which every
//! call site is a plain statement edge. The assembler connects them into the
//! supergraph: each direct call to a function with a body is split into the
//! call/return/summary triple, never-returning calls are pruned, control-flow
//! merges directly behind two calls are spliced apart, and (optionally)
//! function-pointer calls are expanded into an address-equality decision
//! chain.
//!
//! Parameter-count validation runs as a pre-pass over every call site before
//! anything is mutated, so a reported
//! [`Error::FunctionCall`](crate::Error::FunctionCall) guarantees an
//! untouched builder.

mod assembler;

pub use assembler::assemble;

/// How call sites through function pointers are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionPointerMode {
    /// Leave pointer calls as plain statement edges.
    #[default]
    Ignore,
    /// Expand into an if/else-if chain of address-equality assumptions
    /// against parameter-count-compatible candidates.
    AssumeChain {
        /// `true` ends the chain in a termination node (an unmatched pointer
        /// is considered unreachable); `false` ends it in an "undefined
        /// call" statement edge to the return site.
        prune_undefined: bool,
    },
}

/// Configuration of one assembly run.
#[derive(Debug, Clone, Default)]
pub struct AssemblerConfig {
    /// Insert a call-summary-statement edge parallel to each call edge, for
    /// analyses that skip callee bodies.
    pub summary_statement_edges: bool,
    /// Function-pointer call handling.
    pub function_pointers: FunctionPointerMode,
}
