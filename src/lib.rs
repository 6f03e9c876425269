// Copyright 2026 The flowscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![allow(dead_code)]

//! # flowscope
//!
//! Control-flow automaton (CFA) infrastructure for static analysis and
//! verification tools, built in pure Rust. `flowscope` provides the
//! graph-structured intermediate representation that program analyses treat
//! as their unit of computation, together with the algorithms that build,
//! validate, and rewrite it.
//!
//! ## Features
//!
//! - **Typed directed multigraph** - Nodes and edges live in handle-addressed
//!   arenas; edges carry program fragments (assumptions, declarations,
//!   statements) and every call site keeps a secondary "summary edge" channel
//! - **Build/seal lifecycle** - A mutable [`CfaBuilder`] for construction and
//!   a read-only, freely shareable [`Cfa`] produced by a one-way seal
//! - **Graph views** - Lazy, read-only projections with edge-predicate and
//!   function-set filtering, usable with the generic traversal algorithms
//! - **Supergraph assembly** - Connects independent per-function automata
//!   with call/return/summary triples, including never-returning-call
//!   pruning and function-pointer dispatch expansion
//! - **Consistency checking** - A structural gate intended to run after every
//!   transformation
//! - **Substitution rebuilds** - Isomorphic copies with caller-supplied
//!   payload substitution and identity-keyed old→new maps
//! - **Single-loop transformation** - Rewrites a whole automaton into one
//!   with exactly one loop header via a program-counter encoding
//!
//! ## Quick Start
//!
//! ```rust
//! use flowscope::prelude::*;
//!
//! // Build a one-function automaton: main() { }
//! let mut builder = CfaBuilder::new(MachineModel::Lp64);
//! let main = builder.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
//! let entry = builder.function_entry(main);
//! let exit = builder.function_exit(main).expect("fresh function has an exit");
//! builder.add_edge(entry, exit, EdgeKind::blank("function start"), "", FileLocation::dummy())?;
//! builder.set_entry_function("main")?;
//!
//! let cfa = builder.seal()?;
//! assert_eq!(cfa.node_count(), 2);
//! # Ok::<(), flowscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`cfa`] - The node/edge model: AST payloads, machine model, builder,
//!   sealed automaton, views, and the best-effort loop overview
//! - [`supergraph`] - Interprocedural assembly of call/return/summary edges
//! - [`check`] - The structural consistency checker
//! - [`rebuild`] - The substitution-based rebuild engine
//! - [`transform`] - The single-loop transformation
//! - [`utils`] - Graph traits, traversal algorithms, cancellation
//!
//! ## Concurrency
//!
//! The core is single-threaded and synchronous. No operation is safe to
//! invoke concurrently on the same [`CfaBuilder`]; parallel analyses must use
//! separate automaton instances. A sealed [`Cfa`] is guaranteed never to be
//! mutated again and is [`Send`] and [`Sync`], so it may be shared and read
//! concurrently. Long passes poll a [`CancelToken`](utils::CancelToken) at
//! every work-list iteration and unwind via [`Error::Cancelled`] without
//! committing a partial automaton.

#[macro_use]
pub(crate) mod error;

pub mod cfa;
pub mod check;
pub mod prelude;
pub mod rebuild;
pub mod supergraph;
pub mod transform;
pub mod utils;

pub use cfa::{
    BinaryOp, CallStatement, CallTarget, Cfa, CfaBuilder, CfaEdge, CfaNode, CfaType, CfaView,
    Declaration, EdgeClass, EdgeKind, Expression, FileLocation, FunctionId, FunctionSignature,
    IntKind, LoopOverview, MachineModel, NodeKind, Statement, UnaryOp, VariableClassification,
};
pub use error::Error;
pub use utils::graph::{EdgeId, NodeId};

/// Convenience alias for `Result<T, flowscope::Error>` used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
