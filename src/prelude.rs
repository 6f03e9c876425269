//! Convenient re-exports of the most commonly used types and traits.
//!
//! Pulling in the prelude gives analyses and front ends everything needed to
//! build, assemble, check, rebuild, and transform automata:
//!
//! ```rust,no_run
//! use flowscope::prelude::*;
//!
//! let mut builder = CfaBuilder::new(MachineModel::Lp64);
//! let main = builder.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
//! # let _ = main;
//! ```

pub use crate::{
    cfa::{
        BinaryOp, CallStatement, CallTarget, Cfa, CfaBuilder, CfaEdge, CfaNode, CfaStore, CfaType,
        CfaView, Declaration, EdgeClass, EdgeKind, Expression, FileLocation, FunctionId,
        FunctionLoops, FunctionSignature, IntKind, LoopOverview, MachineModel, NodeKind, Statement,
        UnaryOp, VariableClassification,
    },
    check::{check_automaton, check_from, CheckFlags},
    rebuild::{rebuild, rebuild_to_builder, IdentitySubstitution, RebuildMode, Substitution},
    supergraph::{assemble, AssemblerConfig, FunctionPointerMode},
    transform::{transform_to_single_loop, ChunkStrategy, PcAssignment, SingleLoopConfig},
    utils::{
        graph::{EdgeId, GraphBase, NodeId, Predecessors, Successors},
        CancelToken,
    },
    Error, Result,
};
