//! The read seam shared by the mutable and the sealed automaton.
//!
//! The consistency checker and the rebuild engine only *read* automata, but
//! they must run both during the build phase (on a [`CfaBuilder`]) and on
//! sealed results (a [`Cfa`]). [`CfaStore`] is the trait they program
//! against; both phases implement it.
//!
//! [`CfaBuilder`]: crate::CfaBuilder
//! [`Cfa`]: crate::Cfa

use crate::{
    cfa::{
        ast::Declaration,
        edge::CfaEdge,
        function::{FunctionId, FunctionSignature},
        node::CfaNode,
        MachineModel,
    },
    utils::graph::{EdgeId, NodeId},
};

/// Read access to an automaton, mutable or sealed.
///
/// Stale handles yield `None` rather than erroring; iteration covers live
/// arena slots in ascending index order, which keeps every algorithm in the
/// crate deterministic.
pub trait CfaStore {
    /// Returns the machine model this automaton targets.
    fn machine(&self) -> MachineModel;

    /// Returns the node behind a handle, or `None` if it was removed.
    fn node(&self, id: NodeId) -> Option<&CfaNode>;

    /// Returns the edge behind a handle, or `None` if it was removed.
    fn edge(&self, id: EdgeId) -> Option<&CfaEdge>;

    /// Returns an exclusive upper bound on raw node indices, for sizing
    /// side tables.
    fn node_bound(&self) -> usize;

    /// Returns an iterator over all live node handles.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;

    /// Returns an iterator over all live edge handles.
    fn edge_ids(&self) -> impl Iterator<Item = EdgeId>;

    /// Returns an iterator over all live function handles.
    fn function_ids(&self) -> impl Iterator<Item = FunctionId>;

    /// Returns the entry node of a function, if the handle is live.
    fn function_entry(&self, function: FunctionId) -> Option<NodeId>;

    /// Returns the exit node of a function, if the handle is live.
    fn function_exit(&self, function: FunctionId) -> Option<NodeId>;

    /// Returns the signature of a function, if the handle is live.
    fn function_signature(&self, function: FunctionId) -> Option<&FunctionSignature>;

    /// Looks up a function by name.
    fn function_by_name(&self, name: &str) -> Option<FunctionId>;

    /// Returns the designated entry function, if one was set.
    fn entry_function(&self) -> Option<FunctionId>;

    /// Returns the global-declaration pairs delivered by the front end.
    fn globals(&self) -> &[(Declaration, String)];

    /// Returns the source file list delivered by the front end.
    fn files(&self) -> &[String];
}
