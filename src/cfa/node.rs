//! Automaton nodes: program locations.
//!
//! A node is a program location between two control-flow steps. Nodes keep
//! their adjacency explicitly: ordered lists of leaving and entering edge
//! handles, plus a dedicated one-slot channel per direction for summary
//! edges, which never appear in the ordered lists.

use crate::{
    cfa::{ast::Declaration, function::FunctionId},
    utils::graph::{EdgeId, NodeId},
};

/// Classification of a program location.
///
/// The enum is closed and matched exhaustively throughout the crate, so
/// adding a kind forces every transformation to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An ordinary location.
    Plain,
    /// A location carrying a source-level label.
    Label {
        /// The label name.
        name: String,
    },
    /// The unique entry location of a function.
    FunctionEntry {
        /// Back-reference to the function's exit node; `None` once the exit
        /// has been pruned because it was unreachable (the function never
        /// returns).
        exit: Option<NodeId>,
        /// Synthetic variable receiving the function's return value, if the
        /// function returns one.
        return_variable: Option<Declaration>,
    },
    /// The unique exit location of a function.
    FunctionExit,
    /// A location the program never leaves (abort, infinite failure stop).
    Termination,
}

impl NodeKind {
    /// Returns `true` for function-entry nodes.
    #[must_use]
    pub const fn is_function_entry(&self) -> bool {
        matches!(self, NodeKind::FunctionEntry { .. })
    }

    /// Returns `true` for function-exit nodes.
    #[must_use]
    pub const fn is_function_exit(&self) -> bool {
        matches!(self, NodeKind::FunctionExit)
    }

    /// Returns `true` for termination nodes.
    #[must_use]
    pub const fn is_termination(&self) -> bool {
        matches!(self, NodeKind::Termination)
    }

    /// Returns `true` for nodes that may legally have no leaving edges.
    #[must_use]
    pub const fn is_exit_or_termination(&self) -> bool {
        matches!(self, NodeKind::FunctionExit | NodeKind::Termination)
    }
}

/// A program location in the automaton.
///
/// Nodes are owned by the automaton arena and addressed by [`NodeId`]. All
/// adjacency is stored as edge handles:
///
/// - `leaving` / `entering` - ordered lists of ordinary edges;
/// - `leaving_summary` / `entering_summary` - the at-most-one summary edge
///   per direction. Summary edges live only in these slots.
///
/// The reverse-postorder id is assigned per function when the automaton is
/// sealed; before sealing it is zero.
#[derive(Debug, Clone)]
pub struct CfaNode {
    pub(crate) id: NodeId,
    pub(crate) function: FunctionId,
    pub(crate) kind: NodeKind,
    pub(crate) rpo_id: u32,
    pub(crate) leaving: Vec<EdgeId>,
    pub(crate) entering: Vec<EdgeId>,
    pub(crate) leaving_summary: Option<EdgeId>,
    pub(crate) entering_summary: Option<EdgeId>,
}

impl CfaNode {
    pub(crate) fn new(id: NodeId, function: FunctionId, kind: NodeKind) -> Self {
        Self {
            id,
            function,
            kind,
            rpo_id: 0,
            leaving: Vec::new(),
            entering: Vec::new(),
            leaving_summary: None,
            entering_summary: None,
        }
    }

    /// Returns this node's handle.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the handle of the owning function.
    #[must_use]
    pub const fn function(&self) -> FunctionId {
        self.function
    }

    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns the reverse-postorder id assigned at seal time.
    ///
    /// Ids are per function, entry first. Nodes not reachable from their
    /// function entry keep the id 0.
    #[must_use]
    pub const fn rpo_id(&self) -> u32 {
        self.rpo_id
    }

    /// Returns the ordered leaving edges, excluding the summary edge.
    #[must_use]
    pub fn leaving(&self) -> &[EdgeId] {
        &self.leaving
    }

    /// Returns the ordered entering edges, excluding the summary edge.
    #[must_use]
    pub fn entering(&self) -> &[EdgeId] {
        &self.entering
    }

    /// Returns the leaving summary edge, if this node is a call site.
    #[must_use]
    pub const fn leaving_summary(&self) -> Option<EdgeId> {
        self.leaving_summary
    }

    /// Returns the entering summary edge, if this node is a return site.
    #[must_use]
    pub const fn entering_summary(&self) -> Option<EdgeId> {
        self.entering_summary
    }

    /// Returns the number of ordinary leaving edges.
    #[must_use]
    pub fn num_leaving(&self) -> usize {
        self.leaving.len()
    }

    /// Returns the number of ordinary entering edges.
    #[must_use]
    pub fn num_entering(&self) -> usize {
        self.entering.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        assert!(NodeKind::FunctionEntry {
            exit: Some(NodeId::new(1)),
            return_variable: None
        }
        .is_function_entry());
        assert!(NodeKind::FunctionExit.is_exit_or_termination());
        assert!(NodeKind::Termination.is_exit_or_termination());
        assert!(!NodeKind::Plain.is_exit_or_termination());
        assert!(!NodeKind::Label {
            name: "l".to_string()
        }
        .is_function_entry());
    }

    #[test]
    fn test_fresh_node_has_no_adjacency() {
        let node = CfaNode::new(NodeId::new(0), FunctionId::new(0), NodeKind::Plain);
        assert_eq!(node.num_leaving(), 0);
        assert_eq!(node.num_entering(), 0);
        assert!(node.leaving_summary().is_none());
        assert!(node.entering_summary().is_none());
        assert_eq!(node.rpo_id(), 0);
    }
}
