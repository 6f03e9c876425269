//! Node identifier for the automaton arenas.

use std::fmt;

/// A strongly-typed identifier for nodes of a control-flow automaton.
///
/// `NodeId` wraps a `usize` slot index into the node arena, providing type
/// safety to prevent accidental mixing of node handles with other integer
/// values. Handles are assigned sequentially when nodes are added and remain
/// stable for the lifetime of the automaton: removing a node leaves a
/// tombstone rather than shifting later slots.
///
/// Node handles are created by
/// [`CfaBuilder::add_node`](crate::CfaBuilder::add_node) and friends and are
/// the currency of every cross-reference in the model: edge endpoints,
/// entry/exit links, worklists, and the old→new identity maps of the rebuild
/// engine.
///
/// # Thread Safety
///
/// `NodeId` is [`Copy`], [`Send`], and [`Sync`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a `NodeId` from a raw slot index.
    ///
    /// Primarily intended for internal use and testing; normal usage obtains
    /// handles from the builder.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw slot index of this handle.
    ///
    /// The index can be used for per-node side tables (`Vec` indexed by
    /// node).
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_node_id_roundtrip() {
        let node = NodeId::new(42);
        assert_eq!(node.index(), 42);
        assert_eq!(usize::from(node), 42);
        assert_eq!(NodeId::from(42usize), node);
    }

    #[test]
    fn test_node_id_ordering_and_hash() {
        let mut nodes = vec![NodeId::new(3), NodeId::new(1), NodeId::new(2)];
        nodes.sort();
        assert_eq!(nodes, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]);

        let set: HashSet<NodeId> = [NodeId::new(1), NodeId::new(1), NodeId::new(2)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_node_id_formats() {
        let node = NodeId::new(7);
        assert_eq!(format!("{node:?}"), "NodeId(7)");
        assert_eq!(format!("{node}"), "N7");
    }
}
