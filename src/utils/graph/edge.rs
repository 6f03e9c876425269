//! Edge identifier for the automaton arenas.

use std::fmt;

/// A strongly-typed identifier for edges of a control-flow automaton.
///
/// `EdgeId` wraps a `usize` slot index into the edge arena. Like
/// [`NodeId`](crate::NodeId), handles are assigned sequentially, remain
/// stable across removals (tombstones), and are the only way nodes and edges
/// reference each other: a node's ordered leaving/entering lists, its summary
/// slots, and the shared-summary links of a call/return/summary triple all
/// hold `EdgeId`s.
///
/// # Thread Safety
///
/// `EdgeId` is [`Copy`], [`Send`], and [`Sync`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Creates an `EdgeId` from a raw slot index.
    ///
    /// Primarily intended for internal use and testing; normal usage obtains
    /// handles from [`CfaBuilder::add_edge`](crate::CfaBuilder::add_edge).
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        EdgeId(index)
    }

    /// Returns the raw slot index of this handle.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl From<usize> for EdgeId {
    #[inline]
    fn from(index: usize) -> Self {
        EdgeId(index)
    }
}

impl From<EdgeId> for usize {
    #[inline]
    fn from(edge: EdgeId) -> Self {
        edge.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_roundtrip() {
        let edge = EdgeId::new(9);
        assert_eq!(edge.index(), 9);
        assert_eq!(usize::from(edge), 9);
        assert_eq!(EdgeId::from(9usize), edge);
    }

    #[test]
    fn test_edge_id_formats() {
        let edge = EdgeId::new(12);
        assert_eq!(format!("{edge:?}"), "EdgeId(12)");
        assert_eq!(format!("{edge}"), "E12");
    }

    #[test]
    fn test_edge_id_distinct_from_node_id() {
        use crate::utils::graph::NodeId;

        let node = NodeId::new(5);
        let edge = EdgeId::new(5);

        // Same underlying value, different types; mixing them does not compile.
        assert_eq!(node.index(), edge.index());
    }
}
