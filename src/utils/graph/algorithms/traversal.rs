//! Graph traversal algorithms.
//!
//! Depth-first and breadth-first traversals plus the two postorders, over any
//! graph implementing [`Successors`]. These are the building blocks of the
//! reverse-postorder numbering done at seal time, the checker's sweeps, and
//! the transformer's chunk growth.
//!
//! The [`dfs`] and [`bfs`] functions return iterators for lazy evaluation;
//! [`postorder`] and [`reverse_postorder`] return collected vectors since the
//! order requires full traversal anyway.

use std::collections::VecDeque;

use crate::utils::graph::{NodeId, Successors};

/// Depth-first search iterator over graph nodes.
///
/// Performs an iterative (non-recursive) depth-first traversal starting from
/// a given node, visiting each reachable node exactly once in pre-order.
pub struct DfsIterator<'g, G: Successors> {
    graph: &'g G,
    stack: Vec<NodeId>,
    visited: Vec<bool>,
}

impl<'g, G: Successors> DfsIterator<'g, G> {
    fn new(graph: &'g G, start: NodeId) -> Self {
        let bound = graph.node_bound();
        if start.index() >= bound {
            return DfsIterator {
                graph,
                stack: Vec::new(),
                visited: Vec::new(),
            };
        }

        let mut visited = vec![false; bound];
        visited[start.index()] = true;

        DfsIterator {
            graph,
            stack: vec![start],
            visited,
        }
    }
}

impl<G: Successors> Iterator for DfsIterator<'_, G> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // Push unvisited successors in reverse so they pop in original order
        let successors: Vec<NodeId> = self.graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.stack.push(succ);
            }
        }

        Some(node)
    }
}

/// Returns a depth-first search iterator starting from the given node.
///
/// Nodes not reachable from the start are not visited; a start node outside
/// the graph yields an empty iterator.
///
/// # Complexity
///
/// - Time: O(V + E)
/// - Space: O(V) for the visited set and stack
pub fn dfs<G: Successors>(graph: &G, start: NodeId) -> DfsIterator<'_, G> {
    DfsIterator::new(graph, start)
}

/// Breadth-first search iterator over graph nodes.
///
/// Visits each reachable node exactly once, exploring all nodes at distance d
/// before any node at distance d+1.
pub struct BfsIterator<'g, G: Successors> {
    graph: &'g G,
    queue: VecDeque<NodeId>,
    visited: Vec<bool>,
}

impl<'g, G: Successors> BfsIterator<'g, G> {
    fn new(graph: &'g G, start: NodeId) -> Self {
        let bound = graph.node_bound();
        if start.index() >= bound {
            return BfsIterator {
                graph,
                queue: VecDeque::new(),
                visited: Vec::new(),
            };
        }

        let mut visited = vec![false; bound];
        visited[start.index()] = true;

        let mut queue = VecDeque::new();
        queue.push_back(start);

        BfsIterator {
            graph,
            queue,
            visited,
        }
    }
}

impl<G: Successors> Iterator for BfsIterator<'_, G> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.pop_front()?;

        for succ in self.graph.successors(node) {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.queue.push_back(succ);
            }
        }

        Some(node)
    }
}

/// Returns a breadth-first search iterator starting from the given node.
///
/// # Complexity
///
/// - Time: O(V + E)
/// - Space: O(V) for the visited set and queue
pub fn bfs<G: Successors>(graph: &G, start: NodeId) -> BfsIterator<'_, G> {
    BfsIterator::new(graph, start)
}

/// Computes the postorder traversal of nodes reachable from the start.
///
/// In postorder a node appears after all its descendants. Implemented
/// iteratively with an explicit stack to stay safe on deep graphs.
#[must_use]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let bound = graph.node_bound();
    if start.index() >= bound {
        return Vec::new();
    }

    let mut visited = vec![false; bound];
    let mut order = Vec::new();
    // (node, child iterator position) pairs
    let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

    visited[start.index()] = true;
    stack.push((start, graph.successors(start).collect(), 0));

    while let Some((node, children, pos)) = stack.pop() {
        if pos < children.len() {
            let child = children[pos];
            stack.push((node, children, pos + 1));
            if !visited[child.index()] {
                visited[child.index()] = true;
                stack.push((child, graph.successors(child).collect(), 0));
            }
        } else {
            order.push(node);
        }
    }

    order
}

/// Computes the reverse postorder of nodes reachable from the start.
///
/// In reverse postorder, predecessors come before successors in acyclic
/// regions, which makes it the natural numbering for forward analyses and the
/// per-function node ids assigned at seal time.
#[must_use]
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, start);
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::GraphBase;

    /// Tiny adjacency-list graph for exercising the algorithms.
    struct TestGraph {
        succ: Vec<Vec<usize>>,
    }

    impl GraphBase for TestGraph {
        fn node_count(&self) -> usize {
            self.succ.len()
        }

        fn node_bound(&self) -> usize {
            self.succ.len()
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.succ.len()).map(NodeId::new)
        }
    }

    impl Successors for TestGraph {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.succ
                .get(node.index())
                .into_iter()
                .flatten()
                .map(|&i| NodeId::new(i))
        }
    }

    fn diamond() -> TestGraph {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        TestGraph {
            succ: vec![vec![1, 2], vec![3], vec![3], vec![]],
        }
    }

    #[test]
    fn test_dfs_visits_reachable_once() {
        let g = diamond();
        let order: Vec<NodeId> = dfs(&g, NodeId::new(0)).collect();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], NodeId::new(0));
    }

    #[test]
    fn test_dfs_foreign_start_is_empty() {
        let g = diamond();
        let order: Vec<NodeId> = dfs(&g, NodeId::new(99)).collect();
        assert!(order.is_empty());
    }

    #[test]
    fn test_bfs_by_distance() {
        let g = diamond();
        let order: Vec<NodeId> = bfs(&g, NodeId::new(0)).collect();
        assert_eq!(order[0], NodeId::new(0));
        assert_eq!(order[3], NodeId::new(3));
    }

    #[test]
    fn test_postorder_parents_last() {
        let g = diamond();
        let order = postorder(&g, NodeId::new(0));
        assert_eq!(order.len(), 4);
        assert_eq!(order[3], NodeId::new(0)); // root last
        assert_eq!(order[0], NodeId::new(3)); // join first
    }

    #[test]
    fn test_reverse_postorder_entry_first() {
        let g = diamond();
        let order = reverse_postorder(&g, NodeId::new(0));
        assert_eq!(order[0], NodeId::new(0));
        assert_eq!(order[3], NodeId::new(3));
    }

    #[test]
    fn test_traversal_with_cycle_terminates() {
        // 0 -> 1 -> 2 -> 0
        let g = TestGraph {
            succ: vec![vec![1], vec![2], vec![0]],
        };
        let order: Vec<NodeId> = dfs(&g, NodeId::new(0)).collect();
        assert_eq!(order.len(), 3);

        let rpo = reverse_postorder(&g, NodeId::new(0));
        assert_eq!(rpo[0], NodeId::new(0));
    }
}
