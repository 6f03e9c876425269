//! Strongly connected components using Tarjan's algorithm.
//!
//! A strongly connected component is a maximal set of nodes such that every
//! node reaches every other node in the set. In a control-flow automaton, a
//! component with an internal cycle marks a loop region; the loop overview of
//! the sealed automaton derives its loop headers from exactly this
//! computation.

use crate::utils::graph::{NodeId, Successors};

/// Computes the strongly connected components of a directed graph.
///
/// Uses Tarjan's algorithm with a single DFS pass. Components are returned in
/// **reverse topological order**: if an edge leads from component A to
/// component B, then A appears after B in the result. Nodes absent from the
/// graph (tombstoned arena slots) are skipped.
///
/// # Arguments
///
/// * `graph` - The directed graph to analyze
///
/// # Returns
///
/// A vector of components, each a vector of `NodeId`s.
///
/// # Complexity
///
/// - Time: O(V + E)
/// - Space: O(V)
pub fn strongly_connected_components<G>(graph: &G) -> Vec<Vec<NodeId>>
where
    G: Successors,
{
    let bound = graph.node_bound();
    if bound == 0 {
        return Vec::new();
    }

    let mut state = TarjanState::new(bound);

    for node in graph.node_ids() {
        if state.index[node.index()].is_none() {
            state.strongconnect(graph, node);
        }
    }

    state.sccs
}

/// Internal state for Tarjan's algorithm.
struct TarjanState {
    /// Discovery index for each node (None if not yet visited)
    index: Vec<Option<usize>>,
    /// Lowlink value for each node
    lowlink: Vec<usize>,
    /// Whether a node is currently on the stack
    on_stack: Vec<bool>,
    /// The component stack
    stack: Vec<NodeId>,
    /// Current index counter
    current_index: usize,
    /// Collected components
    sccs: Vec<Vec<NodeId>>,
}

impl TarjanState {
    fn new(bound: usize) -> Self {
        Self {
            index: vec![None; bound],
            lowlink: vec![0; bound],
            on_stack: vec![false; bound],
            stack: Vec::new(),
            current_index: 0,
            sccs: Vec::new(),
        }
    }

    /// Iterative strongconnect; an explicit work stack keeps deep automata
    /// from exhausting the call stack.
    fn strongconnect<G: Successors>(&mut self, graph: &G, root: NodeId) {
        // (node, successor list, next successor position)
        let mut work: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

        self.discover(root);
        work.push((root, graph.successors(root).collect(), 0));

        while let Some((v, succs, mut pos)) = work.pop() {
            let mut descended = false;
            while pos < succs.len() {
                let w = succs[pos];
                pos += 1;
                if self.index[w.index()].is_none() {
                    // Descend into w; revisit v afterwards
                    work.push((v, succs, pos));
                    self.discover(w);
                    work.push((w, graph.successors(w).collect(), 0));
                    descended = true;
                    break;
                } else if self.on_stack[w.index()] {
                    let w_index = self.index[w.index()].unwrap_or(0);
                    self.lowlink[v.index()] = self.lowlink[v.index()].min(w_index);
                }
            }
            if descended {
                continue;
            }

            // All successors handled: close v
            if self.lowlink[v.index()] == self.index[v.index()].unwrap_or(0) {
                let mut scc = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w.index()] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                self.sccs.push(scc);
            }

            // Propagate lowlink to the parent frame
            if let Some((parent, _, _)) = work.last() {
                let parent_idx = parent.index();
                self.lowlink[parent_idx] = self.lowlink[parent_idx].min(self.lowlink[v.index()]);
            }
        }
    }

    fn discover(&mut self, v: NodeId) {
        self.index[v.index()] = Some(self.current_index);
        self.lowlink[v.index()] = self.current_index;
        self.current_index += 1;
        self.stack.push(v);
        self.on_stack[v.index()] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::GraphBase;

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

    #[test]
    fn test_single_cycle_is_one_component() {
        // 0 -> 1 -> 2 -> 0
        let g = TestGraph {
            succ: vec![vec![1], vec![2], vec![0]],
        };
        let sccs = strongly_connected_components(&g);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 3);
    }

    #[test]
    fn test_dag_yields_singletons() {
        // 0 -> 1 -> 2
        let g = TestGraph {
            succ: vec![vec![1], vec![2], vec![]],
        };
        let sccs = strongly_connected_components(&g);
        assert_eq!(sccs.len(), 3);
        assert!(sccs.iter().all(|scc| scc.len() == 1));
    }

    #[test]
    fn test_reverse_topological_order() {
        // Two components: {0, 1} -> {2}
        let g = TestGraph {
            succ: vec![vec![1], vec![0, 2], vec![]],
        };
        let sccs = strongly_connected_components(&g);
        assert_eq!(sccs.len(), 2);
        // {2} must come before {0,1}
        assert_eq!(sccs[0], vec![NodeId::new(2)]);
        assert_eq!(sccs[1].len(), 2);
    }

    #[test]
    fn test_self_loop_is_cyclic_singleton() {
        let g = TestGraph {
            succ: vec![vec![0, 1], vec![]],
        };
        let sccs = strongly_connected_components(&g);
        assert_eq!(sccs.len(), 2);
    }

    #[test]
    fn test_nested_cycles_merge() {
        // 0 -> 1 -> 2 -> 1, 2 -> 0: everything mutually reachable
        let g = TestGraph {
            succ: vec![vec![1], vec![2], vec![1, 0]],
        };
        let sccs = strongly_connected_components(&g);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 3);
    }
}
