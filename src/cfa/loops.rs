//! Best-effort loop overview of a sealed automaton.
//!
//! Downstream analyses frequently only need to know *where loops start*,
//! most prominently the single-loop transformer, whose idempotence guard asks
//! whether the whole automaton already has at most one loop header. The
//! overview answers exactly that: per function, the set of loop-header
//! nodes. A header is the target of a back edge of the depth-first traversal
//! from the function entry, so nested loops contribute one header each. A
//! cyclic strongly connected component the traversal never reaches (a loop
//! island) still contributes one header so the count never underreports
//! cycles.
//!
//! Discovery is an auxiliary step in the error-handling sense: it runs at
//! seal time, catches its own failures, and degrades to "feature absent"
//! rather than aborting the pipeline. Full loop nests, exits, and induction
//! information are out of scope; consumers needing them run their own
//! analysis over a [`CfaView`](crate::CfaView).

use std::collections::BTreeSet;

use crate::{
    cfa::{function::FunctionId, store::CfaStore},
    utils::graph::{algorithms, GraphBase, NodeId, Successors},
    Result,
};

/// Loop headers of one function.
#[derive(Debug, Clone)]
pub struct FunctionLoops {
    /// The function these headers belong to.
    pub function: FunctionId,
    /// The function name, for diagnostics.
    pub name: String,
    /// Loop-header nodes, sorted by handle.
    pub headers: Vec<NodeId>,
}

/// The per-function loop headers of a sealed automaton.
#[derive(Debug, Clone, Default)]
pub struct LoopOverview {
    functions: Vec<FunctionLoops>,
}

impl LoopOverview {
    /// Returns the per-function breakdown.
    #[must_use]
    pub fn functions(&self) -> &[FunctionLoops] {
        &self.functions
    }

    /// Returns the loop headers of one function, if known.
    #[must_use]
    pub fn headers_of(&self, function: FunctionId) -> Option<&[NodeId]> {
        self.functions
            .iter()
            .find(|f| f.function == function)
            .map(|f| f.headers.as_slice())
    }

    /// Returns the total number of loop headers across all functions.
    #[must_use]
    pub fn total_headers(&self) -> usize {
        self.functions.iter().map(|f| f.headers.len()).sum()
    }

    /// Returns `true` if the automaton has at most one loop header in total.
    #[must_use]
    pub fn is_single_loop(&self) -> bool {
        self.total_headers() <= 1
    }
}

/// Computes the loop overview of an automaton.
///
/// # Errors
///
/// Reserved for stale function records; callers treat any failure as
/// "overview unavailable".
pub fn compute_loop_overview<S: CfaStore>(store: &S) -> Result<LoopOverview> {
    let mut functions = Vec::new();

    for function in store.function_ids() {
        let Some(signature) = store.function_signature(function) else {
            continue;
        };
        let name = signature.name.clone();
        let projection = IntraprocView { store, function };

        let mut headers: BTreeSet<NodeId> = BTreeSet::new();
        let mut visited = vec![false; store.node_bound()];
        if let Some(entry) = store.function_entry(function) {
            back_edge_targets(&projection, entry, &mut visited, &mut headers);
        }

        // Cyclic components the traversal never reached still count once
        for scc in algorithms::strongly_connected_components(&projection) {
            let reached = scc.iter().any(|n| visited[n.index()]);
            if reached || !scc_is_cyclic(&projection, &scc) {
                continue;
            }
            if let Some(&min) = scc.iter().min() {
                headers.insert(min);
            }
        }

        functions.push(FunctionLoops {
            function,
            name,
            headers: headers.into_iter().collect(),
        });
    }

    Ok(LoopOverview { functions })
}

/// Collects the targets of depth-first back edges reachable from `start`.
///
/// An edge u → v is a back edge when v is still on the traversal stack while
/// u's edges are explored; its target v is a loop header.
fn back_edge_targets<G: Successors>(
    graph: &G,
    start: NodeId,
    visited: &mut [bool],
    headers: &mut BTreeSet<NodeId>,
) {
    if start.index() >= visited.len() || visited[start.index()] {
        return;
    }

    let mut on_stack = vec![false; visited.len()];
    // (node, successor list, next position)
    let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

    visited[start.index()] = true;
    on_stack[start.index()] = true;
    stack.push((start, graph.successors(start).collect(), 0));

    while let Some((node, succs, mut pos)) = stack.pop() {
        let mut descended = false;
        while pos < succs.len() {
            let w = succs[pos];
            pos += 1;
            if on_stack[w.index()] {
                headers.insert(w);
            } else if !visited[w.index()] {
                stack.push((node, succs, pos));
                visited[w.index()] = true;
                on_stack[w.index()] = true;
                stack.push((w, graph.successors(w).collect(), 0));
                descended = true;
                break;
            }
        }
        if !descended {
            on_stack[node.index()] = false;
        }
    }
}

/// A component loops iff it has more than one node or a direct self-loop.
fn scc_is_cyclic<G: Successors>(graph: &G, scc: &[NodeId]) -> bool {
    if scc.len() > 1 {
        return true;
    }
    let node = scc[0];
    graph.successors(node).any(|s| s == node)
}

/// Forward intraprocedural projection of one function.
struct IntraprocView<'a, S: CfaStore> {
    store: &'a S,
    function: FunctionId,
}

impl<S: CfaStore> GraphBase for IntraprocView<'_, S> {
    fn node_count(&self) -> usize {
        self.node_ids().count()
    }

    fn node_bound(&self) -> usize {
        self.store.node_bound()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.store.node_ids().filter(|&n| {
            self.store
                .node(n)
                .is_some_and(|node| node.function() == self.function)
        })
    }
}

impl<S: CfaStore> Successors for IntraprocView<'_, S> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let (list, summary) = match self.store.node(node) {
            Some(n) if n.function() == self.function => (n.leaving().to_vec(), n.leaving_summary()),
            _ => (Vec::new(), None),
        };
        list.into_iter()
            .chain(summary)
            .filter_map(|e| self.store.edge(e))
            .map(|edge| edge.successor())
            .filter(|&s| {
                self.store
                    .node(s)
                    .is_some_and(|n| n.function() == self.function)
            })
            .collect::<Vec<_>>()
            .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfa::{
            ast::CfaType, edge::EdgeKind, function::FunctionSignature, location::FileLocation,
            node::NodeKind,
        },
        CfaBuilder, MachineModel,
    };

    fn builder_with_main() -> (CfaBuilder, FunctionId, NodeId, NodeId) {
        let mut b = CfaBuilder::new(MachineModel::Lp64);
        let main = b.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        (b, main, entry, exit)
    }

    fn blank(b: &mut CfaBuilder, from: NodeId, to: NodeId) {
        b.add_edge(from, to, EdgeKind::blank("t"), "", FileLocation::dummy())
            .unwrap();
    }

    #[test]
    fn test_loop_free_function_has_no_headers() {
        let (mut b, main, entry, exit) = builder_with_main();
        blank(&mut b, entry, exit);

        let overview = compute_loop_overview(&b).unwrap();
        assert_eq!(overview.total_headers(), 0);
        assert!(overview.is_single_loop());
        assert_eq!(overview.headers_of(main).unwrap(), &[]);
    }

    #[test]
    fn test_simple_loop_has_one_header() {
        let (mut b, main, entry, exit) = builder_with_main();
        let head = b.add_node(main, NodeKind::Plain);
        let body = b.add_node(main, NodeKind::Plain);
        blank(&mut b, entry, head);
        blank(&mut b, head, body);
        blank(&mut b, body, head);
        blank(&mut b, head, exit);

        let overview = compute_loop_overview(&b).unwrap();
        assert_eq!(overview.total_headers(), 1);
        assert_eq!(overview.headers_of(main).unwrap(), &[head]);
    }

    #[test]
    fn test_self_loop_is_a_header() {
        let (mut b, main, entry, exit) = builder_with_main();
        let n = b.add_node(main, NodeKind::Plain);
        blank(&mut b, entry, n);
        blank(&mut b, n, n);
        blank(&mut b, n, exit);

        let overview = compute_loop_overview(&b).unwrap();
        assert_eq!(overview.headers_of(main).unwrap(), &[n]);
    }

    #[test]
    fn test_two_separate_loops() {
        let (mut b, main, entry, exit) = builder_with_main();
        let h1 = b.add_node(main, NodeKind::Plain);
        let b1 = b.add_node(main, NodeKind::Plain);
        let h2 = b.add_node(main, NodeKind::Plain);
        let b2 = b.add_node(main, NodeKind::Plain);
        blank(&mut b, entry, h1);
        blank(&mut b, h1, b1);
        blank(&mut b, b1, h1);
        blank(&mut b, h1, h2);
        blank(&mut b, h2, b2);
        blank(&mut b, b2, h2);
        blank(&mut b, h2, exit);

        let overview = compute_loop_overview(&b).unwrap();
        assert_eq!(overview.total_headers(), 2);
        assert!(!overview.is_single_loop());
    }

    #[test]
    fn test_nested_loops_have_two_headers() {
        let (mut b, main, entry, exit) = builder_with_main();
        let outer = b.add_node(main, NodeKind::Plain);
        let inner = b.add_node(main, NodeKind::Plain);
        blank(&mut b, entry, outer);
        blank(&mut b, outer, inner);
        blank(&mut b, inner, inner); // inner self-loop
        blank(&mut b, inner, outer); // outer back edge
        blank(&mut b, outer, exit);

        let overview = compute_loop_overview(&b).unwrap();
        assert_eq!(overview.headers_of(main).unwrap(), &[outer, inner]);
        assert!(!overview.is_single_loop());
    }

    #[test]
    fn test_unreachable_cycle_island_counts_once() {
        let (mut b, main, entry, exit) = builder_with_main();
        blank(&mut b, entry, exit);
        let i1 = b.add_node(main, NodeKind::Plain);
        let i2 = b.add_node(main, NodeKind::Plain);
        blank(&mut b, i1, i2);
        blank(&mut b, i2, i1);

        let overview = compute_loop_overview(&b).unwrap();
        assert_eq!(overview.total_headers(), 1);
    }
}
