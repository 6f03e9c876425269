//! Read-only graph views over a sealed automaton.
//!
//! A [`CfaView`] is a lazy projection: it holds a reference to the sealed
//! [`Cfa`](crate::Cfa) plus the active filters, and every query walks the
//! live store on demand. Views have no side effects and can be stacked:
//! an edge-predicate filter on top of a function restriction keeps both.
//!
//! Degree counts fold the summary edges in transparently, adjacency counts a
//! self-loop once, and foreign node handles simply yield empty results
//! rather than erroring, so analyses can probe speculatively.
//!
//! The view implements the generic graph traits, so every algorithm in
//! [`crate::utils::graph::algorithms`] runs on it unchanged.

use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    cfa::{
        ast::{CallTarget, Statement},
        automaton::Cfa,
        edge::{CfaEdge, EdgeKind},
        function::FunctionId,
    },
    utils::graph::{EdgeId, GraphBase, NodeId, Predecessors, Successors},
};

type EdgePredicate<'a> = Arc<dyn Fn(&CfaEdge) -> bool + Send + Sync + 'a>;

/// A filtered, read-only projection of a sealed automaton.
#[derive(Clone)]
pub struct CfaView<'a> {
    cfa: &'a Cfa,
    predicate: Option<EdgePredicate<'a>>,
    functions: Option<HashSet<FunctionId>>,
}

impl<'a> CfaView<'a> {
    pub(crate) fn new(cfa: &'a Cfa) -> Self {
        Self {
            cfa,
            predicate: None,
            functions: None,
        }
    }

    /// Returns the automaton this view projects.
    #[must_use]
    pub fn cfa(&self) -> &'a Cfa {
        self.cfa
    }

    /// Returns a sub-view keeping only edges the predicate accepts.
    ///
    /// Stacks with any filter already present.
    #[must_use]
    pub fn filter_edges<F>(&self, predicate: F) -> CfaView<'a>
    where
        F: Fn(&CfaEdge) -> bool + Send + Sync + 'a,
    {
        let combined: EdgePredicate<'a> = match self.predicate.clone() {
            Some(prev) => Arc::new(move |e| (prev.as_ref())(e) && predicate(e)),
            None => Arc::new(predicate),
        };
        CfaView {
            cfa: self.cfa,
            predicate: Some(combined),
            functions: self.functions.clone(),
        }
    }

    /// Returns a sub-view restricted to the functions reachable from the
    /// given root function names, following call relationships (call edges,
    /// summarized calls, and unexpanded direct call statements).
    ///
    /// Unknown root names are ignored; an empty root set yields an empty
    /// view.
    #[must_use]
    pub fn restrict_to_functions(&self, roots: &[&str]) -> CfaView<'a> {
        let mut reachable: HashSet<FunctionId> = HashSet::new();
        let mut worklist: Vec<FunctionId> = roots
            .iter()
            .filter_map(|name| self.cfa.function_by_name(name))
            .collect();
        reachable.extend(worklist.iter().copied());

        while let Some(function) = worklist.pop() {
            for callee in self.callees_of(function) {
                if reachable.insert(callee) {
                    worklist.push(callee);
                }
            }
        }

        let functions = match &self.functions {
            Some(prev) => prev.intersection(&reachable).copied().collect(),
            None => reachable,
        };
        CfaView {
            cfa: self.cfa,
            predicate: self.predicate.clone(),
            functions: Some(functions),
        }
    }

    /// Collects the functions directly called from within one function.
    fn callees_of(&self, function: FunctionId) -> Vec<FunctionId> {
        let mut callees = Vec::new();
        for edge in self.cfa.edges() {
            let from = self
                .cfa
                .node(edge.predecessor())
                .map(|n| n.function());
            if from != Some(function) {
                continue;
            }
            let name = match edge.kind() {
                EdgeKind::Call { call, .. } | EdgeKind::Summary { call } => {
                    call.direct_target().map(str::to_string)
                }
                EdgeKind::CallSummaryStatement { callee, .. } => Some(callee.clone()),
                EdgeKind::Statement {
                    statement: Statement::Call(call),
                } => match &call.target {
                    CallTarget::Direct(name) => Some(name.clone()),
                    CallTarget::Pointer(_) => None,
                },
                _ => None,
            };
            if let Some(name) = name {
                if let Some(id) = self.cfa.function_by_name(&name) {
                    callees.push(id);
                }
            }
        }
        callees
    }

    fn node_visible(&self, node: NodeId) -> bool {
        match self.cfa.node(node) {
            Some(n) => self
                .functions
                .as_ref()
                .is_none_or(|set| set.contains(&n.function())),
            None => false,
        }
    }

    fn edge_visible(&self, edge: &CfaEdge) -> bool {
        if !self.node_visible(edge.predecessor()) || !self.node_visible(edge.successor()) {
            return false;
        }
        self.predicate.as_ref().is_none_or(|p| (p.as_ref())(edge))
    }

    /// Returns the visible edges leaving a node, in list order with the
    /// summary edge folded in at the end.
    #[must_use]
    pub fn out_edges(&self, node: NodeId) -> Vec<&'a CfaEdge> {
        if !self.node_visible(node) {
            return Vec::new();
        }
        self.cfa
            .leaving_edges(node)
            .filter(|e| self.edge_visible(e))
            .collect()
    }

    /// Returns the visible edges entering a node, in list order with the
    /// summary edge folded in at the end.
    #[must_use]
    pub fn in_edges(&self, node: NodeId) -> Vec<&'a CfaEdge> {
        if !self.node_visible(node) {
            return Vec::new();
        }
        self.cfa
            .entering_edges(node)
            .filter(|e| self.edge_visible(e))
            .collect()
    }

    /// Returns the out-degree of a node, summary edge included.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.out_edges(node).len()
    }

    /// Returns the in-degree of a node, summary edge included.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.in_edges(node).len()
    }

    /// Returns the distinct successor nodes of a node, in first-occurrence
    /// order. A self-loop contributes its node once.
    #[must_use]
    pub fn successors_of(&self, node: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.out_edges(node)
            .into_iter()
            .map(CfaEdge::successor)
            .filter(|&s| seen.insert(s))
            .collect()
    }

    /// Returns the distinct predecessor nodes of a node, in first-occurrence
    /// order. A self-loop contributes its node once.
    #[must_use]
    pub fn predecessors_of(&self, node: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.in_edges(node)
            .into_iter()
            .map(CfaEdge::predecessor)
            .filter(|&p| seen.insert(p))
            .collect()
    }

    /// Returns the first visible edge connecting `from` to `to`, if any.
    #[must_use]
    pub fn edge_connecting(&self, from: NodeId, to: NodeId) -> Option<&'a CfaEdge> {
        self.out_edges(from)
            .into_iter()
            .find(|e| e.successor() == to)
    }

    /// Returns the handles of all visible edges.
    #[must_use]
    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.cfa
            .edges()
            .filter(|e| self.edge_visible(e))
            .map(CfaEdge::id)
            .collect()
    }
}

impl GraphBase for CfaView<'_> {
    fn node_count(&self) -> usize {
        self.node_ids().count()
    }

    fn node_bound(&self) -> usize {
        use crate::cfa::store::CfaStore;
        self.cfa.node_bound()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.cfa
            .nodes()
            .map(crate::cfa::node::CfaNode::id)
            .filter(|&n| self.node_visible(n))
    }
}

impl Successors for CfaView<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.successors_of(node).into_iter()
    }
}

impl Predecessors for CfaView<'_> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors_of(node).into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfa::{
            ast::{CallStatement, CfaType, Expression},
            function::FunctionSignature,
            location::FileLocation,
            node::NodeKind,
        },
        utils::graph::algorithms,
        CfaBuilder, MachineModel,
    };

    /// main: entry -> a -[assume pair]-> {b, c} -> exit, plus helper() called
    /// via a plain statement edge from b, and an unrelated function "orphan".
    fn sample() -> Cfa {
        let mut builder = CfaBuilder::new(MachineModel::Lp64);
        let main = builder.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        let entry = builder.function_entry(main);
        let exit = builder.function_exit(main).unwrap();
        let a = builder.add_node(main, NodeKind::Plain);
        let b = builder.add_node(main, NodeKind::Plain);
        let c = builder.add_node(main, NodeKind::Plain);

        let cond = Expression::var("x");
        builder
            .add_edge(entry, a, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();
        builder
            .add_edge(
                a,
                b,
                EdgeKind::Assume {
                    expression: cond.clone(),
                    truth: true,
                },
                "x",
                FileLocation::dummy(),
            )
            .unwrap();
        builder
            .add_edge(
                a,
                c,
                EdgeKind::Assume {
                    expression: cond,
                    truth: false,
                },
                "!x",
                FileLocation::dummy(),
            )
            .unwrap();
        builder
            .add_edge(
                b,
                exit,
                EdgeKind::Statement {
                    statement: Statement::Call(CallStatement::direct("helper", vec![])),
                },
                "helper()",
                FileLocation::dummy(),
            )
            .unwrap();
        builder
            .add_edge(c, exit, EdgeKind::blank("join"), "", FileLocation::dummy())
            .unwrap();

        let helper = builder.add_function(FunctionSignature::new("helper", vec![], CfaType::Void));
        let h_entry = builder.function_entry(helper);
        let h_exit = builder.function_exit(helper).unwrap();
        builder
            .add_edge(h_entry, h_exit, EdgeKind::blank("body"), "", FileLocation::dummy())
            .unwrap();

        let orphan = builder.add_function(FunctionSignature::new("orphan", vec![], CfaType::Void));
        let o_entry = builder.function_entry(orphan);
        let o_exit = builder.function_exit(orphan).unwrap();
        builder
            .add_edge(o_entry, o_exit, EdgeKind::blank("body"), "", FileLocation::dummy())
            .unwrap();

        builder.set_entry_function("main").unwrap();
        builder.seal().unwrap()
    }

    #[test]
    fn test_out_edges_and_degrees() {
        let cfa = sample();
        let view = cfa.view();
        let main = cfa.function_by_name("main").unwrap();
        let entry = cfa.function_entry(main).unwrap();

        assert_eq!(view.out_degree(entry), 1);
        assert_eq!(view.in_degree(entry), 0);

        let a = view.successors_of(entry)[0];
        assert_eq!(view.out_degree(a), 2);
        assert_eq!(view.successors_of(a).len(), 2);
    }

    #[test]
    fn test_foreign_node_yields_empty() {
        let cfa = sample();
        let view = cfa.view();
        let foreign = NodeId::new(9999);

        assert!(view.out_edges(foreign).is_empty());
        assert!(view.in_edges(foreign).is_empty());
        assert!(view.successors_of(foreign).is_empty());
        assert_eq!(view.out_degree(foreign), 0);
        assert!(view.edge_connecting(foreign, NodeId::new(0)).is_none());
    }

    #[test]
    fn test_edge_connecting() {
        let cfa = sample();
        let view = cfa.view();
        let main = cfa.function_by_name("main").unwrap();
        let entry = cfa.function_entry(main).unwrap();
        let a = view.successors_of(entry)[0];

        let edge = view.edge_connecting(entry, a).unwrap();
        assert_eq!(edge.predecessor(), entry);
        assert_eq!(edge.successor(), a);
        assert!(view.edge_connecting(a, entry).is_none());
    }

    #[test]
    fn test_filter_edges_hides_assume_legs() {
        let cfa = sample();
        let view = cfa.view().filter_edges(|e| !e.kind().is_assume());
        let main = cfa.function_by_name("main").unwrap();
        let entry = cfa.function_entry(main).unwrap();
        let a = view.successors_of(entry)[0];

        assert_eq!(view.out_degree(a), 0);
        // The unfiltered view is untouched
        assert_eq!(cfa.view().out_degree(a), 2);
    }

    #[test]
    fn test_restrict_to_functions_follows_calls() {
        let cfa = sample();
        let view = cfa.view().restrict_to_functions(&["main"]);

        let helper = cfa.function_by_name("helper").unwrap();
        let orphan = cfa.function_by_name("orphan").unwrap();

        // helper is called from main, orphan is not
        assert!(view.node_visible(cfa.function_entry(helper).unwrap()));
        assert!(!view.node_visible(cfa.function_entry(orphan).unwrap()));
        assert!(view
            .out_edges(cfa.function_entry(orphan).unwrap())
            .is_empty());
    }

    #[test]
    fn test_restrict_unknown_root_is_empty() {
        let cfa = sample();
        let view = cfa.view().restrict_to_functions(&["nope"]);
        assert_eq!(view.node_count(), 0);
    }

    #[test]
    fn test_view_works_with_algorithms() {
        let cfa = sample();
        let view = cfa.view().restrict_to_functions(&["main"]);
        let main = cfa.function_by_name("main").unwrap();
        let entry = cfa.function_entry(main).unwrap();

        let order = algorithms::reverse_postorder(&view, entry);
        assert_eq!(order[0], entry);
        // main has 5 nodes
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn test_self_loop_counted_once() {
        let mut builder = CfaBuilder::new(MachineModel::Lp64);
        let main = builder.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        let entry = builder.function_entry(main);
        let exit = builder.function_exit(main).unwrap();
        let n = builder.add_node(main, NodeKind::Plain);
        builder
            .add_edge(entry, n, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();
        builder
            .add_edge(n, n, EdgeKind::blank("spin"), "", FileLocation::dummy())
            .unwrap();
        builder
            .add_edge(n, exit, EdgeKind::blank("leave"), "", FileLocation::dummy())
            .unwrap();
        builder.set_entry_function("main").unwrap();
        let cfa = builder.seal().unwrap();

        let view = cfa.view();
        // Two out-edges, but n appears once among its own successors
        assert_eq!(view.out_degree(n), 2);
        let succs = view.successors_of(n);
        assert_eq!(succs.iter().filter(|&&s| s == n).count(), 1);
    }
}
