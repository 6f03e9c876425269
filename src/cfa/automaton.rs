//! The sealed, read-only automaton.
//!
//! A [`Cfa`] is produced by [`CfaBuilder::seal`](crate::CfaBuilder::seal) and
//! never mutated again. Sealing assigns per-function reverse-postorder ids
//! and computes the best-effort loop overview and variable classification;
//! afterwards the automaton can be shared freely across threads for
//! concurrent reading.

use std::collections::HashMap;

use log::warn;

use crate::{
    cfa::{
        ast::Declaration,
        builder::CfaBuilder,
        edge::CfaEdge,
        function::{FunctionId, FunctionRecord, FunctionSignature},
        loops::{self, LoopOverview},
        node::CfaNode,
        store::CfaStore,
        variables::{self, VariableClassification},
        view::CfaView,
        MachineModel,
    },
    utils::graph::{algorithms, EdgeId, NodeId},
    Result,
};

/// A completed, read-only control-flow automaton.
///
/// The sealed automaton exposes all nodes and edges, per-function entry/exit
/// lookup, the designated entry function, the machine model, and the
/// optional loop overview. Structural mutation requires rebuilding into a
/// fresh [`CfaBuilder`](crate::CfaBuilder) via the rebuild engine.
///
/// # Thread Safety
///
/// `Cfa` is [`Send`] and [`Sync`]: it is guaranteed never to be mutated
/// again, so background consumers may traverse it concurrently.
#[derive(Debug)]
pub struct Cfa {
    nodes: Vec<Option<CfaNode>>,
    edges: Vec<Option<CfaEdge>>,
    functions: Vec<Option<FunctionRecord>>,
    by_name: HashMap<String, FunctionId>,
    machine: MachineModel,
    entry_function: FunctionId,
    globals: Vec<(Declaration, String)>,
    files: Vec<String>,
    loops: Option<LoopOverview>,
    variables: Option<VariableClassification>,
}

impl Cfa {
    pub(crate) fn from_builder(builder: CfaBuilder, entry_function: FunctionId) -> Result<Self> {
        let (nodes, edges, functions, by_name, machine, globals, files) = builder.into_parts();
        let mut cfa = Cfa {
            nodes,
            edges,
            functions,
            by_name,
            machine,
            entry_function,
            globals,
            files,
            loops: None,
            variables: None,
        };
        cfa.assign_rpo_ids();

        // Both discoveries are best-effort: failure degrades to "feature
        // absent" instead of aborting the pipeline
        cfa.loops = match loops::compute_loop_overview(&cfa) {
            Ok(overview) => Some(overview),
            Err(e) => {
                warn!("loop overview unavailable: {e}");
                None
            }
        };
        cfa.variables = match variables::classify_variables(&cfa) {
            Ok(classification) => Some(classification),
            Err(e) => {
                warn!("variable classification unavailable: {e}");
                None
            }
        };
        Ok(cfa)
    }

    /// Numbers each function's nodes in reverse postorder over its
    /// intraprocedural edges (ordinary edges staying within the function,
    /// plus the summary edge). Nodes unreachable from their entry keep id 0.
    fn assign_rpo_ids(&mut self) {
        let function_ids: Vec<FunctionId> = CfaStore::function_ids(self).collect();
        for function in function_ids {
            let Some(entry) = CfaStore::function_entry(self, function) else {
                continue;
            };
            let projection = FunctionProjection {
                cfa: self,
                function,
            };
            let order = algorithms::reverse_postorder(&projection, entry);
            for (i, node) in order.into_iter().enumerate() {
                if let Some(n) = self.nodes.get_mut(node.index()).and_then(Option::as_mut) {
                    n.rpo_id = u32::try_from(i).unwrap_or(u32::MAX);
                }
            }
        }
    }

    /// Returns the machine model this automaton targets.
    #[must_use]
    pub fn machine(&self) -> MachineModel {
        self.machine
    }

    /// Returns the designated entry function.
    #[must_use]
    pub fn entry_function(&self) -> FunctionId {
        self.entry_function
    }

    /// Returns the node behind a handle, or `None` if it does not exist.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&CfaNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the edge behind a handle, or `None` if it does not exist.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&CfaEdge> {
        self.edges.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns an iterator over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &CfaNode> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    /// Returns an iterator over all edges.
    pub fn edges(&self) -> impl Iterator<Item = &CfaEdge> {
        self.edges.iter().filter_map(Option::as_ref)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        let id = *self.by_name.get(name)?;
        self.functions.get(id.index())?.as_ref()?;
        Some(id)
    }

    /// Returns an iterator over all function handles.
    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| FunctionId::new(i)))
    }

    /// Returns the entry node of a function, if the handle is live.
    #[must_use]
    pub fn function_entry(&self, function: FunctionId) -> Option<NodeId> {
        self.functions
            .get(function.index())?
            .as_ref()
            .map(|r| r.entry)
    }

    /// Returns the exit node of a function; `None` for stale handles or when
    /// the exit was pruned because the function never returns.
    #[must_use]
    pub fn function_exit(&self, function: FunctionId) -> Option<NodeId> {
        self.functions
            .get(function.index())?
            .as_ref()
            .and_then(|r| r.exit)
    }

    /// Returns the signature of a function, if the handle is live.
    #[must_use]
    pub fn function_signature(&self, function: FunctionId) -> Option<&FunctionSignature> {
        self.functions
            .get(function.index())?
            .as_ref()
            .map(|r| &r.signature)
    }

    /// Returns the global-declaration pairs delivered by the front end.
    #[must_use]
    pub fn globals(&self) -> &[(Declaration, String)] {
        &self.globals
    }

    /// Returns the source file list delivered by the front end.
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Returns the loop overview computed at seal time, if discovery
    /// succeeded.
    #[must_use]
    pub fn loops(&self) -> Option<&LoopOverview> {
        self.loops.as_ref()
    }

    /// Returns the variable classification computed at seal time, if
    /// discovery succeeded.
    #[must_use]
    pub fn variables(&self) -> Option<&VariableClassification> {
        self.variables.as_ref()
    }

    /// Returns the unfiltered read-only graph view over this automaton.
    #[must_use]
    pub fn view(&self) -> CfaView<'_> {
        CfaView::new(self)
    }

    /// Returns the edges leaving a node, in order, with the summary edge
    /// folded in at the end.
    pub fn leaving_edges(&self, node: NodeId) -> impl Iterator<Item = &CfaEdge> {
        let (list, summary) = match self.node(node) {
            Some(n) => (n.leaving.as_slice(), n.leaving_summary),
            None => (&[] as &[EdgeId], None),
        };
        list.iter()
            .copied()
            .chain(summary)
            .filter_map(|e| self.edge(e))
    }

    /// Returns the edges entering a node, in order, with the summary edge
    /// folded in at the end.
    pub fn entering_edges(&self, node: NodeId) -> impl Iterator<Item = &CfaEdge> {
        let (list, summary) = match self.node(node) {
            Some(n) => (n.entering.as_slice(), n.entering_summary),
            None => (&[] as &[EdgeId], None),
        };
        list.iter()
            .copied()
            .chain(summary)
            .filter_map(|e| self.edge(e))
    }

    /// Returns the per-function node/edge kind skeleton: for each function
    /// (sorted by name), the node kinds in reverse-postorder and the classes
    /// of the edges leaving them. Two isomorphic automata produce equal
    /// skeletons; tests use this for round-trip comparisons.
    #[must_use]
    pub fn skeleton(&self) -> Vec<(String, Vec<String>)> {
        let mut result: Vec<(String, Vec<String>)> = Vec::new();
        for function in self.functions() {
            let Some(sig) = self.function_signature(function) else {
                continue;
            };
            let mut nodes: Vec<&CfaNode> = self
                .nodes()
                .filter(|n| n.function == function)
                .collect();
            nodes.sort_by_key(|n| (n.rpo_id, n.id.index()));
            let mut entries = Vec::with_capacity(nodes.len());
            for node in nodes {
                let mut classes: Vec<String> = self
                    .leaving_edges(node.id)
                    .map(|e| format!("{:?}", e.class()))
                    .collect();
                classes.sort();
                entries.push(format!("{:?}[{}]", kind_tag(node), classes.join(",")));
            }
            result.push((sig.name.clone(), entries));
        }
        result.sort();
        result
    }
}

/// Payload-free node kind tag for skeletons.
fn kind_tag(node: &CfaNode) -> &'static str {
    use crate::cfa::node::NodeKind;
    match node.kind() {
        NodeKind::Plain => "Plain",
        NodeKind::Label { .. } => "Label",
        NodeKind::FunctionEntry { .. } => "Entry",
        NodeKind::FunctionExit => "Exit",
        NodeKind::Termination => "Termination",
    }
}

/// Intraprocedural forward projection of one function, used for the
/// reverse-postorder numbering at seal time.
struct FunctionProjection<'a> {
    cfa: &'a Cfa,
    function: FunctionId,
}

impl crate::utils::graph::GraphBase for FunctionProjection<'_> {
    fn node_count(&self) -> usize {
        self.cfa
            .nodes()
            .filter(|n| n.function == self.function)
            .count()
    }

    fn node_bound(&self) -> usize {
        self.cfa.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.cfa
            .nodes()
            .filter(|n| n.function == self.function)
            .map(CfaNode::id)
    }
}

impl crate::utils::graph::Successors for FunctionProjection<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.cfa
            .leaving_edges(node)
            .filter(|e| {
                self.cfa
                    .node(e.successor())
                    .is_some_and(|n| n.function == self.function)
            })
            .map(CfaEdge::successor)
    }
}

impl CfaStore for Cfa {
    fn machine(&self) -> MachineModel {
        self.machine
    }

    fn node(&self, id: NodeId) -> Option<&CfaNode> {
        Cfa::node(self, id)
    }

    fn edge(&self, id: EdgeId) -> Option<&CfaEdge> {
        Cfa::edge(self, id)
    }

    fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId::new(i)))
    }

    fn edge_ids(&self) -> impl Iterator<Item = EdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| EdgeId::new(i)))
    }

    fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        self.functions()
    }

    fn function_entry(&self, function: FunctionId) -> Option<NodeId> {
        Cfa::function_entry(self, function)
    }

    fn function_exit(&self, function: FunctionId) -> Option<NodeId> {
        Cfa::function_exit(self, function)
    }

    fn function_signature(&self, function: FunctionId) -> Option<&FunctionSignature> {
        Cfa::function_signature(self, function)
    }

    fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        Cfa::function_by_name(self, name)
    }

    fn entry_function(&self) -> Option<FunctionId> {
        Some(self.entry_function)
    }

    fn globals(&self) -> &[(Declaration, String)] {
        &self.globals
    }

    fn files(&self) -> &[String] {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfa::{
        ast::CfaType, edge::EdgeKind, function::FunctionSignature, location::FileLocation,
        node::NodeKind,
    };

    /// main: entry -> a -> exit, plus a branch a -> exit via b
    fn sealed_diamondish() -> Cfa {
        let mut b = CfaBuilder::new(MachineModel::Lp64);
        let main = b.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        let a = b.add_node(main, NodeKind::Plain);
        b.add_edge(entry, a, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();
        b.add_edge(a, exit, EdgeKind::blank("short"), "", FileLocation::dummy())
            .unwrap();
        b.set_entry_function("main").unwrap();
        b.seal().unwrap()
    }

    #[test]
    fn test_seal_assigns_rpo_ids() {
        let cfa = sealed_diamondish();
        let main = cfa.function_by_name("main").unwrap();
        let entry = cfa.function_entry(main).unwrap();
        let exit = cfa.function_exit(main).unwrap();

        assert_eq!(cfa.node(entry).unwrap().rpo_id(), 0);
        // exit is last in reverse postorder
        let max_rpo = cfa.nodes().map(|n| n.rpo_id()).max().unwrap();
        assert_eq!(cfa.node(exit).unwrap().rpo_id(), max_rpo);
    }

    #[test]
    fn test_sealed_lookups() {
        let cfa = sealed_diamondish();
        assert_eq!(cfa.node_count(), 3);
        assert_eq!(cfa.edge_count(), 2);
        assert_eq!(cfa.machine(), MachineModel::Lp64);

        let main = cfa.function_by_name("main").unwrap();
        assert_eq!(cfa.entry_function(), main);
        assert!(cfa.function_signature(main).is_some());
        assert!(cfa.function_by_name("nope").is_none());
    }

    #[test]
    fn test_loop_overview_present_for_loop_free() {
        let cfa = sealed_diamondish();
        let loops = cfa.loops().expect("overview should be computed");
        assert_eq!(loops.total_headers(), 0);
    }

    #[test]
    fn test_variable_classification_present() {
        let cfa = sealed_diamondish();
        let variables = cfa.variables().expect("classification should be computed");
        assert!(variables.assumed().is_empty());
    }

    #[test]
    fn test_skeleton_is_deterministic() {
        let a = sealed_diamondish();
        let b = sealed_diamondish();
        assert_eq!(a.skeleton(), b.skeleton());
    }

    #[test]
    fn test_sealed_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Cfa>();
    }
}
