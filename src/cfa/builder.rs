//! The mutable "build" phase of an automaton.
//!
//! [`CfaBuilder`] owns the node and edge arenas and is the only type through
//! which connectivity and payloads can change. Handles stay stable across
//! removals because the arenas keep tombstones. Once construction is
//! finished, the one-way [`seal`](CfaBuilder::seal) conversion produces the
//! read-only [`Cfa`](crate::Cfa); there is no way back.

use std::collections::HashMap;

use log::debug;

use crate::{
    cfa::{
        ast::Declaration,
        automaton::Cfa,
        edge::{CfaEdge, EdgeKind},
        function::{FunctionId, FunctionRecord, FunctionSignature},
        location::FileLocation,
        node::{CfaNode, NodeKind},
        store::CfaStore,
        MachineModel,
    },
    utils::graph::{EdgeId, NodeId},
    Error, Result,
};

/// A control-flow automaton under construction.
///
/// The builder is handed to the front end to populate with independent
/// per-function automata, then to the supergraph assembler, and finally
/// sealed. Structural transformations (rebuild, single-loop) produce fresh
/// builders rather than reopening sealed automata.
///
/// # Ownership
///
/// The builder exclusively owns all nodes and edges; they reference each
/// other only by handle, so the cyclic graph needs no interior mutability or
/// reference counting.
///
/// # Thread Safety
///
/// No operation on a builder is safe to invoke concurrently; use separate
/// builders for parallel work.
#[derive(Debug, Clone)]
pub struct CfaBuilder {
    nodes: Vec<Option<CfaNode>>,
    edges: Vec<Option<CfaEdge>>,
    functions: Vec<Option<FunctionRecord>>,
    by_name: HashMap<String, FunctionId>,
    machine: MachineModel,
    entry_function: Option<FunctionId>,
    globals: Vec<(Declaration, String)>,
    files: Vec<String>,
}

impl CfaBuilder {
    /// Creates an empty builder for the given machine model.
    #[must_use]
    pub fn new(machine: MachineModel) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            functions: Vec::new(),
            by_name: HashMap::new(),
            machine,
            entry_function: None,
            globals: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Returns the machine model this automaton targets.
    #[must_use]
    pub fn machine(&self) -> MachineModel {
        self.machine
    }

    /// Replaces the global-declaration pairs delivered by the front end.
    pub fn set_globals(&mut self, globals: Vec<(Declaration, String)>) {
        self.globals = globals;
    }

    /// Returns the global-declaration pairs.
    #[must_use]
    pub fn globals(&self) -> &[(Declaration, String)] {
        &self.globals
    }

    /// Replaces the source file list delivered by the front end.
    pub fn set_files(&mut self, files: Vec<String>) {
        self.files = files;
    }

    /// Returns the source file list.
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Registers a function and creates its exit and entry nodes.
    ///
    /// If the function returns a value, the entry node receives a synthetic
    /// return-variable declaration named `__retval_<function>`.
    ///
    /// # Returns
    ///
    /// The handle of the new function. Entry and exit nodes are reachable via
    /// [`function_entry`](Self::function_entry) /
    /// [`function_exit`](Self::function_exit).
    pub fn add_function(&mut self, signature: FunctionSignature) -> FunctionId {
        let id = FunctionId::new(self.functions.len());

        let exit = self.push_node(id, NodeKind::FunctionExit);
        let return_variable = signature.has_return_value().then(|| Declaration {
            name: format!("__retval_{}", signature.name),
            ty: signature.return_type.clone(),
            initializer: None,
            global: false,
        });
        let entry = self.push_node(
            id,
            NodeKind::FunctionEntry {
                exit: Some(exit),
                return_variable,
            },
        );

        self.by_name.insert(signature.name.clone(), id);
        self.functions.push(Some(FunctionRecord {
            signature,
            entry,
            exit: Some(exit),
        }));
        id
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        let id = *self.by_name.get(name)?;
        self.functions.get(id.index())?.as_ref()?;
        Some(id)
    }

    /// Returns the entry node of a function.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale. Handles produced by
    /// [`add_function`](Self::add_function) stay valid until the function is
    /// pruned.
    #[must_use]
    pub fn function_entry(&self, function: FunctionId) -> NodeId {
        self.record(function).entry
    }

    /// Returns the exit node of a function, or `None` once the exit has been
    /// pruned because the function never returns.
    ///
    /// # Panics
    ///
    /// Panics if the function handle is stale.
    #[must_use]
    pub fn function_exit(&self, function: FunctionId) -> Option<NodeId> {
        self.record(function).exit
    }

    /// Returns the signature of a function, if the handle is live.
    #[must_use]
    pub fn signature(&self, function: FunctionId) -> Option<&FunctionSignature> {
        self.functions
            .get(function.index())?
            .as_ref()
            .map(|r| &r.signature)
    }

    /// Designates the entry function of the program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedEntry`] if no function of that name exists.
    pub fn set_entry_function(&mut self, name: &str) -> Result<()> {
        match self.function_by_name(name) {
            Some(id) => {
                self.entry_function = Some(id);
                Ok(())
            }
            None => Err(Error::UnresolvedEntry(name.to_string())),
        }
    }

    /// Returns the designated entry function, if one was set.
    #[must_use]
    pub fn entry_function(&self) -> Option<FunctionId> {
        self.entry_function
    }

    /// Returns an iterator over all live function handles.
    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| FunctionId::new(i)))
    }

    /// Re-points a function's entry node (used when a transformation
    /// relocates the entry).
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for stale function or node handles.
    pub fn set_function_entry(&mut self, function: FunctionId, entry: NodeId) -> Result<()> {
        if self.node(entry).is_none() {
            return Err(Error::GraphError(format!(
                "entry node {entry} does not exist"
            )));
        }
        match self.functions.get_mut(function.index()).and_then(Option::as_mut) {
            Some(record) => {
                record.entry = entry;
                Ok(())
            }
            None => Err(Error::GraphError(format!(
                "function {function} does not exist"
            ))),
        }
    }

    /// Registers a function record without creating nodes; the rebuild
    /// engine fixes entry/exit up as it clones them.
    pub(crate) fn register_function_shell(&mut self, signature: FunctionSignature) -> FunctionId {
        let id = FunctionId::new(self.functions.len());
        self.by_name.insert(signature.name.clone(), id);
        self.functions.push(Some(FunctionRecord {
            signature,
            entry: NodeId::new(usize::MAX),
            exit: None,
        }));
        id
    }

    /// Re-points a function's recorded exit node.
    pub(crate) fn set_function_exit_record(&mut self, function: FunctionId, exit: Option<NodeId>) {
        if let Some(record) = self
            .functions
            .get_mut(function.index())
            .and_then(Option::as_mut)
        {
            record.exit = exit;
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    fn push_node(&mut self, function: FunctionId, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(CfaNode::new(id, function, kind)));
        id
    }

    /// Adds a node to the given function.
    ///
    /// Function entry/exit nodes are created by
    /// [`add_function`](Self::add_function); this is for plain, label, and
    /// termination locations, and for synthetic nodes of transformations.
    pub fn add_node(&mut self, function: FunctionId, kind: NodeKind) -> NodeId {
        self.push_node(function, kind)
    }

    /// Returns the node behind a handle, or `None` if it was removed.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&CfaNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut CfaNode> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Replaces a node's kind (e.g. demoting a relocated function entry to a
    /// plain node).
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for a stale handle.
    pub fn set_node_kind(&mut self, id: NodeId, kind: NodeKind) -> Result<()> {
        match self.node_mut(id) {
            Some(node) => {
                node.kind = kind;
                Ok(())
            }
            None => Err(Error::GraphError(format!("node {id} does not exist"))),
        }
    }

    /// Removes a node that has no attached edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the handle is stale or edges are
    /// still attached.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let node = self
            .node(id)
            .ok_or_else(|| Error::GraphError(format!("node {id} does not exist")))?;
        if !node.leaving.is_empty()
            || !node.entering.is_empty()
            || node.leaving_summary.is_some()
            || node.entering_summary.is_some()
        {
            return Err(Error::GraphError(format!(
                "node {id} still has attached edges"
            )));
        }
        self.nodes[id.index()] = None;
        Ok(())
    }

    /// Returns an iterator over all live node handles.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId::new(i)))
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Adds an edge between two nodes.
    ///
    /// Ordinary edges are appended to the predecessor's leaving list and the
    /// successor's entering list. Summary edges instead occupy the single
    /// summary slot of each endpoint; occupied slots are refused, which is
    /// the uniform precondition callers splice around. Call and return edges
    /// must reference an existing summary edge that agrees on the shared
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for stale endpoints, occupied summary
    /// slots, or broken triple links.
    pub fn add_edge(
        &mut self,
        predecessor: NodeId,
        successor: NodeId,
        kind: EdgeKind,
        raw: impl Into<String>,
        location: FileLocation,
    ) -> Result<EdgeId> {
        if self.node(predecessor).is_none() {
            return Err(Error::GraphError(format!(
                "predecessor node {predecessor} does not exist"
            )));
        }
        if self.node(successor).is_none() {
            return Err(Error::GraphError(format!(
                "successor node {successor} does not exist"
            )));
        }
        self.validate_triple_link(predecessor, successor, &kind)?;

        let id = EdgeId::new(self.edges.len());
        let is_summary = kind.is_summary();
        if is_summary {
            let pred = self.node(predecessor).map(|n| n.leaving_summary);
            if pred.flatten().is_some() {
                return Err(Error::GraphError(format!(
                    "node {predecessor} already has a leaving summary edge"
                )));
            }
            let succ = self.node(successor).map(|n| n.entering_summary);
            if succ.flatten().is_some() {
                return Err(Error::GraphError(format!(
                    "node {successor} already has an entering summary edge"
                )));
            }
        }

        self.edges.push(Some(CfaEdge::new(
            id,
            predecessor,
            successor,
            kind,
            raw,
            location,
        )));

        if is_summary {
            if let Some(n) = self.node_mut(predecessor) {
                n.leaving_summary = Some(id);
            }
            if let Some(n) = self.node_mut(successor) {
                n.entering_summary = Some(id);
            }
        } else {
            if let Some(n) = self.node_mut(predecessor) {
                n.leaving.push(id);
            }
            if let Some(n) = self.node_mut(successor) {
                n.entering.push(id);
            }
        }
        Ok(id)
    }

    fn validate_triple_link(
        &self,
        predecessor: NodeId,
        _successor: NodeId,
        kind: &EdgeKind,
    ) -> Result<()> {
        match kind {
            EdgeKind::Call {
                summary: Some(s), ..
            } => {
                let summary = self
                    .edge(*s)
                    .ok_or_else(|| Error::GraphError(format!("summary edge {s} does not exist")))?;
                if !summary.kind.is_summary() {
                    return Err(Error::GraphError(format!("edge {s} is not a summary edge")));
                }
                if summary.predecessor != predecessor {
                    return Err(Error::GraphError(format!(
                        "call edge and summary edge {s} disagree on the call site"
                    )));
                }
                Ok(())
            }
            EdgeKind::Return { summary } => {
                // The return site may legitimately diverge from the summary's
                // successor after the single-loop transformation relocated it;
                // only existence and kind are structural here.
                let s = *summary;
                let edge = self
                    .edge(s)
                    .ok_or_else(|| Error::GraphError(format!("summary edge {s} does not exist")))?;
                if !edge.kind.is_summary() {
                    return Err(Error::GraphError(format!("edge {s} is not a summary edge")));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Returns the edge behind a handle, or `None` if it was removed.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&CfaEdge> {
        self.edges.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut CfaEdge> {
        self.edges.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Removes an edge, unregistering it from its endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the handle is stale or if the edge is
    /// a summary edge that a call or return edge still references (the triple
    /// must be relinked consistently, call/return legs first).
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<()> {
        let (predecessor, successor, is_summary) = {
            let edge = self
                .edge(id)
                .ok_or_else(|| Error::GraphError(format!("edge {id} does not exist")))?;
            (edge.predecessor, edge.successor, edge.kind.is_summary())
        };

        if is_summary && self.summary_is_referenced(id, predecessor, successor) {
            return Err(Error::GraphError(format!(
                "summary edge {id} is still referenced by a call or return edge"
            )));
        }

        self.unregister_edge(id, predecessor, successor, is_summary);
        self.edges[id.index()] = None;
        Ok(())
    }

    /// Checks whether a call or return edge still links to the summary edge.
    /// Links can only come from the summary's own endpoints.
    fn summary_is_referenced(&self, id: EdgeId, predecessor: NodeId, successor: NodeId) -> bool {
        let from_call = self.node(predecessor).is_some_and(|n| {
            n.leaving.iter().any(|&e| {
                self.edge(e)
                    .is_some_and(|edge| edge.kind.summary_link() == Some(id))
            })
        });
        let from_return = self.node(successor).is_some_and(|n| {
            n.entering.iter().any(|&e| {
                self.edge(e)
                    .is_some_and(|edge| edge.kind.summary_link() == Some(id))
            })
        });
        from_call || from_return
    }

    fn unregister_edge(
        &mut self,
        id: EdgeId,
        predecessor: NodeId,
        successor: NodeId,
        is_summary: bool,
    ) {
        if is_summary {
            if let Some(n) = self.node_mut(predecessor) {
                if n.leaving_summary == Some(id) {
                    n.leaving_summary = None;
                }
            }
            if let Some(n) = self.node_mut(successor) {
                if n.entering_summary == Some(id) {
                    n.entering_summary = None;
                }
            }
        } else {
            if let Some(n) = self.node_mut(predecessor) {
                n.leaving.retain(|&e| e != id);
            }
            if let Some(n) = self.node_mut(successor) {
                n.entering.retain(|&e| e != id);
            }
        }
    }

    /// Re-points an edge's successor, keeping endpoint registration
    /// consistent (ordered list or summary slot).
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for stale handles or, for summary
    /// edges, an occupied slot at the new successor.
    pub fn retarget_edge_successor(&mut self, id: EdgeId, new_successor: NodeId) -> Result<()> {
        if self.node(new_successor).is_none() {
            return Err(Error::GraphError(format!(
                "successor node {new_successor} does not exist"
            )));
        }
        let (old_successor, is_summary) = {
            let edge = self
                .edge(id)
                .ok_or_else(|| Error::GraphError(format!("edge {id} does not exist")))?;
            (edge.successor, edge.kind.is_summary())
        };
        if old_successor == new_successor {
            return Ok(());
        }

        if is_summary {
            if self
                .node(new_successor)
                .is_some_and(|n| n.entering_summary.is_some())
            {
                return Err(Error::GraphError(format!(
                    "node {new_successor} already has an entering summary edge"
                )));
            }
            if let Some(n) = self.node_mut(old_successor) {
                if n.entering_summary == Some(id) {
                    n.entering_summary = None;
                }
            }
            if let Some(n) = self.node_mut(new_successor) {
                n.entering_summary = Some(id);
            }
        } else {
            if let Some(n) = self.node_mut(old_successor) {
                n.entering.retain(|&e| e != id);
            }
            if let Some(n) = self.node_mut(new_successor) {
                n.entering.push(id);
            }
        }
        if let Some(edge) = self.edge_mut(id) {
            edge.successor = new_successor;
        }
        Ok(())
    }

    /// Re-points an edge's predecessor, keeping endpoint registration
    /// consistent (ordered list or summary slot).
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for stale handles or, for summary
    /// edges, an occupied slot at the new predecessor.
    pub fn retarget_edge_predecessor(&mut self, id: EdgeId, new_predecessor: NodeId) -> Result<()> {
        if self.node(new_predecessor).is_none() {
            return Err(Error::GraphError(format!(
                "predecessor node {new_predecessor} does not exist"
            )));
        }
        let (old_predecessor, is_summary) = {
            let edge = self
                .edge(id)
                .ok_or_else(|| Error::GraphError(format!("edge {id} does not exist")))?;
            (edge.predecessor, edge.kind.is_summary())
        };
        if old_predecessor == new_predecessor {
            return Ok(());
        }

        if is_summary {
            if self
                .node(new_predecessor)
                .is_some_and(|n| n.leaving_summary.is_some())
            {
                return Err(Error::GraphError(format!(
                    "node {new_predecessor} already has a leaving summary edge"
                )));
            }
            if let Some(n) = self.node_mut(old_predecessor) {
                if n.leaving_summary == Some(id) {
                    n.leaving_summary = None;
                }
            }
            if let Some(n) = self.node_mut(new_predecessor) {
                n.leaving_summary = Some(id);
            }
        } else {
            if let Some(n) = self.node_mut(old_predecessor) {
                n.leaving.retain(|&e| e != id);
            }
            if let Some(n) = self.node_mut(new_predecessor) {
                n.leaving.push(id);
            }
        }
        if let Some(edge) = self.edge_mut(id) {
            edge.predecessor = new_predecessor;
        }
        Ok(())
    }

    /// Returns an iterator over all live edge handles.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| EdgeId::new(i)))
    }

    /// Returns the number of live edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|slot| slot.is_some()).count()
    }

    // ------------------------------------------------------------------
    // Pruning
    // ------------------------------------------------------------------

    /// Removes every node (and its edges) not forward-reachable from the
    /// given roots, following both ordinary and summary edges. Functions
    /// whose nodes are all gone lose their record. Returns the number of
    /// removed nodes.
    pub fn remove_unreachable(&mut self, roots: &[NodeId]) -> usize {
        let bound = self.nodes.len();
        let mut reached = vec![false; bound];
        let mut stack: Vec<NodeId> = roots
            .iter()
            .copied()
            .filter(|r| self.node(*r).is_some())
            .collect();
        for r in &stack {
            reached[r.index()] = true;
        }
        while let Some(node) = stack.pop() {
            let Some(n) = self.node(node) else { continue };
            let mut targets: Vec<NodeId> = Vec::with_capacity(n.leaving.len() + 1);
            for &e in &n.leaving {
                if let Some(edge) = self.edge(e) {
                    targets.push(edge.successor);
                }
            }
            if let Some(s) = n.leaving_summary {
                if let Some(edge) = self.edge(s) {
                    targets.push(edge.successor);
                }
            }
            for t in targets {
                if !reached[t.index()] {
                    reached[t.index()] = true;
                    stack.push(t);
                }
            }
        }

        let doomed: Vec<NodeId> = self
            .node_ids()
            .filter(|n| !reached[n.index()])
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        for &node in &doomed {
            let Some(n) = self.node(node) else { continue };
            let mut attached: Vec<EdgeId> = Vec::new();
            attached.extend(n.leaving.iter().copied());
            attached.extend(n.entering.iter().copied());
            attached.extend(n.leaving_summary);
            attached.extend(n.entering_summary);
            for e in attached {
                if let Some(edge) = self.edge(e) {
                    let (p, s, is_summary) = (edge.predecessor, edge.successor, edge.kind.is_summary());
                    self.unregister_edge(e, p, s, is_summary);
                    self.edges[e.index()] = None;
                }
            }
            self.nodes[node.index()] = None;
        }

        // Functions lose their record when their entry died; a dead exit
        // only clears the exit links (the function never returns)
        for i in 0..self.functions.len() {
            let Some(record) = self.functions[i].as_ref() else {
                continue;
            };
            if self.node(record.entry).is_none() {
                let name = record.signature.name.clone();
                debug!("pruning function '{name}'");
                self.by_name.remove(&name);
                self.functions[i] = None;
                continue;
            }
            if let Some(exit) = record.exit {
                if self.node(exit).is_none() {
                    let entry = record.entry;
                    if let Some(r) = self.functions[i].as_mut() {
                        r.exit = None;
                    }
                    if let Some(n) = self.node_mut(entry) {
                        if let NodeKind::FunctionEntry { exit, .. } = &mut n.kind {
                            *exit = None;
                        }
                    }
                }
            }
        }

        debug!("pruned {} unreachable nodes", doomed.len());
        doomed.len()
    }

    // ------------------------------------------------------------------
    // Sealing
    // ------------------------------------------------------------------

    /// Seals the builder into a read-only [`Cfa`].
    ///
    /// Sealing assigns per-function reverse-postorder ids and computes the
    /// best-effort loop overview. An automaton without a designated entry
    /// function cannot be sealed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedEntry`] if no entry function was set or it
    /// was pruned.
    pub fn seal(self) -> Result<Cfa> {
        let entry = self
            .entry_function
            .filter(|f| self.functions.get(f.index()).is_some_and(Option::is_some))
            .ok_or_else(|| Error::UnresolvedEntry("<none designated>".to_string()))?;
        Cfa::from_builder(self, entry)
    }
}

impl CfaStore for CfaBuilder {
    fn machine(&self) -> MachineModel {
        self.machine
    }

    fn node(&self, id: NodeId) -> Option<&CfaNode> {
        CfaBuilder::node(self, id)
    }

    fn edge(&self, id: EdgeId) -> Option<&CfaEdge> {
        CfaBuilder::edge(self, id)
    }

    fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        CfaBuilder::node_ids(self)
    }

    fn edge_ids(&self) -> impl Iterator<Item = EdgeId> {
        CfaBuilder::edge_ids(self)
    }

    fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        CfaBuilder::function_ids(self)
    }

    fn function_entry(&self, function: FunctionId) -> Option<NodeId> {
        self.functions
            .get(function.index())?
            .as_ref()
            .map(|r| r.entry)
    }

    fn function_exit(&self, function: FunctionId) -> Option<NodeId> {
        self.functions
            .get(function.index())?
            .as_ref()
            .and_then(|r| r.exit)
    }

    fn function_signature(&self, function: FunctionId) -> Option<&FunctionSignature> {
        self.signature(function)
    }

    fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        CfaBuilder::function_by_name(self, name)
    }

    fn entry_function(&self) -> Option<FunctionId> {
        self.entry_function
    }

    fn globals(&self) -> &[(Declaration, String)] {
        &self.globals
    }

    fn files(&self) -> &[String] {
        &self.files
    }
}

impl CfaBuilder {
    fn record(&self, function: FunctionId) -> &FunctionRecord {
        self.functions
            .get(function.index())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("stale function handle {function}"))
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<Option<CfaNode>>,
        Vec<Option<CfaEdge>>,
        Vec<Option<FunctionRecord>>,
        HashMap<String, FunctionId>,
        MachineModel,
        Vec<(Declaration, String)>,
        Vec<String>,
    ) {
        (
            self.nodes,
            self.edges,
            self.functions,
            self.by_name,
            self.machine,
            self.globals,
            self.files,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfa::ast::{CallStatement, CfaType};

    fn empty_main() -> (CfaBuilder, FunctionId) {
        let mut b = CfaBuilder::new(MachineModel::Lp64);
        let main = b.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        (b, main)
    }

    #[test]
    fn test_add_function_creates_entry_and_exit() {
        let (b, main) = empty_main();
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        assert_ne!(entry, exit);
        assert!(b.node(entry).unwrap().kind().is_function_entry());
        assert!(b.node(exit).unwrap().kind().is_function_exit());
        match b.node(entry).unwrap().kind() {
            NodeKind::FunctionEntry {
                exit: linked,
                return_variable,
            } => {
                assert_eq!(*linked, Some(exit));
                assert!(return_variable.is_none());
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_return_variable_synthesized() {
        let mut b = CfaBuilder::new(MachineModel::Lp64);
        let f = b.add_function(FunctionSignature::new("f", vec![], CfaType::int()));
        match b.node(b.function_entry(f)).unwrap().kind() {
            NodeKind::FunctionEntry {
                return_variable: Some(var),
                ..
            } => assert_eq!(var.name, "__retval_f"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_add_edge_registers_both_endpoints() {
        let (mut b, main) = empty_main();
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        let e = b
            .add_edge(entry, exit, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();

        assert_eq!(b.node(entry).unwrap().leaving(), &[e]);
        assert_eq!(b.node(exit).unwrap().entering(), &[e]);
        assert_eq!(b.edge(e).unwrap().predecessor(), entry);
        assert_eq!(b.edge(e).unwrap().successor(), exit);
    }

    #[test]
    fn test_add_edge_stale_endpoint_fails() {
        let (mut b, main) = empty_main();
        let entry = b.function_entry(main);
        let result = b.add_edge(
            entry,
            NodeId::new(99),
            EdgeKind::blank("x"),
            "",
            FileLocation::dummy(),
        );
        assert!(matches!(result, Err(Error::GraphError(_))));
    }

    #[test]
    fn test_summary_slot_is_exclusive() {
        let (mut b, main) = empty_main();
        let entry = b.function_entry(main);
        let site = b.add_node(main, NodeKind::Plain);
        let ret = b.add_node(main, NodeKind::Plain);
        let call = CallStatement::direct("f", vec![]);

        b.add_edge(
            site,
            ret,
            EdgeKind::Summary { call: call.clone() },
            "f()",
            FileLocation::dummy(),
        )
        .unwrap();
        assert!(b.node(site).unwrap().leaving_summary().is_some());
        assert!(b.node(ret).unwrap().entering_summary().is_some());

        // A second summary edge at either endpoint is refused
        let other = b.add_node(main, NodeKind::Plain);
        let result = b.add_edge(
            site,
            other,
            EdgeKind::Summary { call: call.clone() },
            "f()",
            FileLocation::dummy(),
        );
        assert!(matches!(result, Err(Error::GraphError(_))));

        let result = b.add_edge(
            entry,
            ret,
            EdgeKind::Summary { call },
            "f()",
            FileLocation::dummy(),
        );
        assert!(matches!(result, Err(Error::GraphError(_))));
    }

    #[test]
    fn test_call_edge_must_share_call_site_with_summary() {
        let (mut b, main) = empty_main();
        let site = b.add_node(main, NodeKind::Plain);
        let ret = b.add_node(main, NodeKind::Plain);
        let callee_entry = b.add_node(main, NodeKind::Plain);
        let call = CallStatement::direct("f", vec![]);

        let s = b
            .add_edge(
                site,
                ret,
                EdgeKind::Summary { call: call.clone() },
                "f()",
                FileLocation::dummy(),
            )
            .unwrap();

        // Call edge from a different node than the summary's call site
        let result = b.add_edge(
            ret,
            callee_entry,
            EdgeKind::Call {
                call: call.clone(),
                summary: Some(s),
            },
            "f()",
            FileLocation::dummy(),
        );
        assert!(matches!(result, Err(Error::GraphError(_))));

        // Correct call site works
        b.add_edge(
            site,
            callee_entry,
            EdgeKind::Call {
                call,
                summary: Some(s),
            },
            "f()",
            FileLocation::dummy(),
        )
        .unwrap();
    }

    #[test]
    fn test_remove_summary_refused_while_referenced() {
        let (mut b, main) = empty_main();
        let site = b.add_node(main, NodeKind::Plain);
        let ret = b.add_node(main, NodeKind::Plain);
        let callee_entry = b.add_node(main, NodeKind::Plain);
        let call = CallStatement::direct("f", vec![]);

        let s = b
            .add_edge(
                site,
                ret,
                EdgeKind::Summary { call: call.clone() },
                "f()",
                FileLocation::dummy(),
            )
            .unwrap();
        let c = b
            .add_edge(
                site,
                callee_entry,
                EdgeKind::Call {
                    call,
                    summary: Some(s),
                },
                "f()",
                FileLocation::dummy(),
            )
            .unwrap();

        assert!(matches!(b.remove_edge(s), Err(Error::GraphError(_))));

        // After removing the call leg, the summary can go
        b.remove_edge(c).unwrap();
        b.remove_edge(s).unwrap();
        assert!(b.node(site).unwrap().leaving_summary().is_none());
        assert!(b.node(ret).unwrap().entering_summary().is_none());
    }

    #[test]
    fn test_remove_node_refused_with_edges() {
        let (mut b, main) = empty_main();
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        b.add_edge(entry, exit, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();

        assert!(matches!(b.remove_node(exit), Err(Error::GraphError(_))));
    }

    #[test]
    fn test_handles_stable_across_removal() {
        let (mut b, main) = empty_main();
        let a = b.add_node(main, NodeKind::Plain);
        let c = b.add_node(main, NodeKind::Plain);
        b.remove_node(a).unwrap();

        assert!(b.node(a).is_none());
        assert_eq!(b.node(c).unwrap().id(), c);
        assert_eq!(b.node_count(), 3); // entry, exit, c
    }

    #[test]
    fn test_set_entry_function_unknown_name() {
        let (mut b, _) = empty_main();
        let result = b.set_entry_function("not_there");
        assert!(matches!(result, Err(Error::UnresolvedEntry(name)) if name == "not_there"));
        assert!(b.entry_function().is_none());
    }

    #[test]
    fn test_seal_requires_entry_function() {
        let (b, _) = empty_main();
        assert!(matches!(b.seal(), Err(Error::UnresolvedEntry(_))));
    }

    #[test]
    fn test_remove_unreachable_prunes_orphans() {
        let (mut b, main) = empty_main();
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        b.add_edge(entry, exit, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();

        // Orphan island: o1 -> o2
        let o1 = b.add_node(main, NodeKind::Plain);
        let o2 = b.add_node(main, NodeKind::Plain);
        b.add_edge(o1, o2, EdgeKind::blank("island"), "", FileLocation::dummy())
            .unwrap();

        let removed = b.remove_unreachable(&[entry]);
        assert_eq!(removed, 2);
        assert!(b.node(o1).is_none());
        assert!(b.node(o2).is_none());
        assert!(b.node(entry).is_some());
        assert!(b.node(exit).is_some());
    }

    #[test]
    fn test_remove_unreachable_drops_empty_functions() {
        let (mut b, main) = empty_main();
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        b.add_edge(entry, exit, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();

        let dead = b.add_function(FunctionSignature::new("dead", vec![], CfaType::Void));
        assert!(b.function_by_name("dead").is_some());

        b.remove_unreachable(&[entry]);
        assert!(b.function_by_name("dead").is_none());
        assert!(b.signature(dead).is_none());
        assert!(b.function_by_name("main").is_some());
    }

    #[test]
    fn test_retarget_edge_predecessor() {
        let (mut b, main) = empty_main();
        let a = b.add_node(main, NodeKind::Plain);
        let c = b.add_node(main, NodeKind::Plain);
        let d = b.add_node(main, NodeKind::Plain);
        let e = b
            .add_edge(a, c, EdgeKind::blank("x"), "", FileLocation::dummy())
            .unwrap();

        b.retarget_edge_predecessor(e, d).unwrap();
        assert_eq!(b.edge(e).unwrap().predecessor(), d);
        assert!(b.node(a).unwrap().leaving().is_empty());
        assert_eq!(b.node(d).unwrap().leaving(), &[e]);
        assert_eq!(b.node(c).unwrap().entering(), &[e]);
    }

    #[test]
    fn test_retarget_edge_successor() {
        let (mut b, main) = empty_main();
        let a = b.add_node(main, NodeKind::Plain);
        let c = b.add_node(main, NodeKind::Plain);
        let d = b.add_node(main, NodeKind::Plain);
        let e = b
            .add_edge(a, c, EdgeKind::blank("x"), "", FileLocation::dummy())
            .unwrap();

        b.retarget_edge_successor(e, d).unwrap();
        assert_eq!(b.edge(e).unwrap().successor(), d);
        assert!(b.node(c).unwrap().entering().is_empty());
        assert_eq!(b.node(d).unwrap().entering(), &[e]);
    }
}
