//! The single-loop transformation.
//!
//! Rewrites an automaton into one with exactly one loop header, preserving
//! behavior. The idea is a program-counter encoding: the automaton is cut
//! into maximal acyclic *chunks*; every edge that would close a cycle or
//! leave its chunk instead flows into a per-value *gate* that assigns the
//! destination's program-counter value and jumps to the single artificial
//! loop header, which dispatches back into the chunks through a left-leaning
//! decision tree of `pc == value` / `pc != value` assume pairs.
//!
//! # Pass structure
//!
//! 1. Guard: an automaton whose loop overview already reports at most one
//!    loop header is returned as an identity rebuild (idempotence).
//! 2. Copy the input into a working builder and splice direct self-loops
//!    apart (original payload rides `u → m`, a marked blank edge closes
//!    `m → u`).
//! 3. Grow chunks with the configured [`ChunkStrategy`], copying each one
//!    into the output builder through the rebuild engine's cloning
//!    primitives and one shared identity map.
//! 4. Detach boundary edges into gates, assigning destination values per the
//!    configured [`PcAssignment`].
//! 5. Retarget summary edges that ended up on gates back to their
//!    materialized return sites, matching on the carried value.
//! 6. Collapse trivial detours (a chunk that is just one marked splice
//!    edge), forwarding their values.
//! 7. Wire gates to the header with `pc = value` assignments; build the
//!    decision tree, optionally omitting the final comparison. A single
//!    surviving value elides the header, the relocated entry, and the
//!    program-counter declaration entirely.
//! 8. Prune everything no longer reachable from the new entry and seal; the
//!    sealed result recomputes the now-trivial loop overview.
//!
//! The whole pass keeps its state in one [`TransformContext`] value that
//! never survives an invocation, and polls cancellation at every work-queue
//! iteration. No partial result is ever exposed.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use log::debug;

use crate::{
    cfa::{
        ast::{CfaType, Declaration, Expression, Statement},
        builder::CfaBuilder,
        edge::EdgeKind,
        function::FunctionId,
        location::FileLocation,
        node::NodeKind,
        store::CfaStore,
        Cfa,
    },
    rebuild::{
        self, clone_node, ensure_function, IdentitySubstitution, RebuildContext, RebuildMode,
    },
    utils::{
        graph::{EdgeId, NodeId},
        CancelToken,
    },
    Result,
};

/// How far a chunk grows before edges detach.
///
/// Fewer chunks mean fewer program-counter values but larger acyclic regions
/// to reason about per dispatch; more chunks mean the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStrategy {
    /// Grow until a cycle forces a stop; branches are followed on all paths.
    #[default]
    MultiplePaths,
    /// Follow single successors only; stop at the first branch.
    SinglePath,
    /// Absorb no successors at all; every leaving edge detaches.
    SingleEdge,
}

/// How program-counter values are assigned to detach destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcAssignment {
    /// Number destinations in discovery order, starting at zero.
    #[default]
    Incremental,
    /// Use the destination node's position (arena index) as its value.
    NodeNumber,
}

/// Configuration of one single-loop transformation.
#[derive(Debug, Clone)]
pub struct SingleLoopConfig {
    /// Chunk growth strategy.
    pub strategy: ChunkStrategy,
    /// Program-counter value assignment.
    pub pc_assignment: PcAssignment,
    /// Skip the last equality test of the decision tree; falling through all
    /// negative branches implies the final case.
    pub omit_final_comparison: bool,
    /// Name of the synthetic program-counter variable.
    pub pc_variable: String,
}

impl Default for SingleLoopConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            pc_assignment: PcAssignment::default(),
            omit_final_comparison: true,
            pc_variable: "__pc".to_string(),
        }
    }
}

/// Pass-wide mutable state; never survives between invocations.
struct TransformContext {
    ctx: RebuildContext,
    dst: CfaBuilder,
    /// Chunk starts still to process (source handles).
    queue: VecDeque<NodeId>,
    queued: HashSet<NodeId>,
    /// Source nodes already assigned to a chunk.
    visited: HashSet<NodeId>,
    /// Source node -> assigned program-counter value.
    values: HashMap<NodeId, i64>,
    next_value: i64,
    /// Value -> exit-gate node in the output.
    gates: BTreeMap<i64, NodeId>,
    /// Output gate node -> its value.
    gate_values: HashMap<NodeId, i64>,
    /// Value -> dispatch destination (source handle).
    gate_targets: BTreeMap<i64, NodeId>,
    /// Return edges whose summary edge lives in a later chunk.
    pending_returns: Vec<PendingReturn>,
    /// Splice edges introduced by self-loop elimination (source handles).
    splice_edges: HashSet<EdgeId>,
}

struct PendingReturn {
    source_edge: EdgeId,
    dst_predecessor: NodeId,
    dst_successor: NodeId,
}

/// One grown chunk: its nodes plus the classification of their edges.
struct Chunk {
    nodes: Vec<NodeId>,
    /// Edges staying inside the chunk (acyclic by construction).
    internal: HashSet<EdgeId>,
}

/// Rewrites an automaton into one with exactly one loop header.
///
/// An automaton already having at most one loop header (according to its
/// loop overview) is returned as an identity rebuild, which makes the
/// transformation idempotent modulo fresh synthetic identities.
///
/// # Errors
///
/// Returns [`Error::Inconsistency`](crate::Error::Inconsistency) when the
/// input violates the call-triple invariants, and
/// [`Error::Cancelled`](crate::Error::Cancelled) on cancellation; no partial
/// result is exposed in either case.
pub fn transform_to_single_loop(
    cfa: &Cfa,
    config: &SingleLoopConfig,
    token: &CancelToken,
) -> Result<Cfa> {
    if let Some(overview) = cfa.loops() {
        if overview.is_single_loop() {
            debug!("automaton already has at most one loop header; rebuilding unchanged");
            return rebuild::rebuild(
                cfa,
                &mut IdentitySubstitution,
                RebuildMode::Supergraph,
                token,
            );
        }
    }

    // Working copy the pass may cut apart
    let (mut src, _) = rebuild::rebuild_to_builder(
        cfa,
        &mut IdentitySubstitution,
        RebuildMode::Supergraph,
        token,
    )?;

    let splice_edges = splice_self_loops(&mut src, token)?;

    let mut t = TransformContext {
        ctx: RebuildContext::new(),
        dst: CfaBuilder::new(src.machine()),
        queue: VecDeque::new(),
        queued: HashSet::new(),
        visited: HashSet::new(),
        values: HashMap::new(),
        next_value: 0,
        gates: BTreeMap::new(),
        gate_values: HashMap::new(),
        gate_targets: BTreeMap::new(),
        pending_returns: Vec::new(),
        splice_edges,
    };
    t.dst.set_globals(src.globals().to_vec());
    t.dst.set_files(src.files().to_vec());

    let main = src
        .entry_function()
        .ok_or_else(|| inconsistency!("automaton has no designated entry function"))?;
    let main_entry = src.function_entry(main);
    let initial_value = t.value_for(main_entry, config);
    t.gate_targets.insert(initial_value, main_entry);
    t.enqueue(main_entry);

    while let Some(start) = t.queue.pop_front() {
        token.checkpoint()?;
        if t.visited.contains(&start) {
            continue;
        }
        let chunk = grow_chunk(&src, start, config.strategy, &mut t.visited);
        copy_chunk(&mut t, &src, &chunk, config)?;
    }

    resolve_pending_returns(&mut t, &src)?;
    fixup_gate_summaries(&mut t)?;
    collapse_trivial_detours(&mut t, token)?;
    wire_dispatch(&mut t, &src, main, main_entry, initial_value, config)?;

    let entry_function_name = src
        .signature(main)
        .map(|s| s.name.clone())
        .ok_or_else(|| inconsistency!("entry function {main} has no signature"))?;
    t.dst.set_entry_function(&entry_function_name)?;

    let new_entry = t.dst.function_entry(
        t.dst
            .entry_function()
            .ok_or_else(|| inconsistency!("entry function lost during transformation"))?,
    );
    let pruned = t.dst.remove_unreachable(&[new_entry]);
    if pruned > 0 {
        debug!("single-loop transformation pruned {pruned} orphaned nodes");
    }

    t.dst.seal()
}

impl TransformContext {
    fn enqueue(&mut self, node: NodeId) {
        if !self.visited.contains(&node) && self.queued.insert(node) {
            self.queue.push_back(node);
        }
    }

    fn value_for(&mut self, node: NodeId, config: &SingleLoopConfig) -> i64 {
        if let Some(&value) = self.values.get(&node) {
            return value;
        }
        let value = match config.pc_assignment {
            PcAssignment::Incremental => {
                let v = self.next_value;
                self.next_value += 1;
                v
            }
            PcAssignment::NodeNumber => node.index() as i64,
        };
        self.values.insert(node, value);
        value
    }

    /// Returns the exit gate of a value, creating it in the destination's
    /// function on first use.
    fn gate_for<S: CfaStore>(
        &mut self,
        src: &S,
        value: i64,
        target: NodeId,
    ) -> Result<NodeId> {
        if let Some(&gate) = self.gates.get(&value) {
            return Ok(gate);
        }
        let function = src
            .node(target)
            .ok_or_else(|| inconsistency!("gate target {target} does not exist"))?
            .function();
        let dst_function = ensure_function(&mut self.ctx, src, &mut self.dst, function)?;
        let gate = self.dst.add_node(dst_function, NodeKind::Plain);
        self.gates.insert(value, gate);
        self.gate_values.insert(gate, value);
        Ok(gate)
    }
}

/// Eliminates direct self-loops by splicing an intermediate node: the
/// original payload rides `u → m`, a marked blank edge closes `m → u`.
fn splice_self_loops(src: &mut CfaBuilder, token: &CancelToken) -> Result<HashSet<EdgeId>> {
    let mut splices = HashSet::new();
    let self_loops: Vec<EdgeId> = src
        .edge_ids()
        .filter(|&e| {
            src.edge(e)
                .is_some_and(|edge| edge.predecessor() == edge.successor())
        })
        .collect();

    for edge_id in self_loops {
        token.checkpoint()?;
        let edge = src
            .edge(edge_id)
            .ok_or_else(|| inconsistency!("self-loop edge {edge_id} vanished"))?;
        if edge.kind().is_summary() {
            return Err(inconsistency!(
                "summary edge {} loops on a single node",
                edge.describe()
            ));
        }
        let (node, kind, raw, location) = (
            edge.predecessor(),
            edge.kind().clone(),
            edge.raw().to_string(),
            edge.location().clone(),
        );
        let function = src
            .node(node)
            .ok_or_else(|| inconsistency!("node {node} vanished"))?
            .function();

        let middle = src.add_node(function, NodeKind::Plain);
        src.remove_edge(edge_id)?;
        src.add_edge(node, middle, kind, raw, location)?;
        let splice = src.add_edge(
            middle,
            node,
            EdgeKind::blank("self-loop splice"),
            "",
            FileLocation::dummy(),
        )?;
        splices.insert(splice);
    }
    if !splices.is_empty() {
        debug!("spliced {} direct self-loops", splices.len());
    }
    Ok(splices)
}

/// Grows a maximal acyclic chunk from `start` and marks its nodes visited.
///
/// Node collection follows the strategy; edge classification afterwards
/// walks the collected nodes in order and keeps an edge internal only if it
/// cannot close a cycle over the internal edges accepted so far.
fn grow_chunk(
    src: &CfaBuilder,
    start: NodeId,
    strategy: ChunkStrategy,
    visited: &mut HashSet<NodeId>,
) -> Chunk {
    let mut nodes: Vec<NodeId> = vec![start];
    let mut members: HashSet<NodeId> = HashSet::new();
    members.insert(start);

    match strategy {
        ChunkStrategy::SingleEdge => {}
        ChunkStrategy::SinglePath => {
            let mut current = start;
            loop {
                let Some(node) = src.node(current) else { break };
                let summary = node.leaving_summary();
                let leaving: Vec<EdgeId> =
                    node.leaving().iter().copied().chain(summary).collect();
                if leaving.len() != 1 {
                    break;
                }
                let Some(edge) = src.edge(leaving[0]) else { break };
                let next = edge.successor();
                if members.contains(&next) || visited.contains(&next) {
                    break;
                }
                members.insert(next);
                nodes.push(next);
                current = next;
            }
        }
        ChunkStrategy::MultiplePaths => {
            let mut frontier = VecDeque::new();
            frontier.push_back(start);
            while let Some(node_id) = frontier.pop_front() {
                let Some(node) = src.node(node_id) else { continue };
                let summary = node.leaving_summary();
                for edge_id in node.leaving().iter().copied().chain(summary) {
                    let Some(edge) = src.edge(edge_id) else { continue };
                    let next = edge.successor();
                    if members.contains(&next) || visited.contains(&next) {
                        continue;
                    }
                    members.insert(next);
                    nodes.push(next);
                    frontier.push_back(next);
                }
            }
        }
    }

    for &node in &nodes {
        visited.insert(node);
    }

    // Classification: accept edges that keep the chunk acyclic
    let mut internal: HashSet<EdgeId> = HashSet::new();
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &node_id in &nodes {
        let Some(node) = src.node(node_id) else { continue };
        let summary = node.leaving_summary();
        for edge_id in node.leaving().iter().copied().chain(summary) {
            let Some(edge) = src.edge(edge_id) else { continue };
            let next = edge.successor();
            if !members.contains(&next) {
                continue;
            }
            if reaches(&adjacency, next, node_id) {
                continue; // would close a cycle: detach
            }
            internal.insert(edge_id);
            adjacency.entry(node_id).or_default().push(next);
        }
    }

    Chunk { nodes, internal }
}

/// Reachability over the internal adjacency accepted so far.
fn reaches(adjacency: &HashMap<NodeId, Vec<NodeId>>, from: NodeId, to: NodeId) -> bool {
    if from == to {
        return true;
    }
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![from];
    seen.insert(from);
    while let Some(node) = stack.pop() {
        for &next in adjacency.get(&node).into_iter().flatten() {
            if next == to {
                return true;
            }
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }
    false
}

/// Copies one chunk into the output, detaching boundary edges into gates.
fn copy_chunk(
    t: &mut TransformContext,
    src: &CfaBuilder,
    chunk: &Chunk,
    config: &SingleLoopConfig,
) -> Result<()> {
    for &node_id in &chunk.nodes {
        clone_node(&mut t.ctx, src, &mut t.dst, node_id, &mut IdentitySubstitution)?;
    }

    for &node_id in &chunk.nodes {
        let Some(node) = src.node(node_id) else { continue };
        let summary = node.leaving_summary();
        // The summary edge first: call edges of this node link to it
        let edge_order: Vec<EdgeId> = summary
            .into_iter()
            .chain(node.leaving().iter().copied())
            .collect();
        for edge_id in edge_order {
            if chunk.internal.contains(&edge_id) {
                copy_internal_edge(t, src, edge_id)?;
            } else {
                detach_edge(t, src, edge_id, config)?;
            }
        }
    }
    Ok(())
}

fn copy_internal_edge(t: &mut TransformContext, src: &CfaBuilder, edge_id: EdgeId) -> Result<()> {
    let edge = src
        .edge(edge_id)
        .ok_or_else(|| inconsistency!("edge {edge_id} vanished"))?;
    let predecessor = t.ctx.mapped_node(edge.predecessor()).ok_or_else(|| {
        inconsistency!("chunk edge {} has an uncloned predecessor", edge.describe())
    })?;
    let successor = clone_node(
        &mut t.ctx,
        src,
        &mut t.dst,
        edge.successor(),
        &mut IdentitySubstitution,
    )?;
    add_mapped_edge(t, src, edge_id, predecessor, successor)
}

/// Detaches a boundary edge: its payload stays on the predecessor's side,
/// flowing into the gate of the destination's value.
fn detach_edge(
    t: &mut TransformContext,
    src: &CfaBuilder,
    edge_id: EdgeId,
    config: &SingleLoopConfig,
) -> Result<()> {
    let edge = src
        .edge(edge_id)
        .ok_or_else(|| inconsistency!("edge {edge_id} vanished"))?;
    let destination = edge.successor();
    let value = t.value_for(destination, config);
    t.gate_targets.insert(value, destination);
    t.enqueue(destination);

    let predecessor = t.ctx.mapped_node(edge.predecessor()).ok_or_else(|| {
        inconsistency!("boundary edge {} has an uncloned predecessor", edge.describe())
    })?;
    let gate = t.gate_for(src, value, destination)?;
    add_mapped_edge(t, src, edge_id, predecessor, gate)
}

/// Adds the clone of `edge_id` between the given output endpoints, remapping
/// summary links and deferring return edges whose summary is not cloned yet.
fn add_mapped_edge(
    t: &mut TransformContext,
    src: &CfaBuilder,
    edge_id: EdgeId,
    predecessor: NodeId,
    successor: NodeId,
) -> Result<()> {
    let edge = src
        .edge(edge_id)
        .ok_or_else(|| inconsistency!("edge {edge_id} vanished"))?;
    let raw = edge.raw().to_string();
    let location = edge.location().clone();

    let kind = match edge.kind().clone() {
        EdgeKind::Call { call, summary } => {
            let summary = match summary {
                Some(s) => Some(t.ctx.mapped_edge(s).ok_or_else(|| {
                    inconsistency!(
                        "call edge {} has no matching summary edge in the output",
                        edge.describe()
                    )
                })?),
                None => None,
            };
            EdgeKind::Call { call, summary }
        }
        EdgeKind::Return { summary } => match t.ctx.mapped_edge(summary) {
            Some(mapped) => EdgeKind::Return { summary: mapped },
            None => {
                t.pending_returns.push(PendingReturn {
                    source_edge: edge_id,
                    dst_predecessor: predecessor,
                    dst_successor: successor,
                });
                return Ok(());
            }
        },
        other => other,
    };

    let mapped = t.dst.add_edge(predecessor, successor, kind, raw, location)?;
    t.ctx.edge_map.insert(edge_id, mapped);
    Ok(())
}

/// Adds the return edges that had to wait for their summary edge's chunk.
fn resolve_pending_returns(t: &mut TransformContext, src: &CfaBuilder) -> Result<()> {
    let pending = std::mem::take(&mut t.pending_returns);
    for p in pending {
        let edge = src
            .edge(p.source_edge)
            .ok_or_else(|| inconsistency!("return edge {} vanished", p.source_edge))?;
        let EdgeKind::Return { summary } = edge.kind() else {
            return Err(inconsistency!(
                "pending edge {} is not a return edge",
                edge.describe()
            ));
        };
        let summary = t.ctx.mapped_edge(*summary).ok_or_else(|| {
            inconsistency!(
                "return edge {} has no matching summary edge in the output",
                edge.describe()
            )
        })?;
        let mapped = t.dst.add_edge(
            p.dst_predecessor,
            p.dst_successor,
            EdgeKind::Return { summary },
            edge.raw().to_string(),
            edge.location().clone(),
        )?;
        t.ctx.edge_map.insert(p.source_edge, mapped);
    }
    Ok(())
}

/// Retargets summary edges whose successor was relocated into a gate back to
/// the value's materialized dispatch destination.
fn fixup_gate_summaries(t: &mut TransformContext) -> Result<()> {
    let summaries: Vec<(EdgeId, i64)> = t
        .dst
        .edge_ids()
        .filter_map(|e| {
            let edge = t.dst.edge(e)?;
            if !edge.kind().is_summary() {
                return None;
            }
            let value = *t.gate_values.get(&edge.successor())?;
            Some((e, value))
        })
        .collect();

    for (edge_id, value) in summaries {
        let target = t
            .gate_targets
            .get(&value)
            .copied()
            .ok_or_else(|| inconsistency!("gate value {value} has no dispatch destination"))?;
        let dst_target = t.ctx.mapped_node(target).ok_or_else(|| {
            inconsistency!("dispatch destination of value {value} was never materialized")
        })?;
        t.dst.retarget_edge_successor(edge_id, dst_target)?;
    }
    Ok(())
}

/// Collapses chunks consisting solely of one marked splice edge: their value
/// forwards to the value the splice flowed into.
fn collapse_trivial_detours(t: &mut TransformContext, token: &CancelToken) -> Result<()> {
    let mut forwards: HashMap<i64, i64> = HashMap::new();

    for (&value, &target) in &t.gate_targets {
        let Some(dst_target) = t.ctx.mapped_node(target) else {
            continue;
        };
        let Some(node) = t.dst.node(dst_target) else {
            continue;
        };
        if node.kind().is_function_entry() {
            continue;
        }
        if node.num_leaving() != 1 || node.leaving_summary().is_some() {
            continue;
        }
        let edge_id = node.leaving()[0];
        let Some(edge) = t.dst.edge(edge_id) else { continue };
        // The chunk must be exactly the splice edge into another gate
        let is_splice = t
            .splice_edges
            .iter()
            .any(|&src_edge| t.ctx.mapped_edge(src_edge) == Some(edge_id));
        if !is_splice {
            continue;
        }
        let Some(&forwarded) = t.gate_values.get(&edge.successor()) else {
            continue;
        };
        forwards.insert(value, forwarded);
    }

    if forwards.is_empty() {
        return Ok(());
    }

    // Resolve forwarding chains
    let resolve = |mut value: i64| {
        let mut hops = 0;
        while let Some(&next) = forwards.get(&value) {
            value = next;
            hops += 1;
            if hops > forwards.len() {
                break;
            }
        }
        value
    };

    let values: Vec<i64> = t.gate_targets.keys().copied().collect();
    for value in values {
        token.checkpoint()?;
        if !forwards.contains_key(&value) {
            continue;
        }
        let final_value = resolve(value);
        let Some(&dead_gate) = t.gates.get(&value) else {
            continue;
        };
        let Some(&surviving_gate) = t.gates.get(&final_value) else {
            continue;
        };

        // Move every edge entering the dead gate over to the surviving gate
        let entering: Vec<EdgeId> = t
            .dst
            .node(dead_gate)
            .map(|n| n.entering().to_vec())
            .unwrap_or_default();
        for edge_id in entering {
            t.dst.retarget_edge_successor(edge_id, surviving_gate)?;
        }
        if t
            .dst
            .node(dead_gate)
            .is_some_and(|n| n.entering_summary().is_some())
        {
            // A summary edge still enters this gate; leave the detour alone
            continue;
        }
        remove_detour_chunk(t, value)?;
        t.gate_values.remove(&dead_gate);
        t.gates.remove(&value);
        t.dst.remove_node(dead_gate)?;
        debug!("collapsed trivial detour: value {value} forwards to {final_value}");
    }

    Ok(())
}

/// Removes a collapsed detour's splice edge and node and drops its value.
fn remove_detour_chunk(t: &mut TransformContext, value: i64) -> Result<()> {
    if let Some(target) = t.gate_targets.remove(&value) {
        if let Some(dst_target) = t.ctx.mapped_node(target) {
            let leaving: Vec<EdgeId> = t
                .dst
                .node(dst_target)
                .map(|n| n.leaving().to_vec())
                .unwrap_or_default();
            for edge_id in leaving {
                t.dst.remove_edge(edge_id)?;
            }
            t.dst.remove_node(dst_target)?;
        }
    }
    Ok(())
}

/// Builds the loop header, the relocated entry, the decision tree, and the
/// gate wiring; a single surviving value elides all of it.
fn wire_dispatch(
    t: &mut TransformContext,
    src: &CfaBuilder,
    main: FunctionId,
    main_entry: NodeId,
    initial_value: i64,
    config: &SingleLoopConfig,
) -> Result<()> {
    let values: Vec<i64> = t.gate_targets.keys().copied().collect();

    if values.len() <= 1 {
        // Degenerate: no header, no program counter. Any gates jump straight
        // back to their destination.
        let gates: Vec<(i64, NodeId)> = t.gates.iter().map(|(&v, &g)| (v, g)).collect();
        for (value, gate) in gates {
            let target = t
                .gate_targets
                .get(&value)
                .copied()
                .ok_or_else(|| inconsistency!("gate value {value} has no dispatch destination"))?;
            let dst_target = t.ctx.mapped_node(target).ok_or_else(|| {
                inconsistency!("dispatch destination of value {value} was never materialized")
            })?;
            t.dst.add_edge(
                gate,
                dst_target,
                EdgeKind::blank("loop return"),
                "",
                FileLocation::dummy(),
            )?;
        }
        debug!("single surviving value: header and decision tree elided");
        return Ok(());
    }

    let dst_main = ensure_function(&mut t.ctx, src, &mut t.dst, main)?;
    let dst_entry = t
        .ctx
        .mapped_node(main_entry)
        .ok_or_else(|| inconsistency!("entry node was never cloned"))?;

    // Demote the original entry; the relocated entry takes over its role
    let old_kind = t
        .dst
        .node(dst_entry)
        .map(|n| n.kind().clone())
        .ok_or_else(|| inconsistency!("cloned entry node vanished"))?;
    let NodeKind::FunctionEntry {
        exit,
        return_variable,
    } = old_kind
    else {
        return Err(inconsistency!("cloned entry node is not a function entry"));
    };
    t.dst.set_node_kind(dst_entry, NodeKind::Plain)?;

    let new_entry = t.dst.add_node(
        dst_main,
        NodeKind::FunctionEntry {
            exit,
            return_variable,
        },
    );
    t.dst.set_function_entry(dst_main, new_entry)?;

    let header = t.dst.add_node(dst_main, NodeKind::Plain);
    let pc = Declaration {
        name: config.pc_variable.clone(),
        ty: CfaType::int(),
        initializer: Some(Expression::int(i128::from(initial_value))),
        global: false,
    };
    t.dst.add_edge(
        new_entry,
        header,
        EdgeKind::Declaration { declaration: pc },
        format!("int {} = {initial_value};", config.pc_variable),
        FileLocation::dummy(),
    )?;

    // Exit gates assign their value and jump to the header
    let gates: Vec<(i64, NodeId)> = t.gates.iter().map(|(&v, &g)| (v, g)).collect();
    for (value, gate) in gates {
        t.dst.add_edge(
            gate,
            header,
            EdgeKind::Statement {
                statement: Statement::Assign {
                    lhs: Expression::var(config.pc_variable.clone()),
                    rhs: Expression::int(i128::from(value)),
                },
            },
            format!("{} = {value};", config.pc_variable),
            FileLocation::dummy(),
        )?;
    }

    // Left-leaning decision tree over the sorted values
    let mut current = header;
    let test_count = if config.omit_final_comparison {
        values.len() - 1
    } else {
        values.len()
    };
    for (i, &value) in values.iter().enumerate().take(test_count) {
        let target = dispatch_target(t, value)?;
        let comparison = Expression::eq(
            Expression::var(config.pc_variable.clone()),
            Expression::int(i128::from(value)),
        );
        let false_successor = if i + 1 < test_count {
            t.dst.add_node(dst_main, NodeKind::Plain)
        } else if config.omit_final_comparison {
            dispatch_target(t, values[values.len() - 1])?
        } else {
            t.dst.add_node(dst_main, NodeKind::Termination)
        };
        t.dst.add_edge(
            current,
            target,
            EdgeKind::Assume {
                expression: comparison.clone(),
                truth: true,
            },
            format!("{} == {value}", config.pc_variable),
            FileLocation::dummy(),
        )?;
        t.dst.add_edge(
            current,
            false_successor,
            EdgeKind::Assume {
                expression: comparison,
                truth: false,
            },
            format!("{} != {value}", config.pc_variable),
            FileLocation::dummy(),
        )?;
        current = false_successor;
    }

    debug!(
        "wired loop header over {} program-counter values ({} decision nodes)",
        values.len(),
        test_count
    );
    Ok(())
}

fn dispatch_target(t: &TransformContext, value: i64) -> Result<NodeId> {
    let target = t
        .gate_targets
        .get(&value)
        .copied()
        .ok_or_else(|| inconsistency!("value {value} has no dispatch destination"))?;
    t.ctx
        .mapped_node(target)
        .ok_or_else(|| inconsistency!("dispatch destination of value {value} was never materialized"))
}
