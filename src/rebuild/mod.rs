//! Substitution-based automaton rebuilding.
//!
//! The rebuild engine produces a new automaton isomorphic to an existing one,
//! passing every payload through a caller-supplied [`Substitution`]. It is
//! the crate's only way to "mutate" a sealed automaton: copy it into a fresh
//! builder, changing what needs changing on the way.
//!
//! # Mechanics
//!
//! A work-list starts from the node with no unexplored entering edges (the
//! entry node of the designated entry function, the candidate "main") and
//! the entries of the remaining functions for coverage. Every node and edge
//! is cloned at most once through the identity-keyed memoizing maps of a
//! [`RebuildContext`]; edge endpoints are materialized on demand, so cloning
//! an edge whose far endpoint has not been visited yet just works.
//!
//! # Build modes
//!
//! - [`RebuildMode::Supergraph`] re-synthesizes real call/return/summary
//!   edges: the engine locates the matching summary edge in the call site's
//!   summary slot and links the cloned triple to its clone. A missing
//!   required match is a fatal internal-invariant violation.
//! - [`RebuildMode::IndependentFunctions`] lowers each summary edge back to
//!   the plain call statement edge it summarizes and replaces call, return,
//!   and call-summary-statement edges with inert blank placeholders, which
//!   are stripped after the work-list drains, leaving separate per-function
//!   automata.
//!
//! # Guarantee
//!
//! Output passes the consistency checker whenever the input did and the
//! substitution preserves payload kinds (for
//! [`RebuildMode::IndependentFunctions`], per function via
//! [`check_from`](crate::check::check_from)).

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use crate::{
    cfa::{
        builder::CfaBuilder,
        edge::{CfaEdge, EdgeKind},
        function::FunctionId,
        node::{CfaNode, NodeKind},
        store::CfaStore,
        Cfa, Statement,
    },
    utils::{
        graph::{EdgeId, NodeId},
        CancelToken,
    },
    Result,
};

/// How interprocedural edges are treated during a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// Re-synthesize real call/return/summary triples.
    Supergraph,
    /// Undo the supergraph connection, restoring independent per-function
    /// automata.
    IndependentFunctions,
}

/// Caller-supplied payload substitution.
///
/// Each hook receives the original element and its (structurally remapped)
/// payload and returns the payload to store in the clone. The default
/// implementations are the identity, so a substitution only overrides what
/// it cares about. Hooks are invoked once per distinct payload instance
/// encountered.
pub trait Substitution {
    /// Maps a node's kind payload.
    fn map_node_kind(&mut self, _node: &CfaNode, kind: NodeKind) -> NodeKind {
        kind
    }

    /// Maps an edge's kind payload.
    fn map_edge_kind(&mut self, _edge: &CfaEdge, kind: EdgeKind) -> EdgeKind {
        kind
    }
}

/// The identity substitution: payloads are copied unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySubstitution;

impl Substitution for IdentitySubstitution {}

/// Identity-keyed old→new maps of one rebuild pass.
///
/// The context is shared with the single-loop transformer, which drives the
/// same cloning primitives chunk by chunk.
#[derive(Debug, Default)]
pub struct RebuildContext {
    pub(crate) node_map: HashMap<NodeId, NodeId>,
    pub(crate) edge_map: HashMap<EdgeId, EdgeId>,
    pub(crate) function_map: HashMap<FunctionId, FunctionId>,
    pub(crate) placeholder_edges: Vec<EdgeId>,
}

impl RebuildContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the clone of a source node, if it was cloned.
    #[must_use]
    pub fn mapped_node(&self, node: NodeId) -> Option<NodeId> {
        self.node_map.get(&node).copied()
    }

    /// Returns the clone of a source edge, if it was cloned.
    #[must_use]
    pub fn mapped_edge(&self, edge: EdgeId) -> Option<EdgeId> {
        self.edge_map.get(&edge).copied()
    }

    /// Returns the clone of a source function, if it was cloned.
    #[must_use]
    pub fn mapped_function(&self, function: FunctionId) -> Option<FunctionId> {
        self.function_map.get(&function).copied()
    }
}

/// Rebuilds an automaton into a sealed clone.
///
/// # Errors
///
/// Propagates [`Error::Inconsistency`](crate::Error::Inconsistency) for
/// broken triples in the source, [`Error::Cancelled`](crate::Error::Cancelled)
/// on cancellation, and seal-time errors.
pub fn rebuild<S, Sub>(
    source: &S,
    substitution: &mut Sub,
    mode: RebuildMode,
    token: &CancelToken,
) -> Result<Cfa>
where
    S: CfaStore,
    Sub: Substitution + ?Sized,
{
    let (builder, _) = rebuild_to_builder(source, substitution, mode, token)?;
    builder.seal()
}

/// Rebuilds an automaton into a fresh builder, returning the identity maps.
///
/// This is the variant structural transformations build on when they need to
/// keep editing the clone before sealing.
///
/// # Errors
///
/// Same conditions as [`rebuild`].
pub fn rebuild_to_builder<S, Sub>(
    source: &S,
    substitution: &mut Sub,
    mode: RebuildMode,
    token: &CancelToken,
) -> Result<(CfaBuilder, RebuildContext)>
where
    S: CfaStore,
    Sub: Substitution + ?Sized,
{
    let mut dst = CfaBuilder::new(source.machine());
    dst.set_globals(source.globals().to_vec());
    dst.set_files(source.files().to_vec());

    let mut ctx = RebuildContext::new();

    // Candidate main first, remaining function entries for coverage
    let mut seeds: Vec<NodeId> = Vec::new();
    if let Some(main) = source.entry_function() {
        if let Some(entry) = source.function_entry(main) {
            seeds.push(entry);
        }
    }
    for function in source.function_ids() {
        if let Some(entry) = source.function_entry(function) {
            if !seeds.contains(&entry) {
                seeds.push(entry);
            }
        }
    }

    let mut queue: VecDeque<NodeId> = VecDeque::new();
    let mut queued: HashSet<NodeId> = HashSet::new();
    for seed in seeds {
        if queued.insert(seed) {
            queue.push_back(seed);
        }
    }

    while let Some(node_id) = queue.pop_front() {
        token.checkpoint()?;
        let Some(node) = source.node(node_id) else {
            continue;
        };
        clone_node(&mut ctx, source, &mut dst, node_id, substitution)?;

        let summary = node.leaving_summary();
        let leaving: Vec<EdgeId> = node.leaving().iter().copied().chain(summary).collect();
        for edge_id in leaving {
            clone_edge(&mut ctx, source, &mut dst, edge_id, substitution, mode)?;
            if let Some(edge) = source.edge(edge_id) {
                let next = edge.successor();
                if source.node(next).is_some() && queued.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    // Placeholders kept the work-list simple; independent functions do not
    // carry interprocedural edges
    let placeholders = std::mem::take(&mut ctx.placeholder_edges);
    for edge in &placeholders {
        dst.remove_edge(*edge)?;
    }
    if !placeholders.is_empty() {
        debug!("stripped {} interprocedural placeholders", placeholders.len());
    }

    if let Some(main) = source.entry_function() {
        if let Some(signature) = source.function_signature(main) {
            let name = signature.name.clone();
            dst.set_entry_function(&name)?;
        }
    }

    debug!(
        "rebuild cloned {} nodes and {} edges",
        ctx.node_map.len(),
        ctx.edge_map.len()
    );
    Ok((dst, ctx))
}

/// Ensures the clone of a function record exists, without cloning any nodes.
pub(crate) fn ensure_function<S: CfaStore>(
    ctx: &mut RebuildContext,
    source: &S,
    dst: &mut CfaBuilder,
    function: FunctionId,
) -> Result<FunctionId> {
    if let Some(mapped) = ctx.function_map.get(&function) {
        return Ok(*mapped);
    }
    let signature = source
        .function_signature(function)
        .ok_or_else(|| inconsistency!("node references unknown function {function}"))?
        .clone();
    let mapped = dst.register_function_shell(signature);
    ctx.function_map.insert(function, mapped);
    Ok(mapped)
}

/// Clones a node (memoized), registering function entry/exit fixups.
///
/// The clone's kind passes through the substitution after its embedded
/// handles (the entry's exit back-reference) have been remapped.
pub(crate) fn clone_node<S, Sub>(
    ctx: &mut RebuildContext,
    source: &S,
    dst: &mut CfaBuilder,
    node_id: NodeId,
    substitution: &mut Sub,
) -> Result<NodeId>
where
    S: CfaStore,
    Sub: Substitution + ?Sized,
{
    if let Some(mapped) = ctx.node_map.get(&node_id) {
        return Ok(*mapped);
    }
    let node = source
        .node(node_id)
        .ok_or_else(|| inconsistency!("node {node_id} does not exist in the source"))?;
    let function = node.function();
    let dst_function = ensure_function(ctx, source, dst, function)?;

    let kind = match node.kind().clone() {
        NodeKind::FunctionEntry {
            exit,
            return_variable,
        } => {
            let exit = match exit {
                Some(exit_id) => Some(clone_node(ctx, source, dst, exit_id, substitution)?),
                None => None,
            };
            NodeKind::FunctionEntry {
                exit,
                return_variable,
            }
        }
        other => other,
    };
    let kind = substitution.map_node_kind(node, kind);

    let mapped = dst.add_node(dst_function, kind);
    ctx.node_map.insert(node_id, mapped);

    if source.function_entry(function) == Some(node_id) {
        dst.set_function_entry(dst_function, mapped)?;
    }
    if source.function_exit(function) == Some(node_id) {
        dst.set_function_exit_record(dst_function, Some(mapped));
    }
    Ok(mapped)
}

/// Clones an edge (memoized), materializing its endpoints on demand.
///
/// Interprocedural kinds follow the build mode; all other payloads pass
/// through the substitution.
pub(crate) fn clone_edge<S, Sub>(
    ctx: &mut RebuildContext,
    source: &S,
    dst: &mut CfaBuilder,
    edge_id: EdgeId,
    substitution: &mut Sub,
    mode: RebuildMode,
) -> Result<EdgeId>
where
    S: CfaStore,
    Sub: Substitution + ?Sized,
{
    if let Some(mapped) = ctx.edge_map.get(&edge_id) {
        return Ok(*mapped);
    }
    let edge = source
        .edge(edge_id)
        .ok_or_else(|| inconsistency!("edge {edge_id} does not exist in the source"))?;
    let predecessor = clone_node(ctx, source, dst, edge.predecessor(), substitution)?;
    let successor = clone_node(ctx, source, dst, edge.successor(), substitution)?;

    let mapped = match edge.kind().clone() {
        EdgeKind::Summary { call } => match mode {
            RebuildMode::Supergraph => {
                let kind = substitution.map_edge_kind(edge, EdgeKind::Summary { call });
                dst.add_edge(predecessor, successor, kind, edge.raw(), edge.location().clone())?
            }
            RebuildMode::IndependentFunctions => {
                // Lowered back to the call site the assembler once split
                let kind = substitution.map_edge_kind(
                    edge,
                    EdgeKind::Statement {
                        statement: Statement::Call(call),
                    },
                );
                dst.add_edge(predecessor, successor, kind, edge.raw(), edge.location().clone())?
            }
        },
        EdgeKind::Call { call, summary } => match mode {
            RebuildMode::Supergraph => {
                let summary = match summary {
                    Some(summary_id) => {
                        Some(locate_summary(ctx, source, dst, edge, summary_id, substitution)?)
                    }
                    None => None,
                };
                let kind = substitution.map_edge_kind(edge, EdgeKind::Call { call, summary });
                dst.add_edge(predecessor, successor, kind, edge.raw(), edge.location().clone())?
            }
            RebuildMode::IndependentFunctions => {
                placeholder(ctx, dst, predecessor, successor, edge)?
            }
        },
        EdgeKind::Return { summary } => match mode {
            RebuildMode::Supergraph => {
                let summary = locate_summary(ctx, source, dst, edge, summary, substitution)?;
                let kind = substitution.map_edge_kind(edge, EdgeKind::Return { summary });
                dst.add_edge(predecessor, successor, kind, edge.raw(), edge.location().clone())?
            }
            RebuildMode::IndependentFunctions => {
                placeholder(ctx, dst, predecessor, successor, edge)?
            }
        },
        EdgeKind::CallSummaryStatement { call, callee } => match mode {
            RebuildMode::Supergraph => {
                let kind = substitution
                    .map_edge_kind(edge, EdgeKind::CallSummaryStatement { call, callee });
                dst.add_edge(predecessor, successor, kind, edge.raw(), edge.location().clone())?
            }
            RebuildMode::IndependentFunctions => {
                placeholder(ctx, dst, predecessor, successor, edge)?
            }
        },
        ordinary => {
            let kind = substitution.map_edge_kind(edge, ordinary);
            dst.add_edge(predecessor, successor, kind, edge.raw(), edge.location().clone())?
        }
    };

    ctx.edge_map.insert(edge_id, mapped);
    Ok(mapped)
}

/// Locates the matching summary edge of a call or return edge and ensures
/// its clone exists.
///
/// For a call edge the summary must sit in the call site's leaving summary
/// slot; a missing match is a fatal internal-invariant violation, not a
/// recoverable condition.
fn locate_summary<S, Sub>(
    ctx: &mut RebuildContext,
    source: &S,
    dst: &mut CfaBuilder,
    edge: &CfaEdge,
    summary_id: EdgeId,
    substitution: &mut Sub,
) -> Result<EdgeId>
where
    S: CfaStore,
    Sub: Substitution + ?Sized,
{
    let summary = source
        .edge(summary_id)
        .ok_or_else(|| {
            inconsistency!(
                "edge {} requires summary edge {summary_id}, which does not exist",
                edge.describe()
            )
        })?;
    if !summary.kind().is_summary() {
        return Err(inconsistency!(
            "edge {} references {} as its summary edge",
            edge.describe(),
            summary.describe()
        ));
    }
    if matches!(edge.kind(), EdgeKind::Call { .. }) {
        let slot = source
            .node(edge.predecessor())
            .and_then(CfaNode::leaving_summary);
        if slot != Some(summary_id) {
            return Err(inconsistency!(
                "call edge {} has no matching summary edge in its call site's slot",
                edge.describe()
            ));
        }
    }
    clone_edge(
        ctx,
        source,
        dst,
        summary_id,
        substitution,
        RebuildMode::Supergraph,
    )
}

/// Adds an inert placeholder for an interprocedural edge; stripped after the
/// work-list drains.
fn placeholder(
    ctx: &mut RebuildContext,
    dst: &mut CfaBuilder,
    predecessor: NodeId,
    successor: NodeId,
    edge: &CfaEdge,
) -> Result<EdgeId> {
    let mapped = dst.add_edge(
        predecessor,
        successor,
        EdgeKind::blank("interprocedural placeholder"),
        edge.raw(),
        edge.location().clone(),
    )?;
    ctx.placeholder_edges.push(mapped);
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfa::{
            ast::{CallStatement, CfaType, Declaration, Expression},
            function::FunctionSignature,
            location::FileLocation,
        },
        check::{check_automaton, check_from, CheckFlags},
        Error, MachineModel,
    };

    /// Builds a small sealed supergraph: main -> f() -> exit, f has a body.
    fn sealed_supergraph() -> Cfa {
        let mut b = CfaBuilder::new(MachineModel::Lp64);
        let main = b.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        let entry = b.function_entry(main);
        let exit = b.function_exit(main).unwrap();
        let site = b.add_node(main, NodeKind::Plain);
        let ret = b.add_node(main, NodeKind::Plain);

        let f = b.add_function(FunctionSignature::new(
            "f",
            vec![Declaration::local_int("a", None)],
            CfaType::Void,
        ));
        let f_entry = b.function_entry(f);
        let f_exit = b.function_exit(f).unwrap();

        b.add_edge(entry, site, EdgeKind::blank("start"), "", FileLocation::dummy())
            .unwrap();
        b.add_edge(ret, exit, EdgeKind::blank("after"), "", FileLocation::dummy())
            .unwrap();
        b.add_edge(
            f_entry,
            f_exit,
            EdgeKind::Declaration {
                declaration: Declaration::local_int("x", Some(Expression::int(1))),
            },
            "int x = 1;",
            FileLocation::line("f.c", 2),
        )
        .unwrap();

        let call = CallStatement::direct("f", vec![Expression::int(7)]);
        let s = b
            .add_edge(
                site,
                ret,
                EdgeKind::Summary { call: call.clone() },
                "f(7)",
                FileLocation::line("main.c", 3),
            )
            .unwrap();
        b.add_edge(
            site,
            f_entry,
            EdgeKind::Call {
                call,
                summary: Some(s),
            },
            "f(7)",
            FileLocation::line("main.c", 3),
        )
        .unwrap();
        b.add_edge(
            f_exit,
            ret,
            EdgeKind::Return { summary: s },
            "",
            FileLocation::dummy(),
        )
        .unwrap();

        b.set_entry_function("main").unwrap();
        b.seal().unwrap()
    }

    #[test]
    fn test_identity_rebuild_is_isomorphic() {
        let cfa = sealed_supergraph();
        let rebuilt = rebuild(
            &cfa,
            &mut IdentitySubstitution,
            RebuildMode::Supergraph,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(cfa.node_count(), rebuilt.node_count());
        assert_eq!(cfa.edge_count(), rebuilt.edge_count());
        assert_eq!(cfa.skeleton(), rebuilt.skeleton());
    }

    #[test]
    fn test_identity_rebuild_passes_checker() {
        let cfa = sealed_supergraph();
        check_automaton(&cfa, CheckFlags::default(), &CancelToken::new()).unwrap();

        let rebuilt = rebuild(
            &cfa,
            &mut IdentitySubstitution,
            RebuildMode::Supergraph,
            &CancelToken::new(),
        )
        .unwrap();
        check_automaton(&rebuilt, CheckFlags::default(), &CancelToken::new()).unwrap();
    }

    #[test]
    fn test_substitution_invoked_per_payload() {
        struct RenamingSubstitution {
            edges_seen: usize,
        }
        impl Substitution for RenamingSubstitution {
            fn map_edge_kind(&mut self, _edge: &CfaEdge, kind: EdgeKind) -> EdgeKind {
                self.edges_seen += 1;
                match kind {
                    EdgeKind::Declaration { mut declaration } => {
                        declaration.name = format!("renamed_{}", declaration.name);
                        EdgeKind::Declaration { declaration }
                    }
                    other => other,
                }
            }
        }

        let cfa = sealed_supergraph();
        let mut subst = RenamingSubstitution { edges_seen: 0 };
        let rebuilt = rebuild(&cfa, &mut subst, RebuildMode::Supergraph, &CancelToken::new())
            .unwrap();

        assert_eq!(subst.edges_seen, cfa.edge_count());
        let renamed = rebuilt.edges().any(|e| {
            matches!(
                e.kind(),
                EdgeKind::Declaration { declaration } if declaration.name == "renamed_x"
            )
        });
        assert!(renamed);
    }

    #[test]
    fn test_independent_functions_mode_disconnects() {
        let cfa = sealed_supergraph();
        let (builder, _) = rebuild_to_builder(
            &cfa,
            &mut IdentitySubstitution,
            RebuildMode::IndependentFunctions,
            &CancelToken::new(),
        )
        .unwrap();

        // No interprocedural edges remain
        for edge_id in builder.edge_ids().collect::<Vec<_>>() {
            let edge = builder.edge(edge_id).unwrap();
            assert!(
                !edge.kind().is_interprocedural(),
                "unexpected interprocedural edge {}",
                edge.describe()
            );
        }

        // The summary was lowered back to a plain call statement
        let call_sites = builder
            .edge_ids()
            .filter(|&e| {
                matches!(
                    builder.edge(e).unwrap().kind(),
                    EdgeKind::Statement {
                        statement: Statement::Call(_)
                    }
                )
            })
            .count();
        assert_eq!(call_sites, 1);

        // Both functions are independently checkable, and the per-function
        // entry/exit degree equivalences hold
        for function in [
            builder.function_by_name("main").unwrap(),
            builder.function_by_name("f").unwrap(),
        ] {
            let entry = builder.function_entry(function);
            let expected: HashSet<_> = builder
                .node_ids()
                .filter(|&n| builder.node(n).unwrap().function() == function)
                .collect();
            check_from(
                &builder,
                entry,
                Some(&expected),
                CheckFlags::default(),
                &CancelToken::new(),
            )
            .unwrap();

            for &node_id in &expected {
                let node = builder.node(node_id).unwrap();
                let no_entering =
                    node.entering().is_empty() && node.entering_summary().is_none();
                let no_leaving = node.leaving().is_empty() && node.leaving_summary().is_none();
                assert_eq!(no_entering, node.kind().is_function_entry());
                assert_eq!(no_leaving, node.kind().is_exit_or_termination());
            }
        }
    }

    #[test]
    fn test_missing_summary_is_fatal() {
        // Build a call edge whose summary slot is empty by erasing the
        // summary through a hostile substitution is not possible via the
        // public API; instead check the locate path via a source with a
        // dangling summary id, which the builder refuses to construct.
        // The closest reachable condition: a call edge whose summary edge
        // was never placed in the slot cannot be built at all.
        let mut b = CfaBuilder::new(MachineModel::Lp64);
        let main = b.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        let site = b.add_node(main, NodeKind::Plain);
        let target = b.add_node(main, NodeKind::Plain);
        let call = CallStatement::direct("f", vec![]);
        let result = b.add_edge(
            site,
            target,
            EdgeKind::Call {
                call,
                summary: Some(EdgeId::new(42)),
            },
            "f()",
            FileLocation::dummy(),
        );
        assert!(matches!(result, Err(Error::GraphError(_))));
    }

    #[test]
    fn test_rebuild_cancellation() {
        let cfa = sealed_supergraph();
        let token = CancelToken::new();
        token.cancel();
        let err = rebuild(
            &cfa,
            &mut IdentitySubstitution,
            RebuildMode::Supergraph,
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_dead_call_summary_none_survives() {
        // A call edge with summary None (pruned dead call) rebuilds cleanly
        let mut b = CfaBuilder::new(MachineModel::Lp64);
        let main = b.add_function(FunctionSignature::new("main", vec![], CfaType::Void));
        let entry = b.function_entry(main);
        let _exit = b.function_exit(main).unwrap();

        let f = b.add_function(FunctionSignature::new("f", vec![], CfaType::Void));
        let f_entry = b.function_entry(f);
        let f_term = b.add_node(f, NodeKind::Termination);
        b.add_edge(f_entry, f_term, EdgeKind::blank("spin"), "", FileLocation::dummy())
            .unwrap();

        b.add_edge(
            entry,
            f_entry,
            EdgeKind::Call {
                call: CallStatement::direct("f", vec![]),
                summary: None,
            },
            "f()",
            FileLocation::dummy(),
        )
        .unwrap();
        b.set_entry_function("main").unwrap();

        let (rebuilt, _) = rebuild_to_builder(
            &b,
            &mut IdentitySubstitution,
            RebuildMode::Supergraph,
            &CancelToken::new(),
        )
        .unwrap();
        let dead_calls = rebuilt
            .edge_ids()
            .filter(|&e| {
                matches!(
                    rebuilt.edge(e).unwrap().kind(),
                    EdgeKind::Call { summary: None, .. }
                )
            })
            .count();
        assert_eq!(dead_calls, 1);
    }
}
