//! Structural consistency checking.
//!
//! The checker is the correctness gate of the core: it is meant to run after
//! every structural transformation, and a failure is a fatal defect, never
//! silently recovered, since continuing would let analyses run on a wrong
//! automaton.
//!
//! [`check_from`] breadth-first-traverses the automaton from a given node,
//! following edges in *both* directions (weak connectivity), and validates
//! every visited node:
//!
//! - edge counts legal for the node kind (no entering edges ⇒ function
//!   entry; no leaving edges ⇒ exit or termination; exactly two leaving
//!   edges ⇒ a true/false assume pair or a call / call-summary-statement
//!   pair);
//! - no duplicate leaving edges;
//! - symmetric registration between predecessor out-lists and successor
//!   in-lists, including the summary slots;
//! - call/return/summary triples share one live summary edge;
//! - integer and character literals fit the machine model.
//!
//! Given an expected node set, the traversal must visit exactly that set.
//! [`check_automaton`] applies this to a whole automaton from its entry
//! function, expecting every live node to be visited.

use std::collections::{HashSet, VecDeque};

use bitflags::bitflags;
use log::debug;

use crate::{
    cfa::{
        ast::{CallStatement, CfaType, Declaration, Expression, Statement},
        edge::{CfaEdge, EdgeClass, EdgeKind},
        node::{CfaNode, NodeKind},
        store::CfaStore,
        MachineModel,
    },
    utils::{graph::NodeId, CancelToken},
    Result,
};

bitflags! {
    /// Selection of check categories to run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CheckFlags: u32 {
        /// Edge-count legality against node kinds.
        const EDGE_COUNTS = 1;
        /// Duplicate-edge absence.
        const DUPLICATES = 1 << 1;
        /// Symmetric registration of edges and summary slots.
        const SYMMETRY = 1 << 2;
        /// Call/return/summary triple integrity.
        const TRIPLES = 1 << 3;
        /// Literal range sanity against the machine model.
        const LITERAL_RANGES = 1 << 4;
    }
}

impl Default for CheckFlags {
    fn default() -> Self {
        CheckFlags::all()
    }
}

/// Checks a whole automaton.
///
/// Sweeps the weakly connected region of every function entry (the entry
/// function first) and then requires that the sweeps together covered every
/// live node; an island no function entry can reach is reported as an
/// inconsistency.
///
/// # Errors
///
/// Returns [`Error::Inconsistency`](crate::Error::Inconsistency) for any
/// violated invariant, or [`Error::Cancelled`](crate::Error::Cancelled).
pub fn check_automaton<S: CfaStore>(store: &S, flags: CheckFlags, token: &CancelToken) -> Result<()> {
    let entry_function = store
        .entry_function()
        .ok_or_else(|| inconsistency!("automaton has no designated entry function"))?;
    let main_entry = store
        .function_entry(entry_function)
        .ok_or_else(|| inconsistency!("entry function {entry_function} has no entry node"))?;

    let mut seeds: Vec<NodeId> = vec![main_entry];
    for function in store.function_ids() {
        if let Some(entry) = store.function_entry(function) {
            if !seeds.contains(&entry) {
                seeds.push(entry);
            }
        }
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    for seed in seeds {
        if !visited.contains(&seed) {
            sweep(store, seed, &mut visited, None, flags, token)?;
        }
    }

    for node_id in store.node_ids() {
        if !visited.contains(&node_id) {
            let description = store
                .node(node_id)
                .map_or_else(|| node_id.to_string(), |n| describe_node(store, n));
            return Err(inconsistency!(
                "node {description} is not connected to any function entry"
            ));
        }
    }
    Ok(())
}

/// Checks the weakly connected region around `start`.
///
/// With an `expected` set, the traversal must visit exactly that set; nodes
/// visited outside the set and expected nodes never reached are both
/// reported.
///
/// # Errors
///
/// Returns [`Error::Inconsistency`](crate::Error::Inconsistency) for any
/// violated invariant, or [`Error::Cancelled`](crate::Error::Cancelled).
pub fn check_from<S: CfaStore>(
    store: &S,
    start: NodeId,
    expected: Option<&HashSet<NodeId>>,
    flags: CheckFlags,
    token: &CancelToken,
) -> Result<()> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    sweep(store, start, &mut visited, expected, flags, token)?;

    if let Some(expected) = expected {
        for &node_id in expected {
            if !visited.contains(&node_id) {
                let description = store
                    .node(node_id)
                    .map_or_else(|| node_id.to_string(), |n| describe_node(store, n));
                return Err(inconsistency!(
                    "expected node {description} was never visited"
                ));
            }
        }
    }
    Ok(())
}

/// One breadth-first sweep over the weakly connected region of `start`,
/// validating every node it dequeues.
fn sweep<S: CfaStore>(
    store: &S,
    start: NodeId,
    visited: &mut HashSet<NodeId>,
    expected: Option<&HashSet<NodeId>>,
    flags: CheckFlags,
    token: &CancelToken,
) -> Result<()> {
    let machine = store.machine();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    if store.node(start).is_some() {
        if visited.insert(start) {
            queue.push_back(start);
        }
    } else {
        return Err(inconsistency!("start node {start} does not exist"));
    }

    while let Some(node_id) = queue.pop_front() {
        token.checkpoint()?;
        let node = store
            .node(node_id)
            .ok_or_else(|| inconsistency!("node {node_id} vanished during traversal"))?;

        if let Some(expected) = expected {
            if !expected.contains(&node_id) {
                return Err(inconsistency!(
                    "traversal reached {} which is outside the expected node set",
                    describe_node(store, node)
                ));
            }
        }

        check_node(store, node, machine, flags)?;

        // Both directions: leaving and entering, summary slots included
        for edge in adjacent_edges(store, node) {
            for next in [edge.predecessor(), edge.successor()] {
                if store.node(next).is_some() && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    debug!("consistency sweep covered {} nodes", visited.len());
    Ok(())
}

fn adjacent_edges<'a, S: CfaStore>(store: &'a S, node: &CfaNode) -> Vec<&'a CfaEdge> {
    node.leaving()
        .iter()
        .chain(node.entering())
        .copied()
        .chain(node.leaving_summary())
        .chain(node.entering_summary())
        .filter_map(|e| store.edge(e))
        .collect()
}

fn check_node<S: CfaStore>(
    store: &S,
    node: &CfaNode,
    machine: MachineModel,
    flags: CheckFlags,
) -> Result<()> {
    if flags.contains(CheckFlags::EDGE_COUNTS) {
        check_edge_counts(store, node)?;
    }
    if flags.contains(CheckFlags::DUPLICATES) {
        check_duplicates(store, node)?;
    }
    if flags.contains(CheckFlags::SYMMETRY) {
        check_symmetry(store, node)?;
    }
    if flags.contains(CheckFlags::TRIPLES) {
        check_triples(store, node)?;
    }
    if flags.contains(CheckFlags::LITERAL_RANGES) {
        check_literals(store, node, machine)?;
    }
    Ok(())
}

fn check_edge_counts<S: CfaStore>(store: &S, node: &CfaNode) -> Result<()> {
    let no_entering = node.entering().is_empty() && node.entering_summary().is_none();
    if no_entering && !node.kind().is_function_entry() {
        return Err(inconsistency!(
            "{} has no entering edges but is not a function entry",
            describe_node(store, node)
        ));
    }

    let leaving: Vec<&CfaEdge> = node
        .leaving()
        .iter()
        .filter_map(|&e| store.edge(e))
        .collect();

    // Function exits leave only through return edges (one per call site);
    // termination nodes never leave
    if node.kind().is_exit_or_termination() {
        if node.leaving_summary().is_some() {
            return Err(inconsistency!(
                "{} is an exit node but carries a leaving summary edge",
                describe_node(store, node)
            ));
        }
        let bad = leaving.iter().find(|e| {
            node.kind().is_termination() || e.class() != EdgeClass::Return
        });
        if let Some(edge) = bad {
            return Err(inconsistency!(
                "{} may not be left through {}",
                describe_node(store, node),
                edge.describe()
            ));
        }
        return Ok(());
    }

    let no_leaving = leaving.is_empty() && node.leaving_summary().is_none();
    if no_leaving {
        return Err(inconsistency!(
            "{} is a dead end: no leaving edges on a non-exit node",
            describe_node(store, node)
        ));
    }
    if let Some(edge) = leaving.iter().find(|e| e.class() == EdgeClass::Return) {
        return Err(inconsistency!(
            "{} is not a function exit but leaves through return edge {}",
            describe_node(store, node),
            edge.describe()
        ));
    }

    match leaving.len() {
        0 | 1 => {
            if leaving.len() == 1 && leaving[0].kind().is_assume() {
                return Err(inconsistency!(
                    "{} has a lone assume edge {}",
                    describe_node(store, node),
                    leaving[0].describe()
                ));
            }
        }
        2 => {
            let ok_assume_pair = matches!(
                (leaving[0].kind(), leaving[1].kind()),
                (
                    EdgeKind::Assume { truth: a, .. },
                    EdgeKind::Assume { truth: b, .. }
                ) if a != b
            );
            let classes = (leaving[0].class(), leaving[1].class());
            let ok_call_pair = matches!(
                classes,
                (EdgeClass::Call, EdgeClass::CallSummaryStatement)
                    | (EdgeClass::CallSummaryStatement, EdgeClass::Call)
            );
            if !ok_assume_pair && !ok_call_pair {
                return Err(inconsistency!(
                    "{} has two leaving edges that are neither a true/false assume pair nor a call/summary-statement pair: {} / {}",
                    describe_node(store, node),
                    leaving[0].describe(),
                    leaving[1].describe()
                ));
            }
        }
        n => {
            return Err(inconsistency!(
                "{} has {n} leaving edges; at most two are allowed",
                describe_node(store, node)
            ));
        }
    }
    Ok(())
}

fn check_duplicates<S: CfaStore>(store: &S, node: &CfaNode) -> Result<()> {
    let mut seen: HashSet<(NodeId, EdgeClass, Option<bool>)> = HashSet::new();
    for &edge_id in node.leaving() {
        let Some(edge) = store.edge(edge_id) else {
            continue;
        };
        let truth = match edge.kind() {
            EdgeKind::Assume { truth, .. } => Some(*truth),
            _ => None,
        };
        if !seen.insert((edge.successor(), edge.class(), truth)) {
            return Err(inconsistency!(
                "{} has duplicate leaving edge {}",
                describe_node(store, node),
                edge.describe()
            ));
        }
    }
    Ok(())
}

fn check_symmetry<S: CfaStore>(store: &S, node: &CfaNode) -> Result<()> {
    for &edge_id in node.leaving() {
        let edge = store
            .edge(edge_id)
            .ok_or_else(|| inconsistency!("node {} lists dead edge {edge_id}", node.id()))?;
        if edge.predecessor() != node.id() {
            return Err(inconsistency!(
                "edge {} is registered as leaving {} but starts elsewhere",
                edge.describe(),
                node.id()
            ));
        }
        let successor = store.node(edge.successor()).ok_or_else(|| {
            inconsistency!("edge {} points at a dead successor", edge.describe())
        })?;
        if !successor.entering().contains(&edge_id) {
            return Err(inconsistency!(
                "edge {} is missing from the entering list of {}",
                edge.describe(),
                successor.id()
            ));
        }
    }
    for &edge_id in node.entering() {
        let edge = store
            .edge(edge_id)
            .ok_or_else(|| inconsistency!("node {} lists dead edge {}", node.id(), edge_id))?;
        if edge.successor() != node.id() {
            return Err(inconsistency!(
                "edge {} is registered as entering {} but ends elsewhere",
                edge.describe(),
                node.id()
            ));
        }
        let predecessor = store.node(edge.predecessor()).ok_or_else(|| {
            inconsistency!("edge {} starts at a dead predecessor", edge.describe())
        })?;
        if !predecessor.leaving().contains(&edge_id) {
            return Err(inconsistency!(
                "edge {} is missing from the leaving list of {}",
                edge.describe(),
                predecessor.id()
            ));
        }
    }
    if let Some(summary_id) = node.leaving_summary() {
        let edge = store
            .edge(summary_id)
            .ok_or_else(|| inconsistency!("node {} has a dead leaving summary edge", node.id()))?;
        if !edge.kind().is_summary() || edge.predecessor() != node.id() {
            return Err(inconsistency!(
                "leaving summary slot of {} holds a non-matching edge {}",
                node.id(),
                edge.describe()
            ));
        }
        let successor = store.node(edge.successor()).ok_or_else(|| {
            inconsistency!("summary edge {} points at a dead successor", edge.describe())
        })?;
        if successor.entering_summary() != Some(summary_id) {
            return Err(inconsistency!(
                "summary edge {} is not registered at its return site {}",
                edge.describe(),
                successor.id()
            ));
        }
    }
    if let Some(summary_id) = node.entering_summary() {
        let edge = store
            .edge(summary_id)
            .ok_or_else(|| inconsistency!("node {} has a dead entering summary edge", node.id()))?;
        if !edge.kind().is_summary() || edge.successor() != node.id() {
            return Err(inconsistency!(
                "entering summary slot of {} holds a non-matching edge {}",
                node.id(),
                edge.describe()
            ));
        }
    }
    Ok(())
}

fn check_triples<S: CfaStore>(store: &S, node: &CfaNode) -> Result<()> {
    for &edge_id in node.leaving() {
        let Some(edge) = store.edge(edge_id) else {
            continue;
        };
        match edge.kind() {
            EdgeKind::Call {
                summary: Some(summary_id),
                ..
            } => {
                let summary = store.edge(*summary_id).ok_or_else(|| {
                    inconsistency!(
                        "call edge {} references dead summary edge {summary_id}",
                        edge.describe()
                    )
                })?;
                if !summary.kind().is_summary() {
                    return Err(inconsistency!(
                        "call edge {} references non-summary edge {}",
                        edge.describe(),
                        summary.describe()
                    ));
                }
                if summary.predecessor() != edge.predecessor() {
                    return Err(inconsistency!(
                        "call edge {} and its summary edge {} disagree on the call site",
                        edge.describe(),
                        summary.describe()
                    ));
                }
            }
            EdgeKind::Return { summary } => {
                let summary_edge = store.edge(*summary).ok_or_else(|| {
                    inconsistency!(
                        "return edge {} references dead summary edge {summary}",
                        edge.describe()
                    )
                })?;
                if !summary_edge.kind().is_summary() {
                    return Err(inconsistency!(
                        "return edge {} references non-summary edge {}",
                        edge.describe(),
                        summary_edge.describe()
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_literals<S: CfaStore>(store: &S, node: &CfaNode, machine: MachineModel) -> Result<()> {
    let summary = node.leaving_summary();
    for edge_id in node.leaving().iter().copied().chain(summary) {
        let Some(edge) = store.edge(edge_id) else {
            continue;
        };
        let mut literals: Vec<&Expression> = Vec::new();
        collect_kind_expressions(edge.kind(), &mut literals);
        for expr in literals {
            check_expression(expr, machine).map_err(|detail| {
                inconsistency!("literal out of range in edge {}: {detail}", edge.describe())
            })?;
        }
    }
    Ok(())
}

/// Collects the expressions embedded in an edge payload.
fn collect_kind_expressions<'a>(kind: &'a EdgeKind, out: &mut Vec<&'a Expression>) {
    match kind {
        EdgeKind::Blank { .. } => {}
        EdgeKind::Assume { expression, .. } => out.push(expression),
        EdgeKind::Declaration { declaration } => collect_declaration(declaration, out),
        EdgeKind::Statement { statement } => collect_statement(statement, out),
        EdgeKind::ReturnStatement { expression } => out.extend(expression.iter()),
        EdgeKind::Call { call, .. }
        | EdgeKind::Summary { call }
        | EdgeKind::CallSummaryStatement { call, .. } => collect_call(call, out),
        EdgeKind::Return { .. } => {}
    }
}

fn collect_declaration<'a>(declaration: &'a Declaration, out: &mut Vec<&'a Expression>) {
    out.extend(declaration.initializer.iter());
}

fn collect_statement<'a>(statement: &'a Statement, out: &mut Vec<&'a Expression>) {
    match statement {
        Statement::Assign { lhs, rhs } => {
            out.push(lhs);
            out.push(rhs);
        }
        Statement::Call(call) => collect_call(call, out),
        Statement::Expression(expression) => out.push(expression),
    }
}

fn collect_call<'a>(call: &'a CallStatement, out: &mut Vec<&'a Expression>) {
    out.extend(call.lvalue.iter());
    out.extend(call.arguments.iter());
    if let crate::cfa::ast::CallTarget::Pointer(expression) = &call.target {
        out.push(expression);
    }
}

/// Walks an expression tree checking every literal against the model.
fn check_expression(expression: &Expression, machine: MachineModel) -> core::result::Result<(), String> {
    match expression {
        Expression::IntLiteral { value, ty } => match ty {
            CfaType::Int { kind, signed } => {
                if machine.value_fits(*kind, *signed, *value) {
                    Ok(())
                } else {
                    Err(format!("integer literal {value} does not fit {ty:?}"))
                }
            }
            _ => Ok(()),
        },
        Expression::CharLiteral { value } => {
            if machine.char_fits(*value) {
                Ok(())
            } else {
                Err(format!("character literal {value} out of range"))
            }
        }
        Expression::Variable { .. } | Expression::FunctionRef { .. } => Ok(()),
        Expression::Unary { operand, .. } => check_expression(operand, machine),
        Expression::Binary { lhs, rhs, .. } => {
            check_expression(lhs, machine)?;
            check_expression(rhs, machine)
        }
    }
}

/// Printable node form for diagnostics: handle, kind, owning function.
fn describe_node<S: CfaStore>(store: &S, node: &CfaNode) -> String {
    let function = store
        .function_signature(node.function())
        .map_or("<unknown>", |s| s.name.as_str());
    let kind = match node.kind() {
        NodeKind::Plain => "plain".to_string(),
        NodeKind::Label { name } => format!("label '{name}'"),
        NodeKind::FunctionEntry { .. } => "function entry".to_string(),
        NodeKind::FunctionExit => "function exit".to_string(),
        NodeKind::Termination => "termination".to_string(),
    };
    format!("node {} ({kind}, function '{function}')", node.id())
}
