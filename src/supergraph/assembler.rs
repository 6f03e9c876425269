//! The supergraph assembly pass.

use std::collections::HashSet;

use log::{debug, trace};

use crate::{
    cfa::{
        ast::{CallStatement, CallTarget, Expression, Statement},
        builder::CfaBuilder,
        edge::EdgeKind,
        function::FunctionId,
        location::FileLocation,
        node::NodeKind,
    },
    supergraph::{AssemblerConfig, FunctionPointerMode},
    utils::{
        graph::{EdgeId, NodeId},
        CancelToken,
    },
    Error, Result,
};

/// One call site found in the per-function automata.
#[derive(Debug, Clone)]
struct CallSite {
    edge: EdgeId,
    predecessor: NodeId,
    return_site: NodeId,
    call: CallStatement,
    raw: String,
    location: FileLocation,
}

/// Connects independent per-function automata into the supergraph.
///
/// Global declarations are spliced behind the entry function's entry node
/// first; every direct call to a known function is then split into its
/// call/return/summary triple, and finally nodes reachable from no function
/// entry (orphaned return sites of never-returning calls, cascades behind
/// them) are pruned.
///
/// # Errors
///
/// - [`Error::UnresolvedEntry`] if the builder has no designated entry
///   function;
/// - [`Error::FunctionCall`] for a parameter-count mismatch at any call site
///   (reported before any mutation);
/// - [`Error::Inconsistency`] if a call site already carries a leaving
///   summary edge, which well-formed per-function automata cannot produce;
/// - [`Error::Cancelled`] when the token is raised.
pub fn assemble(
    builder: &mut CfaBuilder,
    config: &AssemblerConfig,
    token: &CancelToken,
) -> Result<()> {
    let entry_function = builder
        .entry_function()
        .ok_or_else(|| Error::UnresolvedEntry("<none designated>".to_string()))?;

    // Validation runs over the untouched builder: a reported error
    // guarantees that nothing was mutated
    let sites = collect_call_sites(builder);
    validate_call_sites(builder, &sites)?;
    debug!("assembling supergraph over {} call sites", sites.len());

    insert_global_declarations(builder, entry_function)?;
    // Splicing may have re-pointed edges leaving the entry; re-collect
    let sites = collect_call_sites(builder);

    for site in &sites {
        token.checkpoint()?;
        match &site.call.target {
            CallTarget::Direct(name) => {
                // Sites were collected against known functions only
                let callee = builder
                    .function_by_name(name)
                    .ok_or_else(|| inconsistency!("call site callee '{name}' vanished"))?;
                builder.remove_edge(site.edge)?;
                insert_call_triple(builder, config, site, site.predecessor, callee, &site.call)?;
            }
            CallTarget::Pointer(expression) => {
                let expression = expression.clone();
                expand_function_pointer_call(builder, config, site, &expression)?;
            }
        }
    }

    // Orphaned return sites (and anything behind them) go; every function
    // entry stays a root so uncalled functions survive assembly
    let roots: Vec<NodeId> = builder
        .node_ids()
        .filter(|&n| {
            builder
                .node(n)
                .is_some_and(|node| node.kind().is_function_entry())
        })
        .collect();
    builder.remove_unreachable(&roots);

    Ok(())
}

/// Finds every statement edge carrying a call that the assembler handles:
/// direct calls to known functions, and pointer calls when expansion is
/// enabled.
fn collect_call_sites(builder: &CfaBuilder) -> Vec<CallSite> {
    let mut sites = Vec::new();
    for edge_id in builder.edge_ids() {
        let Some(edge) = builder.edge(edge_id) else {
            continue;
        };
        let EdgeKind::Statement {
            statement: Statement::Call(call),
        } = edge.kind()
        else {
            continue;
        };
        match &call.target {
            CallTarget::Direct(name) => {
                if builder.function_by_name(name).is_none() {
                    // Calls to functions without a body stay as they are
                    trace!("leaving external call '{name}' untouched");
                    continue;
                }
            }
            CallTarget::Pointer(_) => {}
        }
        sites.push(CallSite {
            edge: edge_id,
            predecessor: edge.predecessor(),
            return_site: edge.successor(),
            call: call.clone(),
            raw: edge.raw().to_string(),
            location: edge.location().clone(),
        });
    }
    sites
}

/// Validation pre-pass: parameter counts and summary-slot preconditions.
/// Nothing is mutated before this pass succeeds.
fn validate_call_sites(builder: &CfaBuilder, sites: &[CallSite]) -> Result<()> {
    for site in sites {
        if let CallTarget::Direct(name) = &site.call.target {
            let callee = builder
                .function_by_name(name)
                .ok_or_else(|| inconsistency!("call site callee '{name}' vanished"))?;
            let signature = builder
                .signature(callee)
                .ok_or_else(|| inconsistency!("function {callee} has no signature"))?;
            if !signature.accepts(site.call.arguments.len()) {
                return Err(Error::FunctionCall(format!(
                    "function '{name}' expects {}{} parameter(s) but is called with {} argument(s) at {}",
                    signature.parameters.len(),
                    if signature.variadic { " or more" } else { "" },
                    site.call.arguments.len(),
                    site.location
                )));
            }
        }

        let predecessor = builder
            .node(site.predecessor)
            .ok_or_else(|| inconsistency!("call site predecessor {} vanished", site.predecessor))?;
        if predecessor.leaving_summary().is_some() {
            return Err(inconsistency!(
                "call site {} already carries a leaving summary edge",
                site.predecessor
            ));
        }
    }
    Ok(())
}

/// Splices the global declarations as a chain of declaration edges between
/// the entry function's entry node and its original successors.
fn insert_global_declarations(builder: &mut CfaBuilder, entry_function: FunctionId) -> Result<()> {
    let globals: Vec<_> = builder.globals().to_vec();
    if globals.is_empty() {
        return Ok(());
    }

    let entry = builder.function_entry(entry_function);
    let moved: Vec<EdgeId> = builder
        .node(entry)
        .map(|n| n.leaving().to_vec())
        .unwrap_or_default();

    let mut tail = entry;
    for (declaration, raw) in globals {
        let next = builder.add_node(entry_function, NodeKind::Plain);
        builder.add_edge(
            tail,
            next,
            EdgeKind::Declaration { declaration },
            raw,
            FileLocation::dummy(),
        )?;
        tail = next;
    }

    // Re-point the entry's original edges behind the chain; their handles
    // stay valid
    for edge_id in moved {
        builder.retarget_edge_predecessor(edge_id, tail)?;
    }

    debug!("spliced global declarations behind the program entry");
    Ok(())
}

/// Splits one call into its triple at `call_site`, handling the
/// never-returning case and the summary-merge splice.
fn insert_call_triple(
    builder: &mut CfaBuilder,
    config: &AssemblerConfig,
    site: &CallSite,
    call_site: NodeId,
    callee: FunctionId,
    call: &CallStatement,
) -> Result<()> {
    let callee_entry = builder.function_entry(callee);
    let callee_exit = builder.function_exit(callee);
    let exit_reachable = callee_exit
        .is_some_and(|exit| intraprocedural_reachable(builder, callee, callee_entry, exit));

    if !exit_reachable {
        // The call never returns: only the call edge is inserted; the return
        // site is left to the orphan pruning
        trace!(
            "call to '{}' never returns; pruning its return path",
            describe_target(call)
        );
        builder.add_edge(
            call_site,
            callee_entry,
            EdgeKind::Call {
                call: call.clone(),
                summary: None,
            },
            site.raw.clone(),
            site.location.clone(),
        )?;
        return Ok(());
    }
    let callee_exit =
        callee_exit.ok_or_else(|| inconsistency!("function {callee} lost its exit node"))?;

    // A node may carry at most one entering summary edge; a merge directly
    // behind two calls gets a synthetic blank-edge node spliced in
    let return_site = if builder
        .node(site.return_site)
        .is_some_and(|n| n.entering_summary().is_some())
    {
        let function = builder
            .node(call_site)
            .map(|n| n.function())
            .ok_or_else(|| inconsistency!("call site {call_site} vanished"))?;
        let spliced = builder.add_node(function, NodeKind::Plain);
        builder.add_edge(
            spliced,
            site.return_site,
            EdgeKind::blank("summary merge splice"),
            "",
            FileLocation::dummy(),
        )?;
        trace!(
            "spliced node {spliced} in front of shared return site {}",
            site.return_site
        );
        spliced
    } else {
        site.return_site
    };

    let summary = builder.add_edge(
        call_site,
        return_site,
        EdgeKind::Summary { call: call.clone() },
        site.raw.clone(),
        site.location.clone(),
    )?;
    builder.add_edge(
        call_site,
        callee_entry,
        EdgeKind::Call {
            call: call.clone(),
            summary: Some(summary),
        },
        site.raw.clone(),
        site.location.clone(),
    )?;
    builder.add_edge(
        callee_exit,
        return_site,
        EdgeKind::Return { summary },
        site.raw.clone(),
        site.location.clone(),
    )?;
    if config.summary_statement_edges {
        let callee_name = builder
            .signature(callee)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        builder.add_edge(
            call_site,
            return_site,
            EdgeKind::CallSummaryStatement {
                call: call.clone(),
                callee: callee_name,
            },
            site.raw.clone(),
            site.location.clone(),
        )?;
    }
    Ok(())
}

/// Expands a pointer call into an address-equality decision chain over the
/// parameter-count-compatible candidates.
fn expand_function_pointer_call(
    builder: &mut CfaBuilder,
    config: &AssemblerConfig,
    site: &CallSite,
    pointer: &Expression,
) -> Result<()> {
    let FunctionPointerMode::AssumeChain { prune_undefined } = config.function_pointers else {
        return Ok(());
    };

    // Candidates in name order for deterministic output
    let mut candidates: Vec<(String, FunctionId)> = Vec::new();
    for function in builder.function_ids().collect::<Vec<_>>() {
        if let Some(signature) = builder.signature(function) {
            if signature.accepts(site.call.arguments.len()) {
                candidates.push((signature.name.clone(), function));
            }
        }
    }
    candidates.sort();

    let caller_function = builder
        .node(site.predecessor)
        .map(|n| n.function())
        .ok_or_else(|| inconsistency!("call site predecessor {} vanished", site.predecessor))?;

    builder.remove_edge(site.edge)?;

    let mut current = site.predecessor;
    for (name, callee) in &candidates {
        let matches = Expression::eq(
            pointer.clone(),
            Expression::FunctionRef { name: name.clone() },
        );
        let then_node = builder.add_node(caller_function, NodeKind::Plain);
        let else_node = builder.add_node(caller_function, NodeKind::Plain);
        builder.add_edge(
            current,
            then_node,
            EdgeKind::Assume {
                expression: matches.clone(),
                truth: true,
            },
            site.raw.clone(),
            site.location.clone(),
        )?;
        builder.add_edge(
            current,
            else_node,
            EdgeKind::Assume {
                expression: matches,
                truth: false,
            },
            site.raw.clone(),
            site.location.clone(),
        )?;

        let direct_call = CallStatement {
            target: CallTarget::Direct(name.clone()),
            lvalue: site.call.lvalue.clone(),
            arguments: site.call.arguments.clone(),
        };
        insert_call_triple(builder, config, site, then_node, *callee, &direct_call)?;

        current = else_node;
    }

    if prune_undefined {
        // Falling through every candidate is considered unreachable
        builder.set_node_kind(current, NodeKind::Termination)?;
    } else {
        builder.add_edge(
            current,
            site.return_site,
            EdgeKind::Statement {
                statement: Statement::Call(site.call.clone()),
            },
            format!("undefined call: {}", site.raw),
            site.location.clone(),
        )?;
    }
    debug!(
        "expanded pointer call at {} into {} candidate(s)",
        site.location,
        candidates.len()
    );
    Ok(())
}

/// Forward reachability within one function over ordinary edges.
fn intraprocedural_reachable(
    builder: &CfaBuilder,
    function: FunctionId,
    from: NodeId,
    to: NodeId,
) -> bool {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![from];
    visited.insert(from);
    while let Some(node_id) = stack.pop() {
        if node_id == to {
            return true;
        }
        let Some(node) = builder.node(node_id) else {
            continue;
        };
        if node.function() != function {
            continue;
        }
        let summary = node.leaving_summary();
        for edge_id in node.leaving().iter().copied().chain(summary) {
            if let Some(edge) = builder.edge(edge_id) {
                let next = edge.successor();
                if builder
                    .node(next)
                    .is_some_and(|n| n.function() == function)
                    && visited.insert(next)
                {
                    stack.push(next);
                }
            }
        }
    }
    false
}

fn describe_target(call: &CallStatement) -> String {
    match &call.target {
        CallTarget::Direct(name) => name.clone(),
        CallTarget::Pointer(expression) => format!("*{expression}"),
    }
}
