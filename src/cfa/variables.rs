//! Best-effort variable classification of a sealed automaton.
//!
//! Analyses frequently want a cheap answer to "which variables matter":
//! which names are branched on, which are written, which merely exist. The
//! classification walks every edge payload once at seal time and buckets the
//! variable names it sees. Like the loop overview it is an auxiliary step:
//! failures degrade to "feature absent" instead of aborting the pipeline.

use std::collections::BTreeSet;

use crate::{
    cfa::{
        ast::{CallStatement, Declaration, Expression, Statement},
        edge::EdgeKind,
        store::CfaStore,
    },
    Result,
};

/// Variable names bucketed by how the automaton uses them.
///
/// A name can appear in several buckets; `declared` is the universe the
/// other two draw from, plus any name that only occurs inside expressions
/// (externals the front end did not declare).
#[derive(Debug, Clone, Default)]
pub struct VariableClassification {
    declared: BTreeSet<String>,
    assumed: BTreeSet<String>,
    assigned: BTreeSet<String>,
}

impl VariableClassification {
    /// Returns the declared variable names, including synthetic ones.
    #[must_use]
    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    /// Returns the names appearing in assume conditions; these decide
    /// control flow and are the usual relevance seed for analyses.
    #[must_use]
    pub fn assumed(&self) -> &BTreeSet<String> {
        &self.assumed
    }

    /// Returns the names written by assignments, declarations with
    /// initializers, or call results.
    #[must_use]
    pub fn assigned(&self) -> &BTreeSet<String> {
        &self.assigned
    }

    /// Returns `true` if the name decides control flow somewhere.
    #[must_use]
    pub fn is_assumed(&self, name: &str) -> bool {
        self.assumed.contains(name)
    }

    /// Returns `true` if the name is ever written.
    #[must_use]
    pub fn is_assigned(&self, name: &str) -> bool {
        self.assigned.contains(name)
    }
}

/// Classifies every variable mentioned by the automaton's edge payloads.
///
/// # Errors
///
/// Reserved for stale stores; callers treat any failure as "classification
/// unavailable".
pub fn classify_variables<S: CfaStore>(store: &S) -> Result<VariableClassification> {
    let mut classification = VariableClassification::default();

    for function in store.function_ids() {
        if let Some(signature) = store.function_signature(function) {
            for parameter in &signature.parameters {
                classification.declared.insert(parameter.name.clone());
            }
        }
    }
    for (declaration, _) in store.globals() {
        classification.declared.insert(declaration.name.clone());
    }

    for edge_id in store.edge_ids() {
        let Some(edge) = store.edge(edge_id) else {
            continue;
        };
        match edge.kind() {
            EdgeKind::Blank { .. } | EdgeKind::Return { .. } => {}
            EdgeKind::Assume { expression, .. } => {
                collect_names(expression, &mut classification.assumed);
            }
            EdgeKind::Declaration { declaration } => {
                note_declaration(declaration, &mut classification);
            }
            EdgeKind::Statement { statement } => {
                note_statement(statement, &mut classification);
            }
            EdgeKind::ReturnStatement { .. } => {}
            EdgeKind::Call { call, .. }
            | EdgeKind::Summary { call }
            | EdgeKind::CallSummaryStatement { call, .. } => {
                note_call(call, &mut classification);
            }
        }
    }

    Ok(classification)
}

fn note_declaration(declaration: &Declaration, classification: &mut VariableClassification) {
    classification.declared.insert(declaration.name.clone());
    if declaration.initializer.is_some() {
        classification.assigned.insert(declaration.name.clone());
    }
}

fn note_statement(statement: &Statement, classification: &mut VariableClassification) {
    match statement {
        Statement::Assign { lhs, .. } => {
            collect_names(lhs, &mut classification.assigned);
        }
        Statement::Call(call) => note_call(call, classification),
        Statement::Expression(_) => {}
    }
}

fn note_call(call: &CallStatement, classification: &mut VariableClassification) {
    if let Some(lvalue) = &call.lvalue {
        collect_names(lvalue, &mut classification.assigned);
    }
}

/// Collects every variable name mentioned in an expression.
fn collect_names(expression: &Expression, out: &mut BTreeSet<String>) {
    match expression {
        Expression::Variable { name, .. } => {
            out.insert(name.clone());
        }
        Expression::Unary { operand, .. } => collect_names(operand, out),
        Expression::Binary { lhs, rhs, .. } => {
            collect_names(lhs, out);
            collect_names(rhs, out);
        }
        Expression::IntLiteral { .. }
        | Expression::CharLiteral { .. }
        | Expression::FunctionRef { .. } => {}
    }
}
