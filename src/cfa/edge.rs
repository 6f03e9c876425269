//! Automaton edges: control-flow steps carrying program fragments.
//!
//! Each edge connects a predecessor location to a successor location and
//! carries the program fragment executed by that step. Interprocedural calls
//! are represented by a matched triple of edges sharing one summary edge:
//!
//! - the *summary* edge (call site → return site), held in the endpoints'
//!   summary slots, representing the whole call as one opaque step;
//! - the *call* edge (call site → callee entry) and the *return* edge
//!   (callee exit → return site), ordinary edges that both carry the
//!   [`EdgeId`] of their summary edge.
//!
//! Mutating one leg of a triple requires consistently relinking all three;
//! the builder refuses to remove a summary edge that a call or return edge
//! still references.

use std::fmt;

use strum::EnumDiscriminants;

use crate::{
    cfa::{
        ast::{CallStatement, Declaration, Expression, Statement},
        location::FileLocation,
    },
    utils::graph::{EdgeId, NodeId},
};

/// The program fragment attached to an edge, tagged by edge kind.
///
/// The [`EdgeClass`] discriminant enum derived from this type provides a
/// payload-free tag for duplicate detection and diagnostics.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(EdgeClass), derive(Hash, PartialOrd, Ord))]
pub enum EdgeKind {
    /// A step with no program effect (splices, synthetic wiring).
    Blank {
        /// Short description of why the edge exists.
        description: String,
    },
    /// One leg of an assumption pair; control continues only if
    /// `expression == truth`.
    Assume {
        /// The assumed condition.
        expression: Expression,
        /// The truth value this leg assumes.
        truth: bool,
    },
    /// A variable declaration coming into scope.
    Declaration {
        /// The declaration.
        declaration: Declaration,
    },
    /// An ordinary statement.
    Statement {
        /// The statement.
        statement: Statement,
    },
    /// A `return` statement inside a function body.
    ReturnStatement {
        /// The returned expression, if any.
        expression: Option<Expression>,
    },
    /// Interprocedural step into a callee (call site → callee entry).
    Call {
        /// The call being performed.
        call: CallStatement,
        /// The shared summary edge; `None` when the callee never returns and
        /// the return site was pruned.
        summary: Option<EdgeId>,
    },
    /// Interprocedural step out of a callee (callee exit → return site).
    Return {
        /// The shared summary edge.
        summary: EdgeId,
    },
    /// The whole call as one opaque step (call site → return site). Lives
    /// only in the summary slots of its endpoints.
    Summary {
        /// The summarized call.
        call: CallStatement,
    },
    /// A statement edge standing in for the call parallel to the call edge
    /// (call site → return site), for analyses that skip callee bodies.
    CallSummaryStatement {
        /// The summarized call.
        call: CallStatement,
        /// Name of the called function.
        callee: String,
    },
}

impl EdgeKind {
    /// A blank edge with the given description.
    #[must_use]
    pub fn blank(description: impl Into<String>) -> Self {
        EdgeKind::Blank {
            description: description.into(),
        }
    }

    /// Returns `true` for assume edges.
    #[must_use]
    pub const fn is_assume(&self) -> bool {
        matches!(self, EdgeKind::Assume { .. })
    }

    /// Returns `true` for summary edges.
    #[must_use]
    pub const fn is_summary(&self) -> bool {
        matches!(self, EdgeKind::Summary { .. })
    }

    /// Returns `true` for the interprocedural kinds (call, return, summary,
    /// call-summary-statement).
    #[must_use]
    pub const fn is_interprocedural(&self) -> bool {
        matches!(
            self,
            EdgeKind::Call { .. }
                | EdgeKind::Return { .. }
                | EdgeKind::Summary { .. }
                | EdgeKind::CallSummaryStatement { .. }
        )
    }

    /// Returns the shared summary edge referenced by a call or return edge.
    #[must_use]
    pub const fn summary_link(&self) -> Option<EdgeId> {
        match self {
            EdgeKind::Call {
                summary: Some(s), ..
            }
            | EdgeKind::Return { summary: s } => Some(*s),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Blank { description } => write!(f, "blank: {description}"),
            EdgeKind::Assume { expression, truth } => {
                if *truth {
                    write!(f, "[{expression}]")
                } else {
                    write!(f, "[!{expression}]")
                }
            }
            EdgeKind::Declaration { declaration } => write!(f, "decl {declaration}"),
            EdgeKind::Statement { statement } => write!(f, "{statement}"),
            EdgeKind::ReturnStatement { expression } => match expression {
                Some(e) => write!(f, "return {e}"),
                None => f.write_str("return"),
            },
            EdgeKind::Call { call, .. } => write!(f, "call {call}"),
            EdgeKind::Return { .. } => f.write_str("function return"),
            EdgeKind::Summary { call } => write!(f, "summary {call}"),
            EdgeKind::CallSummaryStatement { call, .. } => write!(f, "summary-stmt {call}"),
        }
    }
}

/// A control-flow step in the automaton.
///
/// Edges are owned by the automaton arena and addressed by [`EdgeId`]. The
/// raw source text and location travel with the edge for diagnostics.
#[derive(Debug, Clone)]
pub struct CfaEdge {
    pub(crate) id: EdgeId,
    pub(crate) predecessor: NodeId,
    pub(crate) successor: NodeId,
    pub(crate) kind: EdgeKind,
    pub(crate) raw: String,
    pub(crate) location: FileLocation,
}

impl CfaEdge {
    pub(crate) fn new(
        id: EdgeId,
        predecessor: NodeId,
        successor: NodeId,
        kind: EdgeKind,
        raw: impl Into<String>,
        location: FileLocation,
    ) -> Self {
        Self {
            id,
            predecessor,
            successor,
            kind,
            raw: raw.into(),
            location,
        }
    }

    /// Returns this edge's handle.
    #[must_use]
    pub const fn id(&self) -> EdgeId {
        self.id
    }

    /// Returns the predecessor location.
    #[must_use]
    pub const fn predecessor(&self) -> NodeId {
        self.predecessor
    }

    /// Returns the successor location.
    #[must_use]
    pub const fn successor(&self) -> NodeId {
        self.successor
    }

    /// Returns the edge kind with its payload.
    #[must_use]
    pub const fn kind(&self) -> &EdgeKind {
        &self.kind
    }

    /// Returns the payload-free kind tag.
    #[must_use]
    pub fn class(&self) -> EdgeClass {
        EdgeClass::from(&self.kind)
    }

    /// Returns the raw source text of the step.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the source location of the step.
    #[must_use]
    pub const fn location(&self) -> &FileLocation {
        &self.location
    }

    /// Returns the printable form used in diagnostics:
    /// `E3 N1 -> N2 (payload) @ file:line`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} {} -> {} ({}) @ {}",
            self.id, self.predecessor, self.successor, self.kind, self.location
        )
    }
}

impl fmt::Display for CfaEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        let assume = EdgeKind::Assume {
            expression: Expression::var("c"),
            truth: true,
        };
        assert!(assume.is_assume());
        assert!(!assume.is_interprocedural());

        let summary = EdgeKind::Summary {
            call: CallStatement::direct("f", vec![]),
        };
        assert!(summary.is_summary());
        assert!(summary.is_interprocedural());
    }

    #[test]
    fn test_summary_link() {
        let call = EdgeKind::Call {
            call: CallStatement::direct("f", vec![]),
            summary: Some(EdgeId::new(4)),
        };
        assert_eq!(call.summary_link(), Some(EdgeId::new(4)));

        let dead_call = EdgeKind::Call {
            call: CallStatement::direct("f", vec![]),
            summary: None,
        };
        assert_eq!(dead_call.summary_link(), None);

        assert_eq!(EdgeKind::blank("x").summary_link(), None);
    }

    #[test]
    fn test_class_tags_ignore_payload() {
        let a = EdgeKind::blank("one");
        let b = EdgeKind::blank("two");
        assert_eq!(EdgeClass::from(&a), EdgeClass::from(&b));
        assert_ne!(
            EdgeClass::from(&a),
            EdgeClass::from(&EdgeKind::ReturnStatement { expression: None })
        );
    }

    #[test]
    fn test_describe_contains_endpoints_and_location() {
        let edge = CfaEdge::new(
            EdgeId::new(3),
            NodeId::new(1),
            NodeId::new(2),
            EdgeKind::blank("wiring"),
            "",
            FileLocation::line("a.c", 8),
        );
        let text = edge.describe();
        assert!(text.contains("E3"));
        assert!(text.contains("N1 -> N2"));
        assert!(text.contains("a.c:8"));
    }

    #[test]
    fn test_assume_display() {
        let kind = EdgeKind::Assume {
            expression: Expression::eq(Expression::var("__pc"), Expression::int(2)),
            truth: false,
        };
        assert_eq!(kind.to_string(), "[!(__pc == 2)]");
    }
}
