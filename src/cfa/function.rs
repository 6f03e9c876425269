//! Function identities and signatures.

use std::fmt;

use crate::{
    cfa::ast::{CfaType, Declaration},
    utils::graph::NodeId,
};

/// A strongly-typed identifier for functions of an automaton.
///
/// Like [`NodeId`](crate::NodeId), this is a stable slot index, here into the
/// automaton's function table. Every node records the function that owns it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub(crate) usize);

impl FunctionId {
    /// Creates a `FunctionId` from a raw slot index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        FunctionId(index)
    }

    /// Returns the raw slot index of this handle.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionId({})", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// The declared interface of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    /// The function name, unique within an automaton.
    pub name: String,
    /// The declared parameters, in order.
    pub parameters: Vec<Declaration>,
    /// `true` if the function accepts extra trailing arguments.
    pub variadic: bool,
    /// The declared result type.
    pub return_type: CfaType,
}

impl FunctionSignature {
    /// Creates a non-variadic signature.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<Declaration>,
        return_type: CfaType,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            variadic: false,
            return_type,
        }
    }

    /// Marks the signature as variadic.
    #[must_use]
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Returns `true` if a call with `argc` arguments matches this
    /// signature's parameter count, accounting for variadics.
    #[must_use]
    pub fn accepts(&self, argc: usize) -> bool {
        if self.variadic {
            argc >= self.parameters.len()
        } else {
            argc == self.parameters.len()
        }
    }

    /// Returns `true` if the function produces a value.
    #[must_use]
    pub fn has_return_value(&self) -> bool {
        self.return_type != CfaType::Void
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&p.name)?;
        }
        if self.variadic {
            if !self.parameters.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("...")?;
        }
        f.write_str(")")
    }
}

/// A function known to the automaton: its signature plus entry/exit nodes.
///
/// The exit becomes `None` when it was pruned as unreachable (the function
/// never returns).
#[derive(Debug, Clone)]
pub(crate) struct FunctionRecord {
    pub(crate) signature: FunctionSignature,
    pub(crate) entry: NodeId,
    pub(crate) exit: Option<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: usize, variadic: bool) -> FunctionSignature {
        let parameters = (0..params)
            .map(|i| Declaration::local_int(format!("p{i}"), None))
            .collect();
        let mut s = FunctionSignature::new("f", parameters, CfaType::Void);
        s.variadic = variadic;
        s
    }

    #[test]
    fn test_accepts_exact() {
        let s = sig(2, false);
        assert!(s.accepts(2));
        assert!(!s.accepts(1));
        assert!(!s.accepts(3));
    }

    #[test]
    fn test_accepts_variadic() {
        let s = sig(1, true);
        assert!(!s.accepts(0));
        assert!(s.accepts(1));
        assert!(s.accepts(5));
    }

    #[test]
    fn test_display() {
        let s = sig(2, true);
        assert_eq!(s.to_string(), "f(p0, p1, ...)");
    }

    #[test]
    fn test_has_return_value() {
        assert!(!sig(0, false).has_return_value());
        let s = FunctionSignature::new("g", vec![], CfaType::int());
        assert!(s.has_return_value());
    }
}
