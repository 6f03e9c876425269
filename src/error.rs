use thiserror::Error;

macro_rules! inconsistency {
    // Single string version
    ($msg:expr) => {
        crate::Error::Inconsistency {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Inconsistency {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into three tiers with distinct handling contracts:
///
/// # User-Input Errors
///
/// Problems in the material handed over by the front end. They abort the current
/// translation with a descriptive message and never mutate a previously sealed
/// automaton.
///
/// - [`Error::FunctionCall`] - A call site does not match the callee's signature
/// - [`Error::UnresolvedEntry`] - The designated entry function does not exist
///
/// # Internal-Invariant Violations
///
/// Defects in the core itself, detected by the consistency checker or by a
/// structural transformation. They are fatal and must never be retried or
/// swallowed, since continuing would silently produce a wrong automaton.
///
/// - [`Error::Inconsistency`] - A structural invariant does not hold; carries the
///   source location of the detection site
/// - [`Error::GraphError`] - Arena misuse such as a stale handle or an occupied
///   summary-edge slot
///
/// # Cancellation
///
/// - [`Error::Cancelled`] - The cooperative cancellation signal was raised; this
///   preempts both tiers above and propagates without wrapping
///
/// # Examples
///
/// ```rust
/// use flowscope::{Error, MachineModel, CfaBuilder};
///
/// let mut builder = CfaBuilder::new(MachineModel::Lp64);
/// match builder.set_entry_function("main") {
///     Err(Error::UnresolvedEntry(name)) => {
///         eprintln!("no such function: {}", name);
///     }
///     Err(e) => eprintln!("other error: {}", e),
///     Ok(()) => {}
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A call site does not match the callee's declared signature.
    ///
    /// Raised by the supergraph assembler when the argument count of a call
    /// disagrees with the callee's parameter list (accounting for variadics).
    /// The assembler validates every call site before mutating anything, so
    /// this error guarantees that no edges were touched.
    #[error("function call error - {0}")]
    FunctionCall(String),

    /// The designated entry function was not found among the known functions.
    ///
    /// The associated value is the requested function name.
    #[error("entry function '{0}' is not known")]
    UnresolvedEntry(String),

    /// A structural invariant of the automaton does not hold.
    ///
    /// This is a fatal defect in the core. The message contains the printable
    /// form of the offending node or edge together with its source location,
    /// intended for logs and maintainers rather than programmatic recovery.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Inconsistency - {file}:{line}: {message}")]
    Inconsistency {
        /// The message to be printed for the Inconsistency error
        message: String,
        /// The source file in which this error was detected
        file: &'static str,
        /// The source line in which this error was detected
        line: u32,
    },

    /// Misuse of the node/edge arena.
    ///
    /// Covers stale or foreign handles, attempts to attach a second summary
    /// edge to an occupied slot, and removal of elements that are still
    /// referenced.
    #[error("{0}")]
    GraphError(String),

    /// The cooperative cancellation signal was raised.
    ///
    /// Long-running passes poll the signal at every work-list iteration and
    /// unwind with this error without committing a partial automaton.
    #[error("the operation was cancelled")]
    Cancelled,
}
