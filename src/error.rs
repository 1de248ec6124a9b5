// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! Crate-wide error type.
//!
//! Configuration and topology
//! errors are fatal at assembly/construction time, type mismatches and user
//! panics are fatal to the worker that observed them and trigger a graceful
//! shutdown, queue overflow is recovered silently (it never reaches this
//! type), and external shutdown is cooperative (also never an `Error`).

use std::fmt;

/// Everything that can go wrong building or running a graph.
#[derive(Debug)]
pub enum Error {
    /// Bad arity, missing type on an endpoint, duplicate connection, or a
    /// multi-to-multi connection attempt. Fatal at assembly time.
    Configuration(String),
    /// A cycle was detected while computing the layer ordering. Fatal at
    /// `ExecutionGraph` construction.
    Topology(String),
    /// A method's `execute` returned a tuple whose arity did not match its
    /// declared `produces`.
    TypeMismatch {
        method: &'static str,
        expected: usize,
        got: usize,
    },
    /// The user callable returned an `Err` or panicked.
    UserMethod {
        method: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The user callable panicked; the payload is the panic message if it
    /// could be downcast to a `String` or `&str`.
    Panicked { method: &'static str, payload: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Error::Topology(msg) => write!(f, "topology error: {msg}"),
            Error::TypeMismatch {
                method,
                expected,
                got,
            } => write!(
                f,
                "method `{method}` returned {got} record(s), expected {expected}"
            ),
            Error::UserMethod { method, source } => {
                write!(f, "method `{method}` failed: {source}")
            }
            Error::Panicked { method, payload } => {
                write!(f, "method `{method}` panicked: {payload}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::UserMethod { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Crate-wide result alias, matching the shape exported at the root of this
/// lineage's `glommio::Result`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
