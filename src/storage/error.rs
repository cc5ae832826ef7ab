use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::table::TableState;

/// The result type of every fallible operation of the dense table.
pub type Result<T> = std::result::Result<T, TableErr>;

/// Errors surfaced by a `DenseTable` and its collaborators.
///
/// Everything but `SizeMismatch` and `Closed` is a precondition violation, it
/// means the table was misconfigured or driven outside of its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TableErr {
    AlreadyInitialized,
    NotRunning {
        state: TableState,
    },
    ConflictingLearningRate {
        previous: f32,
        name: String,
        value: f32,
    },
    NoEligibleParameters,
    MissingVariable {
        name: String,
    },
    ShapeMismatch {
        name: String,
        got: usize,
        expected: usize,
    },
    SizeMismatch {
        got: usize,
        expected: usize,
    },
    Closed,
    Threads(String),
}

impl Display for TableErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableErr::AlreadyInitialized => f.write_str("the dense table was already initialized"),
            TableErr::NotRunning { state } => {
                write!(f, "the dense table is not running, current state: {state:?}")
            }
            TableErr::ConflictingLearningRate {
                previous,
                name,
                value,
            } => write!(
                f,
                "learning rate already set to {previous}, variable {name} holds {value}"
            ),
            TableErr::NoEligibleParameters => {
                f.write_str("no parameter matched the asynchronous update conventions")
            }
            TableErr::MissingVariable { name } => {
                write!(f, "variable {name} not found in the source store")
            }
            TableErr::ShapeMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "variable {name} has {got} elements, expected {expected}"
            ),
            TableErr::SizeMismatch { got, expected } => write!(
                f,
                "the provided buffer length {got} doesn't match the table size {expected}"
            ),
            TableErr::Closed => f.write_str("the dense table was closed during the operation"),
            TableErr::Threads(reason) => {
                write!(f, "couldn't start the update threads: {reason}")
            }
        }
    }
}

impl Error for TableErr {}

/// Boundary conversion for binaries / I/O APIs.
impl From<TableErr> for io::Error {
    fn from(value: TableErr) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}
