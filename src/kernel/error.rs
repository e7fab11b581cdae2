use thiserror::Error;

use crate::kernel::memory::ScopeId;
use crate::kernel::values::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown type: `{0}`")]
    UnknownType(String),

    #[error("cannot resolve `{head}` while resolving `{name}`")]
    UnresolvedTarget { head: String, name: String },

    #[error("scope {0} was released")]
    ReleasedScope(ScopeId),

    #[error("`{0}` is not callable")]
    NotCallable(String),

    #[error("`{0}` cannot be indexed")]
    NotIndexable(String),

    #[error("`{0}` is not a valid index")]
    InvalidIndex(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("cannot order {lhs} against {rhs}")]
    Incomparable { lhs: Kind, rhs: Kind },

    #[error("`{0}` does not evaluate to a boolean")]
    NotBoolean(String),

    #[error("`{name}` holds {expected}, cannot store {found}")]
    KindMismatch {
        name: String,
        expected: Kind,
        found: Kind,
    },

    #[error("E_CALL_DEPTH_EXCEEDED: max recursion depth {0} reached")]
    CallDepthExceeded(usize),

    #[error(transparent)]
    Routine(#[from] anyhow::Error),
}
