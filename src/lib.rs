//! Runtime scope tree and dynamic values for the Alany language.
//!
//! [`Memory`] owns every scope; [`Data`] is the coerced value stored in them.
//! Parsing and statement execution live elsewhere and plug in through
//! [`Routine`].
pub mod kernel;

pub use kernel::{Config, Data, Deferral, Error, ExprRoutine, Kind, Memory, ObjectRef, Payload, Raw, Routine, ScopeId};
