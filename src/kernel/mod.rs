// src/kernel/mod.rs
pub mod boolops;
pub mod coerce;
pub mod config;
pub mod error;
mod eval;
pub mod input;
mod instance;
pub mod memory;
pub mod routine;
pub mod text;
pub mod values;

pub use coerce::{Deferral, Raw};
pub use config::Config;
pub use error::{Error, Result};
pub use memory::{Memory, ScopeId};
pub use routine::{ExprRoutine, Routine};
pub use values::{Data, Kind, ObjectRef, Payload};
