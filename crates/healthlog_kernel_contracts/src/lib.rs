#![forbid(unsafe_code)]

pub mod common;
pub mod model;
pub mod notes;
pub mod parse;

pub use common::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};
