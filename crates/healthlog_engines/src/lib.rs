#![forbid(unsafe_code)]

pub mod cache;
pub mod canon;
pub mod disambig;
pub mod gate;
pub mod merge;
pub mod model_adapter;
pub mod ontology;
pub mod rules;
pub mod timeparse;
