#![forbid(unsafe_code)]

pub mod config;
pub mod learned;
pub mod metrics;
pub mod understand;
