#![forbid(unsafe_code)]

pub mod notes_cli;
