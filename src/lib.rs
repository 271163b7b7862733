//! `vx`: scaffolds, removes and initializes app packages inside a JavaScript monorepo.

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod operations;
