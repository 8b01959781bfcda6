//! Subcommand handlers

pub mod devices;
pub mod monitor;
pub mod run;
