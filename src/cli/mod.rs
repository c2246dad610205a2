//! Command line interface module
//!
//! Argument parsing and the runner that maps each subcommand onto a
//! [`crate::registry::RegistryClient`] call, rendering batch progress through
//! the [`crate::logging::Logger`].

pub mod args;
pub mod runner;

pub use args::{Args, Command};
pub use runner::Runner;
