//! Command-line interface
//!
//! Argument definitions and command handlers for the `quickdraw` binary.

pub mod args;
pub mod commands;
