//! Subcommand handlers.

pub mod config_cmd;
pub mod display;
pub mod watch;
pub mod weather;
