//! CLI command handlers
//!
//! Each subcommand lives in its own module and prints JSON on stdout.

pub mod helpers;
pub mod report;
pub mod reset;
pub mod rubric;
pub mod run;
pub mod status;
