//! Undertone Control - command-line front end for the analysis orchestrator.
//!
//! Exposed as a library so argument handling can be tested.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;
