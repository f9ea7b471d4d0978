//! Command-line front end over the submission model, store and engine.

pub mod cli;
pub mod cmd;
