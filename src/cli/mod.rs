//! Command-line front end: `serve` a demo peer over stdio, or `call` a
//! method on a spawned peer.

mod cli_app;
pub mod demo;

pub use cli_app::{run_cli, Cli, Command};
