//! CLI module for the compositing tool

mod config;
#[path = "main.rs"]
mod main_impl;
mod progress;

pub use main_impl::{main, Cli, CliBackground};
