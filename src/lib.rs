// ABOUTME: Library root for glance-manage
// ABOUTME: Exposes the CLI, config, logging, and migration engine modules

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod migration;
pub mod utils;

pub use app::{run, Outcome};
pub use error::ManageError;
