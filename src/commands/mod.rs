//! Command implementations for the CLI
//!
//! This module contains the implementation of all CLI commands:
//! - start: Start the gateway server
//! - stop: Stop a running instance
//! - reload: Reload configuration
//! - test: Test configuration validity

pub mod oauth;
pub mod reload;
pub mod start;
pub mod stats;
pub mod stop;
pub mod test;
