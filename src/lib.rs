//! devhost - Vagrant development environment orchestrator.
//!
//! The library drives the `vagrant` CLI for one environment directory:
//! status parsing, halt-then-start restarts, box and guest OS identity,
//! end-of-life checks, and toggling extension provisioners in the
//! environment's configuration document.

pub mod box_info;
pub mod config;
pub mod eol;
pub mod error;
pub mod extensions;
pub mod process;
pub mod restart;
pub mod status;
pub mod util;
pub mod vagrant;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
