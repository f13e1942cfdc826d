//! CLI command implementations.

pub mod common;
pub mod complete;
pub mod compress;
pub mod config;
pub mod init;
pub mod rotate;
pub mod serve;
pub mod show;
pub mod simulate;
