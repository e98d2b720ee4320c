//! trisend server library
//!
//! This library exposes the daemon's modules for integration testing.

pub mod args;
pub mod config;
pub mod connection_tracker;
pub mod constants;
pub mod db;
pub mod http;
pub mod identity;
pub mod logging;
pub mod ssh;
pub mod transfers;
