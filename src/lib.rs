//! # Redis Server Library

pub mod command;
pub mod config;
pub mod conn;
pub mod constants;
pub mod errors;
pub mod expiry;
pub mod keyspace;
#[macro_use]
pub mod macros;
pub mod resp;
pub mod server;
