//! Matricula Core - Shared types library.
//!
//! This crate provides the types shared by the enrollment console crates:
//! - `console` - Session store, permission resolver and REST client
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no logging. Permission resolution itself lives here because it
//! is a pure lookup over two tables.
//!
//! # Modules
//!
//! - [`types`] - Identities, credentials, roles, permissions and grant tables

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
