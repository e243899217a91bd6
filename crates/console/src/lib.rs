//! Matricula console core.
//!
//! The session and permission machinery behind the enrollment admin console:
//!
//! - [`session::SessionStore`] signs users in (federated identity provider or
//!   username/password, optionally followed by a second factor), persists the
//!   session and restores it on start-up.
//! - [`permissions::PermissionResolver`] answers "may the current user do
//!   `operation` on `resource`?" from the backend's role table, falling back
//!   to a built-in table for roles the backend does not describe.
//! - [`admin::RoleAdmin`] edits role grants.
//! - [`Console`] wires the three together.
//!
//! Screens, tables and forms are not part of this crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod admin;
pub mod api;
pub mod config;
pub mod console;
pub mod error;
pub mod permissions;
pub mod provider;
pub mod session;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use console::Console;
pub use error::ConsoleError;
