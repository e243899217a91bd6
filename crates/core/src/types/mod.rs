//! Core types for the enrollment console.
//!
//! This module provides type-safe wrappers for identities, credentials and
//! the role/permission vocabulary.

pub mod grants;
pub mod id;
pub mod identity;
pub mod mfa;
pub mod permission;
pub mod role;

pub use grants::{PermissionMatrix, RolePermissionMap, resolve, static_fallback};
pub use id::*;
pub use identity::{AuthenticatedSession, Credential, Identity};
pub use mfa::{SecondFactorCode, SecondFactorCodeError};
pub use permission::{Operation, PermissionName, PermissionParseError, Resource};
pub use role::{Permission, Role};
