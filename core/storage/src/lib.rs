//! Filesystem layer for the JSON IdP plugin.
//!
//! This module answers "can this operation touch this path?" before a
//! session starts, and replaces files atomically when a session closes.
//!
//! # Design Principles
//! - Validation is advisory and side-effect free
//! - OS permission checks sit behind the [`AccessCheck`] trait, one
//!   implementation picked per platform
//! - Writes never leave a half-written destination behind

pub mod access;
pub mod atomic;
pub mod validator;

pub use access::{platform_access, AccessCheck, ModeBitsAccess};
#[cfg(unix)]
pub use access::PosixAccess;
pub use atomic::write_atomic;
pub use validator::PathValidator;
