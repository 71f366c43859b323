//! User records and their JSON array representation.
//!
//! This module provides:
//! - The typed user schema shared with the identity-provider host
//! - Record codecs translating between raw JSON elements and records
//! - A streaming reader that yields one array element at a time
//! - An in-memory array buffer for writes
//!
//! # Architecture
//! Files are a single top-level JSON array. Reads never hold more than one
//! element in memory; writes accumulate the whole array before it is
//! flushed by the caller.

pub mod buffer;
pub mod codec;
pub mod stream;
pub mod user;

pub use buffer::{ArrayBuffer, Layout};
pub use codec::{RawCodec, RawRecord, RecordCodec, UserCodec};
pub use stream::ElementReader;
pub use user::{AttrSet, IdentityKind, IdentitySource, Metadata, User};
