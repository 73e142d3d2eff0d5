//! SASL Channel Implementation in Rust
//!
//! A safe, sans-io implementation of the authenticated, optionally encrypted
//! point-to-point channel used between a distributed-filesystem client and a
//! remote service: challenge/response authentication negotiation followed by
//! AES-CTR stream encryption of all payload bytes in both directions.
//!
//! The transport layer owns sockets and message framing; this crate owns the
//! negotiation state machine and the cipher session. No call blocks on I/O.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod cipher;
pub mod codec;
pub mod error;
pub mod session;

pub use error::{Error, Result};
pub use session::SaslSession;
