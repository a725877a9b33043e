//! Collection session orchestration.
//!
//! A [`CollectionSession`] validates its configuration, performs the
//! handshake, starts the server message listener and then runs the tail
//! loop, all under one cancellation token. Either side may cancel it: the
//! listener when the server goes away, the caller when the operator stops
//! collection.

mod error;
mod session;

pub use error::SessionError;
pub use session::{CollectionSession, SessionConfig, SessionSummary, StopReason};
