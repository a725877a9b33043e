//! TCP channel between the collector and the collection server.
//!
//! One connection carries everything: a plaintext handshake, then status
//! lines from the server on the read half and a continuous zlib stream of
//! log lines on the write half.
//!
//! # Wire format
//!
//! See the [`wire`] module for the byte layout.

pub mod client;
pub mod error;
pub mod listener;
pub mod server;
pub mod uploader;
pub mod wire;

pub use client::{HandshakeClient, HandshakeOptions, SessionHandle};
pub use error::DataChannelError;
pub use listener::{ListenerExit, ServerMessageListener};
pub use uploader::CompressingUploader;

use std::time::Duration;

/// Port the collection server listens on.
pub const DEFAULT_PORT: u16 = 8124;

/// TCP read buffer size and compressed-output drain threshold (64 KB).
pub const TCP_BUFFER_SIZE: usize = 64 * 1024;

/// Default timeout for the TCP connection attempt.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the server's handshake reply.
pub const HANDSHAKE_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest text line accepted from the server (64 KB).
pub const MAX_SERVER_LINE_LEN: usize = 64 * 1024;

/// Longest uploader name the reference server reads.
pub const MAX_UPLOADER_NAME_LEN: usize = 256;
