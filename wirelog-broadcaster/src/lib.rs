//! Process-embedded TCP log broadcaster
//!
//! This crate streams a process's diagnostic output to connected TCP
//! clients in real time. It installs as a `tracing` layer (or any other
//! logging facility via [`Broadcaster::handle_record`]), renders each
//! record into a fixed-width text line, and fans the lines out to every
//! client from a single network task. The host never blocks on network I/O
//! to emit a log record.
//!
//! # Features
//!
//! - Plain TCP line stream (default port 6001), no handshake or framing
//!   beyond CRLF — `nc host 6001` is a complete client
//! - Self-toggling interception: activates on the first client connection,
//!   deactivates when the last one leaves; zero formatting cost while idle
//! - Single network task owns the listener and every client socket
//! - Bounded, mutex-guarded line queue between emitters and the network
//!   task; oldest lines are dropped if the consumer stalls
//! - Bind failure degrades to a no-op broadcaster instead of failing the
//!   hosting process
//!
//! # Wire format
//!
//! ```text
//! <severity:9 left><basename:15 left><line:5 right> <message>\r\n
//! ```
//!
//! Severity labels are `debug`, `info`, `warning`, `critical`, `fatal`.
//!
//! # Example
//!
//! ```no_run
//! use tracing_subscriber::prelude::*;
//! use wirelog_broadcaster::{Broadcaster, BroadcasterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let broadcaster = Broadcaster::start(BroadcasterConfig::default()).await;
//!
//!     tracing_subscriber::registry()
//!         .with(tracing_subscriber::fmt::layer())
//!         .with(broadcaster.layer())
//!         .init();
//!
//!     // Emitted while a client is connected, this reaches every client:
//!     tracing::warn!("disk low");
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod error;
pub mod layer;
pub mod queue;
pub mod record;

// Re-exports
pub use broadcaster::{Broadcaster, BroadcasterConfig, DEFAULT_PORT};
pub use error::{BroadcasterError, Result};
pub use layer::BroadcastLayer;
pub use record::{LogRecord, Severity};
