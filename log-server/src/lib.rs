//! Bounded command log served over a line-oriented TCP protocol.
//!
//! Clients send newline-terminated commands. A plain line is appended to a
//! fixed-capacity ring of entries that overwrites its oldest entry when
//! full; a line of the form `AESDCHAR_IOCSEEKTO:<index>,<offset>` moves the
//! session's read cursor instead. After every command the server replies
//! with the log content from the cursor to the end.
//!
//! - [`store`] holds the ring of entries.
//! - [`offset`] translates between global byte offsets and entry positions.
//! - [`accumulator`] assembles commands from partial reads.
//! - [`command`] tells seeks from writes.
//! - [`service`] serializes access to the ring for all sessions.
//! - [`session`] runs the per-connection exchange loop.
//! - [`registry`] tracks, reaps and drains session workers.
//! - [`server`] accepts connections and handles shutdown.
//! - [`cli`] parses the command-line interface into a [`cli::ServerConfig`].
//! - [`error`] defines the failure types.

pub mod accumulator;
pub mod cli;
pub mod command;
pub mod error;
pub mod offset;
pub mod registry;
pub mod server;
pub mod service;
pub mod session;
pub mod store;
