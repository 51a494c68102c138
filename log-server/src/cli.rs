use std::{net::SocketAddr, time::Duration};

use clap::{Parser, builder::TypedValueParser};

use crate::{service::DEFAULT_LOCK_TIMEOUT, session::DEFAULT_READ_BUFFER, store::DEFAULT_CAPACITY};

/// Largest accepted `--capacity`.
pub const MAX_CAPACITY: u64 = 1 << 20;

/// Largest accepted `--read-buffer`, in bytes.
pub const MAX_READ_BUFFER: u64 = 16 << 20;

/// Serve a bounded command log over TCP.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:9000")]
    pub listen: SocketAddr,

    /// Number of commands retained before the oldest is overwritten.
    #[arg(
        long,
        default_value_t = DEFAULT_CAPACITY,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CAPACITY).try_map(|n: u64| usize::try_from(n))
    )]
    pub capacity: usize,

    /// Bytes requested from a client socket per read.
    #[arg(
        long,
        default_value_t = DEFAULT_READ_BUFFER,
        value_parser = clap::value_parser!(u64).range(1..=MAX_READ_BUFFER).try_map(|n: u64| usize::try_from(n))
    )]
    pub read_buffer: usize,

    /// Milliseconds between sweeps that reap finished sessions.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub reap_interval_ms: u64,

    /// Milliseconds a command waits for the log lock before failing.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT.as_millis() as u64)]
    pub lock_timeout_ms: u64,

    /// Milliseconds sessions get to finish on shutdown before being aborted.
    #[arg(long, default_value_t = 1000)]
    pub shutdown_grace_ms: u64,
}

/// Runtime settings for [`Server`](crate::server::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub capacity: usize,
    pub read_buffer: usize,
    pub reap_interval: Duration,
    pub lock_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            read_buffer: DEFAULT_READ_BUFFER,
            reap_interval: Duration::from_millis(100),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl From<&Cli> for ServerConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            capacity: cli.capacity,
            read_buffer: cli.read_buffer,
            reap_interval: Duration::from_millis(cli.reap_interval_ms),
            lock_timeout: Duration::from_millis(cli.lock_timeout_ms),
            shutdown_grace: Duration::from_millis(cli.shutdown_grace_ms),
        }
    }
}
