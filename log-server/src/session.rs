//! One worker per connection.
//!
//! A [`SessionWorker`] owns its stream, its partially received command and
//! its read cursor. The shared [`Session`] record is what the registry sees.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::{
    accumulator::{CommandAccumulator, Feed},
    command::Command,
    error::CommandError,
    service::LogService,
};

pub type SessionId = u64;

/// Bytes requested from the stream per raw read.
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// Lifecycle of one connection, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Accepted = 0,
    Processing = 1,
    Closing = 2,
    Done = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Accepted,
            1 => SessionState::Processing,
            2 => SessionState::Closing,
            _ => SessionState::Done,
        }
    }
}

/// Identity and lifecycle of one connection.
///
/// The worker owns the stream; everyone else (the registry in particular)
/// only holds this shared record to observe progress.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: Option<SocketAddr>,
    state: AtomicU8,
}

impl Session {
    pub fn new(id: SessionId, peer: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer,
            state: AtomicU8::new(SessionState::Accepted as u8),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_complete(&self) -> bool {
        self.state() == SessionState::Done
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Publishes `Done` when dropped, so an aborted or panicking worker still
/// completes its session.
#[derive(Debug)]
struct CompletionGuard(Arc<Session>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.set_state(SessionState::Done);
    }
}

/// Drives one connection: receive a command, apply it to the log, reply with
/// the log content from the session cursor, repeat until the peer leaves.
pub struct SessionWorker<S> {
    completion: CompletionGuard,
    stream: S,
    log: Arc<LogService>,
    accumulator: CommandAccumulator,
    cursor: usize,
    read_buffer: usize,
    exchanges: u64,
}

impl<S> SessionWorker<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(session: Arc<Session>, stream: S, log: Arc<LogService>) -> Self {
        Self {
            completion: CompletionGuard(session),
            stream,
            log,
            accumulator: CommandAccumulator::new(),
            cursor: 0,
            read_buffer: DEFAULT_READ_BUFFER,
            exchanges: 0,
        }
    }

    pub fn with_read_buffer(mut self, size: usize) -> Self {
        self.read_buffer = size.max(1);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.completion.0
    }

    /// Runs the session to completion. An `Err` is an I/O failure on the
    /// stream; command failures never end the session.
    pub async fn run(mut self) -> Result<()> {
        let session = Arc::clone(self.session());
        session.set_state(SessionState::Processing);

        let result = self.process().await;

        session.set_state(SessionState::Closing);
        if let Err(error) = self.stream.shutdown().await {
            debug!(session = session.id(), ?error, "failed to shut down stream cleanly");
        }
        info!(
            session = session.id(),
            peer = ?session.peer(),
            exchanges = self.exchanges,
            "closed connection"
        );
        result
    }

    async fn process(&mut self) -> Result<()> {
        let mut buffer = vec![0u8; self.read_buffer];
        loop {
            let received = self
                .stream
                .read(&mut buffer)
                .await
                .context("failed to receive from client")?;
            if received == 0 {
                let pending = self.accumulator.pending_len();
                if pending > 0 {
                    debug!(
                        session = self.session().id(),
                        pending, "peer closed mid-command, discarding partial command"
                    );
                }
                return Ok(());
            }

            let command = match self.accumulator.feed(&buffer[..received]) {
                Ok(Feed::Incomplete) => continue,
                Ok(Feed::Complete { command, discarded }) => {
                    if discarded > 0 {
                        warn!(
                            session = self.session().id(),
                            discarded,
                            "dropping bytes after line feed; pipelined commands are not supported"
                        );
                    }
                    command
                }
                Err(err) => {
                    self.report(&CommandError::from(err));
                    continue;
                }
            };

            let reply = match self.dispatch(&command).await {
                Ok(reply) => reply,
                Err(err) => {
                    self.report(&err);
                    Vec::new()
                }
            };
            self.stream
                .write_all(&reply)
                .await
                .context("failed to send reply")?;
            self.stream.flush().await.context("failed to flush reply")?;
            self.exchanges += 1;
        }
    }

    async fn dispatch(&mut self, line: &[u8]) -> Result<Vec<u8>, CommandError> {
        let command = Command::parse(line)?;
        let reply = self.log.apply_and_read(command, &mut self.cursor).await?;
        match command {
            Command::Write(bytes) => {
                debug!(session = self.session().id(), bytes = bytes.len(), "appended command");
            }
            Command::Seek { index, offset } => {
                debug!(
                    session = self.session().id(),
                    index,
                    offset,
                    cursor = self.cursor,
                    "moved cursor"
                );
            }
        }
        Ok(reply)
    }

    fn report(&self, err: &CommandError) {
        warn!(
            session = self.session().id(),
            error = %err,
            retryable = err.is_retryable(),
            "command failed, replying with nothing"
        );
    }
}

/// Serves one connection outside any registry, for callers that manage
/// their own tasks.
pub async fn handle_connection<S>(stream: S, log: Arc<LogService>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = Arc::new(Session::new(0, None));
    SessionWorker::new(session, stream, log).run().await
}
