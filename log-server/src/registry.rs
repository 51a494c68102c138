//! Bookkeeping for live session workers.
//!
//! The acceptor spawns every worker through [`ConnectionRegistry::spawn`] and
//! calls [`ConnectionRegistry::reap`] on each tick of its loop, so a finished
//! session lingers for at most one tick. On shutdown
//! [`ConnectionRegistry::drain`] joins whatever is left. Nothing here depends
//! on sockets: any `AsyncRead + AsyncWrite` stream can be registered.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{debug, info, warn};

use crate::{
    service::LogService,
    session::{DEFAULT_READ_BUFFER, Session, SessionId, SessionWorker},
};

/// How often `drain` re-checks workers while waiting out the grace period.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct SessionRecord {
    session: Arc<Session>,
    handle: JoinHandle<()>,
}

impl SessionRecord {
    async fn join(self) {
        let id = self.session.id();
        match self.handle.await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => debug!(session = id, "session worker aborted"),
            Err(err) => warn!(session = id, error = ?err, "session worker panicked"),
        }
    }
}

/// What `drain` had to do to stop every worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub joined: usize,
    pub aborted: usize,
}

pub struct ConnectionRegistry {
    log: Arc<LogService>,
    sessions: HashMap<SessionId, SessionRecord>,
    next_id: SessionId,
    read_buffer: usize,
}

impl ConnectionRegistry {
    pub fn new(log: Arc<LogService>) -> Self {
        Self {
            log,
            sessions: HashMap::new(),
            next_id: 1,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }

    pub fn with_read_buffer(mut self, size: usize) -> Self {
        self.read_buffer = size;
        self
    }

    /// Starts a worker for `stream` and records it.
    pub fn spawn<S>(&mut self, stream: S, peer: Option<SocketAddr>) -> SessionId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let session = Arc::new(Session::new(id, peer));
        let worker = SessionWorker::new(Arc::clone(&session), stream, Arc::clone(&self.log))
            .with_read_buffer(self.read_buffer);
        let handle = tokio::spawn(async move {
            if let Err(err) = worker.run().await {
                warn!(session = id, ?peer, error = ?err, "session closed with error");
            }
        });

        self.sessions.insert(id, SessionRecord { session, handle });
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|record| Arc::clone(&record.session))
    }

    /// Joins and forgets every session that has finished. Returns how many
    /// were reaped.
    pub async fn reap(&mut self) -> usize {
        let finished: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, record)| record.session.is_complete())
            .map(|(id, _)| *id)
            .collect();

        for id in &finished {
            if let Some(record) = self.sessions.remove(id) {
                record.join().await;
            }
        }

        if !finished.is_empty() {
            debug!(
                reaped = finished.len(),
                live = self.sessions.len(),
                "reaped finished sessions"
            );
        }
        finished.len()
    }

    /// Joins every remaining worker.
    ///
    /// Workers get `grace` to finish their current exchange; any still
    /// running afterwards (typically blocked on a receive) are aborted, which
    /// drops their stream, and then joined.
    pub async fn drain(&mut self, grace: Duration) -> DrainReport {
        let records: Vec<SessionRecord> = self.sessions.drain().map(|(_, record)| record).collect();
        if records.is_empty() {
            return DrainReport::default();
        }
        info!(sessions = records.len(), "draining sessions");

        let deadline = Instant::now() + grace;
        while records.iter().any(|record| !record.handle.is_finished()) && Instant::now() < deadline
        {
            sleep(DRAIN_POLL_INTERVAL).await;
        }

        let mut report = DrainReport {
            joined: records.len(),
            aborted: 0,
        };
        for record in &records {
            if !record.handle.is_finished() {
                record.handle.abort();
                report.aborted += 1;
            }
        }
        join_all(records.into_iter().map(SessionRecord::join)).await;
        report
    }
}
