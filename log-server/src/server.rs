use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{info, warn};

use crate::{cli::ServerConfig, registry::ConnectionRegistry, service::LogService};

/// Cooperative stop signal for a running [`Server`].
///
/// Cloning is cheap and every clone triggers the same server. Triggering
/// more than once has no further effect.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Stops accepting connections and drains every session.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Accepts connections and hands each one to the session registry.
pub struct Server {
    listener: TcpListener,
    log: Arc<LogService>,
    config: ServerConfig,
    shutdown: ShutdownHandle,
}

impl Server {
    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        let log = Arc::new(LogService::new(config.capacity, config.lock_timeout));
        Self {
            listener,
            log,
            config,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The log shared by every session of this server.
    pub fn log(&self) -> Arc<LogService> {
        Arc::clone(&self.log)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serves until [`ShutdownHandle::shutdown`] is called.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `signal` completes or the shutdown handle fires, then
    /// drains every session before returning.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            log,
            config,
            shutdown,
        } = self;
        let mut registry = ConnectionRegistry::new(log).with_read_buffer(config.read_buffer);
        let mut stop = shutdown.subscribe();
        let mut reap_tick = interval(config.reap_interval.max(Duration::from_millis(1)));
        reap_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(signal);

        loop {
            select! {
                _ = &mut signal => {
                    info!("shutdown signal received");
                    break;
                }
                _ = shutdown_requested(&mut stop) => {
                    info!("shutdown requested");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &mut registry);
                }
                _ = reap_tick.tick() => {
                    registry.reap().await;
                }
            }
        }

        // No new connections from here on.
        drop(listener);
        shutdown.shutdown();

        let report = registry.drain(config.shutdown_grace).await;
        info!(
            joined = report.joined,
            aborted = report.aborted,
            "server stopped"
        );
        Ok(())
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run_until_signal(self) -> Result<()> {
        self.run_until(termination_signal()).await
    }
}

async fn shutdown_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|requested| *requested).await;
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &mut ConnectionRegistry,
) {
    match result {
        Ok((stream, peer)) => {
            let id = registry.spawn(stream, Some(peer));
            info!(session = id, %peer, "accepted connection");
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                select! {
                    result = tokio::signal::ctrl_c() => log_ctrl_c(result),
                    _ = terminate.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                warn!(error = ?err, "failed to install SIGTERM handler");
                log_ctrl_c(tokio::signal::ctrl_c().await);
            }
        }
    }

    #[cfg(not(unix))]
    {
        log_ctrl_c(tokio::signal::ctrl_c().await);
    }
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("received SIGINT"),
        Err(err) => warn!(error = ?err, "failed to install ctrl-c handler"),
    }
}
