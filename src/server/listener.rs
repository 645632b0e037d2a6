//! TCP listener

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::catalog::Catalog;
use crate::executor::QueryExecutor;

use super::handler::Connection;
use super::{Settings, ShutdownSignal};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepts client connections and spawns one handler task per socket
pub struct Server {
    addr: SocketAddr,
    settings: Settings,
    catalog: Arc<RwLock<Catalog>>,
    executor: Arc<dyn QueryExecutor>,
    shutdown: ShutdownSignal,
    next_connection_id: AtomicU32,
}

impl Server {
    pub fn new(
        addr: SocketAddr,
        settings: Settings,
        catalog: Arc<RwLock<Catalog>>,
        executor: Arc<dyn QueryExecutor>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            addr,
            settings,
            catalog,
            executor,
            shutdown,
            next_connection_id: AtomicU32::new(1),
        }
    }

    /// Get the configured listen address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind and serve until the process ends
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "server listening");

        loop {
            let (socket, peer_addr) = listener.accept().await?;
            self.spawn_connection(socket, peer_addr);
        }
    }

    /// Serve an already-bound listener until the shutdown signal fires
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (socket, peer_addr) = result?;
                    self.spawn_connection(socket, peer_addr);
                }
                _ = &mut shutdown_rx => {
                    tracing::info!("server shutting down");
                    // in-flight connections observe this in their idle polls
                    self.shutdown.trigger();
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%peer_addr, connection_id, "client connected");

        let connection = Connection::new(
            socket,
            connection_id,
            self.settings.clone(),
            self.catalog.clone(),
            self.executor.clone(),
            self.shutdown.clone(),
        );
        tokio::spawn(connection.run());
    }
}

/// Server handle for testing
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub shutdown_tx: oneshot::Sender<()>,
}

impl ServerHandle {
    /// Shutdown the server
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Start a server on an ephemeral loopback port for testing
pub async fn start_test_server(
    settings: Settings,
    catalog: Arc<RwLock<Catalog>>,
    executor: Arc<dyn QueryExecutor>,
) -> Result<ServerHandle, ServerError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let server = Server::new(addr, settings, catalog, executor, ShutdownSignal::new());

    tokio::spawn(async move {
        if let Err(e) = server.serve_with_shutdown(listener, shutdown_rx).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle { addr, shutdown_tx })
}
