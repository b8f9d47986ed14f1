use padrelay_common::tracing;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::controller::ControllerError;
use crate::handshake::{self, HandshakeError};
use crate::macro_engine::MacroEngine;
use crate::session::ClientSession;
use crate::DaemonState;

/// Why a connection never became a session
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("could not open controller: {0}")]
    Controller(#[from] ControllerError),
}

/// TCP listener that turns authenticated connections into sessions
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<DaemonState>,
}

impl RelayServer {
    /// Bind `address` with the given listen backlog
    pub fn bind(address: SocketAddr, backlog: u32, state: Arc<DaemonState>) -> io::Result<Self> {
        let socket = match address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(address)?;
        let listener = socket.listen(backlog)?;

        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until shutdown is requested. The socket is closed on return.
    pub async fn run(self) {
        match self.local_addr() {
            Ok(address) => info!("Listening on {}", address),
            Err(e) => warn!("Listening on unknown address: {}", e),
        }

        let engine = MacroEngine::new(Arc::clone(&self.state.macros));

        loop {
            tokio::select! {
                connection = self.listener.accept() => {
                    match connection {
                        Ok((stream, peer)) => {
                            debug!("Connection from {}", peer);
                            let state = Arc::clone(&self.state);
                            let engine = engine.clone();
                            task::spawn(async move {
                                if let Err(e) = handle_client(stream, peer, state, engine).await {
                                    warn!("Rejected {}: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
                _ = self.state.control.cancelled() => {
                    info!("Shutting down listener");
                    break;
                }
            }
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: Arc<DaemonState>,
    engine: MacroEngine,
) -> Result<(), ConnectionError> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }

    tokio::time::timeout(state.handshake_timeout, handshake::server_handshake(&mut stream))
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout)??;
    info!("Client {} authenticated", peer);

    let controller = state.controllers.open().await?;
    let session = ClientSession::new(peer, state.session.clone());
    session
        .run(stream, engine, controller, Arc::clone(&state.control))
        .await;

    Ok(())
}
