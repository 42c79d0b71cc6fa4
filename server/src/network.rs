//! Server network layer accepting TCP connections

use crate::auth::UserStore;
use crate::config::SessionConfig;
use crate::connection;
use crate::session::SessionOrchestrator;
use crate::words::WordBank;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Listening server. Every accepted connection runs on its own task and
/// shares the session and the credential store.
pub struct Server {
    listener: TcpListener,
    session: Arc<SessionOrchestrator>,
    users: Arc<UserStore>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: SessionConfig,
        words: WordBank,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            session: Arc::new(SessionOrchestrator::new(config, words)),
            users: Arc::new(UserStore::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn session(&self) -> Arc<SessionOrchestrator> {
        Arc::clone(&self.session)
    }

    pub fn users(&self) -> Arc<UserStore> {
        Arc::clone(&self.users)
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(self) -> std::io::Result<()> {
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Client connecting from {}", addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        error!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }

                    let session = Arc::clone(&self.session);
                    let users = Arc::clone(&self.users);
                    tokio::spawn(async move {
                        connection::serve(stream, session, users).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}
