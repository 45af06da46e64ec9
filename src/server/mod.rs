//! Buffer server
//!
//! An async acceptor hands each accepted socket to one of a fixed pool of
//! reactor threads, which owns it until it closes.

mod connection;
mod reactor;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::session::SessionContext;
use crate::stream::StreamRegistry;
use crate::types::BrokerResult;

pub use connection::ConnectionLimits;
pub use reactor::Reactor;

pub struct BufferServer {
    listener: TcpListener,
    registry: Arc<StreamRegistry>,
    reactor: Reactor,
}

impl BufferServer {
    /// Binds the listener and starts the reactor threads.
    pub async fn bind(config: BrokerConfig) -> BrokerResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        let registry = Arc::new(StreamRegistry::new());
        let reactor = Reactor::start(
            config.reactor_threads,
            SessionContext::new(Arc::clone(&registry), &config),
            ConnectionLimits::from(&config),
        )?;

        info!(
            addr = %listener.local_addr()?,
            reactors = config.reactor_threads,
            "buffer server listening"
        );
        Ok(Self {
            listener,
            registry,
            reactor,
        })
    }

    pub fn local_addr(&self) -> BrokerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<StreamRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until `shutdown` resolves, then stops the
    /// reactors. Open connections are closed with them.
    pub async fn run_until<F>(self, shutdown: F) -> BrokerResult<()>
    where
        F: Future<Output = ()>,
    {
        let BufferServer {
            listener,
            registry,
            reactor,
        } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        if let Err(e) = socket.set_nodelay(true) {
                            debug!(peer = %peer, "failed to set TCP_NODELAY: {e}");
                        }
                        match hand_off(&reactor, socket) {
                            Ok(()) => debug!(peer = %peer, "accepted connection"),
                            Err(e) => warn!(peer = %peer, "dropping connection: {e}"),
                        }
                    }
                    Err(e) => warn!("accept failed: {e}"),
                },
            }
        }

        info!("shutting down");
        drop(listener);
        tokio::task::spawn_blocking(move || reactor.shutdown())
            .await
            .map_err(|e| BrokerError::Reactor(e.to_string()))?;

        match serde_json::to_string(&registry.stats()) {
            Ok(streams) => info!(%streams, "buffer server stopped"),
            Err(e) => warn!("failed to serialize stream stats: {e}"),
        }
        Ok(())
    }
}

/// Moves an accepted socket onto a reactor thread. A failure only costs
/// this connection.
fn hand_off(reactor: &Reactor, socket: TcpStream) -> BrokerResult<()> {
    reactor.register(socket.into_std()?)
}
