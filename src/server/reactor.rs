//! Fixed pool of reactor threads
//!
//! Each thread runs a single-threaded runtime with a `LocalSet`; every
//! connection it receives is spawned there and never leaves that thread.

use std::net::TcpStream as StdTcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, error, warn};

use super::connection::{self, ConnectionLimits};
use crate::error::BrokerError;
use crate::session::SessionContext;
use crate::types::BrokerResult;

struct ReactorThread {
    sockets: mpsc::UnboundedSender<StdTcpStream>,
    handle: JoinHandle<()>,
}

pub struct Reactor {
    threads: Vec<ReactorThread>,
    next: AtomicUsize,
}

impl Reactor {
    pub fn start(
        threads: usize,
        ctx: SessionContext,
        limits: ConnectionLimits,
    ) -> BrokerResult<Self> {
        if threads == 0 {
            return Err(BrokerError::Reactor("no reactor threads configured".into()));
        }

        let mut pool = Vec::with_capacity(threads);
        for index in 0..threads {
            let (sockets, incoming) = mpsc::unbounded_channel();
            let runtime = Builder::new_current_thread().enable_all().build()?;
            let ctx = ctx.clone();
            let handle = thread::Builder::new()
                .name(format!("reactor-{index}"))
                .spawn(move || run(index, runtime, incoming, ctx, limits))?;
            pool.push(ReactorThread { sockets, handle });
        }

        Ok(Self {
            threads: pool,
            next: AtomicUsize::new(0),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads.len()
    }

    /// Hands a socket to the next reactor, round-robin.
    pub fn register(&self, socket: StdTcpStream) -> BrokerResult<()> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.threads.len();
        self.threads[index]
            .sockets
            .send(socket)
            .map_err(|_| BrokerError::Reactor(format!("reactor-{index} has stopped")))
    }

    /// A single reactor whose thread has already exited.
    #[cfg(test)]
    pub(crate) fn stopped() -> Self {
        let (sockets, incoming) = mpsc::unbounded_channel();
        drop(incoming);
        Self {
            threads: vec![ReactorThread {
                sockets,
                handle: thread::spawn(|| {}),
            }],
            next: AtomicUsize::new(0),
        }
    }

    /// Stops every reactor and waits for its thread. Blocks.
    pub fn shutdown(self) {
        for (index, thread) in self.threads.into_iter().enumerate() {
            drop(thread.sockets);
            if thread.handle.join().is_err() {
                error!(reactor = index, "reactor thread panicked");
            }
        }
    }
}

fn run(
    index: usize,
    runtime: Runtime,
    mut incoming: mpsc::UnboundedReceiver<StdTcpStream>,
    ctx: SessionContext,
    limits: ConnectionLimits,
) {
    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        while let Some(socket) = incoming.recv().await {
            match TcpStream::from_std(socket) {
                Ok(socket) => {
                    tokio::task::spawn_local(connection::serve(socket, ctx.clone(), limits));
                }
                Err(e) => warn!(reactor = index, "failed to register socket: {e}"),
            }
        }
    });
    // Connections still open are dropped with the LocalSet.
    debug!(reactor = index, "reactor stopped");
}
