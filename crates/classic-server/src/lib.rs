//! Classic protocol server.
//!
//! [`ClientSession`] is our end of one accepted client connection; it decodes
//! client-to-server frames into [`ServerHandler`] upcalls and exposes the
//! server-to-client operations through [`ClientConnection`].
//!
//! [`Server::bind`] + [`Server::run`] accept TCP connections and drive one
//! session task per client; [`serve`] is the spawn-and-forget variant that
//! returns a handle. The factory passed in runs once per client, when that
//! client's handshake reaches steady state, and the handler it returns gets a
//! `ready` upcall as its cue to send world info and the level.

#![forbid(unsafe_code)]

mod session;

pub use classic_core::{ClientConnection, ServerHandler, SessionInfo};
pub use session::ClientSession;

use std::{io, net::SocketAddr, sync::Arc};

use classic_core::ServerHandlerFactory;
use tokio::{net::TcpListener, task::JoinHandle};

/// Shared per-server factory: invoked once per accepted client.
type SharedFactory = Arc<dyn Fn(&SessionInfo) -> Box<dyn ServerHandler> + Send + Sync>;

/// A bound Classic server.
///
/// Owns the listener and the handler factory. [`Self::run`] accepts
/// connections forever, spawning one task per client; sessions do not share
/// mutable state, so nothing here is behind a lock.
pub struct Server {
    listener: TcpListener,
    factory: SharedFactory,
}

impl Server {
    /// Bind a listener on `host:port`.
    pub async fn bind<F>(factory: F, host: &str, port: u16) -> io::Result<Self>
    where
        F: Fn(&SessionInfo) -> Box<dyn ServerHandler> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind((host, port)).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(Self { listener, factory: Arc::new(factory) })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections and drive their frame loops until the listener
    /// fails or the task is cancelled.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tracing::info!(%peer, "client connected");

            let factory = Arc::clone(&self.factory);
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                let session_factory: ServerHandlerFactory =
                    Box::new(move |info| (*factory)(info));
                let mut session = ClientSession::new(reader, writer, session_factory);
                if let Err(err) = session.run().await {
                    tracing::debug!(%peer, %err, "session ended on error");
                }
                tracing::info!(%peer, "client disconnected");
            });
        }
    }
}

/// Handle to a server spawned by [`serve`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. In-flight sessions run until their streams
    /// close.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

/// Bind on `host:port` and spawn the accept loop in the background.
pub async fn serve<F>(factory: F, host: &str, port: u16) -> io::Result<ServerHandle>
where
    F: Fn(&SessionInfo) -> Box<dyn ServerHandler> + Send + Sync + 'static,
{
    let server = Server::bind(factory, host, port).await?;
    let local_addr = server.local_addr()?;
    let task = tokio::spawn(server.run());
    Ok(ServerHandle { local_addr, task })
}
