//! Classic protocol client.
//!
//! [`ServerSession`] is our end of a connection to a remote world server. It
//! decodes server-to-client frames into [`ClientHandler`] upcalls and exposes
//! the client-to-server operations through [`ServerConnection`].
//!
//! [`connect`] opens the TCP stream and builds the session; the caller sends
//! the login hello and then drives the frame loop:
//!
//! ```no_run
//! use classic_client::{ClientHandler, connect};
//!
//! struct Quiet;
//! impl ClientHandler for Quiet {}
//!
//! # async fn run() -> std::io::Result<()> {
//! let mut session = connect(|_info| Box::new(Quiet), "play.example.net", 25565).await?;
//! let _ = session.login("Alice", "secret").await;
//! let _ = session.run().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod session;

pub use classic_core::{ClientHandler, ServerConnection, SessionInfo};
pub use session::ServerSession;

use std::io;

use tokio::net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

/// A [`ServerSession`] over a TCP stream.
pub type TcpServerSession = ServerSession<OwnedReadHalf, OwnedWriteHalf>;

/// Open a TCP connection to a world server and build a session around it.
///
/// The returned session has not spoken yet: call [`ServerSession::login`] and
/// then [`ServerSession::run`] to drive the frame loop. The factory runs once,
/// when the server's identification arrives.
pub async fn connect<F>(factory: F, host: &str, port: u16) -> io::Result<TcpServerSession>
where
    F: FnOnce(&SessionInfo) -> Box<dyn ClientHandler> + Send + 'static,
{
    let stream = TcpStream::connect((host, port)).await?;
    let (reader, writer) = stream.into_split();
    tracing::debug!(host, port, "connected");
    Ok(ServerSession::new(reader, writer, Box::new(factory)))
}
