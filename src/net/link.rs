//! Server connection and the client event loop
//!
//! One task owns the session and waits on four things at once: bytes from the
//! server, the writer finishing a flush, a local command, and the next
//! engagement deadline. The socket's write half lives in its own task, which
//! reports every finished flush back to the loop.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::app::input::Command;
use crate::app::session::Session;
use crate::app::view::SceneSnapshot;

/// Longest join line the server accepts, newline excluded
pub const MAX_JOIN_LINE: usize = 127;

const READ_CHUNK: usize = 512;

/// Link errors
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("join line must be 1-{max} characters without line breaks", max = MAX_JOIN_LINE)]
    InvalidJoinLine,

    #[error("failed to send join line: {0}")]
    Handshake(#[source] io::Error),

    #[error("writer task failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

/// How the event loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// Our leave was flushed and the connection shut down
    Graceful,
    /// Peer closed, or a read or write failed
    Lost,
}

/// Writer task reports
#[derive(Debug)]
enum WriterEvent {
    Flushed(usize),
    Failed(io::Error),
}

/// A joined connection, ready to run
pub struct Link<R, W> {
    reader: R,
    writer: W,
}

impl Link<OwnedReadHalf, OwnedWriteHalf> {
    /// Open a TCP connection and send the join line
    pub async fn connect(host: &str, port: u16, join_line: &str) -> Result<Self, LinkError> {
        let addr = format!("{host}:{port}");
        info!(addr = %addr, "Connecting");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| LinkError::Connect {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle");
        }

        let (reader, writer) = stream.into_split();
        Link::handshake(reader, writer, join_line).await
    }
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Send the join line over an already open stream
    pub async fn handshake(reader: R, mut writer: W, join_line: &str) -> Result<Self, LinkError> {
        validate_join_line(join_line)?;
        let mut line = Vec::with_capacity(join_line.len() + 1);
        line.extend_from_slice(join_line.as_bytes());
        line.push(b'\n');
        writer.write_all(&line).await.map_err(LinkError::Handshake)?;
        writer.flush().await.map_err(LinkError::Handshake)?;
        debug!(join_line, "Join line sent");
        Ok(Self { reader, writer })
    }

    /// Run until the session leaves or the connection drops. A snapshot goes
    /// out on `redraw` whenever the scene changes, and once at each end.
    pub async fn run(
        self,
        session: &mut Session,
        mut commands: mpsc::Receiver<Command>,
        redraw: broadcast::Sender<SceneSnapshot>,
    ) -> Result<Disconnect, LinkError> {
        let Self { mut reader, writer } = self;

        let (chunk_tx, chunk_rx) = mpsc::channel::<Bytes>(1);
        let (event_tx, mut event_rx) = mpsc::channel::<WriterEvent>(1);
        let writer_handle = tokio::spawn(write_loop(writer, chunk_rx, event_tx));

        session.set_status("Connected");
        publish(&redraw, session);

        let mut inbound = BytesMut::with_capacity(READ_CHUNK);
        let outcome = loop {
            if let Some(chunk) = session.take_outbound() {
                trace!(bytes = chunk.len(), "Flushing");
                if chunk_tx.send(chunk).await.is_err() {
                    break Disconnect::Lost;
                }
            }
            if session.exit_ready() {
                break Disconnect::Graceful;
            }

            let deadline = session.next_deadline();
            tokio::select! {
                read = reader.read_buf(&mut inbound) => match read {
                    Ok(0) => {
                        info!("Server closed the connection");
                        break Disconnect::Lost;
                    }
                    Ok(n) => {
                        trace!(bytes = n, buffered = inbound.len(), "Read");
                        if session.process_input(&mut inbound) {
                            publish(&redraw, session);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Read failed");
                        break Disconnect::Lost;
                    }
                },
                Some(event) = event_rx.recv() => match event {
                    WriterEvent::Flushed(n) => {
                        trace!(bytes = n, "Flush complete");
                        session.flush_complete();
                    }
                    WriterEvent::Failed(e) => {
                        warn!(error = %e, "Write failed");
                        break Disconnect::Lost;
                    }
                },
                Some(command) = commands.recv() => {
                    if session.handle_command(command, Instant::now()) {
                        publish(&redraw, session);
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if session.run_engagements(Instant::now()) {
                        publish(&redraw, session);
                    }
                }
                else => break Disconnect::Lost,
            }
        };

        // Closing the chunk channel tells the writer to shut the stream down
        drop(chunk_tx);
        match outcome {
            Disconnect::Graceful => {
                writer_handle.await?;
                info!("Left the game");
                session.disconnect("Disconnected");
            }
            Disconnect::Lost => {
                writer_handle.abort();
                warn!("Connection lost");
                session.disconnect("Connection lost");
            }
        }
        publish(&redraw, session);
        Ok(outcome)
    }
}

/// Write chunks in order, acknowledging each; shut down when the loop hangs up
async fn write_loop<W>(
    mut writer: W,
    mut chunks: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<WriterEvent>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = chunks.recv().await {
        let result = async {
            writer.write_all(&chunk).await?;
            writer.flush().await
        }
        .await;

        let event = match result {
            Ok(()) => WriterEvent::Flushed(chunk.len()),
            Err(e) => WriterEvent::Failed(e),
        };
        let failed = matches!(event, WriterEvent::Failed(_));
        if events.send(event).await.is_err() || failed {
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Shutdown failed");
    }
}

fn validate_join_line(line: &str) -> Result<(), LinkError> {
    let ok = !line.is_empty()
        && line.len() <= MAX_JOIN_LINE
        && !line.contains(&['\n', '\r'][..]);
    ok.then_some(()).ok_or(LinkError::InvalidJoinLine)
}

fn publish(redraw: &broadcast::Sender<SceneSnapshot>, session: &Session) {
    // No subscribers is fine
    let _ = redraw.send(session.snapshot());
}
