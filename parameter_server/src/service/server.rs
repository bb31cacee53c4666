use std::{borrow::Cow, future::Future, io, time::Duration};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{error::StoreErr, storage::StoreHandle};

const STARTING_RX_BUF_SIZE: usize = 1024;

/// How long to wait before accepting again after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A source of worker connections.
pub trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Waits for the next worker to connect.
    ///
    /// # Returns
    /// The worker's stream and a printable address, or the `io::Error` that failed
    /// this accept. Later accepts may still succeed.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, addr) = TcpListener::accept(self).await?;
        stream.set_nodelay(true)?;
        Ok((stream, addr.to_string()))
    }
}

/// Exposes a store to remote workers, one connection per worker.
///
/// A failed accept is logged and retried, only cancelling `shutdown` stops the loop.
///
/// # Arguments
/// * `listener` - Where workers connect to.
/// * `handle` - The store to expose.
/// * `shutdown` - Stops accepting and drops every connection once cancelled.
pub async fn serve<L: Acceptor>(mut listener: L, handle: StoreHandle, shutdown: CancellationToken) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("worker connected from {addr}");

                    let (rx, tx) = tokio::io::split(stream);
                    let (rx, tx) = comms::channel(rx, tx);
                    tasks.spawn(serve_connection(handle.clone(), rx, tx));
                }
                Err(e) => {
                    warn!("failed to accept a worker connection: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(res) = tasks.join_next(), if !tasks.is_empty() => match res {
                Ok(Ok(())) => debug!("worker connection closed"),
                Ok(Err(e)) => warn!("worker connection failed: {e}"),
                Err(e) => warn!("worker connection task panicked: {e}"),
            },
        }
    }

    info!(store = handle.name(); "shutting down, dropping {} connections", tasks.len());
    tasks.shutdown().await;
}

/// Answers a single worker's calls until it disconnects.
///
/// Calls on a connection are answered in the order they arrive.
///
/// # Arguments
/// * `handle` - The store to forward calls to.
/// * `rx` - The receiving end of the worker's connection.
/// * `tx` - The sending end of the worker's connection.
///
/// # Returns
/// An `io::Error` if the connection breaks or the store stops.
pub async fn serve_connection<R, W>(
    handle: StoreHandle,
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut rx_buf: Vec<u32> = vec![0; STARTING_RX_BUF_SIZE];

    loop {
        let msg = match rx.recv_into(&mut rx_buf).await {
            Ok(msg) => msg,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("worker hung up without disconnecting");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match msg {
            Msg::Data(Payload::Apply {
                rank,
                lr_scale,
                key,
                weights,
                gradient,
            }) => match handle.apply(rank, key, weights, gradient, lr_scale).await {
                Ok((weights, gradient)) => {
                    let msg = Msg::Data(Payload::Update {
                        weights: &weights,
                        gradient: &gradient,
                    });
                    tx.send(&msg).await?;
                }
                Err(e @ StoreErr::SizeMismatch { .. }) => {
                    let msg = Msg::Err(Cow::Owned(e.to_string()));
                    tx.send(&msg).await?;
                }
                Err(e) => return Err(io::Error::other(e)),
            },
            Msg::Control(Command::Fetch) => {
                let snapshot = handle.fetch().await.map_err(io::Error::other)?;
                tx.send(&Msg::Control(Command::Snapshot(snapshot))).await?;
            }
            Msg::Control(Command::StepSchedule) => {
                let step = handle.step_schedule().await.map_err(io::Error::other)?;
                tx.send(&Msg::Control(Command::ScheduleStepped { step })).await?;
            }
            Msg::Control(Command::Disconnect) => {
                tx.send(&Msg::Control(Command::Disconnect)).await?;
                return Ok(());
            }
            msg => {
                let text = format!("unexpected message from worker: {msg:?}");
                warn!("{text}");
                tx.send(&Msg::Err(Cow::Owned(text))).await?;
            }
        }
    }
}
