//! Workers in another process reach their store over a connection.

use std::io;

use comms::{
    OnoReceiver, OnoSender, Rank,
    msg::{Command, Msg, Payload},
    snapshot::OptimizerSnapshot,
};
use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use super::RemoteStore;
use crate::error::{Result, WorkerErr};

const STARTING_RX_BUF_SIZE: usize = 1024;

/// The client end of a connection to a store's server.
///
/// Calls are sent one at a time and each waits for its own reply. Replies carry no
/// request id, so once a call is abandoned before its reply arrives, or fails on the
/// transport, the connection can't tell whose reply comes next and every later call
/// fails with `Transport`.
pub struct RemoteClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    rx_buf: Vec<u32>,
    in_flight: bool,
}

impl RemoteClient<OwnedReadHalf, OwnedWriteHalf> {
    /// Connects to a store's server.
    ///
    /// # Arguments
    /// * `addr` - Where the server listens.
    ///
    /// # Returns
    /// A new `RemoteClient` or a `Transport` error if the connection can't be made.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        Ok(Self::new(rx, tx))
    }
}

impl<R, W> RemoteClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `RemoteClient` over an already established channel.
    ///
    /// # Arguments
    /// * `rx` - The receiving end of the communication.
    /// * `tx` - The sending end of the communication.
    pub fn new(rx: OnoReceiver<R>, tx: OnoSender<W>) -> Self {
        Self {
            rx,
            tx,
            rx_buf: vec![0; STARTING_RX_BUF_SIZE],
            in_flight: false,
        }
    }

    /// Whether an earlier call left the connection without a known reply order.
    pub fn is_poisoned(&self) -> bool {
        self.in_flight
    }

    /// Marks a call as started, failing if the previous one never completed.
    fn begin(in_flight: &mut bool) -> Result<()> {
        if *in_flight {
            let e = io::Error::new(
                io::ErrorKind::BrokenPipe,
                "an earlier call on this connection never got its reply",
            );
            return Err(WorkerErr::Transport(e));
        }

        *in_flight = true;
        Ok(())
    }

    /// Turns the outcome of sending a request into the call's error, if any.
    ///
    /// A request refused by the sender's frame cap never reached the wire, so the
    /// connection stays usable.
    fn sent(res: io::Result<()>, in_flight: &mut bool) -> Result<()> {
        match res {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                *in_flight = false;
                Err(WorkerErr::Rejected(e.to_string()))
            }
            Err(e) => Err(WorkerErr::Transport(e)),
        }
    }

    /// Tells the server this worker is done and waits for it to agree.
    pub async fn disconnect(mut self) -> Result<()> {
        Self::begin(&mut self.in_flight)?;
        self.tx.send(&Msg::Control(Command::Disconnect)).await?;

        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Control(Command::Disconnect) => {
                debug!("disconnected from the store");
                Ok(())
            }
            msg => Err(unexpected(msg)),
        }
    }

    async fn control(&mut self, cmd: Command) -> Result<Command> {
        let Self {
            rx,
            tx,
            rx_buf,
            in_flight,
        } = self;

        Self::begin(in_flight)?;
        Self::sent(tx.send(&Msg::Control(cmd)).await, in_flight)?;

        match rx.recv_into(rx_buf).await? {
            Msg::Control(cmd) => {
                *in_flight = false;
                Ok(cmd)
            }
            Msg::Err(e) => {
                *in_flight = false;
                Err(WorkerErr::Rejected(e.into_owned()))
            }
            msg => Err(unexpected(msg)),
        }
    }
}

impl<R, W> RemoteStore for RemoteClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn apply(
        &mut self,
        rank: Rank,
        key: &str,
        weights: &[f32],
        gradient: &[f32],
        lr_scale: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        let Self {
            rx,
            tx,
            rx_buf,
            in_flight,
        } = self;

        Self::begin(in_flight)?;
        let msg = Msg::Data(Payload::Apply {
            rank,
            lr_scale,
            key,
            weights,
            gradient,
        });
        Self::sent(tx.send(&msg).await, in_flight)?;

        match rx.recv_into(rx_buf).await? {
            Msg::Data(Payload::Update { weights, gradient }) => {
                *in_flight = false;
                Ok((weights.to_vec(), gradient.to_vec()))
            }
            Msg::Err(e) => {
                *in_flight = false;
                Err(WorkerErr::Rejected(e.into_owned()))
            }
            msg => Err(unexpected(msg)),
        }
    }

    async fn fetch(&mut self) -> Result<OptimizerSnapshot> {
        match self.control(Command::Fetch).await? {
            Command::Snapshot(snapshot) => Ok(snapshot),
            cmd => Err(unexpected(Msg::Control(cmd))),
        }
    }

    async fn step_schedule(&mut self) -> Result<u64> {
        match self.control(Command::StepSchedule).await? {
            Command::ScheduleStepped { step } => Ok(step),
            cmd => Err(unexpected(Msg::Control(cmd))),
        }
    }
}

fn unexpected(msg: Msg<'_>) -> WorkerErr {
    WorkerErr::UnexpectedMessage {
        got: format!("{msg:?}"),
    }
}
