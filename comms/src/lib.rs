mod align;
mod codec;
pub mod msg;
mod receiver;
mod sender;
pub mod snapshot;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use align::{Align1, Align4};
pub use codec::{Deserialize, MAX_FRAME_LEN, Serialize};
pub use receiver::OnoReceiver;
pub use sender::OnoSender;

/// Identifies a worker within a training run.
pub type Rank = u32;

/// Names one parameter tensor, stable for the lifetime of a training run.
pub type WeightKey = String;

/// Creates both `OnoReceiver` and `OnoSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication.
/// Both ends refuse frames longer than `MAX_FRAME_LEN`.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of an ono receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (OnoReceiver::new(rx), OnoSender::new(tx))
}
