//! The sending end of a store connection.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::{self, LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN, Serialize};

/// What the frame buffer is shrunk back to after refusing a frame.
const RETAINED_BUF_SIZE: usize = 4096;

/// The sending end handle of the communication.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    /// Creates a new `OnoSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Sets the maximum body length of the frames this end sends, at most `u32::MAX`.
    ///
    /// It should not exceed the peer's receiving cap, frames over that are refused there.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len.min(u32::MAX as usize);
        self
    }

    /// Sends `msg` as a single frame.
    ///
    /// A frame over the cap is refused before any byte is written, so the connection
    /// stays usable afterwards. Since the cap is never above `u32::MAX` bytes, every
    /// tensor length that makes it to the wire fits in a `u32`.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// An `InvalidInput` error if the frame is too long, or the underlying `io::Error`.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self {
            tx,
            buf,
            max_frame_len,
        } = self;

        buf.clear();
        buf.resize(LEN_TYPE_SIZE, 0);

        let tail = msg.serialize(buf);
        let len = buf.len() - LEN_TYPE_SIZE + tail.map_or(0, <[_]>::len);

        if let Err(e) = codec::check_frame_len(len, *max_frame_len, io::ErrorKind::InvalidInput) {
            buf.clear();
            buf.shrink_to(RETAINED_BUF_SIZE);
            return Err(e);
        }

        buf[..LEN_TYPE_SIZE].copy_from_slice(&(len as LenType).to_be_bytes());
        tx.write_all(buf).await?;

        if let Some(tail) = tail {
            tx.write_all(tail).await?;
        }

        tx.flush().await
    }
}
