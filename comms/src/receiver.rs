use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    Align4,
    codec::{self, Deserialize, LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN},
};

/// The receiving end handle of the communication.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    /// Creates a new `OnoReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Sets the maximum body length of the frames this end accepts.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Waits to receive a new message from the inner receiver.
    ///
    /// The length header is checked against the frame cap before `buf` grows. If the
    /// body then can't be read in full, `buf` is released.
    ///
    /// # Arguments
    /// * `buf` - The buffer to use for deserialization, the returned
    ///           `T`'s lifetimes will be tied to this buffer.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure.
    pub async fn recv_into<'buf, T, B>(&mut self, buf: &'buf mut Vec<B>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
        B: Align4,
    {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = usize::try_from(LenType::from_be_bytes(size_buf)).unwrap_or(usize::MAX);
        codec::check_frame_len(len, self.max_frame_len, io::ErrorKind::InvalidData)?;

        let needed_amount = len.div_ceil(size_of::<B>());
        buf.resize(needed_amount, B::zeroed());

        let read = {
            let view: &mut [u8] = bytemuck::cast_slice_mut(buf.as_mut_slice());
            self.rx.read_exact(&mut view[..len]).await
        };

        if let Err(e) = read {
            buf.clear();
            buf.shrink_to_fit();
            return Err(e);
        }

        let frame: &'buf [B] = buf;
        let view: &'buf [u8] = bytemuck::cast_slice(frame);
        T::deserialize(&view[..len])
    }
}
