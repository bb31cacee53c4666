//! The framing shared by both ends of a connection.
//!
//! A frame is a big-endian `LenType` holding the body length, followed by the body.
//! Bodies are capped so a single header can't make a peer allocate without bound.

use std::io;

pub(crate) type LenType = u64;
pub(crate) const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// The default maximum body length of a frame, 256 MiB.
///
/// Fits a tensor of 32M `f32`s along with its gradient.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Writes a message into an outgoing frame.
pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The frame buffer, already holding the length prefix.
    ///
    /// # Returns
    /// An optional trailing slice to be written right after `buf` without copying it.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}

/// Reads a message out of the body of a received frame, borrowing from it where possible.
///
/// `buf` is exactly one frame body, never more than the receiver's frame cap.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}

/// Fails with `kind` if a frame body of `len` bytes doesn't fit under `max`.
pub(crate) fn check_frame_len(len: usize, max: usize, kind: io::ErrorKind) -> io::Result<()> {
    if len > max {
        let text = format!("frame of {len} bytes exceeds the maximum of {max}");
        return Err(io::Error::new(kind, text));
    }

    Ok(())
}
