use std::{borrow::Cow, io};

use crate::{Deserialize, Rank, Serialize, snapshot::OptimizerSnapshot};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();
const FIELD_SIZE: usize = size_of::<u32>();

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// Asks the store to apply `gradient` to the tensor under `key` on behalf of `rank`.
    Apply {
        rank: Rank,
        lr_scale: f32,
        key: &'a str,
        weights: &'a [f32],
        gradient: &'a [f32],
    },
    /// The store's answer to an `Apply`.
    Update {
        weights: &'a [f32],
        gradient: &'a [f32],
    },
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Fetch,
    Snapshot(OptimizerSnapshot),
    StepSchedule,
    ScheduleStepped { step: u64 },
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    fn buf_is_too_small<T>(size: usize, needed: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {needed} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind byte {kind}"),
        ))
    }
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn split_u32(buf: &[u8]) -> io::Result<(u32, &[u8])> {
    if buf.len() < FIELD_SIZE {
        return Msg::buf_is_too_small(buf.len(), FIELD_SIZE);
    }

    let (field, rest) = buf.split_at(FIELD_SIZE);

    // SAFETY: We splitted the buffer to be of size `FIELD_SIZE` just above.
    let value = u32::from_be_bytes(field.try_into().unwrap());
    Ok((value, rest))
}

fn cast_nums(buf: &[u8]) -> io::Result<&[f32]> {
    bytemuck::try_cast_slice(buf).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Couldn't read {} bytes as f32s: {e:?}", buf.len()),
        )
    })
}

fn parse_str(buf: &[u8]) -> io::Result<&str> {
    str::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                push_u32(buf, 0);
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                push_u32(buf, 1);

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::Data(Payload::Apply {
                rank,
                lr_scale,
                key,
                weights,
                gradient,
            }) => {
                push_u32(buf, 2);
                push_u32(buf, *rank);
                push_u32(buf, lr_scale.to_bits());
                // Longer tensors can't fit under the sender's frame cap.
                push_u32(buf, weights.len() as u32);
                push_u32(buf, gradient.len() as u32);
                buf.extend_from_slice(bytemuck::cast_slice(weights));
                buf.extend_from_slice(bytemuck::cast_slice(gradient));
                Some(key.as_bytes())
            }
            Msg::Data(Payload::Update { weights, gradient }) => {
                push_u32(buf, 3);
                push_u32(buf, weights.len() as u32);
                buf.extend_from_slice(bytemuck::cast_slice(weights));
                Some(bytemuck::cast_slice(gradient))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len(), HEADER_SIZE);
        }

        let (kind, rest) = split_u32(buf)?;

        match kind {
            0 => {
                let string = parse_str(rest)?;
                Ok(Self::Err(Cow::Borrowed(string)))
            }
            1 => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            2 => {
                let (rank, rest) = split_u32(rest)?;
                let (lr_bits, rest) = split_u32(rest)?;
                let (nweights, rest) = split_u32(rest)?;
                let (ngrad, rest) = split_u32(rest)?;

                let nweights = nweights as usize;
                let nums_len = (nweights + ngrad as usize) * size_of::<f32>();

                if rest.len() < nums_len {
                    return Self::buf_is_too_small(rest.len(), nums_len);
                }

                let (nums, key) = rest.split_at(nums_len);
                let (weights, gradient) = cast_nums(nums)?.split_at(nweights);

                let payload = Payload::Apply {
                    rank,
                    lr_scale: f32::from_bits(lr_bits),
                    key: parse_str(key)?,
                    weights,
                    gradient,
                };

                Ok(Self::Data(payload))
            }
            3 => {
                let (nweights, rest) = split_u32(rest)?;
                let nweights = nweights as usize;
                let nums = cast_nums(rest)?;

                if nums.len() < nweights {
                    return Self::buf_is_too_small(rest.len(), nweights * size_of::<f32>());
                }

                let (weights, gradient) = nums.split_at(nweights);
                Ok(Self::Data(Payload::Update { weights, gradient }))
            }
            kind => Self::invalid_kind_byte(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{self, AsyncWriteExt};

    use super::*;
    use crate::{
        channel,
        snapshot::{Algorithm, OptimizerSnapshot},
    };

    #[tokio::test]
    async fn test_apply_crosses_the_wire_intact() {
        let (left, right) = io::duplex(4096);
        let (_, tx) = io::split(left);
        let (rx, _) = io::split(right);
        let (mut rx, _) = channel(rx, io::sink());
        let (_, mut tx) = channel(io::empty(), tx);

        let weights = [0.5, -1.0, 2.0];
        let gradient = [0.25, 0.0, -4.0];
        let msg = Msg::Data(Payload::Apply {
            rank: 3,
            lr_scale: 0.5,
            key: "layer.0.W",
            weights: &weights,
            gradient: &gradient,
        });
        tx.send(&msg).await.unwrap();

        let mut buf: Vec<u32> = Vec::new();
        match rx.recv_into(&mut buf).await.unwrap() {
            Msg::Data(Payload::Apply {
                rank,
                lr_scale,
                key,
                weights: w,
                gradient: g,
            }) => {
                assert_eq!(rank, 3);
                assert_eq!(lr_scale, 0.5);
                assert_eq!(key, "layer.0.W");
                assert_eq!(w, weights);
                assert_eq!(g, gradient);
            }
            msg => panic!("expected Apply, got {msg:?}"),
        }
    }

    #[tokio::test]
    async fn test_control_and_update_share_a_connection() {
        let (left, right) = io::duplex(4096);
        let (_, tx) = io::split(left);
        let (rx, _) = io::split(right);
        let (mut rx, _) = channel(rx, io::sink());
        let (_, mut tx) = channel(io::empty(), tx);

        let snapshot = OptimizerSnapshot::new(Algorithm::GradientDescent, 0.1).with_schedule(2, 0.05);
        tx.send(&Msg::Control(Command::Snapshot(snapshot.clone())))
            .await
            .unwrap();

        let weights = [1.0; 4];
        let gradient: [f32; 0] = [];
        tx.send(&Msg::Data(Payload::Update {
            weights: &weights,
            gradient: &gradient,
        }))
        .await
        .unwrap();

        let mut buf: Vec<u32> = Vec::new();
        match rx.recv_into(&mut buf).await.unwrap() {
            Msg::Control(Command::Snapshot(got)) => assert_eq!(got, snapshot),
            msg => panic!("expected Snapshot, got {msg:?}"),
        }

        match rx.recv_into(&mut buf).await.unwrap() {
            Msg::Data(Payload::Update { weights: w, gradient: g }) => {
                assert_eq!(w, weights);
                assert!(g.is_empty());
            }
            msg => panic!("expected Update, got {msg:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_apply_is_rejected() {
        let (left, right) = io::duplex(4096);
        let (_, mut raw) = io::split(left);
        let (rx, _) = io::split(right);
        let (mut rx, _) = channel(rx, io::sink());

        // kind, rank, lr_scale, nweights = 8, ngrad = 8 and no tensor data at all.
        let mut body = Vec::new();
        for field in [2u32, 0, 1f32.to_bits(), 8, 8] {
            body.extend_from_slice(&field.to_be_bytes());
        }

        raw.write_all(&(body.len() as u64).to_be_bytes()).await.unwrap();
        raw.write_all(&body).await.unwrap();

        let mut buf: Vec<u32> = Vec::new();
        let err = rx.recv_into::<Msg, _>(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let (left, right) = io::duplex(64);
        let (_, mut raw) = io::split(left);
        let (rx, _) = io::split(right);
        let (mut rx, _) = channel(rx, io::sink());

        raw.write_all(&4u64.to_be_bytes()).await.unwrap();
        raw.write_all(&9u32.to_be_bytes()).await.unwrap();

        let mut buf: Vec<u32> = Vec::new();
        let err = rx.recv_into::<Msg, _>(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
