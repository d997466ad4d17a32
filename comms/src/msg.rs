use std::{borrow::Cow, io};

use bytemuck::{Pod, Zeroable};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_H: Header = 0;
const CONTROL_H: Header = 1;
const CARRY_H: Header = 2;
const SUM_H: Header = 3;
const ECHO_H: Header = 4;

/// A running total handed from one rank to its neighbour in the chain.
///
/// Used both for scan carries (travelling towards the last rank) and for
/// partial sums (travelling towards the root).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CarryMessage {
    pub value: i64,
    pub origin: u64,
}

impl CarryMessage {
    pub fn new(value: i64, origin: usize) -> Self {
        Self {
            value,
            origin: origin as u64,
        }
    }

    /// The rank that produced this message.
    pub fn origin(&self) -> usize {
        self.origin as usize
    }
}

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Carry(CarryMessage),
    Sum(CarryMessage),
    Echo(u64),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Arrive { rank: usize },
    Release,
}

/// The application layer message for the entire system.
#[derive(Debug, PartialEq, Eq)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name of this message's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Arrive { .. }) => "control/arrive",
            Msg::Control(Command::Release) => "control/release",
            Msg::Data(Payload::Carry(_)) => "data/carry",
            Msg::Data(Payload::Sum(_)) => "data/sum",
            Msg::Data(Payload::Echo(_)) => "data/echo",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(byte: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind byte {byte}"),
        ))
    }

    fn read_pod<T: Pod>(body: &[u8]) -> io::Result<T> {
        if body.len() != size_of::<T>() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Data body has {} bytes, expected {}",
                    body.len(),
                    size_of::<T>()
                ),
            ));
        }

        Ok(bytemuck::pod_read_unaligned(body))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_H.to_be_bytes());
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_H.to_be_bytes());

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, cmd).unwrap();
                None
            }
            Msg::Data(payload) => {
                let (kind, body) = match payload {
                    Payload::Carry(carry) => (CARRY_H, bytemuck::bytes_of(carry)),
                    Payload::Sum(sum) => (SUM_H, bytemuck::bytes_of(sum)),
                    Payload::Echo(seq) => (ECHO_H, bytemuck::bytes_of(seq)),
                };

                buf.extend_from_slice(&kind.to_be_bytes());
                Some(body)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR_H => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL_H => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            CARRY_H => Ok(Self::Data(Payload::Carry(Self::read_pod(rest)?))),
            SUM_H => Ok(Self::Data(Payload::Sum(Self::read_pod(rest)?))),
            ECHO_H => Ok(Self::Data(Payload::Echo(Self::read_pod(rest)?))),
            other => Self::invalid_kind_byte(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg: &Msg<'_>) -> Vec<u8> {
        let mut buf = Vec::new();
        let tail = msg.serialize(&mut buf).map(<[u8]>::to_vec);
        buf.extend(tail.unwrap_or_default());
        buf
    }

    #[test]
    fn carry_keeps_value_and_origin() {
        let msg = Msg::Data(Payload::Carry(CarryMessage::new(-42, 3)));
        let bytes = encode(&msg);

        let Msg::Data(Payload::Carry(carry)) = Msg::deserialize(&bytes).unwrap() else {
            panic!("expected a carry");
        };

        assert_eq!(carry.value, -42);
        assert_eq!(carry.origin(), 3);
    }

    #[test]
    fn control_is_json() {
        let msg = Msg::Control(Command::Arrive { rank: 7 });
        let bytes = encode(&msg);

        assert_eq!(&bytes[HEADER_SIZE..], br#"{"arrive":{"rank":7}}"#);
        assert_eq!(Msg::deserialize(&bytes).unwrap(), msg);
    }

    #[test]
    fn short_data_body_is_rejected() {
        let mut bytes = SUM_H.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0; 5]);

        let err = Msg::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let bytes = 99u32.to_be_bytes();
        assert!(Msg::deserialize(&bytes).is_err());
        assert!(Msg::deserialize(&bytes[..2]).is_err());
    }
}
