//! The on-air frame types.
//!
//! Every datagram is at most [`MTU`] bytes long: a big-endian CRC-16/XMODEM
//! over all remaining bytes, then (for sequenced frames) a big-endian
//! sequence number, then the payload.

use crate::crc::LINK_CRC16;
use crate::decode::{Decode, DecodeError, DecodeErrorKind};
use crate::encode::Encode;

/// The largest datagram either transceiver will carry.
pub const MTU: usize = 32;

/// Width of the CRC field in bytes.
pub const CRC_SIZE: usize = 2;

/// Width of the sequence-number field in bytes.
pub const SEQ_NUM_SIZE: usize = 2;

/// End-of-transmission payload of the stop-and-wait variant.
pub const EOT_PAYLOAD: &[u8] = b"ENDOFTRANSMISSION";

/// Prefix of the burst end-of-transmission payload. The bytes that follow it
/// name the sender's text encoding, e.g. `TeamB_EOT-UTF-8`.
pub const BURST_EOT_PREFIX: &[u8] = b"TeamB_EOT-";

/// Session-start handshake literals. Reserved: current sessions start
/// unsolicited and no state machine sends these.
pub const HELLO: &[u8] = b"HELLO";
pub const HELLO_ACK: &[u8] = b"HELLOACK";

const ACK_TAG: &[u8] = b"ACK";
const ERROR_TAG: &[u8] = b"ERROR";

/// Consumes and verifies the leading CRC field.
///
/// On success the cursor is left at the first byte after the CRC, which is
/// exactly the span the checksum was computed over.
fn verify_crc<T>(data: &mut &[u8]) -> Result<(), DecodeError> {
    let value = u16::decode(data).map_err(|_| DecodeError::new::<T>(DecodeErrorKind::UnexpectedEnd))?;
    let expected = LINK_CRC16.checksum(*data);
    if value != expected {
        return Err(DecodeError::new::<T>(DecodeErrorKind::Checksum {
            value,
            expected,
        }));
    }
    Ok(())
}

/// A sequenced data frame: `CRC ‖ SEQ ‖ PAYLOAD`.
///
/// Used for every stop-and-wait frame and for the burst variant's alignment
/// frame. Sequence numbers start at 1 and advance monotonically within a
/// session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub seq: u16,
    pub payload: Vec<u8>,
}

impl DataFrame {
    pub fn new(seq: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            seq,
            payload: payload.into(),
        }
    }

    /// Whether this frame carries the end-of-transmission marker.
    pub fn is_eot(&self) -> bool {
        self.payload == EOT_PAYLOAD
    }
}

impl Encode for DataFrame {
    fn size(&self) -> usize {
        CRC_SIZE + SEQ_NUM_SIZE + self.payload.len()
    }

    fn encode(&self, data: &mut [u8]) {
        let size = self.size();
        self.seq.encode(&mut data[CRC_SIZE..]);
        self.payload.encode(&mut data[CRC_SIZE + SEQ_NUM_SIZE..]);
        LINK_CRC16.checksum(&data[CRC_SIZE..size]).encode(data);
    }
}

impl Decode for DataFrame {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        verify_crc::<Self>(data)?;
        let seq = u16::decode(data)?;
        let payload = data.to_vec();
        *data = &[];
        Ok(Self { seq, payload })
    }
}

/// An unsequenced burst data frame: `CRC ‖ PAYLOAD`.
///
/// Ordering within a burst window is implicit in transmission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstFrame {
    pub payload: Vec<u8>,
}

impl BurstFrame {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// If this frame is a burst end-of-transmission marker, returns the text
    /// encoding label it declares.
    pub fn eot_encoding(&self) -> Option<String> {
        let label = self.payload.strip_prefix(BURST_EOT_PREFIX)?;
        String::from_utf8(label.to_vec()).ok()
    }
}

impl Encode for BurstFrame {
    fn size(&self) -> usize {
        CRC_SIZE + self.payload.len()
    }

    fn encode(&self, data: &mut [u8]) {
        let size = self.size();
        self.payload.encode(&mut data[CRC_SIZE..]);
        LINK_CRC16.checksum(&data[CRC_SIZE..size]).encode(data);
    }
}

impl Decode for BurstFrame {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        verify_crc::<Self>(data)?;
        let payload = data.to_vec();
        *data = &[];
        Ok(Self { payload })
    }
}

/// The reverse-direction control verdict wrapped in an [`AckFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckTag {
    /// The referenced frame (or window) was accepted.
    Ack,
    /// The referenced frame arrived corrupted; resend.
    Error,
}

impl AckTag {
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            AckTag::Ack => ACK_TAG,
            AckTag::Error => ERROR_TAG,
        }
    }
}

/// An acknowledgement frame: `CRC ‖ SEQ ‖ TAG`.
///
/// In the stop-and-wait variant `seq` names the frame being answered. In the
/// burst variant it is cumulative: the highest contiguous sequence accepted
/// so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFrame {
    pub seq: u16,
    pub tag: AckTag,
}

impl AckFrame {
    pub const fn new(seq: u16, tag: AckTag) -> Self {
        Self { seq, tag }
    }
}

impl Encode for AckFrame {
    fn size(&self) -> usize {
        CRC_SIZE + SEQ_NUM_SIZE + self.tag.as_bytes().len()
    }

    fn encode(&self, data: &mut [u8]) {
        let size = self.size();
        self.seq.encode(&mut data[CRC_SIZE..]);
        self.tag.as_bytes().encode(&mut data[CRC_SIZE + SEQ_NUM_SIZE..]);
        LINK_CRC16.checksum(&data[CRC_SIZE..size]).encode(data);
    }
}

impl Decode for AckFrame {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        verify_crc::<Self>(data)?;
        let seq = u16::decode(data)?;
        let tag = if *data == ACK_TAG {
            AckTag::Ack
        } else if *data == ERROR_TAG {
            AckTag::Error
        } else {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedByte {
                name: "ack tag",
                value: data.first().copied().unwrap_or_default(),
                expected: &[b'A', b'E'],
            }));
        };
        *data = &[];
        Ok(Self { seq, tag })
    }
}
