use std::time::Duration;

use crate::frame::{CRC_SIZE, MTU, SEQ_NUM_SIZE};

/// Protocol tunables for one transfer session.
///
/// These are the knobs both nodes must agree on. Radio hardware options
/// (channels, pipe addresses, power, bitrate, CE/CSN pins) belong to the
/// [`RadioPort`](crate::port::RadioPort) implementation, not here.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Payload bytes carried per data frame. Must leave room for the CRC and
    /// sequence fields within the 32-byte MTU; 27, 28 and 30 are the values
    /// used in the field.
    pub data_size: usize,

    /// Data frames transmitted back-to-back before the burst sender stops
    /// for a cumulative acknowledgement.
    pub burst_size: usize,

    /// How long the receiver listens for a data frame before polling again.
    pub data_timeout: Duration,

    /// How long the sender waits for an acknowledgement before
    /// retransmitting.
    pub ack_timeout: Duration,

    /// How long the burst sender waits for the alignment frame's
    /// acknowledgement. The observed setups give this exchange a longer
    /// deadline than the in-session acknowledgement waits.
    pub align_timeout: Duration,

    /// Compression level handed to the external archiver pre-step.
    pub compression_level: u32,

    /// Text-encoding label declared in the burst end-of-transmission marker.
    pub encoding: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            data_size: 28,
            burst_size: 20,
            data_timeout: Duration::from_millis(10),
            ack_timeout: Duration::from_millis(10),
            align_timeout: Duration::from_millis(30),
            compression_level: 6,
            encoding: "UTF-8".into(),
        }
    }
}

impl LinkConfig {
    /// The largest payload a sequenced frame can carry within the MTU.
    pub const fn max_data_size() -> usize {
        MTU - CRC_SIZE - SEQ_NUM_SIZE
    }
}
