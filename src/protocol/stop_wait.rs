//! The stop-and-wait variant: one frame in the air at a time.
//!
//! The sender transmits a chunk, waits up to the acknowledgement timeout,
//! and retransmits until the chunk is answered. The receiver acknowledges
//! every well-formed frame it accepts, answers corruption with an `ERROR`
//! verdict, and re-acknowledges the previous chunk when its answer was lost
//! on the way back. A final `ENDOFTRANSMISSION` frame closes the session.

use log::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::decode::Decode;
use crate::encode::Encode;
use crate::frame::{AckFrame, AckTag, DataFrame, EOT_PAYLOAD};
use crate::port::{RadioError, RadioPort};

use super::{await_ack, TransferError, RETRY_LIMIT};

/// Drives the sending side of a stop-and-wait session.
pub struct StopWaitSender<'a, P: RadioPort> {
    config: &'a LinkConfig,
    port: &'a mut P,
}

impl<'a, P: RadioPort> StopWaitSender<'a, P> {
    pub fn new(config: &'a LinkConfig, port: &'a mut P) -> Self {
        Self { config, port }
    }

    /// Transmits every chunk in order, then the end-of-transmission marker.
    ///
    /// Returns only after the peer has acknowledged the marker, or with
    /// [`TransferError::PeerUnreachable`] once the retry budget is spent.
    pub fn run(&mut self, chunks: &[Vec<u8>]) -> Result<(), TransferError> {
        // Sequence numbers are 16-bit; the chunker cannot be asked to ship
        // more chunks than the sequence space can name.
        assert!(chunks.len() < usize::from(u16::MAX), "blob exceeds sequence space");

        self.port.start_listening()?;
        self.port.flush_rx()?;

        let mut next_seq: u16 = 1;
        for chunk in chunks {
            self.exchange_chunk(next_seq, chunk)?;
            next_seq += 1;
        }
        self.exchange_eot(next_seq)?;

        self.port.stop_listening()?;
        info!("transmission successful: {} chunks delivered", chunks.len());
        Ok(())
    }

    /// One chunk's retransmission loop.
    ///
    /// The first chunk retries indefinitely: the peer may not have powered
    /// on yet, and the two nodes' start times are not synchronized. From the
    /// second chunk on, a peer that stops answering exhausts the retry
    /// budget and kills the session.
    fn exchange_chunk(&mut self, seq: u16, chunk: &[u8]) -> Result<(), TransferError> {
        let frame = DataFrame::new(seq, chunk).to_bytes();
        let mut attempts: u32 = 0;
        loop {
            self.port.send(&frame)?;
            attempts += 1;
            match await_ack(self.port, self.config.ack_timeout)? {
                Some(ack) if ack.seq == seq => match ack.tag {
                    AckTag::Ack => {
                        debug!("chunk {seq} transmitted successfully");
                        return Ok(());
                    }
                    AckTag::Error => {
                        warn!("chunk {seq} arrived corrupted, resending");
                    }
                },
                Some(ack) => {
                    warn!("out-of-order ack: received {}, expecting {seq}", ack.seq);
                }
                None => {
                    debug!("attempt {attempts} to retransmit chunk {seq}");
                }
            }
            if attempts > RETRY_LIMIT && seq > 1 {
                error!("giving up on chunk {seq} after {attempts} attempts");
                return Err(TransferError::PeerUnreachable);
            }
        }
    }

    /// Sends the end-of-transmission marker until the peer confirms it.
    ///
    /// The receiver answers the marker with the sequence after it, which
    /// keeps the confirmation distinguishable from a duplicate data
    /// acknowledgement.
    fn exchange_eot(&mut self, seq: u16) -> Result<(), TransferError> {
        let frame = DataFrame::new(seq, EOT_PAYLOAD).to_bytes();
        for attempt in 1..=RETRY_LIMIT {
            self.port.send(&frame)?;
            match await_ack(self.port, self.config.ack_timeout)? {
                Some(ack) if ack.tag == AckTag::Ack && ack.seq == seq.wrapping_add(1) => {
                    return Ok(());
                }
                Some(ack) => {
                    warn!("unexpected answer to the final frame: {ack:?}");
                }
                None => {
                    debug!("attempt {attempt} to retransmit the final frame");
                }
            }
        }
        error!("failed to deliver the end-of-transmission marker");
        Err(TransferError::PeerUnreachable)
    }
}

/// Drives the receiving side of a stop-and-wait session.
pub struct StopWaitReceiver<'a, P: RadioPort> {
    config: &'a LinkConfig,
    port: &'a mut P,
}

impl<'a, P: RadioPort> StopWaitReceiver<'a, P> {
    pub fn new(config: &'a LinkConfig, port: &'a mut P) -> Self {
        Self { config, port }
    }

    /// Collects chunks until the end-of-transmission marker arrives.
    ///
    /// The accepted list is always a contiguous prefix of the peer's chunk
    /// list: the chunk numbered `expected_seq` is the only one that can be
    /// appended, so the list length equals `expected_seq - 1` throughout.
    pub fn run(&mut self) -> Result<Vec<Vec<u8>>, TransferError> {
        self.port.start_listening()?;

        let mut expected_seq: u16 = 1;
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        loop {
            let raw = match self.port.receive(self.config.data_timeout) {
                Ok(raw) => raw,
                Err(RadioError::Timeout) => continue,
                Err(e) => return Err(e.into()),
            };
            match DataFrame::decode(&mut raw.as_slice()) {
                Ok(frame) if frame.is_eot() => {
                    self.send_ack(expected_seq.wrapping_add(1), AckTag::Ack)?;
                    self.port.stop_listening()?;
                    info!("reception successful: {} chunks", chunks.len());
                    return Ok(chunks);
                }
                Ok(frame) if frame.seq == expected_seq => {
                    self.send_ack(expected_seq, AckTag::Ack)?;
                    chunks.push(frame.payload);
                    expected_seq += 1;
                    debug!("chunk {} received successfully", frame.seq);
                }
                Ok(frame) if expected_seq > 1 && frame.seq == expected_seq - 1 => {
                    // The previous acknowledgement was lost in transit;
                    // answer the duplicate again but keep only one copy.
                    debug!("duplicate of chunk {}, re-acknowledging", frame.seq);
                    self.send_ack(frame.seq, AckTag::Ack)?;
                }
                Ok(frame) => {
                    warn!(
                        "out-of-order chunk: received {}, expecting {expected_seq}",
                        frame.seq
                    );
                }
                Err(e) => {
                    warn!("chunk {expected_seq} received incorrectly: {e}");
                    self.send_ack(expected_seq, AckTag::Error)?;
                }
            }
        }
    }

    fn send_ack(&mut self, seq: u16, tag: AckTag) -> Result<(), TransferError> {
        self.port.send(&AckFrame::new(seq, tag).to_bytes())?;
        Ok(())
    }
}
