//! The burst variant: windows of frames between cumulative acknowledgements.
//!
//! After a sequenced alignment exchange for the first chunk, the sender
//! streams up to `burst_size` unsequenced frames back-to-back and then waits
//! for a single cumulative acknowledgement naming the highest contiguous
//! chunk the peer holds. Corruption is answered aggressively: the receiver
//! discards everything it has collected and the sender starts over from the
//! alignment frame. An MD5 digest exchanged at the end settles whether the
//! two chunk lists really match.

use std::time::Duration;

use log::{debug, error, info, warn};
use md5::{Digest, Md5};

use crate::config::LinkConfig;
use crate::decode::Decode;
use crate::encode::Encode;
use crate::frame::{AckFrame, AckTag, BurstFrame, DataFrame, BURST_EOT_PREFIX};
use crate::port::{RadioError, RadioPort};

use super::{await_ack, TransferError, RETRY_LIMIT};

/// MD5 of the concatenated chunk bytes, rendered as 32 lowercase hex
/// characters.
///
/// Both ends derive this over the ordered chunk list they hold, so any
/// divergence in content or order shows up as a mismatch. The rendering is
/// pure ASCII, so every encoding label the end-of-transmission marker can
/// declare maps it to the same 32 bytes, which is also exactly one datagram.
pub fn transfer_digest(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut hasher = Md5::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let mut hex = String::with_capacity(32);
    for byte in hasher.finalize() {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.into_bytes()
}

/// Drives the sending side of a burst session.
pub struct BurstSender<'a, P: RadioPort> {
    config: &'a LinkConfig,
    port: &'a mut P,
}

impl<'a, P: RadioPort> BurstSender<'a, P> {
    pub fn new(config: &'a LinkConfig, port: &'a mut P) -> Self {
        Self { config, port }
    }

    /// Transmits every chunk, then the end-of-transmission marker and the
    /// transfer digest, restarting from the alignment frame whenever the
    /// peer discards its progress.
    pub fn run(&mut self, chunks: &[Vec<u8>]) -> Result<(), TransferError> {
        assert!(chunks.len() < usize::from(u16::MAX), "blob exceeds sequence space");

        self.port.start_listening()?;

        let digest = transfer_digest(chunks);
        let eot = BurstFrame::new(
            [BURST_EOT_PREFIX, self.config.encoding.as_bytes()].concat(),
        )
        .to_bytes();

        let mut final_attempts: u32 = 0;
        loop {
            self.port.flush_rx()?;
            if !chunks.is_empty() {
                self.align(&chunks[0])?;
                if !self.stream_windows(chunks)? {
                    debug!("re-aligning with the peer");
                    continue;
                }
            }
            // The digest is 32 bytes, a whole datagram: it travels raw,
            // immediately behind the marker.
            self.port.send(&eot)?;
            self.port.send(&digest)?;
            final_attempts += 1;
            match await_ack(self.port, self.config.ack_timeout)? {
                Some(ack) if ack.tag == AckTag::Ack => {
                    self.port.stop_listening()?;
                    info!("transmission successful: {} chunks delivered", chunks.len());
                    return Ok(());
                }
                Some(_) | None => {
                    if final_attempts >= RETRY_LIMIT {
                        error!("failed to confirm the transfer digest");
                        return Err(TransferError::PeerUnreachable);
                    }
                    warn!("transfer not confirmed, restarting from the first chunk");
                }
            }
        }
    }

    /// Delivers chunk 1 in a sequenced frame and waits for its
    /// acknowledgement, aligning the peer on the start of the chunk list.
    ///
    /// The wait here uses the longer alignment deadline: the peer may still
    /// be starting up, unlike in the in-session waits.
    fn align(&mut self, first: &[u8]) -> Result<(), TransferError> {
        let frame = DataFrame::new(1, first).to_bytes();
        for attempt in 1..=RETRY_LIMIT {
            self.port.send(&frame)?;
            match await_ack(self.port, self.config.align_timeout)? {
                Some(ack) if ack.tag == AckTag::Ack && ack.seq == 1 => {
                    debug!("chunk 1 transmitted successfully");
                    return Ok(());
                }
                Some(ack) => {
                    warn!("unexpected answer while aligning: {ack:?}");
                }
                None => {
                    debug!("attempt {attempt} to align with the peer");
                }
            }
        }
        error!("peer never answered the alignment frame");
        Err(TransferError::PeerUnreachable)
    }

    /// Streams the chunks after the first in windows.
    ///
    /// Returns `false` when the peer signalled corruption and discarded its
    /// progress, in which case the caller starts over from the alignment
    /// frame. A window that goes unacknowledged is simply resent from the
    /// last acknowledged chunk.
    fn stream_windows(&mut self, chunks: &[Vec<u8>]) -> Result<bool, TransferError> {
        let total = chunks.len() as u16;
        let mut last_acked: u16 = 1;
        while last_acked < total {
            let remaining = usize::from(total - last_acked);
            let window = remaining.min(self.config.burst_size);

            let mut ack = None;
            for chunk in &chunks[usize::from(last_acked)..usize::from(last_acked) + window] {
                self.port.send(&BurstFrame::new(chunk.clone()).to_bytes())?;
                // An answer arriving mid-window is either a corruption flag
                // or an earlier cumulative acknowledgement finally landing;
                // both mean the rest of this window is pointless.
                if let Some(early) = await_ack(self.port, Duration::ZERO)? {
                    ack = Some(early);
                    break;
                }
            }
            let ack = match ack {
                Some(ack) => Some(ack),
                None => await_ack(self.port, self.config.ack_timeout)?,
            };
            match ack {
                Some(ack) if ack.tag == AckTag::Ack => {
                    if ack.seq > last_acked {
                        debug!(
                            "chunks {}-{} transmitted successfully ({} ok)",
                            last_acked + 1,
                            ack.seq,
                            ack.seq - last_acked
                        );
                        last_acked = ack.seq;
                    } else {
                        warn!("stale cumulative ack for chunk {}", ack.seq);
                    }
                }
                Some(_) => {
                    warn!("peer flagged corruption, restarting the transfer");
                    return Ok(false);
                }
                None => {
                    debug!("no cumulative ack, resending from chunk {}", last_acked + 1);
                }
            }
        }
        Ok(true)
    }
}

/// Drives the receiving side of a burst session.
pub struct BurstReceiver<'a, P: RadioPort> {
    config: &'a LinkConfig,
    port: &'a mut P,
}

impl<'a, P: RadioPort> BurstReceiver<'a, P> {
    pub fn new(config: &'a LinkConfig, port: &'a mut P) -> Self {
        Self { config, port }
    }

    /// Collects chunks until a transfer digest matches.
    ///
    /// The collected list is only ever a contiguous prefix of the peer's
    /// chunk list: any corrupt frame throws the whole prefix away and the
    /// peer starts over, and a transfer only completes once the digest over
    /// the full list matches byte for byte.
    pub fn run(&mut self) -> Result<Vec<Vec<u8>>, TransferError> {
        self.port.start_listening()?;

        let mut chunks: Vec<Vec<u8>> = Vec::new();
        // Frames collected since the last cumulative acknowledgement.
        let mut pending: usize = 0;
        // Until the sequenced alignment frame lands (again), unsequenced
        // frames belong to a window the peer has already given up on.
        let mut aligned = false;

        loop {
            let raw = match self.port.receive(self.config.data_timeout) {
                Ok(raw) => raw,
                Err(RadioError::Timeout) => {
                    if pending > 0 {
                        // Quiet line mid-window: the final window was cut
                        // short, answer with what we hold.
                        self.send_ack(chunks.len() as u16, AckTag::Ack)?;
                        pending = 0;
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !aligned {
                if let Some(accepted) = self.try_align(&raw, &mut chunks)? {
                    aligned = accepted;
                    if !aligned {
                        // Neither the alignment frame nor the marker: a
                        // straggler from an abandoned window. Starve the
                        // peer into re-aligning.
                        debug!("dropping frame while waiting for alignment");
                    }
                    continue;
                }
                // An end-of-transmission marker: fall through and verify.
            } else if pending == 0 && chunks.len() == 1 {
                // Our acknowledgement of the alignment frame may have been
                // lost, making the peer send it again.
                if let Ok(frame) = DataFrame::decode(&mut raw.as_slice()) {
                    if frame.seq == 1 && frame.payload == chunks[0] {
                        debug!("duplicate of chunk 1, re-acknowledging");
                        self.send_ack(1, AckTag::Ack)?;
                        continue;
                    }
                }
            }

            match BurstFrame::decode(&mut raw.as_slice()) {
                Ok(frame) => {
                    if let Some(label) = frame.eot_encoding() {
                        debug!("end of transmission, peer encoding {label}");
                        pending = 0;
                        if self.verify_digest(&chunks)? {
                            self.send_ack(chunks.len() as u16, AckTag::Ack)?;
                            self.port.stop_listening()?;
                            info!("reception successful: {} chunks", chunks.len());
                            return Ok(chunks);
                        }
                        warn!(
                            "transfer digest mismatch, discarding {} chunks",
                            chunks.len()
                        );
                        chunks.clear();
                        aligned = false;
                    } else {
                        chunks.push(frame.payload);
                        pending += 1;
                        if pending >= self.config.burst_size {
                            self.send_ack(chunks.len() as u16, AckTag::Ack)?;
                            pending = 0;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "frame received incorrectly ({e}), discarding {} chunks",
                        chunks.len()
                    );
                    chunks.clear();
                    pending = 0;
                    aligned = false;
                    self.send_ack(0, AckTag::Error)?;
                }
            }
        }
    }

    /// Handles one frame while unaligned; the chunk list is always empty
    /// here, because every path that drops alignment also discards it.
    ///
    /// Returns `Some(true)` when the alignment frame was accepted,
    /// `Some(false)` for frames to drop, and `None` for an
    /// end-of-transmission marker the caller must verify (a transfer with no
    /// chunks at all never gets an alignment frame).
    fn try_align(
        &mut self,
        raw: &[u8],
        chunks: &mut Vec<Vec<u8>>,
    ) -> Result<Option<bool>, TransferError> {
        if let Ok(frame) = DataFrame::decode(&mut &raw[..]) {
            if frame.seq == 1 && !frame.is_eot() {
                debug!("chunk 1 received successfully");
                chunks.push(frame.payload);
                self.send_ack(1, AckTag::Ack)?;
                return Ok(Some(true));
            }
        }
        if let Ok(frame) = BurstFrame::decode(&mut &raw[..]) {
            if frame.eot_encoding().is_some() {
                return Ok(None);
            }
        }
        Ok(Some(false))
    }

    /// Reads the digest datagram trailing the marker and compares it with
    /// the digest of the collected chunks.
    fn verify_digest(&mut self, chunks: &[Vec<u8>]) -> Result<bool, TransferError> {
        let raw = match self.port.receive(self.config.data_timeout) {
            Ok(raw) => raw,
            Err(RadioError::Timeout) => {
                warn!("transfer digest never arrived");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(raw == transfer_digest(chunks))
    }

    fn send_ack(&mut self, seq: u16, tag: AckTag) -> Result<(), TransferError> {
        self.port.send(&AckFrame::new(seq, tag).to_bytes())?;
        Ok(())
    }
}
