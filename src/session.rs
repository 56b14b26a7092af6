//! One transfer attempt from blob to blob.
//!
//! A [`Session`] owns the node's radio port for its whole lifetime, picks
//! the protocol variant, and reduces the rich failure modes underneath to
//! the one answer the surrounding program acts on: did the file make it.
//! Sessions are one-shot; a failed session is discarded and a new one
//! started.

use log::{error, info};

use crate::blob::{BlobSink, BlobSource};
use crate::chunker;
use crate::config::LinkConfig;
use crate::port::RadioPort;
use crate::protocol::burst::{BurstReceiver, BurstSender};
use crate::protocol::stop_wait::{StopWaitReceiver, StopWaitSender};
use crate::protocol::TransferError;

/// Which reliability scheme a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// One frame in the air at a time, each individually acknowledged.
    StopWait,
    /// Windows of frames between cumulative acknowledgements, settled by a
    /// digest.
    Burst,
}

/// A single file-transfer attempt over one radio port.
pub struct Session<P: RadioPort> {
    config: LinkConfig,
    variant: Variant,
    port: P,
}

impl<P: RadioPort> Session<P> {
    pub fn new(config: LinkConfig, variant: Variant, port: P) -> Self {
        Self {
            config,
            variant,
            port,
        }
    }

    /// Runs the sending role: read the blob, slice it, drive the chosen
    /// sender until the peer has confirmed the whole transfer.
    ///
    /// The optional compression pre-step lives in the source: hand over a
    /// [`CompressedFileSource`](crate::blob::CompressedFileSource) built
    /// with [`LinkConfig::compression_level`] and the blob read here is the
    /// packed archive.
    pub fn send_blob(&mut self, source: &mut dyn BlobSource) -> bool {
        let blob = match source.read_all() {
            Ok(blob) => blob,
            Err(e) => {
                error!("reading the blob failed: {e}");
                return false;
            }
        };
        let chunks = chunker::split(&blob, self.config.data_size);
        info!(
            "sending {} bytes as {} chunks ({:?})",
            blob.len(),
            chunks.len(),
            self.variant
        );

        let result = match self.variant {
            Variant::StopWait => StopWaitSender::new(&self.config, &mut self.port).run(&chunks),
            Variant::Burst => BurstSender::new(&self.config, &mut self.port).run(&chunks),
        };
        self.conclude(result)
    }

    /// Runs the receiving role: drive the chosen receiver to completion and
    /// store the reassembled blob.
    ///
    /// The optional decompression post-step mirrors the sending side: a
    /// [`CompressedFileSink`](crate::blob::CompressedFileSink) unpacks the
    /// received archive as it stores it.
    pub fn receive_blob(&mut self, sink: &mut dyn BlobSink) -> bool {
        let result = match self.variant {
            Variant::StopWait => StopWaitReceiver::new(&self.config, &mut self.port).run(),
            Variant::Burst => BurstReceiver::new(&self.config, &mut self.port).run(),
        };
        let chunks = match result {
            Ok(chunks) => chunks,
            Err(e) => return self.conclude(Err(e)),
        };

        let blob = chunker::join(&chunks);
        info!("received {} bytes in {} chunks", blob.len(), chunks.len());
        if let Err(e) = sink.write_all(&blob) {
            error!("storing the blob failed: {e}");
            return false;
        }
        true
    }

    fn conclude(&self, result: Result<(), TransferError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("session failed: {e}");
                false
            }
        }
    }
}
