//! Reliable single-file transfer over short-range, half-duplex packet radio.
//!
//! Two identical nodes each drive a pair of transceivers tuned to opposite
//! channels, together forming a logical full-duplex link that carries
//! fixed-size, lossy datagrams of at most 32 bytes. This crate layers the
//! reliable transfer protocol on top: CRC-16/XMODEM framing, sequencing,
//! acknowledgement, retransmission, and an end-of-transmission handshake.
//!
//! Framing is built around the [`Encode`](encode::Encode) and
//! [`Decode`](decode::Decode) traits; each on-air frame type in
//! [`frame`] implements both. The radio hardware sits behind the
//! [`RadioPort`](port::RadioPort) trait, so the protocol runs unchanged over
//! real transceivers or the in-memory [`loopback`](port::loopback) link.
//!
//! Two interchangeable reliability schemes are provided in [`protocol`]: a
//! stop-and-wait sender that acknowledges every chunk, and a windowed burst
//! sender that trades per-chunk feedback for throughput and verifies the
//! whole transfer with an MD5 digest. A [`Session`] selects the scheme and
//! drives one transfer from [`BlobSource`](blob::BlobSource) to
//! [`BlobSink`](blob::BlobSink).

pub mod blob;
pub mod chunker;
pub mod config;
pub mod crc;
pub mod decode;
pub mod encode;
pub mod frame;
pub mod port;
pub mod protocol;
pub mod session;

pub use config::LinkConfig;
pub use session::{Session, Variant};
