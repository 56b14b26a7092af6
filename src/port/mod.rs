//! The transceiver boundary the protocol drives.
//!
//! A node owns two physical transceivers tuned to opposite channels; one
//! [`RadioPort`] value stands for that pair: [`send`](RadioPort::send) goes
//! out the outbound radio, everything else talks to the inbound one. The
//! driver behind the port is opaque to the protocol. Datagrams are at most
//! [`MTU`](crate::frame::MTU) bytes and may be lost or corrupted in flight;
//! within one direction they arrive in FIFO order.

pub mod loopback;

use std::time::Duration;

use thiserror::Error;

/// One end of the half-duplex radio link.
pub trait RadioPort {
    /// Enqueues one datagram on the outbound radio. Fire-and-forget: success
    /// means the radio took the bytes, not that the peer heard them.
    fn send(&mut self, frame: &[u8]) -> Result<(), RadioError>;

    /// Blocks until a datagram arrives on the inbound radio or the deadline
    /// expires, returning the whole datagram.
    ///
    /// Implementations poll the radio with a sleep of about a millisecond
    /// between checks; this and [`receive`](RadioPort::receive) itself are
    /// the only places the protocol ever blocks.
    ///
    /// # Errors
    ///
    /// [`RadioError::Timeout`] when the deadline expires; this is a routine
    /// verdict, not a failure. Any other error is fatal to the session.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, RadioError>;

    /// Discards any datagrams already queued on the inbound radio.
    fn flush_rx(&mut self) -> Result<(), RadioError>;

    /// Opens the inbound pipe.
    fn start_listening(&mut self) -> Result<(), RadioError>;

    /// Closes the inbound pipe. Hardware that cannot listen and transmit
    /// concurrently requires this before [`send`](RadioPort::send).
    fn stop_listening(&mut self) -> Result<(), RadioError>;
}

#[derive(Error, Debug)]
pub enum RadioError {
    #[error("receive deadline expired")]
    Timeout,

    #[error("peer end of the link is gone")]
    Disconnected,

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}
