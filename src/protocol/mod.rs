//! Sender and receiver state machines for both link variants.
//!
//! [`stop_wait`] acknowledges every chunk before the next one leaves the
//! radio. [`burst`] streams whole windows between cumulative
//! acknowledgements and settles correctness with a digest at the end. Both
//! share the frame codec, the acknowledgement grammar, and the retry
//! budget.

pub mod burst;
pub mod stop_wait;

use log::warn;
use thiserror::Error;

use crate::decode::Decode;
use crate::frame::AckFrame;
use crate::port::{RadioError, RadioPort};

/// Consecutive unacknowledged attempts tolerated before a session is
/// declared dead.
pub const RETRY_LIMIT: u32 = 1000;

/// Why a transfer gave up. Everything recoverable (corruption, duplicate or
/// out-of-order acknowledgements, digest mismatches) is handled inside the
/// state machines and never surfaces here.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("peer unreachable after {RETRY_LIMIT} attempts")]
    PeerUnreachable,

    #[error("radio failure: {0}")]
    Radio(RadioError),
}

impl From<RadioError> for TransferError {
    fn from(error: RadioError) -> Self {
        TransferError::Radio(error)
    }
}

/// Waits for one acknowledgement frame.
///
/// Returns `None` both when the deadline expires and when whatever arrived
/// does not parse as a well-formed acknowledgement; callers treat either as
/// "no answer" and retransmit. Radio failures other than the timeout are
/// fatal and propagate.
pub(crate) fn await_ack<P: RadioPort>(
    port: &mut P,
    timeout: std::time::Duration,
) -> Result<Option<AckFrame>, TransferError> {
    match port.receive(timeout) {
        Ok(raw) => match AckFrame::decode(&mut raw.as_slice()) {
            Ok(ack) => Ok(Some(ack)),
            Err(e) => {
                warn!("ignoring unreadable acknowledgement: {e}");
                Ok(None)
            }
        },
        Err(RadioError::Timeout) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
