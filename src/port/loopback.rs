//! An in-memory radio link for benches and tests.
//!
//! [`loopback_pair`] builds two crossed queues so that each port's outbound
//! frames appear on the other's inbound pipe, standing in for a pair of
//! nodes whose transceivers are tuned to opposite channels. An optional
//! fault hook on each port's outbound side lets tests lose, corrupt, or
//! rewrite individual frames before they reach the peer.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use log::trace;

use super::{RadioError, RadioPort};

/// What a fault hook decided to do with one outbound frame.
pub enum FaultAction {
    /// Deliver the frame untouched.
    Pass,
    /// Lose the frame in flight.
    Drop,
    /// Deliver these bytes instead of the frame.
    Replace(Vec<u8>),
}

type FaultHook = Box<dyn FnMut(&[u8]) -> FaultAction + Send>;

/// One end of an in-memory link.
pub struct LoopbackPort {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    listening: bool,
    fault: Option<FaultHook>,
}

/// Builds the two ends of a lossless in-memory link. Faults are opt-in via
/// [`LoopbackPort::set_send_fault`].
pub fn loopback_pair() -> (LoopbackPort, LoopbackPort) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (LoopbackPort::new(a_tx, a_rx), LoopbackPort::new(b_tx, b_rx))
}

impl LoopbackPort {
    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            tx,
            rx,
            listening: false,
            fault: None,
        }
    }

    /// Installs a hook consulted for every outbound frame.
    pub fn set_send_fault(&mut self, hook: impl FnMut(&[u8]) -> FaultAction + Send + 'static) {
        self.fault = Some(Box::new(hook));
    }
}

impl RadioPort for LoopbackPort {
    fn send(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        let frame = match self.fault.as_mut().map(|hook| hook(frame)) {
            None | Some(FaultAction::Pass) => frame.to_vec(),
            Some(FaultAction::Drop) => {
                trace!("lost frame in flight: {frame:x?}");
                return Ok(());
            }
            Some(FaultAction::Replace(bytes)) => bytes,
        };
        trace!("sent frame: {frame:x?}");
        // A send into a hung-up channel means the peer's port is gone.
        self.tx.send(frame).map_err(|_| RadioError::Disconnected)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, RadioError> {
        if !self.listening {
            std::thread::sleep(timeout);
            return Err(RadioError::Timeout);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => {
                trace!("received frame: {frame:x?}");
                Ok(frame)
            }
            Err(RecvTimeoutError::Timeout) => Err(RadioError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(RadioError::Disconnected),
        }
    }

    fn flush_rx(&mut self) -> Result<(), RadioError> {
        loop {
            match self.rx.try_recv() {
                Ok(frame) => trace!("flushed frame: {frame:x?}"),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(RadioError::Disconnected),
            }
        }
    }

    fn start_listening(&mut self) -> Result<(), RadioError> {
        self.listening = true;
        Ok(())
    }

    fn stop_listening(&mut self) -> Result<(), RadioError> {
        // The queue keeps buffering while closed, like a radio FIFO; callers
        // that care use flush_rx.
        self.listening = false;
        Ok(())
    }
}
