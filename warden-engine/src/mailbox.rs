//! Single-slot control mailbox
//!
//! Pause/resume/disconnect requests reach the blocked connect loop through a
//! mailbox that holds at most one signal. Offering a signal while another
//! is still pending drops the new one.

use tokio::sync::mpsc;

/// Control intent delivered to a paused connect loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Restart the backend and continue
    Resume,
    /// Leave the connect loop
    Disconnect,
}

/// Sending half of the mailbox
#[derive(Debug, Clone)]
pub struct ControlMailbox {
    tx: mpsc::Sender<ControlSignal>,
}

/// Receiving half of the mailbox, owned by the connect loop
#[derive(Debug)]
pub struct ControlReceiver {
    rx: mpsc::Receiver<ControlSignal>,
}

/// Create an empty mailbox
pub fn mailbox() -> (ControlMailbox, ControlReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ControlMailbox { tx }, ControlReceiver { rx })
}

impl ControlMailbox {
    /// Offer a signal; returns `false` if it was dropped
    pub fn offer(&self, signal: ControlSignal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::debug!("Control signal {:?} dropped: another one is pending", signal);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl ControlReceiver {
    /// Wait for the next signal
    ///
    /// A mailbox whose senders are all gone reads as `Disconnect`.
    pub async fn recv(&mut self) -> ControlSignal {
        self.rx.recv().await.unwrap_or(ControlSignal::Disconnect)
    }

    /// Take a pending signal without waiting
    pub fn try_recv(&mut self) -> Option<ControlSignal> {
        self.rx.try_recv().ok()
    }
}
