//! Hardware I/O boundaries: the receipt printer and the card reader.
//!
//! Both sit off the main control path. Card polling runs as a background
//! task feeding a single-slot handoff; the batch print runs on a blocking
//! task under a bounded wait so a wedged printer can never freeze the
//! voter-facing state machine.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::model::ReceiptData;

/// Failure reported by a print sink.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PrintError(pub String);

/// Receipt sink, e.g. the thermal printer service. `print_batch` may
/// block; the controller always invokes it off the main path.
pub trait PrintSink: Send + Sync {
    /// Print one session's receipts as a single job.
    fn print_batch(&self, receipts: &[ReceiptData]) -> std::result::Result<(), PrintError>;
}

/// Contactless card reader. `poll` must return immediately, with a card
/// if one is currently presented.
pub trait TokenReader: Send + 'static {
    fn poll(&mut self) -> Option<ScannedToken>;
}

/// A raw card read: reader UID plus the decrypted token payload.
#[derive(Debug, Clone)]
pub struct ScannedToken {
    pub card_uid: String,
    pub payload: String,
}

/// Consumer side of the single-slot handoff between the background poller
/// and the controller's main loop.
pub struct TokenSlot {
    rx: mpsc::Receiver<ScannedToken>,
}

impl TokenSlot {
    /// Take a detected card, if any, without blocking.
    pub fn try_take(&mut self) -> Option<ScannedToken> {
        self.rx.try_recv().ok()
    }
}

/// Spawn the background task that polls the reader and feeds detected
/// cards into a slot. The task ends when the slot is dropped.
pub fn spawn_token_poller<R>(mut reader: R, interval: Duration) -> (TokenSlot, JoinHandle<()>)
where
    R: TokenReader,
{
    let (tx, rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        loop {
            if let Some(scan) = reader.poll() {
                debug!("Card detected: {}", scan.card_uid);
                // A full slot means a session is in progress; the send
                // waits until the controller is back at the slot.
                if tx.send(scan).await.is_err() {
                    break;
                }
            }
            tokio::time::sleep(interval).await;
        }
    });
    (TokenSlot { rx }, handle)
}

/// Run the batch print off the main path with a bounded wait. A print
/// that times out keeps running in the background; a retry may then
/// produce a duplicate slip.
pub(crate) async fn dispatch_print(
    printer: &Arc<dyn PrintSink>,
    receipts: Vec<ReceiptData>,
    timeout: Duration,
) -> Result<()> {
    let printer = Arc::clone(printer);
    let job = tokio::task::spawn_blocking(move || printer.print_batch(&receipts));
    match tokio::time::timeout(timeout, job).await {
        Err(_) => Err(Error::PrintTimeout(timeout.as_secs())),
        Ok(Err(join_err)) => Err(Error::PrintFailure(join_err.to_string())),
        Ok(Ok(Err(print_err))) => Err(Error::PrintFailure(print_err.to_string())),
        Ok(Ok(Ok(()))) => Ok(()),
    }
}
