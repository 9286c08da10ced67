//! One-shot values delivered by the rendering side, such as snapshots.

use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::error::{EngineError, Result};

/// Opens a one-shot channel whose receiving side gives up after `timeout`.
pub fn channel<T>(timeout: Duration) -> (ValueSender<T>, PendingValue<T>) {
    let (tx, rx) = bounded(1);
    (
        ValueSender { tx },
        PendingValue {
            rx,
            deadline: Instant::now() + timeout,
            timeout,
        },
    )
}

/// Delivers a value at most once; sending consumes the sender.
#[derive(Debug)]
pub struct ValueSender<T> {
    tx: Sender<T>,
}

impl<T> ValueSender<T> {
    /// Returns false when the requester already gave up.
    pub fn deliver(self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }
}

/// The requesting side of a one-shot delivery.
#[derive(Debug)]
pub struct PendingValue<T> {
    rx: Receiver<T>,
    deadline: Instant,
    timeout: Duration,
}

impl<T> PendingValue<T> {
    /// Non-blocking poll. `Ok(None)` while the value may still arrive.
    pub fn try_take(&self) -> Result<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) if Instant::now() < self.deadline => Ok(None),
            Err(TryRecvError::Empty) => Err(EngineError::Timeout(self.timeout)),
            Err(TryRecvError::Disconnected) => Err(EngineError::Disconnected),
        }
    }

    /// Blocks until the value arrives or the deadline passes.
    pub fn wait(self) -> Result<T> {
        self.rx.recv_deadline(self.deadline).map_err(|err| {
            if err.is_disconnected() {
                EngineError::Disconnected
            } else {
                EngineError::Timeout(self.timeout)
            }
        })
    }
}
