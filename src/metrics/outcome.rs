//! Single-slot result cell between a background task and its observer
//!
//! The task side reports exactly once; the observer side polls without
//! blocking and sees the value at most once.

use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::error::{Error, Result};

/// Create a connected reporter/receiver pair for the named task
pub fn outcome_channel(task: &str) -> (OutcomeReporter, OutcomeReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        OutcomeReporter { tx },
        OutcomeReceiver {
            task: task.to_string(),
            rx: Some(rx),
        },
    )
}

/// Write side, consumed by the single report
#[derive(Debug)]
pub struct OutcomeReporter {
    tx: oneshot::Sender<Result<()>>,
}

impl OutcomeReporter {
    pub fn report(self, outcome: Result<()>) {
        // Nobody left to tell if the receiver is gone.
        let _ = self.tx.send(outcome);
    }
}

/// Read side
#[derive(Debug)]
pub struct OutcomeReceiver {
    task: String,
    rx: Option<oneshot::Receiver<Result<()>>>,
}

impl OutcomeReceiver {
    /// Take the terminal outcome if one has been produced.
    ///
    /// Returns `None` while the task is still running and after the outcome
    /// has been taken. A reporter dropped without reporting surfaces once as
    /// [`Error::BackgroundTaskLost`].
    pub fn try_take(&mut self) -> Option<Result<()>> {
        let rx = self.rx.as_mut()?;
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(Error::BackgroundTaskLost(self.task.clone())),
        };
        self.rx = None;
        Some(outcome)
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn is_spent(&self) -> bool {
        self.rx.is_none()
    }
}
