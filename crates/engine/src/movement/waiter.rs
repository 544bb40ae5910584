use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// How a movement a script was waiting on ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    Completed,
    GaveUp,
    Cancelled,
    /// A newer command replaced the path.
    Superseded,
    PathNotFound,
    Deactivated,
}

/// Controller side of a single-use wait. Released at most once; dropping it
/// unreleased reports [`WaitOutcome::Cancelled`].
#[derive(Debug)]
pub struct MovementWaiter {
    sender: Option<Sender<WaitOutcome>>,
}

impl MovementWaiter {
    pub fn release(mut self, outcome: WaitOutcome) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: WaitOutcome) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.try_send(outcome);
        }
    }
}

impl Drop for MovementWaiter {
    fn drop(&mut self) {
        self.send(WaitOutcome::Cancelled);
    }
}

/// Script side of a wait. The outcome is latched once observed.
#[derive(Debug)]
pub struct WaitHandle {
    receiver: Receiver<WaitOutcome>,
    outcome: Option<WaitOutcome>,
}

impl WaitHandle {
    /// `None` while the movement is still running.
    pub fn try_outcome(&mut self) -> Option<WaitOutcome> {
        if self.outcome.is_none() {
            match self.receiver.try_recv() {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.outcome = Some(WaitOutcome::Cancelled),
            }
        }
        self.outcome
    }

    /// Number of releases still buffered; never more than one.
    pub fn pending_releases(&self) -> usize {
        self.receiver.len()
    }
}

pub fn waiter_pair() -> (MovementWaiter, WaitHandle) {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    (
        MovementWaiter {
            sender: Some(sender),
        },
        WaitHandle {
            receiver,
            outcome: None,
        },
    )
}
