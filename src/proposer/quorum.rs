use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::messages::AcceptedProposal;

/// Vote of a single acceptor within a phase. Failed calls and mismatched
/// replies are rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Vote {
    Granted,
    Rejected,
}

/// How a phase concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseOutcome {
    /// A quorum granted the request
    Quorum,
    /// A quorum rejected the request
    Rejected,
    /// Every acceptor replied but neither side reached quorum
    Exhausted,
    /// The phase timeout lapsed first
    TimedOut,
}

/// `Tally` counts the votes of a single phase from concurrent calls.
///
/// Exactly one vote observes its counter reach quorum, so the phase
/// outcome is signaled once even when replies race each other.
#[derive(Debug)]
pub(crate) struct Tally {
    quorum: usize,
    granted: AtomicUsize,
    rejected: AtomicUsize,
}

impl Tally {
    pub fn new(quorum: usize) -> Tally {
        assert!(quorum > 0);
        Tally {
            quorum,
            granted: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    /// Records a vote, returning the outcome if this vote reached quorum.
    pub fn record(&self, vote: Vote) -> Option<PhaseOutcome> {
        let (counter, outcome) = match vote {
            Vote::Granted => (&self.granted, PhaseOutcome::Quorum),
            Vote::Rejected => (&self.rejected, PhaseOutcome::Rejected),
        };
        let count = counter.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Tallied {:?} vote #{} (quorum {})", vote, count, self.quorum);
        if count == self.quorum {
            Some(outcome)
        } else {
            None
        }
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize) {
        (
            self.granted.load(Ordering::Acquire),
            self.rejected.load(Ordering::Acquire),
        )
    }
}

/// Highest accepted proposal disclosed by acceptors during Phase 1.
///
/// Replies arrive in any order; only a strictly higher number replaces the
/// value kept so far.
pub(crate) struct Discovered<V> {
    highest: Mutex<Option<AcceptedProposal<V>>>,
}

impl<V> Default for Discovered<V> {
    fn default() -> Discovered<V> {
        Discovered {
            highest: Mutex::new(None),
        }
    }
}

impl<V> Discovered<V> {
    pub async fn observe(&self, prior: AcceptedProposal<V>) {
        let mut highest = self.highest.lock().await;
        let higher = match *highest {
            Some(ref current) => prior.number > current.number,
            None => true,
        };
        if higher {
            *highest = Some(prior);
        }
    }

    pub async fn take(&self) -> Option<AcceptedProposal<V>> {
        self.highest.lock().await.take()
    }
}
