use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_millis(200);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(5);
const DEFAULT_MAX_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration holds the membership of the cluster along with the
/// timing knobs of the proposer.
///
/// Membership is an immutable snapshot: clones share the address lists.
#[derive(Clone, Debug)]
pub struct Configuration {
    acceptors: Arc<[SocketAddr]>,
    learners: Arc<[SocketAddr]>,
    phase_timeout: Duration,
    retry_backoff: Duration,
    max_retry_backoff: Duration,
}

impl Configuration {
    /// Creates a new configuration
    pub fn new<A, L>(acceptors: A, learners: L) -> Configuration
    where
        A: IntoIterator<Item = SocketAddr>,
        L: IntoIterator<Item = SocketAddr>,
    {
        Configuration {
            acceptors: acceptors.into_iter().collect(),
            learners: learners.into_iter().collect(),
            phase_timeout: DEFAULT_PHASE_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_retry_backoff: DEFAULT_MAX_RETRY_BACKOFF,
        }
    }

    /// Sets how long a proposer waits for a phase to reach quorum.
    pub fn with_phase_timeout(mut self, timeout: Duration) -> Configuration {
        self.phase_timeout = timeout;
        self
    }

    /// Sets the initial and maximum wait between failed rounds.
    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Configuration {
        self.retry_backoff = initial;
        self.max_retry_backoff = max;
        self
    }

    /// Size of quorum
    pub fn quorum_size(&self) -> usize {
        quorum_size(self.acceptors.len())
    }

    /// Addresses of every acceptor
    pub fn acceptors(&self) -> &[SocketAddr] {
        &self.acceptors
    }

    /// Addresses of every learner
    pub fn learners(&self) -> &[SocketAddr] {
        &self.learners
    }

    pub(crate) fn shared_learners(&self) -> Arc<[SocketAddr]> {
        self.learners.clone()
    }

    pub fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn max_retry_backoff(&self) -> Duration {
        self.max_retry_backoff
    }
}

/// Majority of `n` acceptors.
pub fn quorum_size(n: usize) -> usize {
    1 + n / 2
}
