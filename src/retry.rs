use rand::Rng;
use std::time::Duration;

/// Smallest step the backoff grows from when started at zero.
const MIN_STEP: Duration = Duration::from_millis(1);

fn apply_jitter(duration: Duration) -> Duration {
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rand::rng().random_range(0..=nanos))
}

/// Exponential backoff with full jitter, used between failed rounds so that
/// duelling proposers stop pre-empting each other.
pub struct Backoff {
    max: Duration,
    v: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `initial`, never exceeding `max`.
    pub fn new(initial: Duration, max: Duration) -> Backoff {
        Backoff {
            max,
            v: initial,
        }
    }

    pub fn next_wait(&mut self) -> Duration {
        let v = self.v;
        if v >= self.max {
            apply_jitter(self.max)
        } else {
            self.v = (v * 2).max(MIN_STEP).min(self.max);
            apply_jitter(v)
        }
    }
}
