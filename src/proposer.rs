use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::Configuration;
use crate::messages::{Accept, Prepare, Request, Response};
use crate::proposal::{OwnerId, ProposalNumber};
use crate::retry::Backoff;
use crate::rpc::Transport;
use crate::value::Value;

mod quorum;

use self::quorum::{Discovered, PhaseOutcome, Tally, Vote};

/// Phase of the proposer's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposerStatus {
    /// Nothing proposed yet
    Idle,
    /// Waiting for a quorum of PROMISE replies (Phase 1)
    Preparing,
    /// Waiting for a quorum of ACCEPTED replies (Phase 2)
    Accepting,
    /// A value has been decided
    Decided,
}

#[derive(Debug)]
struct ProposerState<V> {
    last: Option<ProposalNumber>,
    candidate: Option<V>,
    status: ProposerStatus,
    decided: Option<V>,
}

impl<V> Default for ProposerState<V> {
    fn default() -> ProposerState<V> {
        ProposerState {
            last: None,
            candidate: None,
            status: ProposerStatus::Idle,
            decided: None,
        }
    }
}

/// The proposer drives rounds of the two Paxos phases until a value is
/// decided. Each round uses a fresh proposal number; Phase 1 asks every
/// acceptor for a promise, Phase 2 asks them to accept either the proposer's
/// own value or the highest value an acceptor already accepted (key to the
/// Paxos algorithm). A round that fails to reach quorum in time is retried.
pub struct Proposer<V: Value, T: Transport<V>> {
    id: OwnerId,
    config: Configuration,
    transport: Arc<T>,
    state: Mutex<ProposerState<V>>,
    /// Held for the duration of `propose`; one active round per proposer
    active: Mutex<()>,
}

impl<V: Value, T: Transport<V>> Proposer<V, T> {
    /// Creates a proposer with a cluster-unique owner id.
    pub fn new(id: OwnerId, config: Configuration, transport: Arc<T>) -> Proposer<V, T> {
        if config.acceptors().is_empty() {
            warn!("Proposer {} configured without acceptors", id);
        }
        Proposer {
            id,
            config,
            transport,
            state: Mutex::new(ProposerState::default()),
            active: Mutex::new(()),
        }
    }

    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Proposes `value` and runs rounds until a value is decided, which is
    /// not necessarily `value`: a value already accepted by acceptors wins.
    ///
    /// There is no bound on the number of rounds. Dropping the returned
    /// future abandons the proposal and cancels its in-flight calls.
    pub async fn propose(&self, value: V) -> V {
        let _active = self.active.lock().await;
        {
            let mut state = self.state.lock().await;
            if let Some(ref decided) = state.decided {
                return decided.clone();
            }
            state.candidate = Some(value.clone());
        }

        let mut backoff = Backoff::new(
            self.config.retry_backoff(),
            self.config.max_retry_backoff(),
        );
        loop {
            if let Some(decided) = self.run_round(&value).await {
                return decided;
            }
            let wait = backoff.next_wait();
            trace!("[proposer {}] retrying in {:?}", self.id, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Runs both phases with a new proposal number.
    async fn run_round(&self, candidate: &V) -> Option<V> {
        let number = self.start_round().await;
        let discovered = Arc::new(Discovered::default());

        debug!("[proposer {}] phase 1, PREPARE {}", self.id, number);
        let outcome = self.prepare(Prepare { number }, discovered.clone()).await;
        if outcome != PhaseOutcome::Quorum {
            debug!("[proposer {}] phase 1 of {} failed: {:?}", self.id, number, outcome);
            return None;
        }

        let value = match discovered.take().await {
            Some(prior) => {
                debug!(
                    "[proposer {}] adopting value accepted at {}: {:?}",
                    self.id, prior.number, prior.value
                );
                prior.value
            }
            None => candidate.clone(),
        };

        self.state.lock().await.status = ProposerStatus::Accepting;
        debug!("[proposer {}] phase 2, ACCEPT {} {:?}", self.id, number, value);
        let outcome = self
            .accept(Accept {
                number,
                value: value.clone(),
            })
            .await;
        if outcome != PhaseOutcome::Quorum {
            debug!("[proposer {}] phase 2 of {} failed: {:?}", self.id, number, outcome);
            // the retry starts over with Phase 1
            self.state.lock().await.status = ProposerStatus::Preparing;
            return None;
        }

        Some(self.decide(value).await)
    }

    /// Generates the next proposal number and enters Phase 1.
    async fn start_round(&self) -> ProposalNumber {
        let mut state = self.state.lock().await;
        let number = ProposalNumber::next(self.id, state.last);
        state.last = Some(number);
        state.status = ProposerStatus::Preparing;
        number
    }

    async fn decide(&self, value: V) -> V {
        let mut state = self.state.lock().await;
        state.status = ProposerStatus::Decided;
        let decided = state.decided.get_or_insert(value).clone();
        info!("[proposer {}] reached consensus on {:?}", self.id, decided);
        decided
    }

    /// Phase 1: sends PREPARE to every acceptor, recording disclosed values.
    async fn prepare(&self, prepare: Prepare, discovered: Arc<Discovered<V>>) -> PhaseOutcome {
        let transport = self.transport.clone();
        self.fan_out(move |addr| {
            let call = transport.call(addr, Request::Prepare(prepare));
            let discovered = discovered.clone();
            async move {
                let promise = match call.await.and_then(Response::into_promise) {
                    Ok(promise) => promise,
                    Err(e) => {
                        debug!("PREPARE {} to {} failed: {}", prepare.number, addr, e);
                        return Vote::Rejected;
                    }
                };
                if !echoes(addr, prepare.number, promise.acceptor, promise.number) {
                    return Vote::Rejected;
                }
                if !promise.accepted {
                    return Vote::Rejected;
                }
                if let Some(prior) = promise.prior {
                    discovered.observe(prior).await;
                }
                Vote::Granted
            }
            .boxed()
        })
        .await
    }

    /// Phase 2: sends ACCEPT to every acceptor.
    async fn accept(&self, accept: Accept<V>) -> PhaseOutcome {
        let transport = self.transport.clone();
        let number = accept.number;
        self.fan_out(move |addr| {
            let call = transport.call(addr, Request::Accept(accept.clone()));
            async move {
                let accepted = match call.await.and_then(Response::into_accepted) {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        debug!("ACCEPT {} to {} failed: {}", number, addr, e);
                        return Vote::Rejected;
                    }
                };
                if echoes(addr, number, accepted.acceptor, accepted.number) && accepted.accepted {
                    Vote::Granted
                } else {
                    Vote::Rejected
                }
            }
            .boxed()
        })
        .await
    }

    /// Calls every acceptor concurrently and waits for the first of quorum
    /// granted, quorum rejected, or the phase timeout. Calls still in flight
    /// when the phase concludes are aborted.
    async fn fan_out<F>(&self, vote: F) -> PhaseOutcome
    where
        F: Fn(SocketAddr) -> BoxFuture<'static, Vote>,
    {
        let tally = Arc::new(Tally::new(self.config.quorum_size()));
        let (signal, mut concluded) = mpsc::unbounded_channel();
        let mut calls = JoinSet::new();

        for &addr in self.config.acceptors() {
            let call = vote(addr);
            let tally = tally.clone();
            let signal = signal.clone();
            calls.spawn(async move {
                if let Some(outcome) = tally.record(call.await) {
                    let _ = signal.send(outcome);
                }
            });
        }
        drop(signal);

        let outcome = match timeout(self.config.phase_timeout(), concluded.recv()).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => PhaseOutcome::Exhausted,
            Err(_) => PhaseOutcome::TimedOut,
        };
        calls.abort_all();
        outcome
    }

    /// Current phase of the proposer
    pub async fn status(&self) -> ProposerStatus {
        self.state.lock().await.status
    }

    /// The decided value, once reached
    pub async fn decided(&self) -> Option<V> {
        self.state.lock().await.decided.clone()
    }

    /// Value this proposer last proposed
    pub async fn candidate(&self) -> Option<V> {
        self.state.lock().await.candidate.clone()
    }

    /// Last generated proposal number
    pub async fn last_number(&self) -> Option<ProposalNumber> {
        self.state.lock().await.last
    }

    /// Forgets the numbering, candidate and decided value between test rounds.
    pub async fn reset(&self) {
        *self.state.lock().await = ProposerState::default();
    }
}

/// Checks that a reply echoes the request it answers, guarding against
/// stale or misrouted replies.
fn echoes(
    addr: SocketAddr,
    number: ProposalNumber,
    acceptor: SocketAddr,
    echoed: ProposalNumber,
) -> bool {
    if acceptor != addr || echoed != number {
        warn!(
            "Mismatched reply from {}: expected {} from {}, got {} from {}",
            addr, number, addr, echoed, acceptor
        );
        return false;
    }
    true
}
