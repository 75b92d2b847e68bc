use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::messages::{Accept, Accepted, AcceptedProposal, Prepare, Promise, Request, Response};
use crate::proposal::ProposalNumber;
use crate::rpc::{Handler, Transport};
use crate::value::Value;

/// Promise/accept memory of a single acceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptorState<V> {
    /// Highest number answered affirmatively to a PREPARE
    promised: Option<ProposalNumber>,
    /// Last accepted number/value pair
    accepted: Option<AcceptedProposal<V>>,
}

impl<V> Default for AcceptorState<V> {
    fn default() -> AcceptorState<V> {
        AcceptorState {
            promised: None,
            accepted: None,
        }
    }
}

impl<V: Clone> AcceptorState<V> {
    /// Promises `number` if it is higher than any number promised so far.
    pub fn promise(&mut self, number: ProposalNumber) -> bool {
        match self.promised {
            Some(promised) if promised >= number => false,
            _ => {
                self.promised = Some(number);
                true
            }
        }
    }

    /// Accepts the value only for the number currently promised. A rival
    /// proposer promised a higher number in between causes a rejection.
    pub fn accept(&mut self, number: ProposalNumber, value: V) -> bool {
        if self.promised != Some(number) {
            return false;
        }
        self.accepted = Some(AcceptedProposal { number, value });
        true
    }

    pub fn promised(&self) -> Option<ProposalNumber> {
        self.promised
    }

    pub fn accepted(&self) -> Option<&AcceptedProposal<V>> {
        self.accepted.as_ref()
    }

    pub fn clear(&mut self) {
        self.promised = None;
        self.accepted = None;
    }
}

/// The acceptor votes on proposals and remembers its highest promise and
/// the last value it accepted. Learners are told about every acceptance.
pub struct Acceptor<V: Value, T: Transport<V>> {
    address: SocketAddr,
    learners: Arc<[SocketAddr]>,
    transport: Arc<T>,
    state: Mutex<AcceptorState<V>>,
    /// Learner notifications still in flight
    notifications: Mutex<JoinSet<()>>,
}

impl<V: Value, T: Transport<V>> Acceptor<V, T> {
    /// Creates an acceptor bound at `address` that notifies `learners`.
    pub fn new(
        address: SocketAddr,
        learners: Arc<[SocketAddr]>,
        transport: Arc<T>,
    ) -> Acceptor<V, T> {
        Acceptor {
            address,
            learners,
            transport,
            state: Mutex::new(AcceptorState::default()),
            notifications: Mutex::new(JoinSet::new()),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Handler for a PREPARE message sent from a proposer. The acceptor
    /// promises numbers higher than its last promise and discloses the value
    /// it accepted last so the proposer can preserve it.
    pub async fn receive_prepare(&self, prepare: Prepare) -> Promise<V> {
        let mut state = self.state.lock().await;
        debug!("[acceptor {}] PREPARE {}", self.address, prepare.number);

        if state.promise(prepare.number) {
            Promise {
                number: prepare.number,
                acceptor: self.address,
                accepted: true,
                prior: state.accepted.clone(),
            }
        } else {
            debug!(
                "[acceptor {}] rejecting PREPARE {}, already promised {:?}",
                self.address, prepare.number, state.promised
            );
            Promise {
                number: prepare.number,
                acceptor: self.address,
                accepted: false,
                prior: None,
            }
        }
    }

    /// Handler for an ACCEPT message, which is sent from a proposer when a
    /// quorum for the Phase 1 PREPARE has been made. On success every learner
    /// is notified; notification failures do not change the outcome.
    pub async fn receive_accept(&self, accept: Accept<V>) -> Accepted {
        let Accept { number, value } = accept;
        let accepted = {
            let mut state = self.state.lock().await;
            debug!("[acceptor {}] ACCEPT {} {:?}", self.address, number, value);
            let accepted = state.accept(number, value);
            if !accepted {
                debug!(
                    "[acceptor {}] rejecting ACCEPT {}, promised {:?}",
                    self.address, number, state.promised
                );
            }
            accepted
        };

        let reply = Accepted {
            number,
            acceptor: self.address,
            accepted,
        };
        if accepted {
            self.notify_learners(reply).await;
        }
        reply
    }

    async fn notify_learners(&self, accepted: Accepted) {
        let mut notifications = self.notifications.lock().await;
        while notifications.try_join_next().is_some() {}
        for &learner in self.learners.iter() {
            let call = self.transport.call(learner, Request::Accepted(accepted));
            let acceptor = self.address;
            notifications.spawn(async move {
                if let Err(e) = call.await {
                    debug!("[acceptor {}] learner {} not notified: {}", acceptor, learner, e);
                }
            });
        }
    }

    /// Clears promise and accept state between test rounds. Notifications
    /// not yet delivered are cancelled, so learners reset afterwards never
    /// see a vote from before the reset.
    pub async fn reset(&self) {
        let mut notifications = self.notifications.lock().await;
        notifications.abort_all();
        while notifications.join_next().await.is_some() {}
        self.state.lock().await.clear();
    }

    /// Highest promised number
    pub async fn promised(&self) -> Option<ProposalNumber> {
        self.state.lock().await.promised
    }

    /// Last accepted number/value pair
    pub async fn accepted(&self) -> Option<AcceptedProposal<V>> {
        self.state.lock().await.accepted.clone()
    }
}

impl<V: Value, T: Transport<V>> Handler<V> for Acceptor<V, T> {
    fn handle(&self, request: Request<V>) -> BoxFuture<'_, Result<Response<V>>> {
        async move {
            match request {
                Request::Prepare(prepare) => {
                    Ok(Response::Promise(self.receive_prepare(prepare).await))
                }
                Request::Accept(accept) => {
                    Ok(Response::Accepted(self.receive_accept(accept).await))
                }
                other => Err(Error::UnknownMethod(other.method())),
            }
        }
        .boxed()
    }
}
