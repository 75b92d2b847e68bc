use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::messages::{Accepted, Request, Response};
use crate::proposal::ProposalNumber;
use crate::rpc::Handler;
use crate::value::Value;

#[derive(Default)]
struct LearnerState {
    /// Acceptors that announced acceptance, per proposal number
    votes: HashMap<ProposalNumber, HashSet<SocketAddr>>,
    /// First number announced by a quorum of acceptors
    chosen: Option<ProposalNumber>,
    received: usize,
}

/// Endpoint that acceptors notify after every successful ACCEPT.
///
/// The learner only acknowledges and counts notifications; delivering the
/// decided value to an application is left to the caller.
pub struct Learner {
    address: SocketAddr,
    quorum: usize,
    state: Mutex<LearnerState>,
}

impl Learner {
    /// Creates a learner bound at `address` that considers a proposal chosen
    /// once `quorum` distinct acceptors announced it.
    pub fn new(address: SocketAddr, quorum: usize) -> Learner {
        Learner {
            address,
            quorum,
            state: Mutex::new(LearnerState::default()),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Handler for ACCEPTED notifications from acceptors.
    pub async fn receive_accepted(&self, accepted: Accepted) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.received += 1;
        trace!("[learner {}] ACCEPTED {:?}", self.address, accepted);

        if !accepted.accepted {
            return;
        }

        let voters = state.votes.entry(accepted.number).or_default();
        voters.insert(accepted.acceptor);
        if voters.len() >= self.quorum && state.chosen.is_none() {
            info!("[learner {}] proposal {} chosen", self.address, accepted.number);
            state.chosen = Some(accepted.number);
        }
    }

    /// Proposal number accepted by a quorum of acceptors, if any
    pub async fn chosen(&self) -> Option<ProposalNumber> {
        self.state.lock().await.chosen
    }

    /// Number of notifications received
    pub async fn received(&self) -> usize {
        self.state.lock().await.received
    }

    /// Forgets every notification between test rounds.
    pub async fn reset(&self) {
        *self.state.lock().await = LearnerState::default();
    }
}

impl<V: Value> Handler<V> for Learner {
    fn handle(&self, request: Request<V>) -> BoxFuture<'_, Result<Response<V>>> {
        async move {
            match request {
                Request::Accepted(accepted) => {
                    self.receive_accepted(accepted).await;
                    Ok(Response::Ack)
                }
                other => Err(Error::UnknownMethod(other.method())),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Method, Prepare};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn accepted(round: u64, acceptor: u16, ok: bool) -> Accepted {
        Accepted {
            number: ProposalNumber::new(round, 1),
            acceptor: addr(acceptor),
            accepted: ok,
        }
    }

    #[tokio::test]
    async fn quorum_of_distinct_acceptors() {
        let learner = Learner::new(addr(4201), 2);

        learner.receive_accepted(accepted(1, 4101, true)).await;
        assert_eq!(learner.chosen().await, None);

        // duplicates from the same acceptor count once
        learner.receive_accepted(accepted(1, 4101, true)).await;
        assert_eq!(learner.chosen().await, None);

        // other proposal numbers are tracked separately
        learner.receive_accepted(accepted(2, 4102, true)).await;
        assert_eq!(learner.chosen().await, None);

        learner.receive_accepted(accepted(1, 4103, true)).await;
        assert_eq!(learner.chosen().await, Some(ProposalNumber::new(1, 1)));

        // the first chosen number sticks
        learner.receive_accepted(accepted(2, 4103, true)).await;
        assert_eq!(learner.chosen().await, Some(ProposalNumber::new(1, 1)));
        assert_eq!(learner.received().await, 5);
    }

    #[tokio::test]
    async fn negative_notifications_are_acknowledged() {
        let learner = Learner::new(addr(4201), 1);
        let res: Result<Response<u64>> = learner
            .handle(Request::Accepted(accepted(1, 4101, false)))
            .await;
        assert_matches!(res, Ok(Response::Ack));
        assert_eq!(learner.chosen().await, None);
        assert_eq!(learner.received().await, 1);

        learner.reset().await;
        assert_eq!(learner.received().await, 0);
    }

    #[tokio::test]
    async fn rejects_acceptor_methods() {
        let learner = Learner::new(addr(4201), 1);
        let res: Result<Response<u64>> = learner
            .handle(Request::Prepare(Prepare {
                number: ProposalNumber::new(1, 1),
            }))
            .await;
        assert_matches!(res, Err(Error::UnknownMethod(Method::ReceivePrepare)));
    }
}
