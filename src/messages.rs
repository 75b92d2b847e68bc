//! Messages exchanged between the roles of a single Paxos instance.
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::proposal::ProposalNumber;

/// `PREPARE` message is the Phase 1a message from a proposer sent
/// to acceptors to receive agreement to not accept proposals of lower number.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
pub struct Prepare {
    pub number: ProposalNumber,
}

/// Pair containing the number and value most recently accepted by an acceptor.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct AcceptedProposal<V> {
    pub number: ProposalNumber,
    pub value: V,
}

/// `PROMISE` is the Phase 1b message sent from acceptors in reply to
/// `PREPARE` messages. When `accepted` is set, the acceptor will not accept
/// proposals less than `number` and discloses the value it last accepted.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Promise<V> {
    pub number: ProposalNumber,
    pub acceptor: SocketAddr,
    pub accepted: bool,
    pub prior: Option<AcceptedProposal<V>>,
}

/// `ACCEPT` message is the Phase 2a message from a proposer sent
/// to acceptors to accept a value. The `ACCEPT` message is predicated
/// on the proposer receiving quorum from Phase 1.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Accept<V> {
    pub number: ProposalNumber,
    pub value: V,
}

/// `ACCEPTED` is the Phase 2b message sent from acceptors in reply to the
/// proposer and, on success, to every learner.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
pub struct Accepted {
    pub number: ProposalNumber,
    pub acceptor: SocketAddr,
    pub accepted: bool,
}

/// Request delivered to a role endpoint.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum Request<V> {
    Prepare(Prepare),
    Accept(Accept<V>),
    Accepted(Accepted),
}

impl<V> Request<V> {
    /// Name of the remote method the request invokes.
    pub fn method(&self) -> Method {
        match *self {
            Request::Prepare(_) => Method::ReceivePrepare,
            Request::Accept(_) => Method::ReceiveAccept,
            Request::Accepted(_) => Method::ReceiveAccepted,
        }
    }
}

/// Reply from a role endpoint.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum Response<V> {
    Promise(Promise<V>),
    Accepted(Accepted),
    /// Empty acknowledgment sent by learners
    Ack,
}

impl<V> Response<V> {
    /// Unpacks the reply to a PREPARE.
    pub fn into_promise(self) -> Result<Promise<V>> {
        match self {
            Response::Promise(promise) => Ok(promise),
            _ => Err(Error::UnexpectedResponse(Method::ReceivePrepare)),
        }
    }

    /// Unpacks the reply to an ACCEPT.
    pub fn into_accepted(self) -> Result<Accepted> {
        match self {
            Response::Accepted(accepted) => Ok(accepted),
            _ => Err(Error::UnexpectedResponse(Method::ReceiveAccept)),
        }
    }
}

/// Remote methods exposed by the roles.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum Method {
    ReceivePrepare,
    ReceiveAccept,
    ReceiveAccepted,
}

impl Method {
    /// Qualified method name, `Role.Method`
    pub fn name(self) -> &'static str {
        match self {
            Method::ReceivePrepare => "Acceptor.ReceivePrepare",
            Method::ReceiveAccept => "Acceptor.ReceiveAccept",
            Method::ReceiveAccepted => "Learner.ReceiveAccepted",
        }
    }

    /// Looks up a method by its qualified name.
    pub fn from_name(name: &str) -> Option<Method> {
        [
            Method::ReceivePrepare,
            Method::ReceiveAccept,
            Method::ReceiveAccepted,
        ]
        .into_iter()
        .find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
