//! Single-decree Paxos: proposers, acceptors and learners agreeing on one
//! value over an unreliable network.
//!
//! Roles talk through a [`Transport`](rpc::Transport). The in-process
//! [`LocalTransport`] can drop or delay calls; the [`HttpTransport`] carries
//! bincode-encoded calls over HTTP.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use basic_paxos::LocalCluster;
//! # #[tokio::main]
//! # async fn main() {
//! let cluster = LocalCluster::<u64>::new(3, 3, 2);
//! cluster.set_unreliable(0.3);
//!
//! let decided = cluster.propose_all(vec![100, 101, 102]).await;
//! assert!(decided.iter().all(|v| *v == decided[0]));
//! # }
//! ```
#[cfg(test)]
#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate log;

pub mod acceptor;
pub mod cluster;
pub mod config;
pub mod error;
pub mod learner;
pub mod messages;
pub mod proposal;
pub mod proposer;
mod retry;
pub mod rpc;
pub mod transport;
pub mod value;

pub use acceptor::Acceptor;
pub use cluster::LocalCluster;
pub use config::Configuration;
pub use error::{Error, Result};
pub use learner::Learner;
pub use proposal::{OwnerId, ProposalNumber};
pub use proposer::{Proposer, ProposerStatus};
pub use transport::{HttpTransport, LocalTransport};
pub use value::{BytesValue, Value};
