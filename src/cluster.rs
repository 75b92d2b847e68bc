//! In-process cluster wiring every role onto one `LocalTransport`.
//!
//! Learners are bound at `127.0.0.1:4201..`, acceptors at `127.0.0.1:4101..`
//! and proposers get the ids `1..=P`. Each cluster owns its transport, so
//! clusters never interfere with each other even though they reuse the
//! same addresses.
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::acceptor::Acceptor;
use crate::config::{quorum_size, Configuration};
use crate::learner::Learner;
use crate::proposal::OwnerId;
use crate::proposer::Proposer;
use crate::transport::local::LocalTransport;
use crate::value::Value;

const ACCEPTOR_BASE_PORT: u16 = 4100;
const LEARNER_BASE_PORT: u16 = 4200;

pub type LocalProposer<V> = Proposer<V, LocalTransport<V>>;
pub type LocalAcceptor<V> = Acceptor<V, LocalTransport<V>>;

pub struct LocalCluster<V: Value> {
    transport: Arc<LocalTransport<V>>,
    config: Configuration,
    proposers: Vec<Arc<LocalProposer<V>>>,
    acceptors: Vec<Arc<LocalAcceptor<V>>>,
    learners: Vec<Arc<Learner>>,
}

fn local_addr(base: u16, index: usize) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], base.wrapping_add(index as u16 + 1)))
}

impl<V: Value> LocalCluster<V> {
    /// Builds a cluster with the default timing configuration.
    pub fn new(proposers: usize, acceptors: usize, learners: usize) -> LocalCluster<V> {
        LocalCluster::with_configuration(proposers, acceptors, learners, |config| config)
    }

    /// Builds a cluster, letting `configure` adjust the timing knobs of the
    /// membership configuration handed to every proposer.
    pub fn with_configuration<F>(
        proposers: usize,
        acceptors: usize,
        learners: usize,
        configure: F,
    ) -> LocalCluster<V>
    where
        F: FnOnce(Configuration) -> Configuration,
    {
        let transport = Arc::new(LocalTransport::new());
        let config = configure(Configuration::new(
            (0..acceptors).map(|i| local_addr(ACCEPTOR_BASE_PORT, i)),
            (0..learners).map(|i| local_addr(LEARNER_BASE_PORT, i)),
        ));

        let learners: Vec<_> = config
            .learners()
            .iter()
            .map(|&addr| {
                let learner = Arc::new(Learner::new(addr, quorum_size(acceptors)));
                transport.bind(addr, learner.clone());
                learner
            })
            .collect();

        let acceptors: Vec<_> = config
            .acceptors()
            .iter()
            .map(|&addr| {
                let learners = config.shared_learners();
                let acceptor = Arc::new(Acceptor::new(addr, learners, transport.clone()));
                transport.bind(addr, acceptor.clone());
                acceptor
            })
            .collect();

        let proposers = (1..=proposers)
            .map(|id| Arc::new(Proposer::new(id as OwnerId, config.clone(), transport.clone())))
            .collect();

        info!(
            "Started local cluster with {} acceptors and {} learners",
            acceptors.len(),
            learners.len()
        );
        LocalCluster {
            transport,
            config,
            proposers,
            acceptors,
            learners,
        }
    }

    /// Makes every acceptor drop inbound calls with probability `rate`.
    pub fn set_unreliable(&self, rate: f64) {
        for addr in self.config.acceptors() {
            self.transport.set_drop_rate(*addr, rate);
        }
    }

    /// Has every proposer propose its value concurrently. Returns the value
    /// each proposer decided, in proposer order.
    pub async fn propose_all(&self, values: Vec<V>) -> Vec<V> {
        if values.len() != self.proposers.len() {
            warn!(
                "{} values for {} proposers; extra proposers stay idle",
                values.len(),
                self.proposers.len()
            );
        }
        join_all(self.proposers.iter().zip(values).map(|(p, v)| p.propose(v))).await
    }

    /// Clears the memory of every role between rounds. Acceptors go before
    /// learners so no notification from the previous round is counted.
    pub async fn reset(&self) {
        for proposer in &self.proposers {
            proposer.reset().await;
        }
        for acceptor in &self.acceptors {
            acceptor.reset().await;
        }
        for learner in &self.learners {
            learner.reset().await;
        }
    }

    /// Unbinds every endpoint; later calls fail as unreachable.
    pub fn close(&self) {
        let endpoints = self.config.acceptors().iter().chain(self.config.learners());
        for addr in endpoints {
            self.transport.close(*addr);
        }
    }

    pub fn transport(&self) -> &Arc<LocalTransport<V>> {
        &self.transport
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn proposers(&self) -> &[Arc<LocalProposer<V>>] {
        &self.proposers
    }

    pub fn acceptors(&self) -> &[Arc<LocalAcceptor<V>>] {
        &self.acceptors
    }

    pub fn learners(&self) -> &[Arc<Learner>] {
        &self.learners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::messages::{Prepare, Request};
    use crate::proposal::ProposalNumber;
    use crate::rpc::Transport;
    use std::time::Duration;
    use tokio::time::timeout;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Every proposer decided the same value, one of those proposed, and a
    /// quorum of acceptors holds it.
    async fn check_agreement(cluster: &LocalCluster<u64>, proposed: &[u64], decided: &[u64]) {
        assert_eq!(decided.len(), proposed.len());
        let value = decided[0];
        assert!(decided.iter().all(|v| *v == value), "split decision {:?}", decided);
        assert!(proposed.contains(&value), "{} was never proposed", value);

        for proposer in cluster.proposers() {
            assert_eq!(proposer.decided().await, Some(value));
        }

        let mut holders = 0;
        for acceptor in cluster.acceptors() {
            if acceptor.accepted().await.map(|a| a.value) == Some(value) {
                holders += 1;
            }
        }
        assert!(holders >= cluster.config().quorum_size());
    }

    async fn await_chosen(learner: &Learner) -> ProposalNumber {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Some(number) = learner.chosen().await {
                    return number;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("learner saw a quorum")
    }

    #[tokio::test]
    async fn single_proposer() {
        init();
        let cluster = LocalCluster::<u64>::new(1, 3, 2);
        let decided = cluster.propose_all(vec![100]).await;
        assert_eq!(decided, vec![100]);
        check_agreement(&cluster, &[100], &decided).await;

        let number = cluster.proposers()[0].last_number().await;
        for learner in cluster.learners() {
            assert_eq!(Some(await_chosen(learner).await), number);
        }
        cluster.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn competing_proposers() {
        init();
        let cluster = LocalCluster::<u64>::new(3, 3, 2);
        for base in [100, 200, 300] {
            let values: Vec<u64> = (0..3).map(|i| base + i).collect();
            let decided = timeout(Duration::from_secs(20), cluster.propose_all(values.clone()))
                .await
                .expect("proposers reached agreement");
            check_agreement(&cluster, &values, &decided).await;
            cluster.reset().await;
        }
        cluster.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn competing_proposers_unreliable_network() {
        init();
        let cluster = LocalCluster::<u64>::new(3, 3, 2);
        cluster.set_unreliable(0.3);
        for base in [100, 200, 300] {
            let values: Vec<u64> = (0..3).map(|i| base + i).collect();
            let decided = timeout(Duration::from_secs(30), cluster.propose_all(values.clone()))
                .await
                .expect("proposers reached agreement");
            check_agreement(&cluster, &values, &decided).await;
            cluster.reset().await;
        }
        cluster.close();
    }

    #[tokio::test]
    async fn minority_of_acceptors_down() {
        init();
        let cluster = LocalCluster::<u64>::with_configuration(2, 5, 1, |config| {
            config.with_phase_timeout(Duration::from_millis(50))
        });
        cluster.transport().close(cluster.config().acceptors()[0]);
        cluster.transport().close(cluster.config().acceptors()[4]);

        let decided = timeout(Duration::from_secs(20), cluster.propose_all(vec![7, 8]))
            .await
            .expect("proposers reached agreement");
        check_agreement(&cluster, &[7, 8], &decided).await;
        assert_eq!(cluster.acceptors()[0].accepted().await, None);
    }

    #[tokio::test]
    async fn closed_cluster_is_unreachable() {
        let cluster = LocalCluster::<u64>::new(1, 3, 1);
        cluster.close();
        let acceptor = cluster.config().acceptors()[0];
        let res = cluster
            .transport()
            .call(
                acceptor,
                Request::Prepare(Prepare {
                    number: ProposalNumber::new(1, 1),
                }),
            )
            .await;
        assert_matches!(res, Err(Error::Unreachable(a)) if a == acceptor);
    }
}
