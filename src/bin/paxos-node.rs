#[macro_use]
extern crate log;

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use basic_paxos::config::quorum_size;
use basic_paxos::transport::{serve, Listener};
use basic_paxos::{Acceptor, BytesValue, Configuration, HttpTransport, Learner, Proposer};
use clap::{Parser, Subcommand};

/// Runs one Paxos role over HTTP.
#[derive(Parser)]
#[command(name = "paxos-node", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serves an acceptor that notifies learners of every acceptance
    Acceptor {
        #[arg(long)]
        listen: SocketAddr,
        #[arg(long = "learner")]
        learners: Vec<SocketAddr>,
        /// Probability of dropping an inbound call
        #[arg(long, default_value_t = 0.0)]
        drop_rate: f64,
    },
    /// Serves a learner
    Learner {
        #[arg(long)]
        listen: SocketAddr,
        /// Number of acceptors in the cluster
        #[arg(long)]
        acceptors: usize,
    },
    /// Proposes a value and prints the decided value
    Propose {
        /// Proposer id, unique within the cluster
        #[arg(long)]
        id: u32,
        #[arg(long = "acceptor", required = true)]
        acceptors: Vec<SocketAddr>,
        #[arg(long, default_value_t = 200)]
        timeout_ms: u64,
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let transport = Arc::new(HttpTransport::new());

    match cli.command {
        Command::Acceptor {
            listen,
            learners,
            drop_rate,
        } => {
            let socket = TcpListener::bind(listen)?;
            let acceptor = Arc::new(Acceptor::<BytesValue, _>::new(
                socket.local_addr()?,
                learners.into(),
                transport,
            ));
            let listener = serve::<BytesValue>(socket, acceptor, drop_rate)?;
            run_until_interrupted(listener).await?;
        }
        Command::Learner { listen, acceptors } => {
            let socket = TcpListener::bind(listen)?;
            let learner = Arc::new(Learner::new(socket.local_addr()?, quorum_size(acceptors)));
            let listener = serve::<BytesValue>(socket, learner.clone(), 0.0)?;
            run_until_interrupted(listener).await?;
            info!(
                "Learner saw {} notifications, chosen: {:?}",
                learner.received().await,
                learner.chosen().await
            );
        }
        Command::Propose {
            id,
            acceptors,
            timeout_ms,
            value,
        } => {
            let config = Configuration::new(acceptors, Vec::new())
                .with_phase_timeout(Duration::from_millis(timeout_ms));
            let proposer = Proposer::new(id, config, transport);
            let decided = proposer.propose(BytesValue::from(value)).await;
            println!("{}", decided);
        }
    }
    Ok(())
}

async fn run_until_interrupted(listener: Listener) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down {}", listener.local_addr());
    listener.close().await;
    Ok(())
}
