use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An `OwnerId` uniquely identifies a proposer within the cluster. Values
/// are assigned disjointly when the cluster is set up.
pub type OwnerId = u32;

/// Proposal numbering is an increasing round in order to order proposals
/// across multiple proposers. Numbers are unique in that the owner of the
/// number breaks ties between proposers that reach the same round.
#[derive(Serialize, Deserialize, PartialEq, Hash, Eq, Clone, Copy, Debug)]
pub struct ProposalNumber {
    round: u64,
    owner: OwnerId,
}

impl ProposalNumber {
    /// Creates a proposal number for an explicit round and owner.
    pub fn new(round: u64, owner: OwnerId) -> ProposalNumber {
        ProposalNumber { round, owner }
    }

    /// Generates a number that is greater than `last` for the given owner,
    /// starting at round 1 when nothing was generated yet.
    pub fn next(owner: OwnerId, last: Option<ProposalNumber>) -> ProposalNumber {
        let round = last.map_or(1, |n| n.round + 1);
        ProposalNumber { round, owner }
    }

    /// Round component of the number
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Proposer that generated the number
    pub fn owner(&self) -> OwnerId {
        self.owner
    }
}

impl PartialOrd for ProposalNumber {
    fn partial_cmp(&self, other: &ProposalNumber) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProposalNumber {
    fn cmp(&self, other: &ProposalNumber) -> Ordering {
        match self.round.cmp(&other.round) {
            Ordering::Equal => self.owner.cmp(&other.owner),
            o => o,
        }
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.round, self.owner)
    }
}
