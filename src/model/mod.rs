//! Shared data types: elections, candidates, ballots, tokens, votes and
//! receipts, in their one canonical shape. Source-document variations are
//! normalised away at the decryption boundary and never leak past here.

pub mod ballot;
pub mod candidate;
pub mod receipt;
pub mod token;
pub mod vote;

pub use ballot::{Ballot, BallotStatus, Election, ElectionType};
pub use candidate::{Candidate, NO_PREFERENCE_ID};
pub use receipt::ReceiptData;
pub use token::VoterToken;
pub use vote::{VoteRecord, PREFERENCE_SEPARATOR};

/// Election identifier, e.g. `"E1"`.
pub type ElectionId = String;

/// Ballot identifier; for pool ballots this is the backing file stem.
pub type BallotId = String;

/// A candidate's per-ballot shuffled identifying number.
pub type CandidateId = u32;

/// A 1-based preference rank.
pub type Rank = u32;
