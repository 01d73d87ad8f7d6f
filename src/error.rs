use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{BallotId, CandidateId, ElectionId, Rank};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No ballot pool has been provisioned for this election.
    #[error("no ballot pool for election {0}")]
    ElectionNotFound(ElectionId),
    /// Every ballot in the pool is used or quarantined.
    #[error("no unused ballots remain for election {0}")]
    PoolExhausted(ElectionId),
    /// The ballot is quarantined and may not be issued or committed.
    #[error("ballot {0} is corrupt")]
    BallotCorrupt(BallotId),
    /// The hardware-derived passphrase did not unlock the private key.
    /// The ballots were encrypted for a different physical device; fatal.
    #[error("failed to unlock device private key: {0}")]
    KeyUnlock(String),
    #[error("failed to decrypt ballot payload: {0}")]
    Decryption(String),
    #[error("malformed ballot document: {0}")]
    BallotFormat(String),
    #[error("token {0} has already been used")]
    TokenAlreadyUsed(String),
    #[error("token grants access to no elections")]
    AccessDenied,
    #[error("candidate {0} is not on this ballot")]
    UnknownCandidate(CandidateId),
    /// The candidate already holds an earlier preference.
    #[error("candidate is already ranked at preference {rank}")]
    AlreadyRanked { rank: Rank },
    #[error("printer reported failure: {0}")]
    PrintFailure(String),
    #[error("printer did not respond within {0} seconds")]
    PrintTimeout(u64),
    /// A durable write did not complete; the vote or token it carried is
    /// not considered committed.
    #[error("durable write failed: {0}")]
    Persistence(String),
    #[error("invalid operation: {0}")]
    InvalidState(&'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Db(#[from] DbError),
}
