//! Ballot pool bookkeeping.
//!
//! The pool itself is a directory of per-voter ballot files; availability
//! lives in a [`StatusBackend`], of which two shapes are deployed: a
//! per-election status file next to the pool, and the legacy MongoDB
//! `ballots` collection. [`BallotStore`] hides the difference.

pub mod file;
pub mod mongo;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::config::{Config, StatusBackendKind};
use crate::decrypt::BallotDecryptor;
use crate::error::{Error, Result};
use crate::model::{Ballot, BallotId, BallotStatus, ElectionId};

pub use file::FileStatusBackend;
pub use mongo::MongoStatusBackend;

/// Durable per-ballot status storage. Every `set_status` must be durable
/// before it returns.
pub trait StatusBackend: Send {
    /// Status of every recorded ballot in one election's pool. Ballots the
    /// backend has never seen are implicitly `Unused`.
    fn statuses(&self, election_id: &str) -> Result<HashMap<BallotId, BallotStatus>>;

    /// Durably set one ballot's status.
    fn set_status(&self, election_id: &str, ballot_id: &str, status: BallotStatus) -> Result<()>;
}

/// Construct the backend selected by the device configuration.
pub fn backend_from_config(config: &Config) -> Result<Box<dyn StatusBackend>> {
    match &config.status_backend {
        StatusBackendKind::File => Ok(Box::new(FileStatusBackend::new(&config.elections_root))),
        StatusBackendKind::Mongo { uri } => Ok(Box::new(MongoStatusBackend::connect(uri)?)),
    }
}

/// A ballot handed out by [`BallotStore::issue`].
#[derive(Debug)]
pub struct IssuedBallot {
    /// Pool identifier (the backing file stem); the id `commit` and
    /// `quarantine` are keyed by.
    pub ballot_id: BallotId,
    pub path: PathBuf,
    pub ballot: Ballot,
}

/// Tracks per-election ballot availability and issues ballots from the
/// pool, quarantining any it finds unreadable along the way.
pub struct BallotStore {
    root: PathBuf,
    backend: Box<dyn StatusBackend>,
    /// Issued but not yet committed, excluded from further issuance so two
    /// issuances can never return the same ballot.
    issued: HashSet<(ElectionId, BallotId)>,
}

impl BallotStore {
    pub fn new(root: impl Into<PathBuf>, backend: Box<dyn StatusBackend>) -> Self {
        Self {
            root: root.into(),
            backend,
            issued: HashSet::new(),
        }
    }

    fn ballots_dir(&self, election_id: &str) -> PathBuf {
        self.root.join(election_id).join("ballots")
    }

    /// Issue the first available ballot of the election, in stable sorted
    /// order. A ballot whose backing file is missing or unreadable is
    /// quarantined and the next one tried; the walk is bounded by the pool
    /// size and ends in `PoolExhausted`.
    pub fn issue(
        &mut self,
        election_id: &str,
        decryptor: &mut BallotDecryptor,
    ) -> Result<IssuedBallot> {
        let dir = self.ballots_dir(election_id);
        if !dir.is_dir() {
            return Err(Error::ElectionNotFound(election_id.to_string()));
        }
        let statuses = self.backend.statuses(election_id)?;

        // Provisioned entries and files actually present may disagree;
        // walk the union so a ballot with a vanished file still gets
        // quarantined rather than silently skipped.
        let mut pool: BTreeSet<BallotId> = statuses.keys().cloned().collect();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    pool.insert(stem.to_string());
                }
            }
        }

        for ballot_id in pool {
            match statuses.get(&ballot_id) {
                Some(BallotStatus::Used) | Some(BallotStatus::Corrupt) => continue,
                _ => {}
            }
            if self.issued.contains(&(election_id.to_string(), ballot_id.clone())) {
                continue;
            }

            let path = dir.join(format!("{ballot_id}.json"));
            if !path.is_file() {
                warn!("Ballot {ballot_id} has no backing file, quarantining");
                self.backend
                    .set_status(election_id, &ballot_id, BallotStatus::Corrupt)?;
                continue;
            }
            match decryptor.load(&path) {
                Ok(ballot) => {
                    info!("Issued ballot {ballot_id} for election {election_id}");
                    self.issued
                        .insert((election_id.to_string(), ballot_id.clone()));
                    return Ok(IssuedBallot {
                        ballot_id,
                        path,
                        ballot,
                    });
                }
                // A key that will not unlock cannot be healed by trying
                // the next ballot; every ballot is encrypted for the same
                // device key.
                Err(err @ Error::KeyUnlock(_)) => return Err(err),
                Err(err) => {
                    warn!("Ballot {ballot_id} unreadable ({err}), quarantining");
                    self.backend
                        .set_status(election_id, &ballot_id, BallotStatus::Corrupt)?;
                }
            }
        }

        Err(Error::PoolExhausted(election_id.to_string()))
    }

    /// Durably mark a ballot consumed. Committing an already-used ballot
    /// is a no-op; committing a quarantined one is an error.
    pub fn commit(&mut self, ballot_id: &str, election_id: &str) -> Result<()> {
        let statuses = self.backend.statuses(election_id)?;
        match statuses.get(ballot_id) {
            Some(BallotStatus::Corrupt) => {
                return Err(Error::BallotCorrupt(ballot_id.to_string()))
            }
            Some(BallotStatus::Used) => {}
            _ => {
                self.backend
                    .set_status(election_id, ballot_id, BallotStatus::Used)?;
                info!("Ballot {ballot_id} committed as used for election {election_id}");
            }
        }
        self.release(ballot_id, election_id);
        Ok(())
    }

    /// Durably exclude a ballot from all future issuance.
    pub fn quarantine(&mut self, ballot_id: &str, election_id: &str) -> Result<()> {
        let statuses = self.backend.statuses(election_id)?;
        if let Some(BallotStatus::Used) = statuses.get(ballot_id) {
            return Err(Error::InvalidState("ballot is already used"));
        }
        self.backend
            .set_status(election_id, ballot_id, BallotStatus::Corrupt)?;
        warn!("Ballot {ballot_id} quarantined for election {election_id}");
        self.release(ballot_id, election_id);
        Ok(())
    }

    /// Return an issued-but-uncommitted ballot to the pool, e.g. when the
    /// voter cancels before casting.
    pub fn release(&mut self, ballot_id: &str, election_id: &str) {
        self.issued
            .remove(&(election_id.to_string(), ballot_id.to_string()));
    }
}
