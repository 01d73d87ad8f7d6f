//! The voting-session state machine.
//!
//! One controller drives one voter at a time from token scan to printed
//! receipts: validate the token, issue and decode a ballot per entitled
//! election, capture selections, buffer receipts, and only after a
//! confirmed batch print persist the votes and consume the token.

mod selection;

pub use selection::Selections;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::decrypt::BallotDecryptor;
use crate::error::{Error, Result};
use crate::hardware::DeviceIdentity;
use crate::ledger::{TokenLedger, VoteLog};
use crate::model::{
    Ballot, BallotId, CandidateId, ElectionId, ElectionType, Rank, ReceiptData, VoteRecord,
    VoterToken, PREFERENCE_SEPARATOR,
};
use crate::peripherals::{dispatch_print, PrintSink, ScannedToken};
use crate::store::{backend_from_config, BallotStore};

/// Where the controller currently rests. Token validation, election
/// activation and vote commit are synchronous passages between these
/// states, so only the states a front end can observe are represented.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Idle, waiting for a card.
    AwaitingToken,
    /// A token was accepted; the first election is being activated.
    TokenValidated,
    /// Collecting the choice for this rank of the active election.
    SelectionInProgress { rank: Rank },
    /// Every rank chosen; waiting for the voter to confirm or edit.
    Confirming,
    /// All entitled elections committed; receipts await the batch print.
    ReadyToPrint,
    /// The batch print failed or timed out; retry or cancel.
    PrintFailed,
}

/// The election currently in front of the voter.
struct ActiveElection {
    /// Election id from the entitlement vector, authoritative for store
    /// and log writes.
    election_id: ElectionId,
    /// Pool id of the issued ballot (its backing file stem).
    pool_ballot_id: BallotId,
    ballot: Ballot,
    selections: Selections,
    max_rank: Rank,
}

/// A vote waiting for the batch print, paired with its printable fields.
struct BufferedVote {
    record: VoteRecord,
    receipt: ReceiptData,
}

/// One voter's visit.
struct ActiveSession {
    token: VoterToken,
    queue: VecDeque<ElectionId>,
    current: Option<ActiveElection>,
    buffer: Vec<BufferedVote>,
}

/// Sequences one voter through their entitled elections. Exactly one
/// session is active at a time; a front end drives the controller through
/// these methods and renders from its accessors.
pub struct SessionController {
    store: BallotStore,
    decryptor: BallotDecryptor,
    tokens: TokenLedger,
    votes: VoteLog,
    printer: Arc<dyn PrintSink>,
    booth: u32,
    print_timeout: Duration,
    reject_delay: Duration,
    state: SessionState,
    session: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(
        store: BallotStore,
        decryptor: BallotDecryptor,
        tokens: TokenLedger,
        votes: VoteLog,
        printer: Arc<dyn PrintSink>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            decryptor,
            tokens,
            votes,
            printer,
            booth: config.booth,
            print_timeout: config.print_timeout(),
            reject_delay: config.reject_delay(),
            state: SessionState::AwaitingToken,
            session: None,
        }
    }

    /// Wire up a controller from the device configuration, with the
    /// production hardware identity.
    pub fn from_config(config: &Config, printer: Arc<dyn PrintSink>) -> Result<Self> {
        let store = BallotStore::new(&config.elections_root, backend_from_config(config)?);
        let decryptor =
            BallotDecryptor::new(&config.private_key_path, Box::new(DeviceIdentity));
        let tokens = TokenLedger::new(&config.token_log_path);
        let votes = VoteLog::new(&config.vote_log_path);
        Ok(Self::new(store, decryptor, tokens, votes, printer, config))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// How long a front end should show a token-rejection screen before
    /// returning to the waiting screen.
    pub fn reject_delay(&self) -> Duration {
        self.reject_delay
    }

    pub fn current_ballot(&self) -> Option<&Ballot> {
        self.current_election().map(|election| &election.ballot)
    }

    pub fn current_election_id(&self) -> Option<&str> {
        self.current_election()
            .map(|election| election.election_id.as_str())
    }

    pub fn selections(&self) -> Option<&Selections> {
        self.current_election().map(|election| &election.selections)
    }

    /// Elections still queued after the active one.
    pub fn remaining_elections(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.queue.len())
    }

    /// Votes buffered for the batch print.
    pub fn buffered_votes(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.buffer.len())
    }

    /// The earlier rank already holding this candidate, if any. Front ends
    /// use this to present the option disabled, annotated with that rank.
    pub fn earlier_rank_of(&self, candidate: CandidateId) -> Option<Rank> {
        let rank = match self.state {
            SessionState::SelectionInProgress { rank } => rank,
            _ => return None,
        };
        self.current_election()
            .and_then(|election| election.selections.earlier_rank_of(rank, candidate))
    }

    fn current_election(&self) -> Option<&ActiveElection> {
        self.session.as_ref().and_then(|session| session.current.as_ref())
    }

    /// Token scan: validate the token and activate the first entitled
    /// election. A used token or an empty entitlement vector is rejected
    /// without touching the ledger.
    pub fn begin_session(&mut self, scan: &ScannedToken) -> Result<()> {
        if self.state != SessionState::AwaitingToken {
            return Err(Error::InvalidState("a session is already active"));
        }
        let token = VoterToken::parse(&scan.payload);
        if self.tokens.is_used(&token.token_id)? {
            warn!("Token {} already used, rejecting", token.token_id);
            return Err(Error::TokenAlreadyUsed(token.token_id));
        }
        if token.eid_vector.is_empty() {
            warn!("Token {} grants no elections, rejecting", token.token_id);
            return Err(Error::AccessDenied);
        }
        info!(
            "Token {} validated, entitled to {:?}",
            token.token_id, token.eid_vector
        );
        self.state = SessionState::TokenValidated;
        let queue = token.eid_vector.iter().cloned().collect();
        self.session = Some(ActiveSession {
            token,
            queue,
            current: None,
            buffer: Vec::new(),
        });
        if let Err(err) = self.activate_next() {
            self.abort_session();
            return Err(err);
        }
        Ok(())
    }

    /// Pop the next entitled election and issue it a ballot; with the
    /// queue empty the session moves on to printing.
    fn activate_next(&mut self) -> Result<()> {
        let next = match self.session.as_mut() {
            Some(session) => session.queue.pop_front(),
            None => return Err(Error::InvalidState("no active session")),
        };
        let election_id = match next {
            Some(election_id) => election_id,
            None => {
                self.state = SessionState::ReadyToPrint;
                return Ok(());
            }
        };
        let issued = self.store.issue(&election_id, &mut self.decryptor)?;
        let ballot = issued.ballot;
        let max_rank = match ballot.election_type {
            ElectionType::SingleChoice => 1,
            ElectionType::Ranked => ballot.rank_count(),
        };
        debug!(
            "Election {election_id} active with ballot {} ({:?}, {} ranks)",
            issued.ballot_id, ballot.election_type, max_rank
        );
        if let Some(session) = self.session.as_mut() {
            session.current = Some(ActiveElection {
                election_id,
                pool_ballot_id: issued.ballot_id,
                ballot,
                selections: Selections::default(),
                max_rank,
            });
        }
        self.state = SessionState::SelectionInProgress { rank: 1 };
        Ok(())
    }

    /// Record the voter's choice for the current rank and advance.
    pub fn select(&mut self, candidate: CandidateId) -> Result<()> {
        let rank = match self.state {
            SessionState::SelectionInProgress { rank } => rank,
            _ => return Err(Error::InvalidState("no selection in progress")),
        };
        let election = current_election_mut(&mut self.session)?;
        if election.ballot.candidate(candidate).is_none() {
            return Err(Error::UnknownCandidate(candidate));
        }
        election.selections.set(rank, candidate)?;
        if rank < election.max_rank {
            self.state = SessionState::SelectionInProgress { rank: rank + 1 };
        } else {
            self.state = SessionState::Confirming;
        }
        Ok(())
    }

    /// Step back to the previous rank.
    pub fn back(&mut self) -> Result<()> {
        let rank = match self.state {
            SessionState::SelectionInProgress { rank } if rank > 1 => rank,
            _ => return Err(Error::InvalidState("at the first preference")),
        };
        current_election_mut(&mut self.session)?;
        self.state = SessionState::SelectionInProgress { rank: rank - 1 };
        Ok(())
    }

    /// Leave the confirmation screen and edit again from the first rank.
    pub fn edit(&mut self) -> Result<()> {
        if self.state != SessionState::Confirming {
            return Err(Error::InvalidState("nothing to edit"));
        }
        current_election_mut(&mut self.session)?;
        self.state = SessionState::SelectionInProgress { rank: 1 };
        Ok(())
    }

    /// Confirm the vote: build the record, buffer the receipt, spend the
    /// ballot and move to the next entitled election.
    pub fn cast_vote(&mut self) -> Result<()> {
        if self.state != SessionState::Confirming {
            return Err(Error::InvalidState("nothing to confirm"));
        }
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Err(Error::InvalidState("no active session")),
        };
        let election = match session.current.take() {
            Some(election) => election,
            None => return Err(Error::InvalidState("no active election")),
        };
        let now = Local::now();
        let record = build_vote_record(&election, &session.token, self.booth, &now);
        let receipt = build_receipt(&election, &now);
        debug!(
            "Vote queued for election {}: pref {}",
            election.election_id, record.pref_id
        );
        session.buffer.push(BufferedVote { record, receipt });

        // Spent the moment it joins the batch: a print failure later can
        // waste this ballot, but it can never be issued twice.
        if let Err(err) = self
            .store
            .commit(&election.pool_ballot_id, &election.election_id)
        {
            self.abort_session();
            return Err(err);
        }
        if let Err(err) = self.activate_next() {
            self.abort_session();
            return Err(err);
        }
        Ok(())
    }

    /// Batch print, then persist. On confirmed print success every
    /// buffered vote is written to the vote log and the token is consumed;
    /// on failure the session waits in [`SessionState::PrintFailed`].
    pub async fn finish_session(&mut self) -> Result<()> {
        match self.state {
            SessionState::ReadyToPrint | SessionState::PrintFailed => {}
            _ => return Err(Error::InvalidState("the session is not ready to print")),
        }
        let receipts: Vec<ReceiptData> = match self.session.as_ref() {
            Some(session) => session.buffer.iter().map(|vote| vote.receipt.clone()).collect(),
            None => return Err(Error::InvalidState("no active session")),
        };
        info!("Printing {} session receipt(s)", receipts.len());
        if let Err(err) = dispatch_print(&self.printer, receipts, self.print_timeout).await {
            warn!("Batch print failed: {err}");
            self.state = SessionState::PrintFailed;
            return Err(err);
        }

        // Persist votes, then consume the token. Failures past this point
        // are flagged for manual reconciliation, never retried: the voter
        // was already shown a successful print, and a retry could record a
        // vote twice.
        let session = match self.session.take() {
            Some(session) => session,
            None => return Err(Error::InvalidState("no active session")),
        };
        self.state = SessionState::AwaitingToken;
        for vote in &session.buffer {
            if let Err(err) = self.votes.append(&vote.record) {
                error!(
                    "RECONCILE: vote for election {} printed but not persisted: {err}",
                    vote.record.election_id
                );
                return Err(err);
            }
        }
        if let Err(err) = self.tokens.record(&session.token.token_id) {
            error!(
                "RECONCILE: token {} consumed but not recorded: {err}",
                session.token.token_id
            );
            return Err(err);
        }
        info!("Session complete for token {}", session.token.token_id);
        Ok(())
    }

    /// Re-run only the batch print after a failure; selections are not
    /// re-collected.
    pub async fn retry_print(&mut self) -> Result<()> {
        if self.state != SessionState::PrintFailed {
            return Err(Error::InvalidState("no failed print to retry"));
        }
        self.finish_session().await
    }

    /// Voter-initiated cancel: drop the remaining queue and the receipt
    /// buffer and return to waiting. Buffered receipts are never printed
    /// or logged; elections already committed stay committed.
    pub fn cancel_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(election) = session.current {
                self.store
                    .release(&election.pool_ballot_id, &election.election_id);
            }
            info!(
                "Session cancelled, {} buffered vote(s) discarded",
                session.buffer.len()
            );
        }
        self.state = SessionState::AwaitingToken;
    }

    /// Abort after a fatal activation error. Same cleanup as a cancel.
    fn abort_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(election) = session.current {
                self.store
                    .release(&election.pool_ballot_id, &election.election_id);
            }
            warn!(
                "Session aborted, {} buffered vote(s) discarded",
                session.buffer.len()
            );
        }
        self.state = SessionState::AwaitingToken;
    }
}

fn current_election_mut(session: &mut Option<ActiveSession>) -> Result<&mut ActiveElection> {
    session
        .as_mut()
        .and_then(|session| session.current.as_mut())
        .ok_or(Error::InvalidState("no active election"))
}

fn build_vote_record(
    election: &ActiveElection,
    token: &VoterToken,
    default_booth: u32,
    now: &DateTime<Local>,
) -> VoteRecord {
    let ballot = &election.ballot;
    let (pref_id, commitment) = match ballot.election_type {
        ElectionType::SingleChoice => {
            let chosen = election
                .selections
                .get(1)
                .and_then(|id| ballot.candidate(id));
            (
                chosen.map(|c| c.id.to_string()).unwrap_or_default(),
                chosen
                    .and_then(|c| c.commitment.clone())
                    .unwrap_or_default(),
            )
        }
        ElectionType::Ranked => (
            election.selections.preference_string(ballot),
            election.selections.commitment_string(ballot),
        ),
    };
    VoteRecord {
        election_id: election.election_id.clone(),
        voter_id: token.voter_id().to_string(),
        booth_num: token.booth.unwrap_or(default_booth),
        commitment,
        pref_id,
        hash_value: ballot.hash_string.clone().unwrap_or_default(),
        timestamp: now.to_rfc3339(),
    }
}

fn build_receipt(election: &ActiveElection, now: &DateTime<Local>) -> ReceiptData {
    let ballot = &election.ballot;
    let chosen: Vec<_> = election
        .selections
        .in_rank_order()
        .filter_map(|(_, id)| ballot.candidate(id))
        .collect();
    let choice = chosen
        .iter()
        .map(|candidate| candidate.id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let choice_qr = chosen
        .iter()
        .map(|candidate| {
            format!(
                "{}:{}",
                candidate.id,
                candidate.commitment.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(PREFERENCE_SEPARATOR);
    ReceiptData {
        election_id: election.election_id.clone(),
        election_name: ballot.election_name.clone(),
        ballot_id: ballot.ballot_id.clone(),
        timestamp: now.format("%d-%m-%y %H:%M:%S").to_string(),
        choice,
        choice_qr,
        voter_qr: ballot.raw_commitments.clone().unwrap_or_default(),
        election_hash: ballot.hash_string.clone().unwrap_or_default(),
    }
}
