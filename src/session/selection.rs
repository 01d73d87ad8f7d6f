use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::{Ballot, CandidateId, Rank, NO_PREFERENCE_ID, PREFERENCE_SEPARATOR};

/// The rank → candidate choices for one election.
///
/// Enforces the ranked-conflict rules: a real candidate may hold at most
/// one rank, while the "no preference" sentinel may repeat freely.
#[derive(Debug, Default, Clone)]
pub struct Selections {
    chosen: BTreeMap<Rank, CandidateId>,
}

impl Selections {
    /// Record the choice for a rank.
    ///
    /// A candidate already holding an earlier rank is refused (the error
    /// names that rank). Choosing a candidate here invalidates the same
    /// candidate at any later rank.
    pub fn set(&mut self, rank: Rank, candidate: CandidateId) -> Result<()> {
        if candidate != NO_PREFERENCE_ID {
            if let Some(earlier) = self.earlier_rank_of(rank, candidate) {
                return Err(Error::AlreadyRanked { rank: earlier });
            }
            self.chosen
                .retain(|&held_rank, &mut held| held_rank <= rank || held != candidate);
        }
        self.chosen.insert(rank, candidate);
        Ok(())
    }

    /// The earlier rank currently holding this candidate, if any. The
    /// sentinel never blocks.
    pub fn earlier_rank_of(&self, rank: Rank, candidate: CandidateId) -> Option<Rank> {
        if candidate == NO_PREFERENCE_ID {
            return None;
        }
        self.chosen
            .iter()
            .find(|&(&held_rank, &held)| held_rank < rank && held == candidate)
            .map(|(&held_rank, _)| held_rank)
    }

    pub fn get(&self, rank: Rank) -> Option<CandidateId> {
        self.chosen.get(&rank).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty()
    }

    /// Chosen candidates in rank order. Ranks invalidated by a later
    /// re-selection are simply absent.
    pub fn in_rank_order(&self) -> impl Iterator<Item = (Rank, CandidateId)> + '_ {
        self.chosen.iter().map(|(&rank, &candidate)| (rank, candidate))
    }

    /// The candidates' identifying numbers joined in rank order, skipping
    /// any rank left unresolved.
    pub fn preference_string(&self, ballot: &Ballot) -> String {
        self.join_resolved(ballot, |candidate| candidate.id.to_string())
    }

    /// The candidates' commitments joined in rank order, skipping any rank
    /// left unresolved.
    pub fn commitment_string(&self, ballot: &Ballot) -> String {
        self.join_resolved(ballot, |candidate| {
            candidate.commitment.clone().unwrap_or_default()
        })
    }

    fn join_resolved(
        &self,
        ballot: &Ballot,
        field: impl Fn(&crate::model::Candidate) -> String,
    ) -> String {
        self.chosen
            .values()
            .filter_map(|&candidate| ballot.candidate(candidate).map(&field))
            .collect::<Vec<_>>()
            .join(PREFERENCE_SEPARATOR)
    }
}
