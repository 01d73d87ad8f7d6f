use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::model::{Candidate, CandidateId, ElectionId};

/// How votes are captured for an election.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionType {
    /// Exactly one candidate is chosen.
    SingleChoice,
    /// Candidates are ordered by preference across `candidates - 1` ranks.
    Ranked,
}

impl ElectionType {
    /// Classify the free-form `election_type` label found in ballot
    /// documents. Anything not recognisably preferential is single-choice.
    pub(crate) fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("preferential") || label.contains("ranked") {
            ElectionType::Ranked
        } else {
            ElectionType::SingleChoice
        }
    }
}

/// Lifecycle of a pool ballot. Transitions are monotonic: `Unused` may
/// become `Used` or `Corrupt`, and both of those are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BallotStatus {
    Unused,
    Used,
    Corrupt,
}

impl From<BallotStatus> for Bson {
    fn from(status: BallotStatus) -> Self {
        to_bson(&status).expect("status serialisation is infallible")
    }
}

/// A decoded per-voter ballot document, already normalised: one canonical
/// candidate list sorted by identifying number, commitments merged in.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub ballot_id: String,
    pub election_id: ElectionId,
    pub election_name: String,
    pub election_type: ElectionType,
    /// Audit hash of the ballot document, when provisioned with one.
    pub hash_string: Option<String>,
    pub candidates: Vec<Candidate>,
    /// The serialized commitment array exactly as provisioned, kept for
    /// the voter receipt QR payload.
    pub raw_commitments: Option<String>,
}

impl Ballot {
    /// Look up a candidate by identifying number.
    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Number of preference ranks a ranked ballot offers.
    pub fn rank_count(&self) -> u32 {
        (self.candidates.len().saturating_sub(1)).max(1) as u32
    }

    /// The election metadata carried by this ballot.
    pub fn election(&self) -> Election {
        Election {
            id: self.election_id.clone(),
            name: self.election_name.clone(),
            election_type: self.election_type,
            candidate_count: self.candidates.len(),
        }
    }
}

/// Election metadata, as carried by every ballot document in its pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: ElectionId,
    pub name: String,
    pub election_type: ElectionType,
    pub candidate_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_type_labels() {
        assert_eq!(ElectionType::from_label("Preferential"), ElectionType::Ranked);
        assert_eq!(ElectionType::from_label("ranked choice"), ElectionType::Ranked);
        assert_eq!(ElectionType::from_label("Normal"), ElectionType::SingleChoice);
        assert_eq!(ElectionType::from_label(""), ElectionType::SingleChoice);
    }

    #[test]
    fn status_serialises_to_legacy_uppercase() {
        assert_eq!(serde_json::to_string(&BallotStatus::Unused).unwrap(), "\"UNUSED\"");
        assert_eq!(serde_json::to_string(&BallotStatus::Used).unwrap(), "\"USED\"");
        assert_eq!(serde_json::to_string(&BallotStatus::Corrupt).unwrap(), "\"CORRUPT\"");
        let status: BallotStatus = serde_json::from_str("\"USED\"").unwrap();
        assert_eq!(status, BallotStatus::Used);
    }

    #[test]
    fn rank_count_is_one_less_than_candidates() {
        let ballot = Ballot {
            ballot_id: "B1".into(),
            election_id: "E1".into(),
            election_name: "Test".into(),
            election_type: ElectionType::Ranked,
            hash_string: None,
            candidates: (0..4)
                .map(|id| Candidate {
                    id,
                    name: format!("c{id}"),
                    entry_number: String::new(),
                    party: None,
                    commitment: None,
                })
                .collect(),
            raw_commitments: None,
        };
        assert_eq!(ballot.rank_count(), 3);
    }
}
