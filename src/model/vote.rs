use serde::{Deserialize, Serialize};

use crate::model::ElectionId;

/// Separator between per-rank entries in a preference or commitment string.
pub const PREFERENCE_SEPARATOR: &str = "_";

/// One committed vote, as appended to the vote log. Field names match the
/// deployed `votes.json` schema and must not change. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub election_id: ElectionId,
    pub voter_id: String,
    pub booth_num: u32,
    /// The chosen candidate's commitment, or the rank-ordered joined
    /// commitments for a ranked vote.
    pub commitment: String,
    /// The chosen candidate's identifying number, or the rank-ordered
    /// joined numbers for a ranked vote.
    pub pref_id: String,
    pub hash_value: String,
    pub timestamp: String,
}
