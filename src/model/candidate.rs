use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::CandidateId;

/// The identifying number of the designated "no preference" candidate.
/// Unlike real candidates, it may legitimately repeat across ranks.
pub const NO_PREFERENCE_ID: CandidateId = 0;

/// One candidate as displayed on a single ballot.
///
/// The `id` is the per-ballot shuffled identifying number the voter sees;
/// the `entry_number` is the candidate's fixed registration number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub entry_number: String,
    pub party: Option<String>,
    pub commitment: Option<String>,
}

/// A candidate as it appears in ballot documents. Two schema generations
/// are in circulation: the older one uses `serial_id`/`candidate_number`,
/// the newer one `pref_id`/`entry_number`, and ids may be numbers or
/// numeric strings.
#[derive(Debug, Deserialize)]
pub(crate) struct RawCandidate {
    serial_id: Option<RawId>,
    pref_id: Option<RawId>,
    id: Option<RawId>,
    candidate_name: String,
    entry_number: Option<String>,
    candidate_number: Option<String>,
    candidate_party: Option<String>,
    commitment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u32),
    Str(String),
}

impl RawId {
    fn resolve(&self) -> Result<CandidateId> {
        match self {
            RawId::Num(n) => Ok(*n),
            RawId::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::BallotFormat(format!("candidate id {s:?} is not numeric"))),
        }
    }
}

/// Ballot documents carry candidates either as an ordered list or as a
/// keyed mapping. Both normalise to the same canonical list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCandidates {
    List(Vec<RawCandidate>),
    Keyed(BTreeMap<String, RawCandidate>),
}

impl Default for RawCandidates {
    fn default() -> Self {
        RawCandidates::List(Vec::new())
    }
}

impl RawCandidates {
    /// Emit the canonical candidate list, sorted by identifying number.
    pub(crate) fn normalize(self) -> Result<Vec<Candidate>> {
        let raws = match self {
            RawCandidates::List(list) => list,
            RawCandidates::Keyed(map) => map.into_values().collect(),
        };
        let mut candidates = raws
            .into_iter()
            .map(Candidate::from_raw)
            .collect::<Result<Vec<_>>>()?;
        candidates.sort_by_key(|c| c.id);
        Ok(candidates)
    }
}

impl Candidate {
    fn from_raw(raw: RawCandidate) -> Result<Self> {
        let id = raw
            .serial_id
            .as_ref()
            .or(raw.pref_id.as_ref())
            .or(raw.id.as_ref())
            .ok_or_else(|| {
                Error::BallotFormat(format!("candidate {:?} has no id", raw.candidate_name))
            })?
            .resolve()?;
        Ok(Candidate {
            id,
            name: raw.candidate_name,
            entry_number: raw.entry_number.or(raw.candidate_number).unwrap_or_default(),
            party: raw.candidate_party,
            commitment: raw.commitment,
        })
    }
}
