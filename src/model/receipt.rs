use serde::{Deserialize, Serialize};

use crate::model::{BallotId, ElectionId};

/// Printable fields for one completed election, buffered until the whole
/// session prints as a single batch.
///
/// The QR payloads are opaque strings here; rasterization belongs to the
/// print service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptData {
    pub election_id: ElectionId,
    pub election_name: String,
    /// The ballot id printed on the audit slip.
    pub ballot_id: BallotId,
    /// Session timestamp in the printed `%d-%m-%y %H:%M:%S` format.
    pub timestamp: String,
    /// Human-readable choice string, e.g. `"3"` or `"2, 0, 1"`.
    pub choice: String,
    /// Audit-slip QR payload: `id:commitment` entries joined per rank.
    pub choice_qr: String,
    /// Voter-slip QR payload: the ballot's raw commitment material.
    pub voter_qr: String,
    pub election_hash: String,
}
