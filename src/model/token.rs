use serde::Deserialize;

use crate::model::ElectionId;

/// The authorization payload carried by a voter's contactless card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterToken {
    pub token_id: String,
    /// The elections this voter may vote in, in visiting order.
    pub eid_vector: Vec<ElectionId>,
    pub entry_number: Option<String>,
    pub booth: Option<u32>,
}

/// Wire shape of a structured token payload.
#[derive(Debug, Deserialize)]
struct RawToken {
    token_id: Option<String>,
    eid_vector: Option<String>,
    entry_number: Option<String>,
    booth: Option<u32>,
}

impl VoterToken {
    /// Parse a card payload. Structured payloads carry a token id and a
    /// semicolon-delimited entitlement vector; anything else is treated as
    /// a legacy token whose id is the whole payload and which grants no
    /// entitlements.
    pub fn parse(payload: &str) -> Self {
        match serde_json::from_str::<RawToken>(payload) {
            Ok(raw) => VoterToken {
                token_id: raw.token_id.unwrap_or_else(|| payload.to_string()),
                eid_vector: raw
                    .eid_vector
                    .as_deref()
                    .map(parse_eid_vector)
                    .unwrap_or_default(),
                entry_number: raw.entry_number,
                booth: raw.booth,
            },
            Err(_) => VoterToken {
                token_id: payload.to_string(),
                eid_vector: Vec::new(),
                entry_number: None,
                booth: None,
            },
        }
    }

    /// The identifier recorded against each vote: the voter's entry number
    /// when the token carries one, otherwise the token id.
    pub fn voter_id(&self) -> &str {
        self.entry_number.as_deref().unwrap_or(&self.token_id)
    }
}

fn parse_eid_vector(vector: &str) -> Vec<ElectionId> {
    vector
        .split(';')
        .map(str::trim)
        .filter(|eid| !eid.is_empty())
        .map(String::from)
        .collect()
}
