//! Ballot file loading and decryption.
//!
//! Pool ballots arrive either as plaintext JSON documents or as a sequence
//! of fixed-size RSA-OAEP cipher blocks produced by the provisioning tools.
//! Both decode to the same canonical [`Ballot`]; nothing downstream ever
//! branches on the source shape.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::hardware::HardwareIdentity;
use crate::model::candidate::RawCandidates;
use crate::model::{Ballot, ElectionType};

/// Loads ballot files, transparently handling hardware-key-encrypted
/// payloads, and normalises their schema.
pub struct BallotDecryptor {
    key_path: PathBuf,
    identity: Box<dyn HardwareIdentity>,
    key: Option<RsaPrivateKey>,
}

/// Wire shape of a ballot document, before normalisation.
#[derive(Debug, Deserialize)]
struct RawBallot {
    election_id: Option<String>,
    election_name: Option<String>,
    election_type: Option<String>,
    hash_string: Option<String>,
    ballot_id: Option<String>,
    #[serde(default)]
    candidates: RawCandidates,
    commitments: Option<String>,
}

impl BallotDecryptor {
    pub fn new(key_path: impl Into<PathBuf>, identity: Box<dyn HardwareIdentity>) -> Self {
        Self {
            key_path: key_path.into(),
            identity,
            key: None,
        }
    }

    /// Read and decode one ballot file. Bytes that are not a structured
    /// document at all are treated as ciphertext and decrypted block by
    /// block before parsing again.
    pub fn load(&mut self, path: &Path) -> Result<Ballot> {
        let bytes = fs::read(path)?;
        match serde_json::from_slice::<RawBallot>(&bytes) {
            Ok(raw) => normalize_document(raw),
            Err(_) => {
                debug!("Ballot {} is not plaintext, decrypting", path.display());
                let plaintext = self.decrypt_blocks(&bytes)?;
                parse_document(&plaintext)
            }
        }
    }

    /// Split the ciphertext into cipher-sized blocks and decrypt each one
    /// independently, concatenating the recovered plaintext.
    fn decrypt_blocks(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.unlock_key()?;
        let block_size = key.size();
        if ciphertext.is_empty() || ciphertext.len() % block_size != 0 {
            return Err(Error::Decryption(format!(
                "ciphertext length {} is not a multiple of the {block_size}-byte cipher block",
                ciphertext.len()
            )));
        }
        let mut plaintext = Vec::new();
        for block in ciphertext.chunks(block_size) {
            let recovered = key
                .decrypt(Oaep::new::<Sha256>(), block)
                .map_err(|err| Error::Decryption(err.to_string()))?;
            plaintext.extend(recovered);
        }
        Ok(plaintext)
    }

    /// Unlock the device private key with the hardware-derived passphrase.
    /// The key is unlocked once and cached. Failure means the key (or the
    /// ballots) were provisioned for a different physical device.
    fn unlock_key(&mut self) -> Result<&RsaPrivateKey> {
        if self.key.is_none() {
            let pem = fs::read_to_string(&self.key_path).map_err(|err| {
                Error::KeyUnlock(format!(
                    "cannot read private key {}: {err}",
                    self.key_path.display()
                ))
            })?;
            let passphrase = self.identity.derive_passphrase()?;
            let key = RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, &passphrase)
                .map_err(|err| Error::KeyUnlock(err.to_string()))?;
            debug!("Device private key unlocked");
            self.key = Some(key);
        }
        match &self.key {
            Some(key) => Ok(key),
            None => unreachable!("key cache was just filled"),
        }
    }
}

fn parse_document(bytes: &[u8]) -> Result<Ballot> {
    let raw: RawBallot = serde_json::from_slice(bytes)?;
    normalize_document(raw)
}

fn normalize_document(raw: RawBallot) -> Result<Ballot> {
    let mut candidates = raw.candidates.normalize()?;
    if candidates.is_empty() {
        return Err(Error::BallotFormat("document has no candidates".to_string()));
    }

    // Commitments are an audit aid, not a correctness requirement; a
    // malformed commitment block must not sink the whole ballot.
    if let Some(serialized) = raw.commitments.as_deref() {
        match extract_commitments(serialized) {
            Some(hashes) => {
                for (candidate, hash) in candidates.iter_mut().zip(hashes) {
                    if candidate.commitment.is_none() {
                        candidate.commitment = Some(hash);
                    }
                }
            }
            None => warn!("Unparseable commitment block, continuing without commitments"),
        }
    }

    Ok(Ballot {
        ballot_id: raw.ballot_id.unwrap_or_else(|| "UNKNOWN".to_string()),
        election_id: raw.election_id.unwrap_or_default(),
        election_name: raw
            .election_name
            .unwrap_or_else(|| "General Election".to_string()),
        election_type: ElectionType::from_label(raw.election_type.as_deref().unwrap_or_default()),
        hash_string: raw.hash_string,
        candidates,
        raw_commitments: raw.commitments,
    })
}

/// The `commitments` field is a string holding a serialized nested array;
/// its first element is the per-candidate hash list, in candidate order.
fn extract_commitments(serialized: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(serialized).ok()?;
    value
        .as_array()?
        .first()?
        .as_array()?
        .iter()
        .map(|hash| hash.as_str().map(String::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPublicKey;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::hardware::DeviceIdentity;

    /// Plaintext chunk size used by the provisioning encryptor.
    const CHUNK_SIZE: usize = 150;

    struct FixedIdentity(&'static [u8]);

    impl HardwareIdentity for FixedIdentity {
        fn derive_passphrase(&self) -> Result<Vec<u8>> {
            Ok(self.0.to_vec())
        }
    }

    fn ballot_json(pad: usize) -> Vec<u8> {
        let doc = json!({
            "election_id": "E1",
            "election_name": "Student Council",
            "election_type": "Preferential",
            "hash_string": "deadbeef",
            "ballot_id": "AB12CD34",
            "candidates": [
                {"pref_id": "0", "entry_number": "012", "candidate_name": "NAFS"},
                {"pref_id": "1", "entry_number": "001", "candidate_name": "Alice"},
                {"pref_id": "2", "entry_number": "002", "candidate_name": "Bob"}
            ],
            "pad": "x".repeat(pad)
        });
        serde_json::to_vec(&doc).unwrap()
    }

    /// Pad the document so the serialized form is exactly `target` bytes.
    fn ballot_json_of_len(target: usize) -> Vec<u8> {
        let base = ballot_json(0).len();
        let bytes = ballot_json(target - base);
        assert_eq!(bytes.len(), target);
        bytes
    }

    fn encrypt_like_provisioner(key: &RsaPrivateKey, plaintext: &[u8]) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let public = RsaPublicKey::from(key);
        let mut ciphertext = Vec::new();
        for chunk in plaintext.chunks(CHUNK_SIZE) {
            ciphertext.extend(
                public
                    .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
                    .unwrap(),
            );
        }
        ciphertext
    }

    fn write_encrypted_key(dir: &Path, passphrase: &[u8]) -> (PathBuf, RsaPrivateKey) {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = key
            .to_pkcs8_encrypted_pem(&mut rng, passphrase, LineEnding::LF)
            .unwrap();
        let path = dir.join("private.pem");
        fs::write(&path, pem.as_bytes()).unwrap();
        (path, key)
    }

    #[test]
    fn loads_plaintext_ballot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("AB12CD34.json");
        fs::write(&path, ballot_json(0)).unwrap();

        let mut decryptor =
            BallotDecryptor::new(dir.path().join("missing.pem"), Box::new(DeviceIdentity));
        let ballot = decryptor.load(&path).unwrap();
        assert_eq!(ballot.ballot_id, "AB12CD34");
        assert_eq!(ballot.election_type, ElectionType::Ranked);
        assert_eq!(ballot.candidates.len(), 3);
        // Canonical order regardless of document order.
        assert_eq!(ballot.candidates[0].name, "NAFS");
        assert_eq!(ballot.candidates[2].id, 2);
    }

    #[test]
    fn encrypted_round_trip_across_block_boundaries() {
        let passphrase = b"test-passphrase";
        let dir = TempDir::new().unwrap();
        let (key_path, key) = write_encrypted_key(dir.path(), passphrase);
        let mut decryptor =
            BallotDecryptor::new(key_path, Box::new(FixedIdentity(passphrase)));

        // Just below, exactly at, and just above a chunk boundary, plus a
        // several-block payload.
        for target in [449, 450, 451, 607] {
            let plaintext = ballot_json_of_len(target);
            let path = dir.path().join(format!("ballot_{target}.json"));
            fs::write(&path, encrypt_like_provisioner(&key, &plaintext)).unwrap();

            let ballot = decryptor.load(&path).unwrap();
            assert_eq!(ballot.ballot_id, "AB12CD34", "payload size {target}");
            assert_eq!(ballot.election_id, "E1");
            assert_eq!(ballot.candidates.len(), 3);
        }
    }

    #[test]
    fn wrong_device_passphrase_is_key_unlock_failure() {
        let dir = TempDir::new().unwrap();
        let (key_path, key) = write_encrypted_key(dir.path(), b"the-real-device");
        let path = dir.path().join("ballot.json");
        fs::write(&path, encrypt_like_provisioner(&key, &ballot_json(0))).unwrap();

        let mut decryptor =
            BallotDecryptor::new(key_path, Box::new(FixedIdentity(b"some-other-device")));
        assert!(matches!(decryptor.load(&path), Err(Error::KeyUnlock(_))));
    }

    #[test]
    fn truncated_ciphertext_is_decryption_failure() {
        let passphrase = b"test-passphrase";
        let dir = TempDir::new().unwrap();
        let (key_path, key) = write_encrypted_key(dir.path(), passphrase);
        let mut ciphertext = encrypt_like_provisioner(&key, &ballot_json(0));
        ciphertext.truncate(ciphertext.len() - 7);
        let path = dir.path().join("ballot.json");
        fs::write(&path, ciphertext).unwrap();

        let mut decryptor =
            BallotDecryptor::new(key_path, Box::new(FixedIdentity(passphrase)));
        assert!(matches!(decryptor.load(&path), Err(Error::Decryption(_))));
    }

    #[test]
    fn commitments_are_extracted_per_candidate() {
        let commitments = json!([["h0", "h1", "h2"], [1, "[...]"]]).to_string();
        let doc = json!({
            "election_id": "E1",
            "election_type": "Normal",
            "ballot_id": "B1",
            "commitments": commitments,
            "candidates": [
                {"pref_id": "0", "candidate_name": "NAFS"},
                {"pref_id": "1", "candidate_name": "Alice"},
                {"pref_id": "2", "candidate_name": "Bob"}
            ]
        });
        let ballot = parse_document(&serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(ballot.candidates[0].commitment.as_deref(), Some("h0"));
        assert_eq!(ballot.candidates[2].commitment.as_deref(), Some("h2"));
        assert_eq!(ballot.raw_commitments.as_deref(), Some(commitments.as_str()));
    }

    #[test]
    fn malformed_commitments_are_tolerated() {
        let doc = json!({
            "election_id": "E1",
            "ballot_id": "B1",
            "commitments": "not a nested array",
            "candidates": [{"pref_id": "1", "candidate_name": "Alice"}]
        });
        let ballot = parse_document(&serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(ballot.candidates[0].commitment, None);
    }

    #[test]
    fn document_without_candidates_is_rejected() {
        let doc = json!({"election_id": "E1", "ballot_id": "B1"});
        assert!(matches!(
            parse_document(&serde_json::to_vec(&doc).unwrap()),
            Err(Error::BallotFormat(_))
        ));
    }
}
